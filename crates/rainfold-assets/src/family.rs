//! Contract families and the event names each of them emits.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::events::EventKind;

/// A kind of contract whose events are projected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractFamily {
    GameAssets,
    Accessories,
    Rain1155,
    GameAssetsFactory,
    AccessoriesFactory,
}

/// What a family does with an event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventRoute {
    /// Decoded into the given normalized event
    Project(EventKind),
    /// Emitted by the family but carries no projection
    Ignored,
    /// Not part of the family's ABI
    Unknown,
}

const REGISTRY_IGNORED: &[&str] = &["Snapshot", "ApprovalForAll"];

impl ContractFamily {
    pub const ALL: [ContractFamily; 5] = [
        ContractFamily::GameAssets,
        ContractFamily::Accessories,
        ContractFamily::Rain1155,
        ContractFamily::GameAssetsFactory,
        ContractFamily::AccessoriesFactory,
    ];

    /// Name of the decoder handling this family; persisted with every data source.
    pub fn decoder_name(self) -> &'static str {
        match self {
            ContractFamily::GameAssets => "game_assets",
            ContractFamily::Accessories => "accessories",
            ContractFamily::Rain1155 => "rain1155",
            ContractFamily::GameAssetsFactory => "game_assets_factory",
            ContractFamily::AccessoriesFactory => "accessories_factory",
        }
    }

    pub fn from_decoder_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.decoder_name() == name)
    }

    pub fn is_factory(self) -> bool {
        matches!(
            self,
            ContractFamily::GameAssetsFactory | ContractFamily::AccessoriesFactory
        )
    }

    /// Registry family spawned by a factory family.
    pub fn child_family(self) -> Option<ContractFamily> {
        match self {
            ContractFamily::GameAssetsFactory => Some(ContractFamily::GameAssets),
            ContractFamily::AccessoriesFactory => Some(ContractFamily::Accessories),
            _ => None,
        }
    }

    /// Template name recorded on sources spawned by this factory family.
    pub fn template_name(self) -> Option<&'static str> {
        match self {
            ContractFamily::GameAssetsFactory => Some("GameAssetsTemplate"),
            ContractFamily::AccessoriesFactory => Some("AccessoriesTemplate"),
            _ => None,
        }
    }

    /// Routes an ABI event name for this family.
    pub fn route(self, event_name: &str) -> EventRoute {
        let kind = match (self, event_name) {
            (ContractFamily::GameAssetsFactory | ContractFamily::AccessoriesFactory, name) => {
                match name {
                    "Implementation" => Some(EventKind::Implementation),
                    "NewChild" => Some(EventKind::NewChild),
                    _ => None,
                }
            }
            (_, "Initialize") => Some(EventKind::Initialize),
            (_, "TransferSingle") => Some(EventKind::TransferSingle),
            (_, "TransferBatch") => Some(EventKind::TransferBatch),
            (_, "URI") => Some(EventKind::Uri),
            (ContractFamily::GameAssets | ContractFamily::Rain1155, "AssetCreated")
            | (ContractFamily::Accessories, "ItemCreated") => Some(EventKind::AssetCreated),
            (ContractFamily::GameAssets, "AssetUpdated")
            | (ContractFamily::Accessories, "ItemUpdated") => Some(EventKind::AssetUpdated),
            (ContractFamily::GameAssets | ContractFamily::Accessories, name) => match name {
                "AdminChanged" => Some(EventKind::AdminChanged),
                "BaseURIChanged" => Some(EventKind::BaseUriChanged),
                "OwnershipTransferred" => Some(EventKind::OwnershipTransferred),
                "ClassCreated" => Some(EventKind::ClassCreated),
                "CreatorAdded" => Some(EventKind::CreatorAdded),
                "CreatorRemoved" => Some(EventKind::CreatorRemoved),
                _ => None,
            },
            _ => None,
        };

        match kind {
            Some(kind) => EventRoute::Project(kind),
            None if !self.is_factory() && REGISTRY_IGNORED.contains(&event_name) => {
                EventRoute::Ignored
            }
            None => EventRoute::Unknown,
        }
    }
}

impl fmt::Display for ContractFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContractFamily::GameAssets => "GameAssets",
            ContractFamily::Accessories => "Accessories",
            ContractFamily::Rain1155 => "Rain1155",
            ContractFamily::GameAssetsFactory => "GameAssetsFactory",
            ContractFamily::AccessoriesFactory => "AccessoriesFactory",
        };
        f.write_str(name)
    }
}
