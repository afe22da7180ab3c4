//! Normalized events.
//!
//! The three registry families name their parameters differently
//! (`_assetId` / `_itemId` / `assetId_`, `recepient` / `recipient`, ...). All
//! spellings decode into the same [`AssetEvent`], so the handlers only see one
//! shape per event type.

use primitive_types::{H160, U256};
use rainfold::etl::envelope::{TypeId, TypedBody};
use rainfold::etl::EventPosition;
use rainfold_common::{serde_address, serde_address_vec, serde_u256};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::any::Any;
use std::fmt;

use crate::error::ProjectionError;
use crate::family::ContractFamily;

/// Envelope type of every projected asset event.
pub const ASSET_EVENT_TYPE: &str = "assets.event";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Initialize,
    AdminChanged,
    BaseUriChanged,
    OwnershipTransferred,
    ClassCreated,
    CreatorAdded,
    CreatorRemoved,
    AssetCreated,
    AssetUpdated,
    TransferSingle,
    TransferBatch,
    Uri,
    Implementation,
    NewChild,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Opaque pricing or eligibility script configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptConfig {
    #[serde(default, with = "serde_u256::vec")]
    pub constants: Vec<U256>,
    /// Hex-encoded bytecode sources
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default, with = "serde_u256", alias = "stack_length")]
    pub stack_length: U256,
    #[serde(default, with = "serde_u256", alias = "arguments_length")]
    pub arguments_length: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClassCreated {
    #[serde(alias = "_classId", alias = "classId", with = "serde_u256")]
    pub class_id: U256,
    #[serde(default, alias = "_name")]
    pub name: String,
    #[serde(default, alias = "_description")]
    pub description: String,
    #[serde(default, alias = "_attributes")]
    pub attributes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetCreated {
    pub asset_id: U256,
    pub name: String,
    pub description: String,
    pub loot_box_id: U256,
    pub class_id: Option<U256>,
    pub creator: H160,
    pub rarity: U256,
    pub token_uri: String,
    pub currencies: Vec<H160>,
    /// Token ids consumed in order by currencies that need one; `None` when
    /// the event lists bare token addresses
    pub currency_token_ids: Option<Vec<U256>>,
    pub price_script: ScriptConfig,
    pub eligibility_script: ScriptConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetUpdated {
    pub asset_id: U256,
    pub loot_box_id: Option<U256>,
    pub eligibility_script: Option<ScriptConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransferSingle {
    #[serde(default, with = "serde_address::option")]
    pub operator: Option<H160>,
    #[serde(with = "serde_address")]
    pub from: H160,
    #[serde(with = "serde_address")]
    pub to: H160,
    #[serde(with = "serde_u256")]
    pub id: U256,
    #[serde(with = "serde_u256")]
    pub value: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransferBatch {
    #[serde(default, with = "serde_address::option")]
    pub operator: Option<H160>,
    #[serde(with = "serde_address")]
    pub from: H160,
    #[serde(with = "serde_address")]
    pub to: H160,
    #[serde(with = "serde_u256::vec")]
    pub ids: Vec<U256>,
    #[serde(with = "serde_u256::vec")]
    pub values: Vec<U256>,
}

/// One event of a registry or factory, with its parameters normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetEvent {
    Initialize {
        owner: Option<H160>,
        base_uri: Option<String>,
    },
    AdminChanged {
        admin: H160,
    },
    BaseUriChanged {
        base_uri: String,
    },
    OwnershipTransferred {
        new_owner: H160,
    },
    ClassCreated(ClassCreated),
    CreatorAdded {
        creator: H160,
    },
    CreatorRemoved {
        creator: H160,
    },
    AssetCreated(Box<AssetCreated>),
    AssetUpdated(AssetUpdated),
    TransferSingle(TransferSingle),
    TransferBatch(TransferBatch),
    Uri {
        id: U256,
        value: String,
    },
    Implementation {
        implementation: H160,
    },
    NewChild {
        sender: H160,
        child: H160,
    },
}

impl AssetEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AssetEvent::Initialize { .. } => EventKind::Initialize,
            AssetEvent::AdminChanged { .. } => EventKind::AdminChanged,
            AssetEvent::BaseUriChanged { .. } => EventKind::BaseUriChanged,
            AssetEvent::OwnershipTransferred { .. } => EventKind::OwnershipTransferred,
            AssetEvent::ClassCreated(_) => EventKind::ClassCreated,
            AssetEvent::CreatorAdded { .. } => EventKind::CreatorAdded,
            AssetEvent::CreatorRemoved { .. } => EventKind::CreatorRemoved,
            AssetEvent::AssetCreated(_) => EventKind::AssetCreated,
            AssetEvent::AssetUpdated(_) => EventKind::AssetUpdated,
            AssetEvent::TransferSingle(_) => EventKind::TransferSingle,
            AssetEvent::TransferBatch(_) => EventKind::TransferBatch,
            AssetEvent::Uri { .. } => EventKind::Uri,
            AssetEvent::Implementation { .. } => EventKind::Implementation,
            AssetEvent::NewChild { .. } => EventKind::NewChild,
        }
    }

    /// Decodes the ABI parameters of an event already routed to `kind`.
    ///
    /// `event_name` is only used for diagnostics.
    pub fn decode(
        kind: EventKind,
        event_name: &str,
        params: &serde_json::Value,
    ) -> Result<Self, ProjectionError> {
        let event = match kind {
            EventKind::Initialize => {
                let p: InitializeParams = parse(event_name, params)?;
                let config = p.config.unwrap_or_default();
                AssetEvent::Initialize {
                    owner: config.creator,
                    base_uri: config.base_uri,
                }
            }
            EventKind::AdminChanged => {
                let p: AdminChangedParams = parse(event_name, params)?;
                AssetEvent::AdminChanged { admin: p.admin }
            }
            EventKind::BaseUriChanged => {
                let p: BaseUriChangedParams = parse(event_name, params)?;
                AssetEvent::BaseUriChanged {
                    base_uri: p.base_uri,
                }
            }
            EventKind::OwnershipTransferred => {
                let p: OwnershipTransferredParams = parse(event_name, params)?;
                AssetEvent::OwnershipTransferred {
                    new_owner: p.new_owner,
                }
            }
            EventKind::ClassCreated => AssetEvent::ClassCreated(parse(event_name, params)?),
            EventKind::CreatorAdded => {
                let p: CreatorAddedParams = parse(event_name, params)?;
                AssetEvent::CreatorAdded { creator: p.creator }
            }
            EventKind::CreatorRemoved => {
                let p: CreatorRemovedParams = parse(event_name, params)?;
                AssetEvent::CreatorRemoved { creator: p.creator }
            }
            EventKind::AssetCreated => {
                let p: AssetCreatedParams = parse(event_name, params)?;
                AssetEvent::AssetCreated(Box::new(p.into_event(event_name)?))
            }
            EventKind::AssetUpdated => {
                let p: AssetUpdatedParams = parse(event_name, params)?;
                AssetEvent::AssetUpdated(AssetUpdated {
                    asset_id: p.asset_id,
                    loot_box_id: p.asset.and_then(|a| a.loot_box_id),
                    eligibility_script: p.eligibility_script,
                })
            }
            EventKind::TransferSingle => AssetEvent::TransferSingle(parse(event_name, params)?),
            EventKind::TransferBatch => {
                let batch: TransferBatch = parse(event_name, params)?;
                if batch.ids.len() != batch.values.len() {
                    return Err(ProjectionError::malformed(
                        event_name,
                        format!(
                            "{} ids but {} values",
                            batch.ids.len(),
                            batch.values.len()
                        ),
                    ));
                }
                AssetEvent::TransferBatch(batch)
            }
            EventKind::Uri => {
                let p: UriParams = parse(event_name, params)?;
                AssetEvent::Uri {
                    id: p.id,
                    value: p.value,
                }
            }
            EventKind::Implementation => {
                let p: ImplementationParams = parse(event_name, params)?;
                AssetEvent::Implementation {
                    implementation: p.implementation,
                }
            }
            EventKind::NewChild => {
                let p: NewChildParams = parse(event_name, params)?;
                AssetEvent::NewChild {
                    sender: p.sender,
                    child: p.child,
                }
            }
        };
        Ok(event)
    }
}

/// Envelope body carrying a normalized event and where it came from.
#[derive(Debug, Clone)]
pub struct AssetEventBody {
    /// Emitting contract
    pub contract: H160,
    pub family: ContractFamily,
    pub block_number: u64,
    pub block_timestamp: u64,
    pub position: EventPosition,
    pub event: AssetEvent,
}

impl TypedBody for AssetEventBody {
    fn envelope_type_id(&self) -> TypeId {
        TypeId::new(ASSET_EVENT_TYPE)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn parse<T: DeserializeOwned>(
    event_name: &str,
    params: &serde_json::Value,
) -> Result<T, ProjectionError> {
    T::deserialize(params).map_err(|e| ProjectionError::malformed(event_name, e))
}

// ===== ABI parameter shapes =====

#[derive(Deserialize)]
struct InitializeParams {
    #[serde(default, alias = "config_", alias = "_config")]
    config: Option<InitializeConfig>,
}

#[derive(Default, Deserialize)]
struct InitializeConfig {
    #[serde(
        default,
        alias = "_creator",
        alias = "_accessoriesCreator",
        alias = "owner",
        with = "serde_address::option"
    )]
    creator: Option<H160>,
    #[serde(default, alias = "_baseURI", alias = "baseURI")]
    base_uri: Option<String>,
}

#[derive(Deserialize)]
struct AdminChangedParams {
    #[serde(alias = "_admin", alias = "newAdmin", with = "serde_address")]
    admin: H160,
}

#[derive(Deserialize)]
struct BaseUriChangedParams {
    #[serde(alias = "_baseURI", alias = "baseURI")]
    base_uri: String,
}

#[derive(Deserialize)]
struct OwnershipTransferredParams {
    #[serde(alias = "newOwner", with = "serde_address")]
    new_owner: H160,
}

#[derive(Deserialize)]
struct CreatorAddedParams {
    #[serde(alias = "_addedCreator", alias = "_creator", with = "serde_address")]
    creator: H160,
}

#[derive(Deserialize)]
struct CreatorRemovedParams {
    #[serde(alias = "_removedCreator", alias = "_creator", with = "serde_address")]
    creator: H160,
}

#[derive(Deserialize)]
struct AssetCreatedParams {
    #[serde(
        alias = "_assetId",
        alias = "_itemId",
        alias = "assetId_",
        alias = "assetId",
        alias = "itemId",
        with = "serde_u256"
    )]
    asset_id: U256,
    #[serde(default, alias = "_name", alias = "name_")]
    name: String,
    #[serde(default, alias = "_description", alias = "description_")]
    description: String,
    #[serde(alias = "_asset", alias = "_item", alias = "asset_", alias = "item")]
    asset: AssetDetails,
    #[serde(
        default,
        alias = "_priceConfig",
        alias = "_priceScript",
        alias = "priceConfig",
        alias = "priceScript"
    )]
    price_script: Option<ScriptConfig>,
    #[serde(
        default,
        alias = "_canMintConfig",
        alias = "_canMintScript",
        alias = "canMintConfig",
        alias = "canMintScript"
    )]
    eligibility_script: Option<ScriptConfig>,
}

impl AssetCreatedParams {
    fn into_event(self, event_name: &str) -> Result<AssetCreated, ProjectionError> {
        let AssetDetails {
            loot_box_id,
            class_id,
            creator,
            rarity,
            token_uri,
            currencies,
            vm_state_config,
        } = self.asset;

        let creator = creator.ok_or_else(|| {
            ProjectionError::malformed(event_name, "asset has neither creator nor recipient")
        })?;

        let (currencies, currency_token_ids) = match currencies {
            CurrencyList::Tokens(tokens) => (tokens, None),
            CurrencyList::Detailed { token, token_id } => (token, Some(token_id)),
        };

        Ok(AssetCreated {
            asset_id: self.asset_id,
            name: self.name,
            description: self.description,
            loot_box_id: loot_box_id.unwrap_or_default(),
            class_id,
            creator,
            rarity,
            token_uri,
            currencies,
            currency_token_ids,
            price_script: self.price_script.or(vm_state_config).unwrap_or_default(),
            eligibility_script: self.eligibility_script.unwrap_or_default(),
        })
    }
}

#[derive(Deserialize)]
struct AssetDetails {
    #[serde(default, alias = "lootBoxId", with = "serde_u256::option")]
    loot_box_id: Option<U256>,
    #[serde(
        default,
        alias = "assetClass",
        alias = "itemClass",
        with = "serde_u256::option"
    )]
    class_id: Option<U256>,
    #[serde(
        default,
        alias = "recepient",
        alias = "recipient",
        with = "serde_address::option"
    )]
    creator: Option<H160>,
    #[serde(default, with = "serde_u256")]
    rarity: U256,
    #[serde(default, alias = "tokenURI", alias = "tokenUri")]
    token_uri: String,
    #[serde(default)]
    currencies: CurrencyList,
    #[serde(default, alias = "vmStateConfig")]
    vm_state_config: Option<ScriptConfig>,
}

/// Either a bare list of token addresses or `{ token: [...], tokenId: [...] }`.
/// A `tokenType` list alongside is ignored; the classifier decides the standard.
#[derive(Deserialize)]
#[serde(untagged)]
enum CurrencyList {
    Tokens(#[serde(with = "serde_address_vec")] Vec<H160>),
    Detailed {
        #[serde(with = "serde_address_vec")]
        token: Vec<H160>,
        #[serde(default, alias = "tokenId", alias = "tokenIds", with = "serde_u256::vec")]
        token_id: Vec<U256>,
    },
}

impl Default for CurrencyList {
    fn default() -> Self {
        CurrencyList::Tokens(Vec::new())
    }
}

#[derive(Deserialize)]
struct AssetUpdatedParams {
    #[serde(
        alias = "_assetId",
        alias = "_itemId",
        alias = "assetId_",
        alias = "assetId",
        alias = "itemId",
        with = "serde_u256"
    )]
    asset_id: U256,
    #[serde(default, alias = "_asset", alias = "_item", alias = "asset_", alias = "item")]
    asset: Option<AssetDetails>,
    #[serde(
        default,
        alias = "_canMintConfig",
        alias = "_canMintScript",
        alias = "canMintConfig",
        alias = "canMintScript"
    )]
    eligibility_script: Option<ScriptConfig>,
}

#[derive(Deserialize)]
struct UriParams {
    #[serde(alias = "_value", alias = "uri")]
    value: String,
    #[serde(with = "serde_u256")]
    id: U256,
}

#[derive(Deserialize)]
struct ImplementationParams {
    #[serde(with = "serde_address")]
    implementation: H160,
}

#[derive(Deserialize)]
struct NewChildParams {
    #[serde(with = "serde_address")]
    sender: H160,
    #[serde(with = "serde_address")]
    child: H160,
}
