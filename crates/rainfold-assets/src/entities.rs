//! Entity records of the projected graph.
//!
//! Every record is stored as a JSON document under `(EntityKind, id)`.
//! Cross references between records are entity ids (see [`crate::ids`]).

use bigdecimal::BigDecimal;
use primitive_types::{H160, U256};
use rainfold_common::{serde_address, serde_u256};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::events::ScriptConfig;
use crate::family::ContractFamily;

/// Store namespace of an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Registry,
    Factory,
    Asset,
    PriceScript,
    EligibilityScript,
    Class,
    Creator,
    Holder,
    BalanceRecord,
    Currency,
    TokenStandard,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Registry => "registry",
            EntityKind::Factory => "factory",
            EntityKind::Asset => "asset",
            EntityKind::PriceScript => "price_script",
            EntityKind::EligibilityScript => "eligibility_script",
            EntityKind::Class => "class",
            EntityKind::Creator => "creator",
            EntityKind::Holder => "holder",
            EntityKind::BalanceRecord => "balance_record",
            EntityKind::Currency => "currency",
            EntityKind::TokenStandard => "token_standard",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record with a fixed store namespace and its own key.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    const KIND: EntityKind;

    fn id(&self) -> &str;
}

macro_rules! impl_entity {
    ($ty:ty, $kind:expr) => {
        impl Entity for $ty {
            const KIND: EntityKind = $kind;

            fn id(&self) -> &str {
                &self.id
            }
        }
    };
}

/// Root of one deployed asset registry contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registry {
    pub id: String,
    pub family: ContractFamily,
    #[serde(with = "serde_address")]
    pub owner: H160,
    #[serde(with = "serde_address")]
    pub admin: H160,
    pub base_uri: String,
    pub deploy_block: u64,
    pub deploy_timestamp: u64,
    /// Always equal to `assets.len()`
    pub total_assets: u64,
    pub assets: Vec<String>,
    pub holders: Vec<String>,
    pub classes: Vec<String>,
    pub creators: Vec<String>,
}

impl Registry {
    pub fn new(id: String, family: ContractFamily, deploy_block: u64, deploy_timestamp: u64) -> Self {
        Self {
            id,
            family,
            owner: H160::zero(),
            admin: H160::zero(),
            base_uri: String::new(),
            deploy_block,
            deploy_timestamp,
            total_assets: 0,
            assets: Vec::new(),
            holders: Vec::new(),
            classes: Vec::new(),
            creators: Vec::new(),
        }
    }
}

impl_entity!(Registry, EntityKind::Registry);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factory {
    pub id: String,
    pub family: ContractFamily,
    #[serde(with = "serde_address")]
    pub implementation: H160,
    /// Registry ids spawned by this factory, in spawn order
    pub children: Vec<String>,
}

impl_entity!(Factory, EntityKind::Factory);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub registry: String,
    #[serde(with = "serde_u256")]
    pub asset_id: U256,
    pub name: String,
    pub description: String,
    #[serde(with = "serde_u256")]
    pub loot_box_id: U256,
    /// Creator (GameAssets, Accessories) or recipient (Rain1155)
    #[serde(with = "serde_address")]
    pub creator: H160,
    #[serde(with = "serde_u256")]
    pub rarity: U256,
    /// Class id; always resolves once set
    pub class: Option<String>,
    pub creation_block: u64,
    pub creation_timestamp: u64,
    pub token_uri: String,
    /// Currency ids in the order the event listed them
    pub currencies: Vec<String>,
    pub price_script: String,
    pub eligibility_script: String,
}

impl_entity!(Asset, EntityKind::Asset);

macro_rules! script_entity {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            pub id: String,
            #[serde(with = "serde_u256::vec")]
            pub constants: Vec<U256>,
            pub sources: Vec<String>,
            #[serde(with = "serde_u256")]
            pub stack_length: U256,
            #[serde(with = "serde_u256")]
            pub arguments_length: U256,
        }

        impl $name {
            pub fn snapshot(id: String, config: &ScriptConfig) -> Self {
                Self {
                    id,
                    constants: config.constants.clone(),
                    sources: config.sources.iter().map(|s| s.to_lowercase()).collect(),
                    stack_length: config.stack_length,
                    arguments_length: config.arguments_length,
                }
            }
        }

        impl_entity!($name, $kind);
    };
}

script_entity!(
    /// Snapshot of an asset's pricing script.
    PriceScript,
    EntityKind::PriceScript
);

script_entity!(
    /// Snapshot of an asset's mint-eligibility script.
    EligibilityScript,
    EntityKind::EligibilityScript
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
    pub id: String,
    #[serde(with = "serde_u256")]
    pub class_id: U256,
    pub name: String,
    pub description: String,
    pub attributes: Vec<String>,
}

impl_entity!(Class, EntityKind::Class);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Creator {
    pub id: String,
    #[serde(with = "serde_address")]
    pub address: H160,
    pub assets_created: Vec<String>,
}

impl_entity!(Creator, EntityKind::Creator);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holder {
    pub id: String,
    pub registry: String,
    #[serde(with = "serde_address")]
    pub address: H160,
    /// Balance record ids, first receipt first
    pub balances: Vec<String>,
}

impl_entity!(Holder, EntityKind::Holder);

/// Running unit count of one asset held by one holder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub id: String,
    pub holder: String,
    /// Asset id, when the asset existed at the first transfer
    pub asset: Option<String>,
    #[serde(with = "serde_u256")]
    pub asset_id: U256,
    /// Signed; only negative for a stream that sends before it receives
    pub count: BigDecimal,
}

impl_entity!(BalanceRecord, EntityKind::BalanceRecord);

/// Token standard detected by probing a token contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenStandard {
    #[serde(rename = "ERC20")]
    Fungible,
    #[serde(rename = "ERC721")]
    NonFungible,
    #[serde(rename = "ERC1155")]
    MultiToken,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl TokenStandard {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenStandard::Fungible => "ERC20",
            TokenStandard::NonFungible => "ERC721",
            TokenStandard::MultiToken => "ERC1155",
            TokenStandard::Unknown => "UNKNOWN",
        }
    }

    /// Whether currencies of this standard are identified by a token id.
    pub fn has_token_id(self) -> bool {
        matches!(self, TokenStandard::NonFungible | TokenStandard::MultiToken)
    }
}

impl fmt::Display for TokenStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified payment or eligibility token, scoped to one registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Currency {
    pub id: String,
    pub registry: String,
    #[serde(with = "serde_address")]
    pub address: H160,
    pub standard: TokenStandard,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
    #[serde(default, with = "serde_u256::option")]
    pub token_id: Option<U256>,
    pub token_uri: Option<String>,
}

impl_entity!(Currency, EntityKind::Currency);

/// Cached probe result for a token contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenStandardRecord {
    pub id: String,
    #[serde(with = "serde_address")]
    pub address: H160,
    pub standard: TokenStandard,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
}

impl_entity!(TokenStandardRecord, EntityKind::TokenStandard);
