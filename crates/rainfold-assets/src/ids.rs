//! Entity keys.
//!
//! Keys join their components with `-`: the registry address first, then the
//! entity-local id, then the holder address, then the asset id. Addresses are
//! always rendered as `0x` + 40 lowercase hex digits and integers in decimal, so
//! no component can contain the delimiter and every key splits back into its
//! parts unambiguously.

use primitive_types::{H160, U256};
use rainfold_common::{address_hex, u256_decimal};

use crate::entities::TokenStandard;

pub const DELIMITER: char = '-';

pub fn registry_id(registry: H160) -> String {
    address_hex(registry)
}

pub fn factory_id(factory: H160) -> String {
    address_hex(factory)
}

/// Asset key. Price and eligibility script snapshots share it.
pub fn asset_id(registry: H160, asset_id: U256) -> String {
    format!("{}{DELIMITER}{}", address_hex(registry), u256_decimal(asset_id))
}

pub fn script_id(registry: H160, asset_id: U256) -> String {
    self::asset_id(registry, asset_id)
}

pub fn class_id(registry: H160, class_id: U256) -> String {
    format!("{}{DELIMITER}{}", address_hex(registry), u256_decimal(class_id))
}

pub fn creator_id(registry: H160, creator: H160) -> String {
    format!("{}{DELIMITER}{}", address_hex(registry), address_hex(creator))
}

pub fn holder_id(registry: H160, holder: H160) -> String {
    format!("{}{DELIMITER}{}", address_hex(registry), address_hex(holder))
}

pub fn balance_id(registry: H160, holder: H160, asset_id: U256) -> String {
    format!(
        "{}{DELIMITER}{}{DELIMITER}{}",
        address_hex(registry),
        address_hex(holder),
        u256_decimal(asset_id)
    )
}

/// Currency key, scoped to one registry. `token_id` is zero for standards
/// without token ids.
pub fn currency_id(registry: H160, token: H160, standard: TokenStandard, token_id: U256) -> String {
    format!(
        "{}{DELIMITER}{}{DELIMITER}{}{DELIMITER}{}",
        address_hex(registry),
        address_hex(token),
        standard.as_str(),
        u256_decimal(token_id)
    )
}

/// Key of the cached classification of a token contract (global, not per registry).
pub fn token_standard_id(token: H160) -> String {
    address_hex(token)
}
