//! Common utilities for rainfold projections
//!
//! Provides the canonical text forms of EVM addresses and 256-bit integers,
//! tolerant serde adapters for event parameters, and the token introspection
//! seam used by the currency classifier.

pub mod abi;
pub mod introspection;

use anyhow::{Context, Result};
use bigdecimal::BigDecimal;
use primitive_types::{H160, U256};
use std::str::FromStr;

pub use introspection::{NoopIntrospector, RpcIntrospector, TokenIntrospector};

/// Errors produced while parsing textual addresses and integers.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("invalid address '{0}': expected 20 bytes of hex")]
    InvalidAddress(String),
    #[error("invalid integer '{0}'")]
    InvalidInteger(String),
}

// ===== Address formatting =====

/// Canonical text form of an address: `0x` followed by 40 lowercase hex digits.
pub fn address_hex(address: H160) -> String {
    format!("{address:#x}")
}

/// Parses a `0x`-prefixed (or bare) 20-byte hex address, case-insensitively.
pub fn parse_address(input: &str) -> Result<H160, ParseError> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let bytes =
        hex::decode(digits).map_err(|_| ParseError::InvalidAddress(input.to_string()))?;
    if bytes.len() != 20 {
        return Err(ParseError::InvalidAddress(input.to_string()));
    }
    Ok(H160::from_slice(&bytes))
}

// ===== U256 conversions =====

/// Parses a decimal string or a `0x` hex string into a U256.
pub fn parse_u256(input: &str) -> Result<U256, ParseError> {
    let trimmed = input.trim();
    let parsed = if let Some(hex_digits) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        if hex_digits.is_empty() {
            Ok(U256::zero())
        } else {
            U256::from_str_radix(hex_digits, 16).map_err(|_| ())
        }
    } else if trimmed.is_empty() {
        Err(())
    } else {
        U256::from_dec_str(trimmed).map_err(|_| ())
    };
    parsed.map_err(|()| ParseError::InvalidInteger(input.to_string()))
}

/// Canonical decimal text of a U256 (no leading zeros, `0` for zero).
pub fn u256_decimal(value: U256) -> String {
    value.to_string()
}

/// Converts a U256 into an arbitrary precision decimal.
pub fn u256_to_bigdecimal(value: U256) -> Result<BigDecimal> {
    BigDecimal::from_str(&value.to_string())
        .with_context(|| format!("Failed to convert {value} to decimal"))
}

/// Serde adapters for U256 values carried as JSON numbers, decimal strings or hex strings.
///
/// Serialization always emits the decimal string form.
pub mod serde_u256 {
    use primitive_types::U256;
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    fn from_raw<E: de::Error>(raw: Raw) -> Result<U256, E> {
        match raw {
            Raw::Number(n) => Ok(U256::from(n)),
            Raw::Text(s) => super::parse_u256(&s).map_err(E::custom),
        }
    }

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        from_raw(Raw::deserialize(deserializer)?)
    }

    /// Same as the parent module, for `Vec<U256>`.
    pub mod vec {
        use super::{from_raw, Raw};
        use primitive_types::U256;
        use serde::ser::SerializeSeq;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(values: &[U256], serializer: S) -> Result<S::Ok, S::Error> {
            let mut seq = serializer.serialize_seq(Some(values.len()))?;
            for value in values {
                seq.serialize_element(&value.to_string())?;
            }
            seq.end()
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<U256>, D::Error> {
            Vec::<Raw>::deserialize(deserializer)?
                .into_iter()
                .map(from_raw)
                .collect()
        }
    }

    /// Same as the parent module, for `Option<U256>`.
    pub mod option {
        use super::{from_raw, Raw};
        use primitive_types::U256;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<U256>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => serializer.collect_str(v),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<U256>, D::Error> {
            Option::<Raw>::deserialize(deserializer)?
                .map(from_raw)
                .transpose()
        }
    }
}

/// Serde adapter for a list of addresses, accepting any hex casing.
pub mod serde_address_vec {
    use primitive_types::H160;
    use serde::ser::SerializeSeq;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[H160], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            seq.serialize_element(&super::address_hex(*value))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<H160>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|s| super::parse_address(s).map_err(de::Error::custom))
            .collect()
    }
}

/// Serde adapter for a single address, accepting any hex casing.
pub mod serde_address {
    use primitive_types::H160;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &H160, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::address_hex(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<H160, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_address(&raw).map_err(de::Error::custom)
    }

    /// Same as the parent module, for `Option<H160>`.
    pub mod option {
        use primitive_types::H160;
        use serde::{de, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<H160>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => serializer.serialize_str(&crate::address_hex(*v)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<H160>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| crate::parse_address(&raw).map_err(de::Error::custom))
                .transpose()
        }
    }
}
