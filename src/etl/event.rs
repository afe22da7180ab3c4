//! Inbound chain event record and its total order.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context};
use primitive_types::{H160, H256};
use rainfold_common::{address_hex, serde_address};
use serde::{Deserialize, Serialize};

/// A decoded log emitted by a contract.
///
/// `params` holds the ABI-decoded event arguments keyed by their ABI names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmittedEvent {
    #[serde(with = "serde_address")]
    pub address: H160,
    #[serde(alias = "event")]
    pub name: String,
    #[serde(default, alias = "args")]
    pub params: serde_json::Value,
    #[serde(alias = "block_number")]
    pub block_number: u64,
    #[serde(default, alias = "block_timestamp")]
    pub block_timestamp: u64,
    #[serde(default, alias = "transaction_hash")]
    pub transaction_hash: H256,
    #[serde(default, alias = "transaction_index")]
    pub transaction_index: u64,
    #[serde(default, alias = "log_index")]
    pub log_index: u64,
}

impl EmittedEvent {
    pub fn position(&self) -> EventPosition {
        EventPosition {
            block_number: self.block_number,
            transaction_index: self.transaction_index,
            log_index: self.log_index,
        }
    }

    /// Envelope metadata describing where this event came from.
    pub fn metadata(&self) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        metadata.insert("address".to_string(), address_hex(self.address));
        metadata.insert("event".to_string(), self.name.clone());
        metadata.insert("tx_hash".to_string(), format!("{:#x}", self.transaction_hash));
        metadata.insert("block_number".to_string(), self.block_number.to_string());
        metadata.insert(
            "block_timestamp".to_string(),
            self.block_timestamp.to_string(),
        );
        metadata.insert("position".to_string(), self.position().to_string());
        metadata
    }
}

/// Chain order of an event: block, then transaction, then log index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventPosition {
    pub block_number: u64,
    pub transaction_index: u64,
    pub log_index: u64,
}

impl EventPosition {
    pub fn new(block_number: u64, transaction_index: u64, log_index: u64) -> Self {
        Self {
            block_number,
            transaction_index,
            log_index,
        }
    }
}

impl fmt::Display for EventPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.block_number, self.transaction_index, self.log_index
        )
    }
}

impl FromStr for EventPosition {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 {
            bail!("Invalid event position '{s}', expected block:tx:log");
        }
        Ok(Self {
            block_number: parts[0].parse().context("Invalid block number")?,
            transaction_index: parts[1].parse().context("Invalid transaction index")?,
            log_index: parts[2].parse().context("Invalid log index")?,
        })
    }
}
