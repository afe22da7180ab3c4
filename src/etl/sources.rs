//! Dynamic data-source registry.
//!
//! Maps contract addresses to the decoder that handles their events. Static
//! sources are seeded from configuration before the pipeline starts; template
//! sources are added at runtime when a factory reports a new child. A source is
//! registered once and never removed, so every later event from that address
//! is routed.
//!
//! When an `EngineDb` is attached, registrations are persisted and restored by
//! `load_from_db` on restart.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use primitive_types::H160;
use rainfold_common::address_hex;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::etl::engine_db::EngineDb;

/// A subscribed contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    pub address: H160,
    /// Name of the decoder that handles this contract
    pub decoder: String,
    /// Template name for sources spawned at runtime; None for static sources
    pub template: Option<String>,
    /// Events before this block are not routed to the source
    pub start_block: u64,
}

impl DataSource {
    pub fn static_source(address: H160, decoder: impl Into<String>, start_block: u64) -> Self {
        Self {
            address,
            decoder: decoder.into(),
            template: None,
            start_block,
        }
    }

    pub fn from_template(
        address: H160,
        template: impl Into<String>,
        decoder: impl Into<String>,
        start_block: u64,
    ) -> Self {
        Self {
            address,
            decoder: decoder.into(),
            template: Some(template.into()),
            start_block,
        }
    }
}

/// Shared address → data source table.
pub struct SourceRegistry {
    engine_db: Option<Arc<EngineDb>>,
    sources: RwLock<HashMap<H160, DataSource>>,
}

impl SourceRegistry {
    /// Registry persisted in the engine database.
    pub fn new(engine_db: Arc<EngineDb>) -> Self {
        Self {
            engine_db: Some(engine_db),
            sources: RwLock::new(HashMap::new()),
        }
    }

    /// Registry without persistence (tests, one-shot replays).
    pub fn in_memory() -> Self {
        Self {
            engine_db: None,
            sources: RwLock::new(HashMap::new()),
        }
    }

    /// Restores persisted registrations. Returns the number loaded.
    pub async fn load_from_db(&self) -> Result<usize> {
        let Some(engine_db) = &self.engine_db else {
            return Ok(0);
        };

        let persisted = engine_db.get_data_sources().await?;
        let count = persisted.len();

        let mut sources = self.sources.write().await;
        for source in persisted {
            sources.insert(source.address, source);
        }

        tracing::info!(
            target: "rainfold::etl::sources",
            count,
            "Loaded data sources from database"
        );

        Ok(count)
    }

    /// Registers a source.
    ///
    /// Returns `Ok(false)` without touching the existing entry when the address
    /// is already registered.
    pub async fn register(&self, source: DataSource) -> Result<bool> {
        let mut sources = self.sources.write().await;

        if let Some(existing) = sources.get(&source.address) {
            tracing::debug!(
                target: "rainfold::etl::sources",
                address = %address_hex(source.address),
                existing_decoder = %existing.decoder,
                "Data source already registered, ignoring"
            );
            return Ok(false);
        }

        if let Some(engine_db) = &self.engine_db {
            engine_db.insert_data_source(&source).await?;
        }

        tracing::info!(
            target: "rainfold::etl::sources",
            address = %address_hex(source.address),
            decoder = %source.decoder,
            template = source.template.as_deref().unwrap_or("-"),
            start_block = source.start_block,
            "Registered data source"
        );

        sources.insert(source.address, source);
        Ok(true)
    }

    pub async fn get(&self, address: H160) -> Option<DataSource> {
        self.sources.read().await.get(&address).cloned()
    }

    pub async fn is_registered(&self, address: H160) -> bool {
        self.sources.read().await.contains_key(&address)
    }

    pub async fn len(&self) -> usize {
        self.sources.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sources.read().await.is_empty()
    }

    /// All sources, sorted by address.
    pub async fn all(&self) -> Vec<DataSource> {
        let mut all: Vec<DataSource> = self.sources.read().await.values().cloned().collect();
        all.sort_by_key(|s| s.address);
        all
    }
}
