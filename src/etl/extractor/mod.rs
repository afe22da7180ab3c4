//! Extractor trait for fetching events from various sources

pub mod replay;

use crate::etl::engine_db::EngineDb;
use crate::etl::event::EmittedEvent;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

pub use replay::ReplayExtractor;

/// Block context information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockContext {
    pub number: u64,
    pub timestamp: u64,
}

/// Batch of events in chain order, with block context deduplicated by number.
#[derive(Debug, Clone, Default)]
pub struct ExtractionBatch {
    /// Events sorted by position
    pub events: Vec<EmittedEvent>,

    pub blocks: HashMap<u64, BlockContext>,

    /// Opaque cursor for resuming after this batch
    pub cursor: Option<String>,
}

impl ExtractionBatch {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a batch, deriving block context from the events.
    pub fn from_events(events: Vec<EmittedEvent>, cursor: Option<String>) -> Self {
        let mut blocks = HashMap::new();
        for event in &events {
            blocks
                .entry(event.block_number)
                .or_insert_with(|| BlockContext {
                    number: event.block_number,
                    timestamp: event.block_timestamp,
                });
        }
        Self {
            events,
            blocks,
            cursor,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn latest_block(&self) -> Option<u64> {
        self.blocks.keys().max().copied()
    }
}

/// Extractor trait for fetching event batches
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract the next batch.
    ///
    /// - Non-empty batch: process events, call `extract()` again
    /// - Empty batch + `is_finished() = false`: nothing new yet, sleep and retry
    /// - Empty batch + `is_finished() = true`: the source is exhausted
    async fn extract(
        &mut self,
        cursor: Option<String>,
        engine_db: &EngineDb,
    ) -> Result<ExtractionBatch>;

    fn is_finished(&self) -> bool;

    /// Persist the cursor of a fully processed batch.
    async fn commit_cursor(&mut self, _cursor: &str, _engine_db: &EngineDb) -> Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any;
}
