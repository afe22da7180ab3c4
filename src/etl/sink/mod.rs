pub mod multi;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use super::envelope::{Envelope, TypeId};
use super::extractor::ExtractionBatch;
use super::sources::SourceRegistry;

pub use multi::MultiSink;

/// Shared resources handed to every sink during initialization.
#[derive(Clone)]
pub struct SinkContext {
    /// Directory where sinks may keep their own databases
    pub database_root: PathBuf,
    /// Data-source registry, for sinks that spawn new sources
    pub sources: Arc<SourceRegistry>,
}

/// Sink trait - folds envelopes into some state.
#[async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &str;

    /// Type IDs this sink reacts to. Other envelopes are ignored.
    fn interested_types(&self) -> Vec<TypeId>;

    /// Process envelopes in order.
    ///
    /// `batch` is the extraction batch the envelopes were decoded from; use
    /// `batch.blocks[&n]` for block context instead of scanning `batch.events`.
    ///
    /// Returning `Err` halts the pipeline. The batch cursor is not committed,
    /// so the same events are delivered again after a restart.
    async fn process(&self, envelopes: &[Envelope], batch: &ExtractionBatch) -> anyhow::Result<()>;

    /// Called once before the pipeline starts.
    async fn initialize(&mut self, context: &SinkContext) -> anyhow::Result<()>;
}
