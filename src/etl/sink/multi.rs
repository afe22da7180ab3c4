//! MultiSink runs multiple sinks in sequence
//!
//! Each sink sees the same envelopes and filters by TypeId itself. The first
//! failing sink stops the chain and its error is returned.

use async_trait::async_trait;
use std::sync::Arc;

use super::{Sink, SinkContext};
use crate::etl::envelope::{Envelope, TypeId};
use crate::etl::extractor::ExtractionBatch;

pub struct MultiSink {
    sinks: Vec<Arc<dyn Sink>>,
}

impl MultiSink {
    pub fn new(sinks: Vec<Arc<dyn Sink>>) -> Self {
        Self { sinks }
    }

    pub fn sinks(&self) -> &[Arc<dyn Sink>] {
        &self.sinks
    }
}

#[async_trait]
impl Sink for MultiSink {
    fn name(&self) -> &'static str {
        "multi"
    }

    fn interested_types(&self) -> Vec<TypeId> {
        self.sinks
            .iter()
            .flat_map(|sink| sink.interested_types())
            .collect()
    }

    async fn process(&self, envelopes: &[Envelope], batch: &ExtractionBatch) -> anyhow::Result<()> {
        for sink in &self.sinks {
            if let Err(e) = sink.process(envelopes, batch).await {
                tracing::error!(
                    target: "rainfold::etl::multi_sink",
                    "Sink '{}' failed: {:#}",
                    sink.name(),
                    e
                );
                return Err(e.context(format!("Sink '{}' failed", sink.name())));
            }
        }

        tracing::trace!(
            target: "rainfold::etl::multi_sink",
            "Processed {} envelopes across {} sinks",
            envelopes.len(),
            self.sinks.len()
        );

        Ok(())
    }

    async fn initialize(&mut self, _context: &SinkContext) -> anyhow::Result<()> {
        // Sinks are initialized by `run` before being wrapped in Arc.
        Ok(())
    }
}
