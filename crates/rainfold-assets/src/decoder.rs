//! Per-family event decoders.

use anyhow::Result;
use async_trait::async_trait;
use rainfold::etl::{Decoder, EmittedEvent, Envelope};
use std::sync::Arc;

use crate::events::{AssetEvent, AssetEventBody};
use crate::family::{ContractFamily, EventRoute};

/// Decodes the events of one contract family into [`AssetEventBody`] envelopes.
///
/// Event names the family emits without a projection (`Snapshot`,
/// `ApprovalForAll`) and names outside its ABI yield no envelope. A known
/// event whose parameters cannot be read is an error.
pub struct AssetsDecoder {
    family: ContractFamily,
}

impl AssetsDecoder {
    pub fn new(family: ContractFamily) -> Self {
        Self { family }
    }

    pub fn family(&self) -> ContractFamily {
        self.family
    }

    /// One decoder per family, ready to register with the engine.
    pub fn all() -> Vec<Arc<dyn Decoder>> {
        ContractFamily::ALL
            .into_iter()
            .map(|family| Arc::new(Self::new(family)) as Arc<dyn Decoder>)
            .collect()
    }
}

#[async_trait]
impl Decoder for AssetsDecoder {
    fn decoder_name(&self) -> &str {
        self.family.decoder_name()
    }

    async fn decode_event(&self, event: &EmittedEvent) -> Result<Vec<Envelope>> {
        let kind = match self.family.route(&event.name) {
            EventRoute::Project(kind) => kind,
            EventRoute::Ignored => {
                tracing::trace!(
                    target: "rainfold_assets::decoder",
                    family = %self.family,
                    event = %event.name,
                    "Event carries no projection"
                );
                return Ok(Vec::new());
            }
            EventRoute::Unknown => {
                tracing::trace!(
                    target: "rainfold_assets::decoder",
                    family = %self.family,
                    event = %event.name,
                    position = %event.position(),
                    "Unknown event name"
                );
                return Ok(Vec::new());
            }
        };

        let decoded = AssetEvent::decode(kind, &event.name, &event.params).map_err(|e| {
            tracing::error!(
                target: "rainfold_assets::decoder",
                family = %self.family,
                event = %event.name,
                position = %event.position(),
                error = %e,
                "Failed to decode event"
            );
            e
        })?;

        let body = AssetEventBody {
            contract: event.address,
            family: self.family,
            block_number: event.block_number,
            block_timestamp: event.block_timestamp,
            position: event.position(),
            event: decoded,
        };

        let mut metadata = event.metadata();
        metadata.insert("family".to_string(), self.family.to_string());

        Ok(vec![Envelope::new(
            format!("{}_{}", self.decoder_name(), event.position()),
            Box::new(body),
            metadata,
            event.position(),
        )])
    }
}
