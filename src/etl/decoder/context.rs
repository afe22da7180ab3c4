//! DecoderContext routes events to decoders through the data-source registry.
//!
//! - Decoders are identified by their `decoder_name()` (hashed to DecoderId).
//! - An event is decoded only when its address is a registered data source and
//!   the event is at or after the source's start block.
//! - Events from unregistered addresses are skipped.
//! - Decoder errors propagate: a known event that fails to decode halts the
//!   pipeline rather than being dropped.

use async_trait::async_trait;
use rainfold_common::address_hex;
use std::collections::HashMap;
use std::sync::Arc;

use super::{Decoder, DecoderId};
use crate::etl::envelope::Envelope;
use crate::etl::event::EmittedEvent;
use crate::etl::sources::SourceRegistry;

pub struct DecoderContext {
    decoders: HashMap<DecoderId, Arc<dyn Decoder>>,
    sources: Arc<SourceRegistry>,
}

impl DecoderContext {
    /// Create a new DecoderContext.
    ///
    /// Fails when two decoders share a name.
    pub fn new(decoders: Vec<Arc<dyn Decoder>>, sources: Arc<SourceRegistry>) -> anyhow::Result<Self> {
        let mut decoder_map = HashMap::new();

        for decoder in decoders {
            let name = decoder.decoder_name().to_string();
            let id = DecoderId::new(&name);

            if decoder_map.contains_key(&id) {
                anyhow::bail!("Duplicate decoder name '{name}' (id: {id:?}). Decoder names must be unique");
            }

            tracing::debug!(
                target: "rainfold::etl::decoder_context",
                "Registered decoder '{}' with ID {:?}",
                name,
                id
            );

            decoder_map.insert(id, decoder);
        }

        tracing::info!(
            target: "rainfold::etl::decoder_context",
            "Initialized DecoderContext with {} decoders",
            decoder_map.len()
        );

        Ok(Self {
            decoders: decoder_map,
            sources,
        })
    }

    pub fn get_decoder(&self, id: &DecoderId) -> Option<&Arc<dyn Decoder>> {
        self.decoders.get(id)
    }

    /// All registered decoder IDs, sorted
    pub fn decoder_ids(&self) -> Vec<DecoderId> {
        let mut ids: Vec<_> = self.decoders.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn sources(&self) -> &Arc<SourceRegistry> {
        &self.sources
    }
}

#[async_trait]
impl Decoder for DecoderContext {
    fn decoder_name(&self) -> &str {
        "context"
    }

    async fn decode_event(&self, event: &EmittedEvent) -> anyhow::Result<Vec<Envelope>> {
        let Some(source) = self.sources.get(event.address).await else {
            tracing::trace!(
                target: "rainfold::etl::decoder_context",
                contract = %address_hex(event.address),
                event = %event.name,
                "Skipping event from unregistered contract"
            );
            metrics::counter!("rainfold_events_skipped_total", "reason" => "unregistered")
                .increment(1);
            return Ok(Vec::new());
        };

        if event.block_number < source.start_block {
            tracing::trace!(
                target: "rainfold::etl::decoder_context",
                contract = %address_hex(event.address),
                block = event.block_number,
                start_block = source.start_block,
                "Skipping event before data source start block"
            );
            metrics::counter!("rainfold_events_skipped_total", "reason" => "before_start")
                .increment(1);
            return Ok(Vec::new());
        }

        let Some(decoder) = self.decoders.get(&DecoderId::new(&source.decoder)) else {
            anyhow::bail!(
                "Data source {} references unknown decoder '{}'",
                address_hex(event.address),
                source.decoder
            );
        };

        let envelopes = decoder.decode_event(event).await.map_err(|e| {
            e.context(format!(
                "Decoder '{}' failed on {} at {}",
                decoder.decoder_name(),
                event.name,
                event.position()
            ))
        })?;

        if !envelopes.is_empty() {
            tracing::trace!(
                target: "rainfold::etl::decoder_context",
                "Decoder '{}' decoded {} from {} into {} envelope(s)",
                decoder.decoder_name(),
                event.name,
                address_hex(event.address),
                envelopes.len()
            );
        }

        Ok(envelopes)
    }
}
