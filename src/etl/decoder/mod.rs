pub mod context;

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::envelope::Envelope;
use super::event::EmittedEvent;

pub use context::DecoderContext;

/// Decoder turns raw events of one contract family into typed envelopes.
///
/// The decoder context only hands a decoder events from addresses that were
/// registered for it, so a decoder never has to filter by address. It still
/// returns an empty Vec for event names it has no projection for.
///
/// A decoder must return `Err` when it recognizes an event but cannot read its
/// parameters. The pipeline halts on that error instead of skipping the event.
///
/// # Example
///
/// ```rust,ignore
/// #[async_trait]
/// impl Decoder for MyDecoder {
///     fn decoder_name(&self) -> &str {
///         "my_family"
///     }
///
///     async fn decode_event(&self, event: &EmittedEvent) -> anyhow::Result<Vec<Envelope>> {
///         match event.name.as_str() {
///             "Thing" => {
///                 let body = Thing::from_params(&event.params)?;
///                 Ok(vec![Envelope::new(
///                     event.position().to_string(),
///                     Box::new(body),
///                     event.metadata(),
///                     event.position(),
///                 )])
///             }
///             _ => Ok(Vec::new()),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Decoder: Send + Sync {
    /// Unique, stable name of this decoder.
    ///
    /// Data sources reference decoders by this name, and the name is persisted
    /// with every registered source. Renaming a decoder orphans its sources.
    fn decoder_name(&self) -> &str;

    /// Decode a single event. Empty Vec when the event carries nothing to project.
    async fn decode_event(&self, event: &EmittedEvent) -> anyhow::Result<Vec<Envelope>>;

    /// Decode several events in order.
    async fn decode(&self, events: &[EmittedEvent]) -> anyhow::Result<Vec<Envelope>> {
        let mut all_envelopes = Vec::new();
        for event in events {
            let envelopes = self.decode_event(event).await?;
            all_envelopes.extend(envelopes);
        }
        Ok(all_envelopes)
    }
}

/// Decoder identifier: hash of the decoder name, stable across restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DecoderId(u64);

impl DecoderId {
    pub fn new(name: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        DecoderId(hasher.finish())
    }

    pub fn from_u64(value: u64) -> Self {
        DecoderId(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}
