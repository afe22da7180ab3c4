//! Typed envelopes passed from decoders to sinks.

use std::any::Any;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use super::event::EventPosition;

/// Identifier of an envelope body type, derived from a stable name
/// (e.g. "assets.event").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvelopeTypeId(u64);

impl EnvelopeTypeId {
    pub fn new(type_name: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        type_name.hash(&mut hasher);
        EnvelopeTypeId(hasher.finish())
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

pub type TypeId = EnvelopeTypeId;

/// Body of an envelope. Sinks match on `envelope_type_id` and downcast.
pub trait TypedBody: Send + Sync {
    fn envelope_type_id(&self) -> TypeId;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Decoded event data travelling through the pipeline.
pub struct Envelope {
    /// Unique identifier, usually derived from the event position
    pub id: String,

    pub type_id: TypeId,

    pub body: Box<dyn TypedBody>,

    /// Source information (address, tx hash, block) as strings
    pub metadata: HashMap<String, String>,

    /// Chain position of the event this envelope was decoded from
    pub position: EventPosition,

    /// Wall-clock time the envelope was built
    pub timestamp: i64,
}

impl Envelope {
    pub fn new(
        id: String,
        body: Box<dyn TypedBody>,
        metadata: HashMap<String, String>,
        position: EventPosition,
    ) -> Self {
        let type_id = body.envelope_type_id();
        Self {
            id,
            type_id,
            body,
            metadata,
            position,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.body.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.body.as_any_mut().downcast_mut::<T>()
    }
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("id", &self.id)
            .field("type_id", &self.type_id)
            .field("position", &self.position)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}
