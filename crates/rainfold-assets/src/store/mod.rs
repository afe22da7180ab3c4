//! Entity store adapter.
//!
//! A document store keyed by `(EntityKind, id)`. Handlers never write to it
//! directly: they go through an [`EventTx`] whose buffered writes are applied
//! with a single [`EntityStore::commit`], together with the position of the
//! event that produced them.

pub mod memory;
pub mod sqlite;
pub mod tx;

use rainfold::etl::EventPosition;

use crate::entities::{Entity, EntityKind};
use crate::error::StoreError;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use tx::EventTx;

/// Stored form of an entity.
pub type Document = serde_json::Value;

/// One buffered write. `document: None` deletes the record.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityWrite {
    pub kind: EntityKind,
    pub id: String,
    pub document: Option<Document>,
}

/// All writes of one event, applied atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub writes: Vec<EntityWrite>,
    /// Position of the applied event; stored in the same transaction
    pub checkpoint: Option<EventPosition>,
}

impl ChangeSet {
    pub fn single(kind: EntityKind, id: &str, document: Option<Document>) -> Self {
        Self {
            writes: vec![EntityWrite {
                kind,
                id: id.to_string(),
                document,
            }],
            checkpoint: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.checkpoint.is_none()
    }
}

/// Point lookups and atomic upserts over entity documents.
pub trait EntityStore: Send + Sync {
    fn load(&self, kind: EntityKind, id: &str) -> Result<Option<Document>, StoreError>;

    /// Applies every write and the checkpoint, or none of them.
    fn commit(&self, changes: ChangeSet) -> Result<(), StoreError>;

    /// Position of the last committed event.
    fn checkpoint(&self) -> Result<Option<EventPosition>, StoreError>;

    /// Number of records of a kind.
    fn count(&self, kind: EntityKind) -> Result<usize, StoreError>;

    /// Upsert by id.
    fn save(&self, kind: EntityKind, id: &str, document: Document) -> Result<(), StoreError> {
        self.commit(ChangeSet::single(kind, id, Some(document)))
    }

    fn remove(&self, kind: EntityKind, id: &str) -> Result<(), StoreError> {
        self.commit(ChangeSet::single(kind, id, None))
    }
}

/// Typed access on top of [`EntityStore`].
pub trait EntityStoreExt: EntityStore {
    fn fetch<E: Entity>(&self, id: &str) -> Result<Option<E>, StoreError> {
        self.load(E::KIND, id)?
            .map(|doc| from_document(E::KIND, id, doc))
            .transpose()
    }

    fn put<E: Entity>(&self, entity: &E) -> Result<(), StoreError> {
        let document = to_document(entity)?;
        self.save(E::KIND, entity.id(), document)
    }
}

impl<S: EntityStore + ?Sized> EntityStoreExt for S {}

pub(crate) fn to_document<E: Entity>(entity: &E) -> Result<Document, StoreError> {
    serde_json::to_value(entity).map_err(|source| StoreError::Document {
        kind: E::KIND,
        id: entity.id().to_string(),
        source,
    })
}

pub(crate) fn from_document<E: Entity>(
    kind: EntityKind,
    id: &str,
    document: Document,
) -> Result<E, StoreError> {
    serde_json::from_value(document).map_err(|source| StoreError::Document {
        kind,
        id: id.to_string(),
        source,
    })
}
