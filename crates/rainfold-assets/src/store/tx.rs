//! Per-event write overlay.

use std::collections::BTreeMap;

use rainfold::etl::EventPosition;

use super::{from_document, to_document, ChangeSet, Document, EntityStore, EntityWrite};
use crate::entities::{Entity, EntityKind};
use crate::error::StoreError;

/// Buffers the writes of one event on top of a store.
///
/// Reads see the buffered writes first. Nothing reaches the store until
/// [`EventTx::into_change_set`] is committed, so dropping the overlay after a
/// failed handler discards every write of that event.
pub struct EventTx<'a> {
    store: &'a dyn EntityStore,
    writes: BTreeMap<(EntityKind, String), Option<Document>>,
}

impl<'a> EventTx<'a> {
    pub fn new(store: &'a dyn EntityStore) -> Self {
        Self {
            store,
            writes: BTreeMap::new(),
        }
    }

    pub fn fetch<E: Entity>(&self, id: &str) -> Result<Option<E>, StoreError> {
        let document = match self.writes.get(&(E::KIND, id.to_string())) {
            Some(buffered) => buffered.clone(),
            None => self.store.load(E::KIND, id)?,
        };
        document
            .map(|doc| from_document(E::KIND, id, doc))
            .transpose()
    }

    pub fn exists<E: Entity>(&self, id: &str) -> Result<bool, StoreError> {
        self.exists_kind(E::KIND, id)
    }

    pub fn exists_kind(&self, kind: EntityKind, id: &str) -> Result<bool, StoreError> {
        match self.writes.get(&(kind, id.to_string())) {
            Some(buffered) => Ok(buffered.is_some()),
            None => Ok(self.store.load(kind, id)?.is_some()),
        }
    }

    pub fn put<E: Entity>(&mut self, entity: &E) -> Result<(), StoreError> {
        let document = to_document(entity)?;
        self.writes
            .insert((E::KIND, entity.id().to_string()), Some(document));
        Ok(())
    }

    pub fn remove<E: Entity>(&mut self, id: &str) {
        self.writes.insert((E::KIND, id.to_string()), None);
    }

    /// Number of distinct records written or removed.
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Writes in `(kind, id)` order, stamped with the event position.
    pub fn into_change_set(self, checkpoint: Option<EventPosition>) -> ChangeSet {
        ChangeSet {
            writes: self
                .writes
                .into_iter()
                .map(|((kind, id), document)| EntityWrite { kind, id, document })
                .collect(),
            checkpoint,
        }
    }
}
