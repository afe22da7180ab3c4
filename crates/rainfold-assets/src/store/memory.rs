use std::collections::HashMap;
use std::sync::Mutex;

use rainfold::etl::EventPosition;

use super::{ChangeSet, Document, EntityStore};
use crate::entities::EntityKind;
use crate::error::StoreError;

#[derive(Default)]
struct MemoryState {
    documents: HashMap<(EntityKind, String), Document>,
    checkpoint: Option<EventPosition>,
}

/// In-process store, used by tests and one-shot replays.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of every record of a kind, sorted.
    pub fn ids(&self, kind: EntityKind) -> Result<Vec<String>, StoreError> {
        let state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        let mut ids: Vec<String> = state
            .documents
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, id)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

impl EntityStore for MemoryStore {
    fn load(&self, kind: EntityKind, id: &str) -> Result<Option<Document>, StoreError> {
        let state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(state.documents.get(&(kind, id.to_string())).cloned())
    }

    fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        let mut state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        for write in changes.writes {
            let key = (write.kind, write.id);
            match write.document {
                Some(document) => {
                    state.documents.insert(key, document);
                }
                None => {
                    state.documents.remove(&key);
                }
            }
        }
        if let Some(position) = changes.checkpoint {
            state.checkpoint = Some(position);
        }
        Ok(())
    }

    fn checkpoint(&self) -> Result<Option<EventPosition>, StoreError> {
        let state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(state.checkpoint)
    }

    fn count(&self, kind: EntityKind) -> Result<usize, StoreError> {
        let state = self.state.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(state.documents.keys().filter(|(k, _)| *k == kind).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EntityStoreExt, EntityWrite};
    use serde_json::json;

    #[test]
    fn test_upsert_and_remove() {
        let store = MemoryStore::new();
        store.save(EntityKind::Class, "a", json!({"v": 1})).unwrap();
        store.save(EntityKind::Class, "a", json!({"v": 2})).unwrap();
        assert_eq!(store.load(EntityKind::Class, "a").unwrap(), Some(json!({"v": 2})));
        assert_eq!(store.count(EntityKind::Class).unwrap(), 1);
        assert_eq!(store.load(EntityKind::Asset, "a").unwrap(), None);

        store.remove(EntityKind::Class, "a").unwrap();
        assert_eq!(store.load(EntityKind::Class, "a").unwrap(), None);
    }

    #[test]
    fn test_commit_applies_checkpoint() {
        let store = MemoryStore::new();
        store
            .commit(ChangeSet {
                writes: vec![EntityWrite {
                    kind: EntityKind::Holder,
                    id: "h".to_string(),
                    document: Some(json!({})),
                }],
                checkpoint: Some(EventPosition::new(3, 1, 0)),
            })
            .unwrap();
        assert_eq!(store.checkpoint().unwrap(), Some(EventPosition::new(3, 1, 0)));
        assert_eq!(store.ids(EntityKind::Holder).unwrap(), vec!["h".to_string()]);

        // A commit without a checkpoint leaves the previous one in place.
        store.save(EntityKind::Holder, "i", json!({})).unwrap();
        assert_eq!(store.checkpoint().unwrap(), Some(EventPosition::new(3, 1, 0)));
    }

    #[test]
    fn test_fetch_reports_corrupt_documents() {
        let store = MemoryStore::new();
        store.save(EntityKind::Class, "c", json!({"id": 5})).unwrap();
        let err = store.fetch::<crate::entities::Class>("c").unwrap_err();
        assert!(matches!(err, StoreError::Document { .. }));
    }
}
