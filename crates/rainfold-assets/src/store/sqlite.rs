//! SQLite entity store.
//!
//! One `entities` table holding JSON bodies keyed by `(kind, id)` and a
//! single-row `checkpoint` table. A [`ChangeSet`] is applied inside one
//! SQLite transaction.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

use rainfold::etl::EventPosition;

use super::{ChangeSet, Document, EntityStore};
use crate::entities::EntityKind;
use crate::error::StoreError;

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Create or open the database
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path.as_ref())?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;
             PRAGMA cache_size=-64000;
             PRAGMA temp_store=MEMORY;
             PRAGMA busy_timeout=5000;",
        )?;

        tracing::info!(
            target: "rainfold_assets::store",
            path = %db_path.as_ref().display(),
            "SQLite entity store configured: WAL mode, NORMAL sync"
        );

        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entities (
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
                PRIMARY KEY (kind, id)
            );
            CREATE TABLE IF NOT EXISTS checkpoint (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                block_number INTEGER NOT NULL,
                transaction_index INTEGER NOT NULL,
                log_index INTEGER NOT NULL
            );",
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl EntityStore for SqliteStore {
    fn load(&self, kind: EntityKind, id: &str) -> Result<Option<Document>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM entities WHERE kind = ?1 AND id = ?2",
                params![kind.as_str(), id],
                |row| row.get(0),
            )
            .optional()?;

        body.map(|body| {
            serde_json::from_str(&body).map_err(|source| StoreError::Document {
                kind,
                id: id.to_string(),
                source,
            })
        })
        .transpose()
    }

    fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let tx = conn.transaction()?;

        {
            let mut upsert = tx.prepare_cached(
                "INSERT INTO entities (kind, id, body, updated_at)
                 VALUES (?1, ?2, ?3, strftime('%s', 'now'))
                 ON CONFLICT(kind, id) DO UPDATE SET
                    body = excluded.body,
                    updated_at = excluded.updated_at",
            )?;
            let mut delete = tx.prepare_cached("DELETE FROM entities WHERE kind = ?1 AND id = ?2")?;

            for write in &changes.writes {
                match &write.document {
                    Some(document) => {
                        upsert.execute(params![
                            write.kind.as_str(),
                            write.id,
                            document.to_string()
                        ])?;
                    }
                    None => {
                        delete.execute(params![write.kind.as_str(), write.id])?;
                    }
                }
            }

            if let Some(position) = changes.checkpoint {
                tx.execute(
                    "INSERT INTO checkpoint (id, block_number, transaction_index, log_index)
                     VALUES (0, ?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET
                        block_number = excluded.block_number,
                        transaction_index = excluded.transaction_index,
                        log_index = excluded.log_index",
                    params![
                        position.block_number as i64,
                        position.transaction_index as i64,
                        position.log_index as i64
                    ],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn checkpoint(&self) -> Result<Option<EventPosition>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let row: Option<(i64, i64, i64)> = conn
            .query_row(
                "SELECT block_number, transaction_index, log_index FROM checkpoint WHERE id = 0",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        row.map(|(block, tx, log)| {
            if block < 0 || tx < 0 || log < 0 {
                return Err(StoreError::Checkpoint(format!("{block}:{tx}:{log}")));
            }
            Ok(EventPosition::new(block as u64, tx as u64, log as u64))
        })
        .transpose()
    }

    fn count(&self, kind: EntityKind) -> Result<usize, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM entities WHERE kind = ?1",
            params![kind.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EntityWrite;
    use serde_json::json;

    fn write(kind: EntityKind, id: &str, document: Option<Document>) -> EntityWrite {
        EntityWrite {
            kind,
            id: id.to_string(),
            document,
        }
    }

    #[test]
    fn test_round_trip_and_checkpoint() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .commit(ChangeSet {
                writes: vec![
                    write(EntityKind::Registry, "r", Some(json!({"total_assets": 1}))),
                    write(EntityKind::Asset, "r-1", Some(json!({"name": "Car"}))),
                ],
                checkpoint: Some(EventPosition::new(7, 2, 1)),
            })
            .unwrap();

        assert_eq!(
            store.load(EntityKind::Asset, "r-1").unwrap(),
            Some(json!({"name": "Car"}))
        );
        assert_eq!(store.load(EntityKind::Registry, "r-1").unwrap(), None);
        assert_eq!(store.count(EntityKind::Registry).unwrap(), 1);
        assert_eq!(store.checkpoint().unwrap(), Some(EventPosition::new(7, 2, 1)));

        store.remove(EntityKind::Asset, "r-1").unwrap();
        assert_eq!(store.load(EntityKind::Asset, "r-1").unwrap(), None);
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("assets.db");

        {
            let store = SqliteStore::new(&path).unwrap();
            store
                .commit(ChangeSet {
                    writes: vec![write(EntityKind::Holder, "h", Some(json!({"n": 1})))],
                    checkpoint: Some(EventPosition::new(1, 0, 0)),
                })
                .unwrap();
        }

        let store = SqliteStore::new(&path).unwrap();
        assert_eq!(store.load(EntityKind::Holder, "h").unwrap(), Some(json!({"n": 1})));
        assert_eq!(store.checkpoint().unwrap(), Some(EventPosition::new(1, 0, 0)));
    }
}
