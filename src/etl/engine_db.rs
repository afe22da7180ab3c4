//! Engine database.
//!
//! Tracks pipeline state that is independent of any projection: the processed
//! head, free-form stats, extractor cursors and the registered data sources.

use anyhow::{Context, Result};
use primitive_types::H160;
use rainfold_common::{address_hex, parse_address};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::etl::sources::DataSource;

const SQLITE_SCHEMA_SQL: &str = include_str!("../../sql/engine_schema.sql");

/// Engine database configuration
#[derive(Debug, Clone)]
pub struct EngineDbConfig {
    /// File path, `sqlite:` URL or `:memory:`
    pub path: String,
}

/// Engine database for tracking pipeline state
pub struct EngineDb {
    pool: SqlitePool,
}

impl EngineDb {
    pub async fn new(config: EngineDbConfig) -> Result<Self> {
        let is_memory = config.path == ":memory:" || config.path == "sqlite::memory:";
        let is_url = config.path.starts_with("sqlite:");

        if !is_memory && !is_url {
            if let Some(parent) = Path::new(&config.path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .context(format!("Failed to create directory: {}", parent.display()))?;
                }
            }
        }

        let database_url = if is_memory {
            "sqlite::memory:".to_string()
        } else if is_url {
            config.path.clone()
        } else {
            format!("sqlite://{}", config.path)
        };

        tracing::debug!(
            target: "rainfold::etl::engine_db",
            "Connecting to database: {}",
            database_url
        );

        let options = SqliteConnectOptions::from_str(&database_url)
            .context("Invalid engine database URL")?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // Every connection to `:memory:` opens its own database, so keep exactly one alive.
        let pool_options = if is_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .context("Failed to connect to engine database")?;

        let db = Self { pool };
        db.load_schema_from_sql().await?;

        tracing::info!(target: "rainfold::etl::engine_db", "Engine database schema initialized");

        Ok(db)
    }

    async fn load_schema_from_sql(&self) -> Result<()> {
        for statement in SQLITE_SCHEMA_SQL.split(';') {
            let sql_lines: Vec<&str> = statement
                .lines()
                .filter(|line| {
                    let trimmed = line.trim();
                    !trimmed.is_empty() && !trimmed.starts_with("--")
                })
                .collect();

            if sql_lines.is_empty() {
                continue;
            }

            let clean_sql = sql_lines.join("\n");

            sqlx::query(&clean_sql)
                .execute(&self.pool)
                .await
                .context(format!(
                    "Failed to execute SQL: {}",
                    clean_sql.lines().next().unwrap_or("")
                ))?;
        }

        Ok(())
    }

    /// Current head: last processed block and total processed event count
    pub async fn get_head(&self) -> Result<(u64, u64)> {
        let row = sqlx::query("SELECT block_number, event_count FROM head WHERE id = 'main'")
            .fetch_one(&self.pool)
            .await?;

        let block_number: i64 = row.get(0);
        let event_count: i64 = row.get(1);

        Ok((block_number as u64, event_count as u64))
    }

    /// Moves the head to `block_number` and adds `events_processed` to the count
    pub async fn update_head(&self, block_number: u64, events_processed: u64) -> Result<()> {
        sqlx::query(
            "UPDATE head SET block_number = ?, event_count = event_count + ? WHERE id = 'main'",
        )
        .bind(block_number as i64)
        .bind(events_processed as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_stat(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM stats WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get(0)))
    }

    pub async fn set_stat(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO stats (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn get_stats(&self) -> Result<EngineStats> {
        let (block_number, event_count) = self.get_head().await?;
        let start_time = self.get_stat("start_time").await?.unwrap_or_default();

        Ok(EngineStats {
            current_block: block_number,
            total_events: event_count,
            start_time,
        })
    }

    /// Extractor state value, e.g. `("json_file", "last_position")`
    pub async fn get_extractor_state(
        &self,
        extractor_type: &str,
        state_key: &str,
    ) -> Result<Option<String>> {
        let row = sqlx::query(
            "SELECT state_value FROM extractor_state WHERE extractor_type = ? AND state_key = ?",
        )
        .bind(extractor_type)
        .bind(state_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get(0)))
    }

    pub async fn set_extractor_state(
        &self,
        extractor_type: &str,
        state_key: &str,
        state_value: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO extractor_state (extractor_type, state_key, state_value, updated_at) \
             VALUES (?, ?, ?, strftime('%s', 'now')) \
             ON CONFLICT(extractor_type, state_key) \
             DO UPDATE SET state_value = excluded.state_value, updated_at = strftime('%s', 'now')",
        )
        .bind(extractor_type)
        .bind(state_key)
        .bind(state_value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ===== Data source persistence =====

    /// Persists a data source. An existing row for the address is left untouched.
    pub async fn insert_data_source(&self, source: &DataSource) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO data_sources (address, decoder, template, start_block, registered_at) \
             VALUES (?, ?, ?, ?, strftime('%s', 'now'))",
        )
        .bind(address_hex(source.address))
        .bind(&source.decoder)
        .bind(source.template.as_deref())
        .bind(source.start_block as i64)
        .execute(&self.pool)
        .await
        .context("Failed to persist data source")?;

        Ok(())
    }

    pub async fn get_data_sources(&self) -> Result<Vec<DataSource>> {
        let rows = sqlx::query(
            "SELECT address, decoder, template, start_block FROM data_sources ORDER BY address",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut sources = Vec::with_capacity(rows.len());
        for row in rows {
            let address_str: String = row.get(0);
            let address: H160 = parse_address(&address_str)
                .context(format!("Invalid data source address: {address_str}"))?;
            let start_block: i64 = row.get(3);
            sources.push(DataSource {
                address,
                decoder: row.get(1),
                template: row.get(2),
                start_block: start_block as u64,
            });
        }

        Ok(sources)
    }
}

/// Engine statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineStats {
    pub current_block: u64,
    pub total_events: u64,
    pub start_time: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_db() -> EngineDb {
        EngineDb::new(EngineDbConfig {
            path: ":memory:".to_string(),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_engine_db_initialization() {
        let db = memory_db().await;
        let (block, events) = db.get_head().await.unwrap();

        assert_eq!(block, 0);
        assert_eq!(events, 0);
    }

    #[tokio::test]
    async fn test_update_head() {
        let db = memory_db().await;

        db.update_head(100, 50).await.unwrap();
        assert_eq!(db.get_head().await.unwrap(), (100, 50));

        db.update_head(200, 30).await.unwrap();
        assert_eq!(db.get_head().await.unwrap(), (200, 80));
    }

    #[tokio::test]
    async fn test_stats_and_extractor_state() {
        let db = memory_db().await;

        db.set_stat("start_time", "2026-01-08").await.unwrap();
        assert_eq!(
            db.get_stat("start_time").await.unwrap(),
            Some("2026-01-08".to_string())
        );
        assert_eq!(db.get_stat("nonexistent").await.unwrap(), None);

        db.set_extractor_state("json_file", "last_position", "1:0:0")
            .await
            .unwrap();
        db.set_extractor_state("json_file", "last_position", "2:0:1")
            .await
            .unwrap();
        assert_eq!(
            db.get_extractor_state("json_file", "last_position")
                .await
                .unwrap(),
            Some("2:0:1".to_string())
        );
    }

    #[tokio::test]
    async fn test_data_source_insert_is_first_write_wins() {
        let db = memory_db().await;
        let address = H160::repeat_byte(0xab);

        db.insert_data_source(&DataSource::static_source(address, "rain1155", 1))
            .await
            .unwrap();
        db.insert_data_source(&DataSource::static_source(address, "other", 9))
            .await
            .unwrap();

        let sources = db.get_data_sources().await.unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].decoder, "rain1155");
        assert_eq!(sources[0].start_block, 1);
        assert_eq!(sources[0].template, None);
    }
}
