//! Rainfold Assets - Rain game-asset indexer
//!
//! Folds the events of GameAssets, Accessories and Rain1155 registries, and of
//! the factories that deploy them, into a SQLite entity graph.
//!
//! # Usage
//!
//! ```bash
//! # Replay an event file against two factories
//! rainfold-assets --events ./events.json \
//!     --game-assets-factory 0x123... --accessories-factory 0x456...
//!
//! # Classify currencies through an RPC node
//! rainfold-assets --events ./events.json --rain1155 0x789... --rpc-url http://localhost:8545
//! ```

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use config::Config;
use rainfold::etl::{DataSource, ReplayExtractor};
use rainfold_assets::{
    AssetSink, AssetsDecoder, ClassifierConfig, CurrencyClassifier, EntityKind, EntityStore,
    PolicyTable, SqliteStore,
};
use rainfold_common::{address_hex, NoopIntrospector, RpcIntrospector, TokenIntrospector};
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let config = Config::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(true)
        .init();

    tracing::info!("Starting Rainfold asset indexer");
    tracing::info!("Events: {}", config.events);
    tracing::info!("Database: {}", config.db_path);

    let contracts = config.static_contracts().map_err(anyhow::Error::msg)?;
    if contracts.is_empty() {
        tracing::warn!("No contracts configured, every event will be skipped");
    }

    let db_path = Path::new(&config.db_path);
    let database_root = db_path.parent().unwrap_or(Path::new(".")).to_path_buf();
    std::fs::create_dir_all(&database_root)
        .with_context(|| format!("Failed to create {}", database_root.display()))?;

    let engine_db_path = config.engine_db.clone().unwrap_or_else(|| {
        database_root
            .join("engine.db")
            .to_string_lossy()
            .to_string()
    });
    tracing::info!("Engine database: {}", engine_db_path);

    // Create storage
    let store = Arc::new(SqliteStore::new(db_path)?);
    tracing::info!("Database initialized");

    let introspector: Arc<dyn TokenIntrospector> = match &config.rpc_url {
        Some(url) => {
            tracing::info!("RPC URL: {}", url);
            Arc::new(RpcIntrospector::from_url(url)?)
        }
        None => {
            tracing::info!("No RPC URL, currencies will be classified as UNKNOWN");
            Arc::new(NoopIntrospector)
        }
    };
    let classifier = CurrencyClassifier::new(introspector).with_config(ClassifierConfig {
        probe_erc721: config.probe_erc721,
    });

    let extractor = Box::new(ReplayExtractor::from_json_file(
        &config.events,
        config.batch_size,
    )?);
    tracing::info!("Extractor configured");

    let policies = if config.strict {
        tracing::info!("Strict mode, missing parent records halt the pipeline");
        PolicyTable::strict()
    } else {
        PolicyTable::default()
    };
    let sink = Box::new(AssetSink::new(store.clone(), classifier).with_policies(policies));

    let mut rainfold_config = rainfold::RainfoldConfig::builder()
        .database_root(database_root)
        .engine_database_url(engine_db_path)
        .with_extractor(extractor)
        .with_decoders(AssetsDecoder::all())
        .add_sink_boxed(sink)
        .events_per_cycle(config.batch_size);

    for (address, family) in contracts {
        tracing::info!(
            "Watching {} as {} from block 0",
            address_hex(address),
            family
        );
        rainfold_config = rainfold_config.add_data_source(DataSource::static_source(
            address,
            family.decoder_name(),
            0,
        ));
    }

    tracing::info!("Rainfold configured, starting ETL pipeline...");

    // Run the pipeline (blocks until the event file is exhausted or shutdown)
    rainfold::run(rainfold_config.build())
        .await
        .map_err(|e| anyhow::anyhow!("Rainfold error: {e:#}"))?;

    // Print final statistics
    tracing::info!("Final Statistics:");
    if let Ok(Some(checkpoint)) = store.checkpoint() {
        tracing::info!("  Last applied event: {}", checkpoint);
    }
    for kind in [
        EntityKind::Registry,
        EntityKind::Asset,
        EntityKind::Holder,
        EntityKind::Currency,
    ] {
        if let Ok(count) = store.count(kind) {
            tracing::info!("  {}: {}", kind, count);
        }
    }

    Ok(())
}
