//! rainfold - event-sourced state projection for on-chain asset registries.
//!
//! The core crate is a small ETL pipeline: an [`Extractor`](etl::Extractor)
//! yields ordered batches of chain events, the
//! [`DecoderContext`](etl::DecoderContext) routes each event to the decoder of
//! its registered [`DataSource`](etl::DataSource), and sinks fold the decoded
//! envelopes into their state. Events are processed one at a time in chain
//! order, so a source registered while handling one event is routable for the
//! very next one.

pub mod etl;

pub use async_trait::async_trait;
pub use tokio;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use etl::extractor::{ExtractionBatch, Extractor};
use etl::sink::{Sink, SinkContext};
use etl::{
    DataSource, Decoder, DecoderContext, EmittedEvent, EngineDb, MultiSink, ReplayExtractor,
    SourceRegistry,
};

/// Configuration for the pipeline with pluggable sinks and decoders.
pub struct RainfoldConfig {
    /// Sinks to register (not yet initialized).
    pub sinks: Vec<Box<dyn Sink>>,

    pub decoders: Vec<Arc<dyn Decoder>>,

    /// Extractor. When None, `events` are replayed from memory.
    pub extractor: Option<Box<dyn Extractor>>,

    pub events: Vec<EmittedEvent>,

    /// Events per batch for the in-memory replay.
    pub events_per_cycle: usize,

    /// Directory for the engine database and sink databases.
    pub database_root: PathBuf,

    /// Engine database path or URL. Defaults to `<database_root>/engine.db`.
    pub engine_database_url: Option<String>,

    /// Sources routed from the first event on.
    pub data_sources: Vec<DataSource>,

    /// Seconds to wait before polling an extractor that has no new events.
    pub cycle_interval: u64,
}

impl RainfoldConfig {
    pub fn builder() -> RainfoldConfigBuilder {
        RainfoldConfigBuilder::default()
    }
}

#[derive(Default)]
pub struct RainfoldConfigBuilder {
    sinks: Vec<Box<dyn Sink>>,
    decoders: Vec<Arc<dyn Decoder>>,
    extractor: Option<Box<dyn Extractor>>,
    events: Vec<EmittedEvent>,
    events_per_cycle: Option<usize>,
    database_root: Option<PathBuf>,
    engine_database_url: Option<String>,
    data_sources: Vec<DataSource>,
    cycle_interval: Option<u64>,
}

impl RainfoldConfigBuilder {
    pub fn add_sink_boxed(mut self, sink: Box<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn add_decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoders.push(decoder);
        self
    }

    pub fn with_decoders(mut self, decoders: Vec<Arc<dyn Decoder>>) -> Self {
        self.decoders.extend(decoders);
        self
    }

    pub fn with_extractor(mut self, extractor: Box<dyn Extractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Replays these events instead of using an extractor.
    pub fn with_events(mut self, events: Vec<EmittedEvent>) -> Self {
        self.events = events;
        self
    }

    pub fn events_per_cycle(mut self, count: usize) -> Self {
        self.events_per_cycle = Some(count);
        self
    }

    pub fn database_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_root = Some(path.into());
        self
    }

    pub fn engine_database_url(mut self, url: impl Into<String>) -> Self {
        self.engine_database_url = Some(url.into());
        self
    }

    pub fn add_data_source(mut self, source: DataSource) -> Self {
        self.data_sources.push(source);
        self
    }

    pub fn cycle_interval(mut self, seconds: u64) -> Self {
        self.cycle_interval = Some(seconds);
        self
    }

    pub fn build(self) -> RainfoldConfig {
        RainfoldConfig {
            sinks: self.sinks,
            decoders: self.decoders,
            extractor: self.extractor,
            events: self.events,
            events_per_cycle: self.events_per_cycle.unwrap_or(100),
            database_root: self.database_root.unwrap_or_else(|| PathBuf::from(".")),
            engine_database_url: self.engine_database_url,
            data_sources: self.data_sources,
            cycle_interval: self.cycle_interval.unwrap_or(3),
        }
    }
}

/// Runs the pipeline until the extractor is exhausted or a shutdown signal arrives.
///
/// Any decode or sink error stops the pipeline and is returned. The cursor of
/// the failing batch is not committed.
///
/// NOTE: The caller is responsible for initializing the tracing subscriber.
pub async fn run(config: RainfoldConfig) -> anyhow::Result<()> {
    tracing::info!(
        target: "rainfold::main",
        "Starting rainfold with {} sink(s) and {} decoder(s)",
        config.sinks.len(),
        config.decoders.len()
    );

    let engine_db_path = config.engine_database_url.clone().unwrap_or_else(|| {
        config
            .database_root
            .join("engine.db")
            .to_string_lossy()
            .to_string()
    });
    let engine_db = Arc::new(
        EngineDb::new(etl::EngineDbConfig {
            path: engine_db_path,
        })
        .await?,
    );

    let sources = Arc::new(SourceRegistry::new(engine_db.clone()));
    sources.load_from_db().await?;
    for source in config.data_sources {
        sources.register(source).await?;
    }

    let sink_context = SinkContext {
        database_root: config.database_root.clone(),
        sources: sources.clone(),
    };

    let mut initialized_sinks: Vec<Arc<dyn Sink>> = Vec::new();
    for mut sink in config.sinks {
        sink.initialize(&sink_context)
            .await
            .with_context(|| format!("Failed to initialize sink '{}'", sink.name()))?;
        initialized_sinks.push(Arc::from(sink));
    }
    let multi_sink = MultiSink::new(initialized_sinks);

    let decoder_context = DecoderContext::new(config.decoders, sources.clone())?;

    let mut extractor: Box<dyn Extractor> = if let Some(extractor) = config.extractor {
        tracing::info!(target: "rainfold::etl", "Using configured extractor");
        extractor
    } else {
        tracing::info!(
            target: "rainfold::etl",
            "No extractor configured, replaying {} in-memory events",
            config.events.len()
        );
        Box::new(ReplayExtractor::from_events(
            config.events,
            config.events_per_cycle,
        ))
    };

    engine_db
        .set_stat("start_time", &chrono::Utc::now().to_rfc3339())
        .await?;

    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    let signal_handle = tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                match result {
                    Ok(()) => tracing::info!(target: "rainfold::main", "Received SIGINT (Ctrl+C), initiating graceful shutdown..."),
                    Err(e) => tracing::warn!(target: "rainfold::main", "Failed to listen for Ctrl+C: {}", e),
                }
                signal_token.cancel();
            }
            () = signal_token.cancelled() => {}
        }
    });

    let cycle_interval = Duration::from_secs(config.cycle_interval);
    let mut cursor: Option<String> = None;

    tracing::info!(
        target: "rainfold::etl",
        sources = sources.len().await,
        "Starting ETL pipeline..."
    );

    let outcome: anyhow::Result<()> = async {
        loop {
            if shutdown_token.is_cancelled() {
                tracing::info!(target: "rainfold::etl", "Shutdown requested, stopping ETL loop");
                break;
            }

            let batch = match extractor.extract(cursor.clone(), &engine_db).await {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::error!(target: "rainfold::etl", "Extract failed: {:#}", e);
                    wait_or_shutdown(&shutdown_token, cycle_interval).await;
                    continue;
                }
            };

            if batch.is_empty() {
                if extractor.is_finished() {
                    tracing::info!(target: "rainfold::etl", "Extractor finished, stopping ETL loop");
                    break;
                }
                wait_or_shutdown(&shutdown_token, cycle_interval).await;
                continue;
            }

            let new_cursor = batch.cursor.clone();
            let envelope_count = process_batch(&decoder_context, &multi_sink, &batch).await?;

            engine_db
                .update_head(batch.latest_block().unwrap_or(0), batch.len() as u64)
                .await?;

            // Commit only after every event of the batch has been applied.
            if let Some(ref cursor_str) = new_cursor {
                if let Err(e) = extractor.commit_cursor(cursor_str, &engine_db).await {
                    tracing::error!(target: "rainfold::etl", "Failed to commit cursor: {:#}", e);
                }
            }
            cursor = new_cursor;

            tracing::info!(
                target: "rainfold::etl",
                events = batch.len(),
                envelopes = envelope_count,
                "ETL cycle complete"
            );
        }
        Ok(())
    }
    .await;

    shutdown_token.cancel();
    if let Err(e) = signal_handle.await {
        tracing::warn!(target: "rainfold::main", "Signal listener ended abnormally: {}", e);
    }

    match &outcome {
        Ok(()) => {
            let stats = engine_db.get_stats().await?;
            tracing::info!(
                target: "rainfold::main",
                current_block = stats.current_block,
                total_events = stats.total_events,
                "rainfold shutdown complete"
            );
        }
        Err(e) => {
            tracing::error!(target: "rainfold::main", "ETL pipeline halted: {:#}", e);
        }
    }

    outcome
}

/// Decodes and sinks every event of the batch in order. Returns the number of envelopes.
async fn process_batch(
    decoder_context: &DecoderContext,
    multi_sink: &MultiSink,
    batch: &ExtractionBatch,
) -> anyhow::Result<usize> {
    let mut envelope_count = 0;

    for event in &batch.events {
        metrics::counter!("rainfold_events_total").increment(1);

        let envelopes = decoder_context.decode_event(event).await?;
        if envelopes.is_empty() {
            continue;
        }

        multi_sink.process(&envelopes, batch).await?;
        envelope_count += envelopes.len();
    }

    Ok(envelope_count)
}

async fn wait_or_shutdown(token: &CancellationToken, interval: Duration) {
    tokio::select! {
        () = tokio::time::sleep(interval) => {}
        () = token.cancelled() => {}
    }
}
