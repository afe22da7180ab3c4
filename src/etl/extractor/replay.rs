//! Extractor that replays a finite, recorded list of events.
//!
//! Events come either from memory (tests) or from a JSON file in one of two
//! shapes: a bare array `[{...}, ...]` or an object `{"events": [{...}, ...]}`.
//! They are sorted by chain position and handed out in chunks. The cursor is
//! the position of the last event in a batch; a committed cursor makes a
//! restarted extractor skip everything at or before it.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::{ExtractionBatch, Extractor};
use crate::etl::engine_db::EngineDb;
use crate::etl::event::{EmittedEvent, EventPosition};

const EXTRACTOR_TYPE: &str = "replay";
const STATE_KEY: &str = "last_position";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EventsFileFormat {
    DirectArray(Vec<EmittedEvent>),
    WithMetadata { events: Vec<EmittedEvent> },
}

pub struct ReplayExtractor {
    events: Vec<EmittedEvent>,
    next_index: usize,
    batch_size: usize,
    resumed: bool,
}

impl ReplayExtractor {
    pub fn from_events(mut events: Vec<EmittedEvent>, batch_size: usize) -> Self {
        events.sort_by_key(EmittedEvent::position);
        Self {
            events,
            next_index: 0,
            batch_size: batch_size.max(1),
            resumed: false,
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>, batch_size: usize) -> Result<Self> {
        let path = path.as_ref();

        tracing::info!(
            target: "rainfold::etl::replay",
            path = %path.display(),
            "Loading events from JSON file"
        );

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read events file: {}", path.display()))?;
        let events = Self::parse_json(&contents)?;

        tracing::info!(
            target: "rainfold::etl::replay",
            total_events = events.len(),
            "Loaded events from file"
        );

        Ok(Self::from_events(events, batch_size))
    }

    pub fn parse_json(contents: &str) -> Result<Vec<EmittedEvent>> {
        let events = match serde_json::from_str::<EventsFileFormat>(contents)
            .context("Failed to parse events JSON")?
        {
            EventsFileFormat::DirectArray(events) | EventsFileFormat::WithMetadata { events } => {
                events
            }
        };
        Ok(events)
    }

    pub fn remaining(&self) -> usize {
        self.events.len() - self.next_index
    }

    async fn resume(&mut self, cursor: Option<String>, engine_db: &EngineDb) -> Result<()> {
        let committed = match cursor {
            Some(cursor) => Some(cursor),
            None => engine_db
                .get_extractor_state(EXTRACTOR_TYPE, STATE_KEY)
                .await?,
        };

        if let Some(committed) = committed {
            let position: EventPosition = committed.parse()?;
            self.next_index = self.events.partition_point(|e| e.position() <= position);
            tracing::info!(
                target: "rainfold::etl::replay",
                %position,
                skipped = self.next_index,
                "Resuming replay after committed position"
            );
        }

        Ok(())
    }
}

#[async_trait]
impl Extractor for ReplayExtractor {
    async fn extract(
        &mut self,
        cursor: Option<String>,
        engine_db: &EngineDb,
    ) -> Result<ExtractionBatch> {
        if !self.resumed {
            self.resume(cursor, engine_db).await?;
            self.resumed = true;
        }

        if self.is_finished() {
            return Ok(ExtractionBatch::empty());
        }

        let end = (self.next_index + self.batch_size).min(self.events.len());
        let events = self.events[self.next_index..end].to_vec();
        self.next_index = end;

        let cursor = events.last().map(|e| e.position().to_string());

        tracing::debug!(
            target: "rainfold::etl::replay",
            count = events.len(),
            remaining = self.remaining(),
            "Extracted replay batch"
        );

        Ok(ExtractionBatch::from_events(events, cursor))
    }

    fn is_finished(&self) -> bool {
        self.next_index >= self.events.len()
    }

    async fn commit_cursor(&mut self, cursor: &str, engine_db: &EngineDb) -> Result<()> {
        engine_db
            .set_extractor_state(EXTRACTOR_TYPE, STATE_KEY, cursor)
            .await
            .context("Failed to commit cursor")?;
        tracing::debug!(
            target: "rainfold::etl::replay",
            "Committed cursor: {}",
            cursor
        );
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
