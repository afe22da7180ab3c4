pub mod decoder;
pub mod engine_db;
pub mod envelope;
pub mod event;
pub mod extractor;
pub mod sink;
pub mod sources;

pub use decoder::{Decoder, DecoderContext, DecoderId};
pub use engine_db::{EngineDb, EngineDbConfig, EngineStats};
pub use envelope::{Envelope, TypeId, TypedBody};
pub use event::{EmittedEvent, EventPosition};
pub use extractor::{BlockContext, ExtractionBatch, Extractor, ReplayExtractor};
pub use sink::{MultiSink, Sink, SinkContext};
pub use sources::{DataSource, SourceRegistry};
