//! Rain game-asset projection for rainfold
//!
//! Folds the events of GameAssets, Accessories and Rain1155 registries (and
//! the factories that spawn them) into a queryable entity graph: registries,
//! assets with their script snapshots, classes, creators, holders with
//! per-asset balances, and classified payment currencies.
//!
//! # Components
//!
//! - [`AssetsDecoder`]: Normalizes the events of one contract family
//! - [`AssetSink`]: Applies each event atomically and subscribes spawned registries
//! - [`EntityStore`]: Document store, [`MemoryStore`] or [`SqliteStore`]
//! - [`CurrencyClassifier`]: Probes token contracts once and caches the standard
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rainfold_assets::{AssetSink, AssetsDecoder, CurrencyClassifier, SqliteStore};
//! use rainfold_common::NoopIntrospector;
//!
//! let store = Arc::new(SqliteStore::new("./assets.db")?);
//! let sink = AssetSink::new(store, CurrencyClassifier::new(Arc::new(NoopIntrospector)));
//!
//! let config = rainfold::RainfoldConfig::builder()
//!     .with_decoders(AssetsDecoder::all())
//!     .add_sink_boxed(Box::new(sink))
//!     .build();
//! ```

pub mod currency;
pub mod decoder;
pub mod entities;
pub mod error;
pub mod events;
pub mod family;
pub mod handlers;
pub mod ids;
pub mod policy;
pub mod sink;
pub mod store;

pub use currency::{ClassifierConfig, CurrencyClassifier};
pub use decoder::AssetsDecoder;
pub use entities::{
    Asset, BalanceRecord, Class, Creator, Currency, EligibilityScript, Entity, EntityKind,
    Factory, Holder, PriceScript, Registry, TokenStandard, TokenStandardRecord,
};
pub use error::{ProjectionError, StoreError};
pub use events::{AssetEvent, AssetEventBody, EventKind, ASSET_EVENT_TYPE};
pub use family::{ContractFamily, EventRoute};
pub use handlers::{Outcome, SpawnedChild};
pub use policy::PolicyTable;
pub use sink::AssetSink;
pub use store::{ChangeSet, EntityStore, EntityStoreExt, EventTx, MemoryStore, SqliteStore};
