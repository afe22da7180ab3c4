use thiserror::Error;

use crate::entities::EntityKind;
use crate::events::EventKind;

/// Errors raised by the entity store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to (de)serialize {kind} '{id}': {source}")]
    Document {
        kind: EntityKind,
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid checkpoint '{0}'")]
    Checkpoint(String),
    #[error("store lock poisoned")]
    Poisoned,
}

/// Errors that stop the projection. Every variant is fatal for the event
/// being applied; missing parents under a soft policy never reach this type.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// An asset references a class that was never created.
    #[error("asset '{asset}' references class '{class}' which does not exist")]
    DanglingClass { asset: String, class: String },

    /// A parent record required by a hard policy is missing.
    #[error("{event:?} requires {kind} '{id}' which does not exist")]
    MissingParent {
        event: EventKind,
        kind: EntityKind,
        id: String,
    },

    /// A known event whose parameters cannot be read.
    #[error("malformed {event} event: {reason}")]
    Malformed { event: String, reason: String },

    /// A state change the entity graph cannot represent.
    #[error("invalid {event:?} transition: {reason}")]
    InvalidTransition { event: EventKind, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ProjectionError {
    pub fn malformed(event: impl Into<String>, reason: impl ToString) -> Self {
        Self::Malformed {
            event: event.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid(event: EventKind, reason: impl Into<String>) -> Self {
        Self::InvalidTransition {
            event,
            reason: reason.into(),
        }
    }
}
