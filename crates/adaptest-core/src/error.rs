//! Engine error types.
//!
//! One enum covers every failure the session operations can surface to a
//! caller. Variants carry enough structure that a transport layer can map
//! them to status codes without string matching.

use thiserror::Error;
use uuid::Uuid;

/// Errors raised while building a [`Catalog`](crate::catalog::Catalog).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The bank holds fewer items than the engine needs to run.
    #[error("bank must include at least {minimum} items, found {found}")]
    TooFewItems { minimum: usize, found: usize },

    /// Two items share an id.
    #[error("duplicate item id: {0}")]
    DuplicateId(String),

    /// An item is missing a required field.
    #[error("item {id:?} is missing required field `{field}`")]
    MissingField { id: String, field: &'static str },

    /// An item has fewer than two choices.
    #[error("item {0} needs at least 2 choices")]
    TooFewChoices(String),

    /// An item's correct index does not point at one of its choices.
    #[error("item {id} has invalid correct_index {index} for {choices} choices")]
    InvalidCorrectIndex {
        id: String,
        index: i64,
        choices: usize,
    },

    /// A session references an item the catalog does not contain.
    #[error("item {0} not found in catalog")]
    UnknownItem(String),
}

/// Errors raised while decoding a persisted session snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The snapshot was written under a schema this build does not read.
    #[error("unsupported session schema version {found:?} (expected {expected})")]
    UnsupportedVersion { found: Option<u64>, expected: u32 },

    /// The snapshot is not valid JSON or does not match the schema.
    #[error("malformed session snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Errors surfaced by session operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The session configuration is malformed or cannot be satisfied.
    #[error("configuration error: {0}")]
    Config(String),

    /// The answer references an item that is not the session's current item.
    #[error("question mismatch: expected {expected:?}, received {received}")]
    QuestionMismatch {
        expected: Option<String>,
        received: String,
    },

    /// The session already reached a terminal state.
    #[error("session {0} already completed")]
    AlreadyCompleted(Uuid),

    /// The response payload is malformed.
    #[error("invalid input: {0}")]
    Input(String),

    /// No session exists under this id.
    #[error("session {0} not found")]
    SessionNotFound(Uuid),

    /// The item bank is invalid.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// A persisted session could not be decoded.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// The session store failed.
    #[error("session store error: {0:#}")]
    Store(anyhow::Error),
}

impl EngineError {
    /// Returns `true` for errors caused by a stale or duplicate request
    /// against a session whose state moved on.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            EngineError::QuestionMismatch { .. } | EngineError::AlreadyCompleted(_)
        )
    }

    /// Returns `true` if the caller can fix the request; `false` for
    /// failures of the engine's own dependencies.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            EngineError::Catalog(_) | EngineError::Snapshot(_) | EngineError::Store(_)
        )
    }
}
