//! # kgstore - Knowledge graph persistence
//!
//! Stores a small knowledge graph in SQLite with get-or-create semantics on
//! every dimension:
//! - Categories and predicates form deduplicated controlled vocabularies
//! - Nodes are keyed by a caller-supplied external identifier and own their aliases
//! - Edges are keyed by the (subject, predicate, object) triple
//! - A canonical JSON snapshot of the whole graph is kept alongside
//!
//! Repeated inserts are idempotent and the first write of a node or edge wins.

pub mod canonical;
pub mod record;
pub mod storage;
pub mod ingest;
pub mod extraction;
pub mod config;
pub mod server;
pub mod ui;

// Re-exports for convenient access
pub use canonical::to_canonical_json;
pub use record::{GraphSnapshot, NodeEdges, StoredEdge, StoredNode};
pub use storage::{DbStats, GraphStore};
pub use ingest::{ingest_graph, IngestReport};
pub use extraction::{Clock, ExtractionState, ExtractionTracker, ManualClock, SystemClock};

/// Result type alias for kgstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for kgstore operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required field was missing or blank. Caller error, never retried.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A referenced entity does not exist yet.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// A uniqueness or foreign-key invariant broke underneath a get-or-create.
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    pub(crate) fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Error::NotFound { entity, key: key.into() }
    }

    /// Classify a failed write: constraint failures become integrity violations.
    pub(crate) fn from_write(err: rusqlite::Error, context: &str) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref e, ref msg)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                let detail = msg.clone().unwrap_or_else(|| e.to_string());
                Error::IntegrityViolation(format!("{}: {}", context, detail))
            }
            other => Error::Storage(other),
        }
    }
}
