//! Error types for politica-etl
//!
//! Row-level and chunk-level problems are not errors at this level: they are
//! recorded in the run summary. `EtlError` is what a chunk reports when it
//! fails, and what a whole run returns when it cannot start.

use thiserror::Error;

/// Loader error type
#[derive(Debug, Error)]
pub enum EtlError {
    /// Store operation failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Entity resolution failed (store unreachable)
    #[error(transparent)]
    Resolution(#[from] crate::services::resolver::ResolutionError),

    /// Run could not reach the store or seed its caches; nothing dispatched
    #[error("Startup failed: {0}")]
    Startup(String),

    /// Row source could not be read
    #[error("Source error in {path}: {message}")]
    Source { path: String, message: String },

    /// Run state machine misuse
    #[error("Invalid run transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: crate::models::RunState,
        to: crate::models::RunState,
    },

    /// Worker task panicked while processing a chunk
    #[error("Worker panicked: {0}")]
    WorkerPanic(String),
}

/// Result type for loader operations
pub type EtlResult<T> = Result<T, EtlError>;
