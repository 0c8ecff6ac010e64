//! Error types for staged-articles
//!
//! This module provides the error taxonomy for the pipeline:
//! - Expected race outcomes (`Conflict`, `AlreadyClaimed`) that concurrent
//!   dispatch swallows per item
//! - Non-retryable caller errors (`NotFound`, `InvalidState`)
//! - Infrastructure errors (`Database`, `Sqlx`, `Io`) that abort a whole cycle

use thiserror::Error;

/// Result type alias for staged-articles operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for staged-articles
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "lease_duration_secs")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Article not found in the store
    #[error("article not found: {0}")]
    NotFound(String),

    /// A mutation was presented with a stale version
    ///
    /// Another worker already claimed, completed, or reclaimed the article.
    /// Callers must re-read current state rather than retry the same mutation.
    #[error("version conflict on article {id}: expected version {expected}")]
    Conflict {
        /// The article whose version check failed
        id: String,
        /// The version the caller expected to find
        expected: i64,
    },

    /// Another worker holds a live lease on the article
    #[error("article {id} is already claimed (lease expires at {lease_expires_at})")]
    AlreadyClaimed {
        /// The article that is already claimed
        id: String,
        /// Unix timestamp when the current lease expires
        lease_expires_at: i64,
    },

    /// Operation not valid for the article's current state
    #[error("cannot {operation} article {id} in state {current_state}")]
    InvalidState {
        /// The article that is in an invalid state for the operation
        id: String,
        /// The operation that was attempted (e.g., "claim", "requeue")
        operation: String,
        /// The current state that prevents the operation
        current_state: String,
    },

    /// Shutdown in progress - not accepting new cycles
    #[error("shutdown in progress: not accepting new cycles")]
    ShuttingDown,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error is an expected outcome of concurrent dispatch
    ///
    /// Losing a claim race or completing against a stale version is normal
    /// under concurrent workers; the dispatcher skips such items without
    /// counting them as failures.
    pub fn is_race_loss(&self) -> bool {
        matches!(self, Error::Conflict { .. } | Error::AlreadyClaimed { .. })
    }

    /// Whether this error is fatal to a whole dispatch cycle
    ///
    /// Store and I/O failures indicate the shared infrastructure is
    /// unavailable; per-item processing cannot continue meaningfully.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Database(_) | Error::Sqlx(_) | Error::Io(_) | Error::ShuttingDown
        )
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Constraint violation (e.g., duplicate key)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}
