//! Database layer for staged-articles
//!
//! Handles SQLite persistence for articles and their processing state.
//! All cross-worker coordination goes through [`ArticleStore::compare_and_set`],
//! an atomic version-checked update; no in-process lock is relied on for
//! correctness, so multiple service instances can share one store.
//!
//! ## Submodules
//!
//! Methods on [`SqliteStore`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`articles`] — Article CRUD and compare-and-set operations

use crate::error::Result;
use crate::types::{ArticleId, ArticleState};
use async_trait::async_trait;
use sqlx::{FromRow, sqlite::SqlitePool};

mod articles;
mod migrations;

/// New article to be staged by a producer
#[derive(Debug, Clone)]
pub struct NewArticle {
    /// Unique identifier assigned by the producer
    pub id: ArticleId,
    /// Opaque content blob, immutable once staged
    pub payload: String,
}

/// Article record as stored in SQLite
#[derive(Debug, Clone, FromRow)]
pub struct ArticleRow {
    /// Unique identifier
    pub id: ArticleId,
    /// Current state code (see [`ArticleState::from_i32`])
    pub state: i32,
    /// Opaque content blob
    pub payload: String,
    /// Number of processing attempts so far
    pub attempt_count: i64,
    /// Error description, set only for failed articles
    pub last_error: Option<String>,
    /// Optimistic-concurrency version, +1 per successful mutation
    pub version: i64,
    /// Unix timestamp when the current lease expires (Processing only)
    pub lease_expires_at: Option<i64>,
    /// Unix timestamp when the article was staged
    pub created_at: i64,
    /// Unix timestamp of the last mutation
    pub updated_at: i64,
}

/// Article with its processing state, the unit of work for the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    /// Unique identifier
    pub id: ArticleId,
    /// Current processing state
    pub state: ArticleState,
    /// Opaque content blob
    pub payload: String,
    /// Number of processing attempts so far
    pub attempt_count: i64,
    /// Error description, set only for failed articles
    pub last_error: Option<String>,
    /// Optimistic-concurrency version, +1 per successful mutation
    pub version: i64,
    /// Unix timestamp when the current lease expires (Processing only)
    pub lease_expires_at: Option<i64>,
    /// Unix timestamp when the article was staged
    pub created_at: i64,
    /// Unix timestamp of the last mutation
    pub updated_at: i64,
}

impl From<ArticleRow> for Article {
    fn from(row: ArticleRow) -> Self {
        Article {
            id: row.id,
            state: ArticleState::from_i32(row.state),
            payload: row.payload,
            attempt_count: row.attempt_count,
            last_error: row.last_error,
            version: row.version,
            lease_expires_at: row.lease_expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// State change applied through [`ArticleStore::compare_and_set`]
///
/// Describes the target of one atomic mutation. The store increments
/// `version` itself; callers never write versions directly.
#[derive(Debug, Clone)]
pub struct ArticleMutation {
    /// State to transition to
    pub state: ArticleState,
    /// New lease expiry, or None to clear the lease
    pub lease_expires_at: Option<i64>,
    /// New error description, or None to clear it
    pub last_error: Option<String>,
    /// Whether this mutation counts as a processing attempt
    pub increment_attempt: bool,
}

/// Durable keyed storage of articles and their processing state
///
/// The store is the only shared mutable resource in the pipeline; it must
/// provide atomic compare-and-set semantics. Trait object so embedders can
/// substitute a different backend.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Fetch an article by id
    async fn get(&self, id: &ArticleId) -> Result<Option<Article>>;

    /// Stage a new article at version 1
    async fn insert(&self, article: &NewArticle) -> Result<Article>;

    /// Atomically apply `mutation` if the article's current version equals
    /// `expected_version`, incrementing the version on success
    ///
    /// Fails with [`Error::Conflict`](crate::Error::Conflict) when the row
    /// moved past `expected_version`, or
    /// [`Error::NotFound`](crate::Error::NotFound) when the id is unknown.
    async fn compare_and_set(
        &self,
        id: &ArticleId,
        expected_version: i64,
        mutation: ArticleMutation,
    ) -> Result<Article>;

    /// List articles eligible for claiming: `Staged`, or `Processing` with
    /// a lease that expired at or before `now`
    async fn list_staged_or_expired(&self, now: i64, limit: usize) -> Result<Vec<Article>>;

    /// Count articles currently in `state`
    async fn count_by_state(&self, state: ArticleState) -> Result<i64>;
}

/// SQLite-backed article store
pub struct SqliteStore {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
