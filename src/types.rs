//! Core types for staged-articles

use serde::{Deserialize, Serialize};

/// Unique identifier for an article
///
/// Opaque and immutable; assigned by the producer that stages the article.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArticleId(pub String);

impl ArticleId {
    /// Create a new ArticleId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ArticleId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ArticleId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for ArticleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for ArticleId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for ArticleId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode(self.0.clone(), buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for ArticleId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <String as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Article processing state
///
/// Exactly one state holds at any time. Valid transitions:
///
/// ```text
/// Staged --claim--> Processing --complete(Publish)--> Published  (terminal)
///                   Processing --complete(Reject)-->  Rejected   (terminal)
///                   Processing --complete(Fail)-->    Failed
/// Processing --lease expiry--> reclaimable by claim
/// Failed --operator requeue--> Staged
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleState {
    /// Awaiting processing
    Staged,
    /// Claimed by a worker under a time-bounded lease
    Processing,
    /// Successfully published (terminal)
    Published,
    /// Rejected by the processing function (terminal)
    Rejected,
    /// Failed; exits only via explicit operator requeue
    Failed,
}

impl ArticleState {
    /// Convert integer state code to ArticleState enum
    pub fn from_i32(state: i32) -> Self {
        match state {
            0 => ArticleState::Staged,
            1 => ArticleState::Processing,
            2 => ArticleState::Published,
            3 => ArticleState::Rejected,
            4 => ArticleState::Failed,
            _ => ArticleState::Failed, // Default to Failed for unknown state
        }
    }

    /// Convert ArticleState enum to integer state code
    pub fn to_i32(&self) -> i32 {
        match self {
            ArticleState::Staged => 0,
            ArticleState::Processing => 1,
            ArticleState::Published => 2,
            ArticleState::Rejected => 3,
            ArticleState::Failed => 4,
        }
    }

    /// Whether this is a terminal state (never mutated again by the core)
    pub fn is_terminal(&self) -> bool {
        matches!(self, ArticleState::Published | ArticleState::Rejected)
    }
}

impl std::fmt::Display for ArticleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ArticleState::Staged => "staged",
            ArticleState::Processing => "processing",
            ArticleState::Published => "published",
            ArticleState::Rejected => "rejected",
            ArticleState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Terminal outcome applied by `complete`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Transition to `Published`
    Publish,
    /// Transition to `Rejected`
    Reject,
    /// Transition to `Failed` with an error description
    Fail(String),
}

impl Outcome {
    /// The state this outcome transitions to
    pub fn target_state(&self) -> ArticleState {
        match self {
            Outcome::Publish => ArticleState::Published,
            Outcome::Reject => ArticleState::Rejected,
            Outcome::Fail(_) => ArticleState::Failed,
        }
    }
}

/// Verdict returned by the embedder-supplied processing function
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// The article should be published
    Publish,
    /// The article should be rejected
    Reject,
    /// Permanent business failure; the article is marked `Failed`
    Fail(String),
    /// Transient failure; the lease is left to expire so a later
    /// dispatch cycle can reclaim the article
    Transient(String),
}

/// Per-item result of one dispatch cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemOutcome {
    /// Completed as `Published`
    Published,
    /// Completed as `Rejected`
    Rejected,
    /// Completed as `Failed`
    Failed,
    /// Lost the claim/complete race to another worker, or cycle cancelled
    Skipped,
    /// Transient failure within the attempt budget; lease left to expire
    Deferred,
}

/// Summary of one dispatch cycle, counted per outcome
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleSummary {
    /// Articles completed as `Published`
    pub published: usize,
    /// Articles completed as `Rejected`
    pub rejected: usize,
    /// Articles completed as `Failed`
    pub failed: usize,
    /// Articles skipped (lost races, cancellation)
    pub skipped: usize,
    /// Articles deferred to a later cycle via lease expiry
    pub deferred: usize,
}

impl CycleSummary {
    /// Total number of articles accounted for in this cycle
    pub fn total(&self) -> usize {
        self.published + self.rejected + self.failed + self.skipped + self.deferred
    }

    /// Record one per-item outcome
    pub fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Published => self.published += 1,
            ItemOutcome::Rejected => self.rejected += 1,
            ItemOutcome::Failed => self.failed += 1,
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Deferred => self.deferred += 1,
        }
    }
}

/// Event emitted during the article lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Article staged by a producer
    Staged {
        /// Article ID
        id: ArticleId,
    },

    /// Article claimed for processing
    Claimed {
        /// Article ID
        id: ArticleId,
        /// Processing attempt number (1-based)
        attempt: i64,
    },

    /// Article published
    Published {
        /// Article ID
        id: ArticleId,
    },

    /// Article rejected
    Rejected {
        /// Article ID
        id: ArticleId,
    },

    /// Article failed
    Failed {
        /// Article ID
        id: ArticleId,
        /// Failure description
        reason: String,
    },

    /// Article deferred; its lease will expire and it becomes reclaimable
    Deferred {
        /// Article ID
        id: ArticleId,
        /// Transient failure description
        reason: String,
    },

    /// Failed article moved back to `Staged` by an operator
    Requeued {
        /// Article ID
        id: ArticleId,
    },

    /// One dispatch cycle finished
    CycleCompleted {
        /// Per-outcome counts for the cycle
        summary: CycleSummary,
    },
}
