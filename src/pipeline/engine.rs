//! Transition engine — applies single atomic state transitions to articles.
//!
//! Every mutation goes through the store's compare-and-set, so the engine is
//! safe to call from any number of workers or service instances. The engine
//! never holds state of its own beyond the configured lease duration.

use std::sync::Arc;

use crate::db::{Article, ArticleMutation, ArticleStore};
use crate::error::{Error, Result};
use crate::types::{ArticleId, ArticleState, Outcome};

/// Applies exactly one valid state transition to exactly one article,
/// atomically with respect to its version
pub struct TransitionEngine {
    store: Arc<dyn ArticleStore>,
    lease_duration: chrono::Duration,
}

impl TransitionEngine {
    /// Create a new engine over `store` with the given lease duration
    pub fn new(store: Arc<dyn ArticleStore>, lease_duration: chrono::Duration) -> Self {
        Self {
            store,
            lease_duration,
        }
    }

    /// Claim an article for processing
    ///
    /// Succeeds for articles in `Staged`, or in `Processing` whose lease has
    /// expired (abandoned by a crashed worker). On success the article moves
    /// to `Processing` with a fresh lease, its version and attempt count
    /// incremented.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] — unknown id
    /// - [`Error::AlreadyClaimed`] — another live lease holds the article
    /// - [`Error::Conflict`] — the article moved between read and claim
    ///   (another worker won the race)
    /// - [`Error::InvalidState`] — the article is in a terminal or failed state
    pub async fn claim(&self, id: &ArticleId) -> Result<Article> {
        let article = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let now = chrono::Utc::now().timestamp();

        match article.state {
            ArticleState::Staged => {}
            ArticleState::Processing => {
                // A Processing row without an expiry is treated as expired;
                // otherwise it could never be reclaimed after a crash.
                if let Some(expiry) = article.lease_expires_at {
                    if expiry > now {
                        return Err(Error::AlreadyClaimed {
                            id: id.to_string(),
                            lease_expires_at: expiry,
                        });
                    }
                }
                tracing::debug!(
                    id = %id,
                    attempt = article.attempt_count,
                    "Reclaiming article with expired lease"
                );
            }
            state => {
                return Err(Error::InvalidState {
                    id: id.to_string(),
                    operation: "claim".into(),
                    current_state: state.to_string(),
                });
            }
        }

        let lease_expires_at = now + self.lease_duration.num_seconds();
        let claimed = self
            .store
            .compare_and_set(
                id,
                article.version,
                ArticleMutation {
                    state: ArticleState::Processing,
                    lease_expires_at: Some(lease_expires_at),
                    last_error: article.last_error.clone(),
                    increment_attempt: true,
                },
            )
            .await?;

        tracing::debug!(
            id = %id,
            version = claimed.version,
            attempt = claimed.attempt_count,
            lease_expires_at,
            "Claimed article"
        );

        Ok(claimed)
    }

    /// Complete a claimed article with a terminal or failed outcome
    ///
    /// `version` must be the version returned by the `claim` that granted
    /// the caller's lease. A mismatch means another worker already completed
    /// or reclaimed the article; the caller must re-read current state
    /// rather than retry the same outcome.
    pub async fn complete(
        &self,
        id: &ArticleId,
        version: i64,
        outcome: Outcome,
    ) -> Result<Article> {
        let article = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        // Stale version always loses, regardless of current state
        if article.version != version {
            return Err(Error::Conflict {
                id: id.to_string(),
                expected: version,
            });
        }

        if article.state != ArticleState::Processing {
            return Err(Error::InvalidState {
                id: id.to_string(),
                operation: "complete".into(),
                current_state: article.state.to_string(),
            });
        }

        let last_error = match &outcome {
            Outcome::Fail(reason) => Some(reason.clone()),
            Outcome::Publish | Outcome::Reject => None,
        };

        let target = outcome.target_state();
        let completed = self
            .store
            .compare_and_set(
                id,
                version,
                ArticleMutation {
                    state: target,
                    lease_expires_at: None,
                    last_error,
                    increment_attempt: false,
                },
            )
            .await?;

        tracing::debug!(
            id = %id,
            state = %target,
            version = completed.version,
            "Completed article"
        );

        Ok(completed)
    }

    /// Move a `Failed` article back to `Staged`
    ///
    /// Operator entry point; the only exit from the `Failed` state. Clears
    /// the recorded error so the next attempt starts clean.
    pub async fn requeue(&self, id: &ArticleId) -> Result<Article> {
        let article = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if article.state != ArticleState::Failed {
            return Err(Error::InvalidState {
                id: id.to_string(),
                operation: "requeue".into(),
                current_state: article.state.to_string(),
            });
        }

        let requeued = self
            .store
            .compare_and_set(
                id,
                article.version,
                ArticleMutation {
                    state: ArticleState::Staged,
                    lease_expires_at: None,
                    last_error: None,
                    increment_attempt: false,
                },
            )
            .await?;

        tracing::info!(id = %id, version = requeued.version, "Requeued failed article");

        Ok(requeued)
    }
}
