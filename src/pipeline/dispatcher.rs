//! Worker dispatcher — fans a batch of claimable articles out across
//! bounded concurrency and collects per-item outcomes.
//!
//! Races lost to other workers (`Conflict`, `AlreadyClaimed`) are expected
//! under concurrent dispatch and reported as `Skipped`, never as failures.
//! Only store/infrastructure errors abort a batch.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::db::Article;
use crate::error::{Error, Result};
use crate::types::{ArticleId, Event, ItemOutcome, Outcome, Verdict};

use super::engine::TransitionEngine;

/// Business processing function supplied by the embedding application
///
/// Decides what should happen to a claimed article. Must be pure with
/// respect to pipeline state: all state mutation is the engine's job.
#[async_trait]
pub trait ArticleProcessor: Send + Sync {
    /// Process one claimed article and return a verdict
    async fn process(&self, article: &Article) -> Verdict;
}

/// Drives a batch of articles through claim → process → complete
pub(crate) struct Dispatcher {
    engine: Arc<TransitionEngine>,
    processor: Arc<dyn ArticleProcessor>,
    max_attempts: i64,
    event_tx: tokio::sync::broadcast::Sender<Event>,
}

impl Dispatcher {
    pub(crate) fn new(
        engine: Arc<TransitionEngine>,
        processor: Arc<dyn ArticleProcessor>,
        max_attempts: i64,
        event_tx: tokio::sync::broadcast::Sender<Event>,
    ) -> Self {
        Self {
            engine,
            processor,
            max_attempts,
            event_tx,
        }
    }

    /// Run one batch with at most `concurrency` articles in flight
    ///
    /// Cancellation is cooperative and checked before each claim: items not
    /// yet claimed when `cancel` fires are reported `Skipped`, while items
    /// already in flight finish their transition normally. A claimed item is
    /// never abandoned mid-transition; a worker that dies simply lets its
    /// lease expire.
    pub(crate) async fn run_batch(
        &self,
        batch: Vec<Article>,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<(ArticleId, ItemOutcome)>> {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        // Child token: a fatal store error stops the rest of this batch
        // without cancelling the caller's token.
        let batch_cancel = cancel.child_token();

        let mut join_set: JoinSet<Result<(ArticleId, ItemOutcome)>> = JoinSet::new();
        let mut results = Vec::with_capacity(batch.len());

        for article in batch {
            if batch_cancel.is_cancelled() {
                tracing::debug!(id = %article.id, "Cycle cancelled, skipping article");
                results.push((article.id, ItemOutcome::Skipped));
                continue;
            }

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => {
                    // Semaphore closed — treat like cancellation
                    results.push((article.id, ItemOutcome::Skipped));
                    continue;
                }
            };

            let engine = Arc::clone(&self.engine);
            let processor = Arc::clone(&self.processor);
            let event_tx = self.event_tx.clone();
            let max_attempts = self.max_attempts;
            let task_cancel = batch_cancel.clone();

            join_set.spawn(async move {
                let _permit = permit;
                if task_cancel.is_cancelled() {
                    return Ok((article.id, ItemOutcome::Skipped));
                }
                process_one(engine, processor, max_attempts, event_tx, article).await
            });
        }

        let mut fatal: Option<Error> = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(outcome)) => results.push(outcome),
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Fatal error during dispatch, aborting cycle");
                    batch_cancel.cancel();
                    if fatal.is_none() {
                        fatal = Some(e);
                    }
                }
                Err(join_err) => {
                    // A panicked task leaves its article claimed; the lease
                    // expires and a later cycle reclaims it.
                    tracing::error!(error = %join_err, "Dispatch task panicked");
                    batch_cancel.cancel();
                    if fatal.is_none() {
                        fatal = Some(Error::Other(format!("dispatch task panicked: {join_err}")));
                    }
                }
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }
}

/// Drive a single article through claim → process → complete
async fn process_one(
    engine: Arc<TransitionEngine>,
    processor: Arc<dyn ArticleProcessor>,
    max_attempts: i64,
    event_tx: tokio::sync::broadcast::Sender<Event>,
    article: Article,
) -> Result<(ArticleId, ItemOutcome)> {
    let id = article.id.clone();

    let claimed = match engine.claim(&id).await {
        Ok(claimed) => claimed,
        Err(e) if e.is_race_loss() => {
            tracing::debug!(id = %id, error = %e, "Lost claim race, skipping");
            return Ok((id, ItemOutcome::Skipped));
        }
        Err(Error::InvalidState { current_state, .. }) => {
            // Completed by another worker between listing and claiming
            tracing::debug!(id = %id, state = %current_state, "Article no longer claimable");
            return Ok((id, ItemOutcome::Skipped));
        }
        Err(Error::NotFound(_)) => {
            // The core never deletes; something external removed the row
            tracing::warn!(id = %id, "Article vanished between listing and claim");
            return Ok((id, ItemOutcome::Skipped));
        }
        Err(e) => return Err(e),
    };

    let _ = event_tx.send(Event::Claimed {
        id: id.clone(),
        attempt: claimed.attempt_count,
    });

    // No in-process lock is held across this call; the lease is the only
    // claim on the article while business processing runs.
    let verdict = processor.process(&claimed).await;

    let (outcome, event) = match verdict {
        Verdict::Publish => (
            Outcome::Publish,
            Event::Published { id: id.clone() },
        ),
        Verdict::Reject => (Outcome::Reject, Event::Rejected { id: id.clone() }),
        Verdict::Fail(reason) => (
            Outcome::Fail(reason.clone()),
            Event::Failed {
                id: id.clone(),
                reason,
            },
        ),
        Verdict::Transient(reason) => {
            if claimed.attempt_count >= max_attempts {
                let reason = format!(
                    "retry budget exhausted after {} attempts: {}",
                    claimed.attempt_count, reason
                );
                (
                    Outcome::Fail(reason.clone()),
                    Event::Failed {
                        id: id.clone(),
                        reason,
                    },
                )
            } else {
                // Leave the lease to expire; a later cycle reclaims the
                // article. Bounded retry without an explicit retry loop.
                tracing::debug!(
                    id = %id,
                    attempt = claimed.attempt_count,
                    reason = %reason,
                    "Transient failure, deferring via lease expiry"
                );
                let _ = event_tx.send(Event::Deferred {
                    id: id.clone(),
                    reason,
                });
                return Ok((id, ItemOutcome::Deferred));
            }
        }
    };

    match engine.complete(&id, claimed.version, outcome).await {
        Ok(completed) => {
            let item = match completed.state {
                crate::types::ArticleState::Published => ItemOutcome::Published,
                crate::types::ArticleState::Rejected => ItemOutcome::Rejected,
                _ => ItemOutcome::Failed,
            };
            let _ = event_tx.send(event);
            Ok((id, item))
        }
        Err(e) if e.is_race_loss() => {
            // Another worker reclaimed and completed the article after our
            // lease expired mid-processing. Their outcome stands.
            tracing::debug!(id = %id, error = %e, "Lost complete race, skipping");
            Ok((id, ItemOutcome::Skipped))
        }
        Err(Error::InvalidState { current_state, .. }) => {
            tracing::warn!(id = %id, state = %current_state, "Article left processing before complete");
            Ok((id, ItemOutcome::Skipped))
        }
        Err(e) => Err(e),
    }
}
