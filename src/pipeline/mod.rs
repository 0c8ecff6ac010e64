//! Core pipeline implementation split into focused submodules.
//!
//! The `ArticlePipeline` struct and its collaborators are organized by domain:
//! - [`engine`] - Atomic state transitions (claim/complete/requeue)
//! - [`dispatcher`] - Bounded fan-out of one batch across workers
//! - [`runner`] - Background interval cycle runner

mod dispatcher;
mod engine;
mod runner;

pub use dispatcher::ArticleProcessor;
pub use engine::TransitionEngine;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db::{Article, ArticleStore, NewArticle, SqliteStore};
use crate::error::{Error, Result};
use crate::types::{ArticleId, CycleSummary, Event};

use dispatcher::Dispatcher;

/// Main pipeline façade (cloneable - all fields are Arc-wrapped)
///
/// Explicitly constructed with its store and processing-function
/// dependencies; the embedding web/CLI layer holds one of these and calls
/// [`run_cycle`](ArticlePipeline::run_cycle) per scheduler tick.
#[derive(Clone)]
pub struct ArticlePipeline {
    /// Article store (trait object so embedders can substitute a backend)
    store: Arc<dyn ArticleStore>,
    /// Transition engine shared with the dispatcher
    engine: Arc<TransitionEngine>,
    /// Batch dispatcher
    dispatcher: Arc<Dispatcher>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    config: Arc<Config>,
    /// Event broadcast channel sender (multiple subscribers supported)
    event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Cancellation token observed by cycles and the background runner
    shutdown: CancellationToken,
    /// Flag to indicate whether new cycles are accepted (false during shutdown)
    accepting_new: Arc<AtomicBool>,
}

impl ArticlePipeline {
    /// Create a pipeline over an explicit store and processor
    pub fn new(
        config: Config,
        store: Arc<dyn ArticleStore>,
        processor: Arc<dyn ArticleProcessor>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        // Broadcast channel sized generously so slow subscribers lag rather
        // than block the pipeline
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let engine = Arc::new(TransitionEngine::new(
            Arc::clone(&store),
            config.lease_duration(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&engine),
            processor,
            config.pipeline.max_attempts,
            event_tx.clone(),
        ));

        Ok(Self {
            store,
            engine,
            dispatcher,
            config,
            event_tx,
            shutdown: CancellationToken::new(),
            accepting_new: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Create a pipeline backed by the SQLite store from the configuration
    pub async fn with_sqlite(config: Config, processor: Arc<dyn ArticleProcessor>) -> Result<Self> {
        config.validate()?;
        let store = SqliteStore::new(&config.persistence.database_path).await?;
        Self::new(config, Arc::new(store), processor)
    }

    /// Run one dispatch cycle: list a batch of claimable articles, drive
    /// each through claim → process → complete, and fold the per-item
    /// report into counts
    ///
    /// Per-item failures never abort the batch; only store/infrastructure
    /// errors surface as `Err`. The summary's totals add up to the batch
    /// size that was dispatched.
    pub async fn run_cycle(&self) -> Result<CycleSummary> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let now = chrono::Utc::now().timestamp();
        let batch = self
            .store
            .list_staged_or_expired(now, self.config.pipeline.batch_size)
            .await?;

        if batch.is_empty() {
            tracing::debug!("No claimable articles, cycle is a no-op");
            return Ok(CycleSummary::default());
        }

        let batch_size = batch.len();
        tracing::info!(
            batch_size,
            concurrency = self.config.pipeline.concurrency,
            "Starting dispatch cycle"
        );

        let report = self
            .dispatcher
            .run_batch(batch, self.config.pipeline.concurrency, &self.shutdown)
            .await?;

        let mut summary = CycleSummary::default();
        for (_, outcome) in &report {
            summary.record(*outcome);
        }

        tracing::info!(
            published = summary.published,
            rejected = summary.rejected,
            failed = summary.failed,
            skipped = summary.skipped,
            deferred = summary.deferred,
            "Dispatch cycle complete"
        );

        let _ = self.event_tx.send(Event::CycleCompleted { summary });

        Ok(summary)
    }

    /// Stage a new article for processing (producer entry point)
    pub async fn stage(&self, id: impl Into<ArticleId>, payload: impl Into<String>) -> Result<Article> {
        let article = self
            .store
            .insert(&NewArticle {
                id: id.into(),
                payload: payload.into(),
            })
            .await?;

        tracing::debug!(id = %article.id, "Staged article");
        let _ = self.event_tx.send(Event::Staged {
            id: article.id.clone(),
        });

        Ok(article)
    }

    /// Fetch an article by id
    pub async fn get(&self, id: &ArticleId) -> Result<Option<Article>> {
        self.store.get(id).await
    }

    /// Move a `Failed` article back to `Staged` (operator entry point)
    pub async fn requeue(&self, id: &ArticleId) -> Result<Article> {
        let article = self.engine.requeue(id).await?;
        let _ = self.event_tx.send(Event::Requeued { id: id.clone() });
        Ok(article)
    }

    /// Subscribe to pipeline lifecycle events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Stop accepting new cycles and cancel the background runner
    ///
    /// In-flight transitions finish normally; claimed-but-uncompleted
    /// articles time out via lease expiry and are reclaimed later.
    pub fn shutdown(&self) {
        tracing::info!("Pipeline shutting down");
        self.accepting_new.store(false, Ordering::SeqCst);
        self.shutdown.cancel();
    }

    /// Whether shutdown has been requested
    pub fn is_shutting_down(&self) -> bool {
        !self.accepting_new.load(Ordering::SeqCst)
    }

    /// The pipeline configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
