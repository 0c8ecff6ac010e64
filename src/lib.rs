//! # staged-articles
//!
//! Embeddable pipeline that advances staged articles to a terminal state
//! (published, rejected, or failed), safely under concurrent invocation.
//!
//! ## Design Philosophy
//!
//! staged-articles is designed to be:
//! - **Library-first** - No CLI or HTTP surface, purely a Rust crate for embedding
//! - **Store-coordinated** - All cross-worker coordination goes through the
//!   store's atomic compare-and-set; no in-process locking is relied on, so
//!   multiple service instances can share one store
//! - **Lease-based** - A crashed worker's claim simply expires and the
//!   article becomes reclaimable; nothing gets permanently stuck
//! - **Event-driven** - Consumers subscribe to lifecycle events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use staged_articles::{ArticlePipeline, ArticleProcessor, Config, Verdict, db::Article};
//!
//! struct Moderator;
//!
//! #[async_trait::async_trait]
//! impl ArticleProcessor for Moderator {
//!     async fn process(&self, article: &Article) -> Verdict {
//!         if article.payload.is_empty() {
//!             Verdict::Reject
//!         } else {
//!             Verdict::Publish
//!         }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = ArticlePipeline::with_sqlite(Config::default(), Arc::new(Moderator)).await?;
//!
//!     pipeline.stage("doc-1", "article body").await?;
//!     let summary = pipeline.run_cycle().await?;
//!     println!("published: {}", summary.published);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Core pipeline implementation (decomposed into focused submodules)
pub mod pipeline;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{Config, PersistenceConfig, PipelineConfig, RunnerConfig};
pub use db::{Article, ArticleMutation, ArticleStore, NewArticle, SqliteStore};
pub use error::{DatabaseError, Error, Result};
pub use pipeline::{ArticlePipeline, ArticleProcessor, TransitionEngine};
pub use types::{
    ArticleId, ArticleState, CycleSummary, Event, ItemOutcome, Outcome, Verdict,
};

/// Helper function to run the pipeline's cycle runner with graceful signal handling.
///
/// Starts the background cycle runner, waits for a termination signal, and
/// then calls the pipeline's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use staged_articles::{ArticlePipeline, Config, run_with_shutdown};
/// # use staged_articles::{ArticleProcessor, Verdict, db::Article};
/// # struct Moderator;
/// # #[async_trait::async_trait]
/// # impl ArticleProcessor for Moderator {
/// #     async fn process(&self, _article: &Article) -> Verdict { Verdict::Publish }
/// # }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pipeline = ArticlePipeline::with_sqlite(Config::default(), Arc::new(Moderator)).await?;
///
///     // Run cycles on the configured interval until a signal arrives
///     run_with_shutdown(pipeline).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(pipeline: ArticlePipeline) -> Result<()> {
    let runner = pipeline.start_cycle_runner();
    wait_for_signal().await;
    pipeline.shutdown();
    let _ = runner.await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
