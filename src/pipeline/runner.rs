//! Background cycle runner — runs dispatch cycles on a fixed interval.

use super::ArticlePipeline;

impl ArticlePipeline {
    /// Start the background cycle runner
    ///
    /// Spawns a task that calls [`run_cycle`](ArticlePipeline::run_cycle)
    /// every `cycle_interval` until shutdown. Cycle errors are logged and do
    /// not stop the runner; the next tick simply tries again, which covers
    /// transient store outages.
    pub fn start_cycle_runner(&self) -> tokio::task::JoinHandle<()> {
        let pipeline = self.clone();
        let interval = self.config.cycle_interval();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so a freshly started
            // runner waits one interval before its first cycle.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("Cycle runner stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        match pipeline.run_cycle().await {
                            Ok(summary) if summary.total() > 0 => {
                                tracing::debug!(total = summary.total(), "Scheduled cycle processed articles");
                            }
                            Ok(_) => {}
                            Err(crate::Error::ShuttingDown) => break,
                            Err(e) => {
                                tracing::error!(error = %e, "Scheduled cycle failed");
                            }
                        }
                    }
                }
            }
        })
    }
}
