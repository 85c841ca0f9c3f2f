// src/background/reporter.rs
// Periodic metrics and queue-depth reporting

use crate::db::pool::DatabasePool;
use crate::db::queue;
use crate::queue::metrics::QueueMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub struct MetricsReporter {
    pool: Arc<DatabasePool>,
    interval_secs: u64,
    metrics: Arc<QueueMetrics>,
    shutdown: watch::Receiver<bool>,
}

impl MetricsReporter {
    pub fn new(
        pool: Arc<DatabasePool>,
        interval_secs: u64,
        metrics: Arc<QueueMetrics>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            pool,
            interval_secs,
            metrics,
            shutdown,
        }
    }

    /// Run the reporting loop until shutdown.
    pub async fn run(mut self) {
        tracing::info!("Metrics reporter started (interval: {}s)", self.interval_secs);

        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(self.interval_secs)) => {}
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        tracing::info!("Metrics reporter shutting down");
                        break;
                    }
                }
            }

            self.metrics.report();

            if let Some(stats) = self
                .pool
                .try_interact("stats snapshot", |conn| {
                    queue::queue_stats_sync(conn).map_err(Into::into)
                })
                .await
            {
                tracing::info!(
                    pending = stats.pending,
                    leased = stats.leased,
                    delivered = stats.delivered,
                    dead = stats.dead,
                    inbound_pending = stats.inbound_pending,
                    oldest_pending_secs = stats.oldest_pending_secs,
                    "queue depth"
                );
            }
        }
    }
}
