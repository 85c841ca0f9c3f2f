// src/background/mod.rs
// Background workers for broker housekeeping
//
// Three loops share the pool and a watch-based shutdown signal:
// - Sweeper: expiration, lease recovery, stale-agent detection
// - Retention: purge of old terminal messages (when enabled)
// - Reporter: periodic metrics/stats summary

mod reporter;
mod retention;
mod sweeper;

use crate::config::FleetMqConfig;
use crate::db::pool::DatabasePool;
use crate::queue::backoff::BackoffPolicy;
use crate::queue::metrics::QueueMetrics;
use std::sync::Arc;
use tokio::sync::watch;

pub use reporter::MetricsReporter;
pub use retention::RetentionWorker;
pub use sweeper::SweeperWorker;

/// Spawn all housekeeping workers.
///
/// Returns the shutdown sender; send `true` to stop every worker.
pub fn spawn(
    pool: Arc<DatabasePool>,
    config: &FleetMqConfig,
    metrics: Arc<QueueMetrics>,
) -> watch::Sender<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let backoff = BackoffPolicy::from_millis(
        config.queue.backoff_base_ms,
        config.queue.backoff_cap_ms,
    );

    let sweeper = SweeperWorker::new(
        pool.clone(),
        config.sweep.clone(),
        backoff,
        metrics.clone(),
        shutdown_rx.clone(),
    );
    tokio::spawn(async move {
        sweeper.run().await;
    });

    if config.retention.enabled {
        let retention = RetentionWorker::new(
            pool.clone(),
            config.retention.clone(),
            shutdown_rx.clone(),
        );
        tokio::spawn(async move {
            retention.run().await;
        });
    } else {
        tracing::info!("Retention disabled; terminal messages are kept indefinitely");
    }

    let reporter = MetricsReporter::new(
        pool,
        config.metrics.report_interval_secs,
        metrics,
        shutdown_rx,
    );
    tokio::spawn(async move {
        reporter.run().await;
    });

    shutdown_tx
}
