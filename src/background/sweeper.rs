// src/background/sweeper.rs
// Periodic sweep: message expiration, lease recovery, stale agents
//
// The sweeper is the only place leased messages come back from a crashed
// or partitioned agent, so its interval bounds redelivery latency.

use crate::config::SweepConfig;
use crate::db::pool::DatabasePool;
use crate::db::{agents, queue};
use crate::queue::backoff::BackoffPolicy;
use crate::queue::metrics::QueueMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub struct SweeperWorker {
    pool: Arc<DatabasePool>,
    config: SweepConfig,
    backoff: BackoffPolicy,
    metrics: Arc<QueueMetrics>,
    shutdown: watch::Receiver<bool>,
}

impl SweeperWorker {
    pub fn new(
        pool: Arc<DatabasePool>,
        config: SweepConfig,
        backoff: BackoffPolicy,
        metrics: Arc<QueueMetrics>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            pool,
            config,
            backoff,
            metrics,
            shutdown,
        }
    }

    /// Run the sweeper loop until shutdown.
    pub async fn run(mut self) {
        tracing::info!(
            "Sweeper started (interval: {}s, agent idle window: {}s)",
            self.config.interval_secs,
            self.config.agent_idle_secs
        );

        loop {
            if *self.shutdown.borrow() {
                tracing::info!("Sweeper shutting down");
                break;
            }

            self.sweep_once().await;

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(self.config.interval_secs)) => {}
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        tracing::info!("Sweeper shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One full pass. Each sub-sweep is best-effort; a failure is logged
    /// and the next tick tries again.
    pub async fn sweep_once(&self) {
        if let Some(expired) = self
            .pool
            .try_interact("expiration sweep", |conn| {
                queue::expire_due_sync(conn).map_err(Into::into)
            })
            .await
        {
            if expired > 0 {
                self.metrics.record_expired(expired);
                tracing::info!("Expired {} overdue messages", expired);
            }
        }

        let backoff = self.backoff.clone();
        if let Some((released, dead_lettered)) = self
            .pool
            .try_interact("lease recovery", move |conn| {
                queue::release_expired_leases_sync(conn, &backoff).map_err(Into::into)
            })
            .await
        {
            if released > 0 {
                tracing::info!("Released {} expired leases back to pending", released);
            }
            for _ in 0..dead_lettered {
                self.metrics.record_dead_lettered();
            }
            if dead_lettered > 0 {
                tracing::warn!(
                    "Dead-lettered {} messages whose leases expired with no budget left",
                    dead_lettered
                );
            }
        }

        let idle_secs = self.config.agent_idle_secs;
        if let Some(flipped) = self
            .pool
            .try_interact("stale agent sweep", move |conn| {
                agents::mark_stale_agents_offline_sync(conn, idle_secs).map_err(Into::into)
            })
            .await
        {
            if flipped > 0 {
                tracing::info!("Marked {} silent agents offline", flipped);
            }
        }
    }
}
