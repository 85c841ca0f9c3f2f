// src/background/retention.rs
// Periodic purge of old terminal messages

use crate::config::RetentionConfig;
use crate::db::pool::DatabasePool;
use crate::db::retention;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub struct RetentionWorker {
    pool: Arc<DatabasePool>,
    config: RetentionConfig,
    shutdown: watch::Receiver<bool>,
}

impl RetentionWorker {
    pub fn new(
        pool: Arc<DatabasePool>,
        config: RetentionConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            pool,
            config,
            shutdown,
        }
    }

    /// Run the retention loop until shutdown.
    pub async fn run(mut self) {
        tracing::info!(
            "Retention started (interval: {}s, keep terminal messages {} days)",
            self.config.interval_secs,
            self.config.days
        );

        loop {
            if *self.shutdown.borrow() {
                tracing::info!("Retention worker shutting down");
                break;
            }

            let days = self.config.days;
            if let Some(deleted) = self
                .pool
                .try_interact("retention purge", move |conn| {
                    retention::purge_terminal_sync(conn, days).map_err(Into::into)
                })
                .await
            {
                if deleted > 0 {
                    tracing::info!("Retention purged {} terminal messages", deleted);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(self.config.interval_secs)) => {}
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        tracing::info!("Retention worker shutting down");
                        break;
                    }
                }
            }
        }
    }
}
