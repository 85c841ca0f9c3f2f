// src/queue/mod.rs
// QueueManager: the async facade the fleet server talks to
//
// Delegates storage to the db::queue operation functions and layers the
// in-process pieces on top: correlation waiters, dispatch metrics, and the
// retry/backoff policy.

pub mod backoff;
pub mod correlation;
pub mod metrics;

use std::sync::Arc;
use std::time::Duration;

use crate::config::QueueConfig;
use crate::db::pool::DatabasePool;
use crate::db::types::{Direction, NackOutcome, NewMessage, QueueStats, QueuedMessage};
use crate::db::{agents, queue as queue_ops};
use crate::error::{FleetMqError, Result};

use backoff::BackoffPolicy;
use correlation::CorrelationRegistry;
use metrics::QueueMetrics;

/// Server-side manager for the durable message queue.
///
/// One instance per database; cheap to share behind an Arc.
pub struct QueueManager {
    pool: Arc<DatabasePool>,
    config: QueueConfig,
    backoff: BackoffPolicy,
    correlations: CorrelationRegistry,
    metrics: Arc<QueueMetrics>,
}

impl QueueManager {
    pub fn new(pool: Arc<DatabasePool>, config: QueueConfig) -> Self {
        let backoff = BackoffPolicy::from_millis(config.backoff_base_ms, config.backoff_cap_ms);
        Self {
            pool,
            config,
            backoff,
            correlations: CorrelationRegistry::new(),
            metrics: Arc::new(QueueMetrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<QueueMetrics> {
        self.metrics.clone()
    }

    pub fn pool(&self) -> Arc<DatabasePool> {
        self.pool.clone()
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    /// Enqueue a message. The write is retried on SQLite contention — losing
    /// an enqueue loses a command.
    pub async fn enqueue(&self, message: NewMessage) -> Result<QueuedMessage> {
        let default_max_attempts = self.config.default_max_attempts;
        let stored = self
            .pool
            .run_with_retry(move |conn| {
                queue_ops::enqueue_sync(conn, &message, default_max_attempts)
            })
            .await?;
        self.metrics.record_enqueued();
        Ok(stored)
    }

    /// Lease a batch of dispatchable messages for an agent.
    ///
    /// Polling doubles as liveness: the agent is registered on first contact
    /// and its heartbeat bumped on every call.
    pub async fn poll(&self, agent_id: &str, limit: Option<usize>) -> Result<Vec<QueuedMessage>> {
        let agent = agent_id.to_string();
        let limit = limit.unwrap_or(self.config.batch_limit);
        let lease_secs = self.config.lease_secs;

        let batch = self
            .pool
            .run_with_retry(move |conn| {
                if !agents::heartbeat_sync(conn, &agent)? {
                    agents::register_agent_sync(conn, &agent, None)?;
                }
                queue_ops::lease_batch_sync(conn, &agent, limit, lease_secs)
            })
            .await?;

        if !batch.is_empty() {
            self.metrics.record_leased(batch.len());
            tracing::debug!(
                "Leased {} messages for agent {} (lease {}s)",
                batch.len(),
                agent_id,
                lease_secs
            );
        }
        Ok(batch)
    }

    /// The agent confirmed receipt of a leased message.
    pub async fn confirm_delivery(&self, message_id: &str) -> Result<()> {
        let id = message_id.to_string();
        let updated = self
            .pool
            .run(move |conn| queue_ops::mark_delivered_sync(conn, &id))
            .await?;
        if !updated {
            return Err(FleetMqError::MessageNotFound(message_id.to_string()));
        }
        self.metrics.record_delivered();
        Ok(())
    }

    /// Terminal success for a message.
    pub async fn acknowledge(&self, message_id: &str) -> Result<()> {
        let id = message_id.to_string();
        let updated = self
            .pool
            .run_with_retry(move |conn| queue_ops::ack_sync(conn, &id))
            .await?;
        if !updated {
            return Err(FleetMqError::MessageNotFound(message_id.to_string()));
        }
        self.metrics.record_acknowledged();
        Ok(())
    }

    /// The agent reported a failure. Reschedules with backoff or
    /// dead-letters when the attempt budget is spent.
    pub async fn report_failure(&self, message_id: &str, error: &str) -> Result<NackOutcome> {
        let id = message_id.to_string();
        let error = error.to_string();
        let policy = self.backoff.clone();
        let outcome = self
            .pool
            .run_with_retry(move |conn| queue_ops::nack_sync(conn, &id, &error, &policy))
            .await?
            .ok_or_else(|| FleetMqError::MessageNotFound(message_id.to_string()))?;

        match &outcome {
            NackOutcome::Rescheduled { next_attempt_at } => {
                self.metrics.record_retried();
                tracing::debug!("Message {} rescheduled for {}", message_id, next_attempt_at);
            }
            NackOutcome::DeadLettered => {
                self.metrics.record_dead_lettered();
                tracing::warn!("Message {} dead-lettered after exhausting retries", message_id);
            }
        }
        Ok(outcome)
    }

    /// Store an inbound message from an agent.
    ///
    /// A correlated response also settles its originating outbound request
    /// and completes any in-process waiter; in that case the response itself
    /// is consumed (acknowledged) on the spot.
    pub async fn submit_response(&self, response: NewMessage) -> Result<QueuedMessage> {
        if response.direction != Direction::Inbound {
            return Err(FleetMqError::InvalidInput(
                "submit_response requires an inbound message".to_string(),
            ));
        }

        let default_max_attempts = self.config.default_max_attempts;
        let to_store = response.clone();
        let stored = self
            .pool
            .run_with_retry(move |conn| {
                agents::heartbeat_sync(conn, &to_store.agent_id)?;
                let stored = queue_ops::enqueue_sync(conn, &to_store, default_max_attempts)?;
                if let Some(correlation_id) = &to_store.correlation_id {
                    queue_ops::ack_request_by_correlation_sync(conn, correlation_id)?;
                }
                Ok::<_, rusqlite::Error>(stored)
            })
            .await?;

        if let Some(correlation_id) = &stored.correlation_id {
            if self.correlations.complete(correlation_id, stored.clone()) {
                // Waiter took it; consume the stored row so take_response
                // doesn't hand it out again.
                let id = stored.message_id.clone();
                self.pool
                    .try_interact("ack consumed response", move |conn| {
                        queue_ops::ack_sync(conn, &id).map_err(Into::into)
                    })
                    .await;
                self.metrics.record_response_matched();
            }
        }
        Ok(stored)
    }

    /// Enqueue a command and wait for its correlated response.
    ///
    /// Mints a correlation id unless the command carries one already.
    pub async fn request(&self, mut command: NewMessage, timeout: Duration) -> Result<QueuedMessage> {
        if command.direction != Direction::Outbound {
            return Err(FleetMqError::InvalidInput(
                "request requires an outbound command".to_string(),
            ));
        }
        let correlation_id = command
            .correlation_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        command.correlation_id = Some(correlation_id.clone());

        self.enqueue(command).await?;
        self.wait_for_response(&correlation_id, timeout).await
    }

    /// Wait for the response to a correlation id.
    ///
    /// Registers an in-process waiter first, then checks the table — a
    /// response that arrived before this call is returned immediately, and
    /// one that lands in between completes the waiter. Times out with
    /// `ResponseTimeout`.
    pub async fn wait_for_response(
        &self,
        correlation_id: &str,
        timeout: Duration,
    ) -> Result<QueuedMessage> {
        let rx = self.correlations.register(correlation_id);

        let corr = correlation_id.to_string();
        if let Some(message) = self
            .pool
            .run(move |conn| queue_ops::take_response_sync(conn, &corr))
            .await?
        {
            self.correlations.cancel(correlation_id);
            self.metrics.record_response_matched();
            return Ok(message);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(_)) => Err(FleetMqError::Cancelled),
            Err(_) => {
                self.correlations.cancel(correlation_id);
                self.metrics.record_response_timeout();
                Err(FleetMqError::ResponseTimeout(correlation_id.to_string()))
            }
        }
    }

    /// Consume a response without waiting (None if it hasn't arrived).
    pub async fn take_response(&self, correlation_id: &str) -> Result<Option<QueuedMessage>> {
        let corr = correlation_id.to_string();
        let taken = self
            .pool
            .run(move |conn| queue_ops::take_response_sync(conn, &corr))
            .await?;
        if taken.is_some() {
            self.metrics.record_response_matched();
        }
        Ok(taken)
    }

    /// Uncorrelated inbound messages awaiting server-side consumption.
    pub async fn pending_inbound(&self, limit: usize) -> Result<Vec<QueuedMessage>> {
        self.pool
            .run(move |conn| queue_ops::pending_inbound_sync(conn, limit))
            .await
            .map_err(Into::into)
    }

    /// Replay a dead-lettered message.
    pub async fn requeue_dead(&self, message_id: &str) -> Result<()> {
        let id = message_id.to_string();
        let updated = self
            .pool
            .run(move |conn| queue_ops::requeue_dead_sync(conn, &id))
            .await?;
        if !updated {
            return Err(FleetMqError::MessageNotFound(message_id.to_string()));
        }
        Ok(())
    }

    /// Aggregate queue counters from the table.
    pub async fn stats(&self) -> Result<QueueStats> {
        self.pool
            .run(queue_ops::queue_stats_sync)
            .await
            .map_err(Into::into)
    }

    /// Combined view: table aggregates plus in-process activity counters.
    pub async fn status(&self) -> Result<BrokerStatus> {
        Ok(BrokerStatus {
            queue: self.stats().await?,
            activity: self.metrics.snapshot(),
        })
    }
}

/// Snapshot of queue depth and broker activity for monitoring.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BrokerStatus {
    pub queue: QueueStats,
    pub activity: metrics::MetricsSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{setup_test_pool, setup_test_pool_with_agent};
    use crate::db::types::MessagePriority;
    use serde_json::json;

    fn manager(pool: Arc<DatabasePool>) -> QueueManager {
        QueueManager::new(pool, QueueConfig::default())
    }

    #[tokio::test]
    async fn test_enqueue_and_poll_priority_order() {
        let (pool, agent_id) = setup_test_pool_with_agent().await;
        let mgr = manager(pool);

        mgr.enqueue(
            NewMessage::command(&agent_id, "low_task", json!({}))
                .with_priority(MessagePriority::Low),
        )
        .await
        .unwrap();
        mgr.enqueue(NewMessage::command(&agent_id, "normal_task", json!({})))
            .await
            .unwrap();
        mgr.enqueue(
            NewMessage::command(&agent_id, "critical_task", json!({}))
                .with_priority(MessagePriority::Critical),
        )
        .await
        .unwrap();

        let batch = mgr.poll(&agent_id, None).await.unwrap();
        let types: Vec<&str> = batch.iter().map(|m| m.message_type.as_str()).collect();
        assert_eq!(types, vec!["critical_task", "normal_task", "low_task"]);
    }

    #[tokio::test]
    async fn test_poll_registers_unknown_agent() {
        let pool = setup_test_pool().await;
        let mgr = manager(pool.clone());

        let batch = mgr.poll("brand-new-agent", None).await.unwrap();
        assert!(batch.is_empty());

        let agent = pool
            .interact_raw(|conn| crate::db::agents::get_agent_sync(conn, "brand-new-agent"))
            .await
            .unwrap();
        assert!(agent.is_some(), "polling must register the agent");
    }

    #[tokio::test]
    async fn test_request_response_round_trip() {
        let (pool, agent_id) = setup_test_pool_with_agent().await;
        let mgr = Arc::new(manager(pool));

        // Agent side: poll until the command shows up, then answer it.
        let agent_mgr = mgr.clone();
        let agent = agent_id.clone();
        let agent_task = tokio::spawn(async move {
            loop {
                let batch = agent_mgr.poll(&agent, None).await.unwrap();
                if let Some(command) = batch.into_iter().next() {
                    let correlation_id = command.correlation_id.clone().unwrap();
                    agent_mgr
                        .submit_response(NewMessage::response(
                            &agent,
                            correlation_id,
                            "command_result",
                            json!({"exit_code": 0}),
                        ))
                        .await
                        .unwrap();
                    return command.message_id;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        });

        let response = mgr
            .request(
                NewMessage::command(&agent_id, "run_script", json!({"path": "/tmp/x.sh"})),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert_eq!(response.message_type, "command_result");
        assert_eq!(response.direction, Direction::Inbound);

        // The originating command is settled by the response.
        let command_id = agent_task.await.unwrap();
        let command = mgr
            .pool()
            .interact_raw(move |conn| queue_ops::get_by_message_id_sync(conn, &command_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(command.status, crate::db::types::MessageStatus::Acknowledged);
    }

    #[tokio::test]
    async fn test_response_arriving_before_wait() {
        let (pool, agent_id) = setup_test_pool_with_agent().await;
        let mgr = manager(pool);

        mgr.enqueue(
            NewMessage::command(&agent_id, "collect_inventory", json!({}))
                .with_correlation("corr-early"),
        )
        .await
        .unwrap();

        // Response lands while nobody is waiting — it stays pending in the table.
        mgr.submit_response(NewMessage::response(
            &agent_id,
            "corr-early",
            "inventory_report",
            json!({"disks": 2}),
        ))
        .await
        .unwrap();

        let response = mgr
            .wait_for_response("corr-early", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(response.message_type, "inventory_report");

        // Consumed: a second wait times out.
        let again = mgr
            .wait_for_response("corr-early", Duration::from_millis(50))
            .await;
        assert!(matches!(again, Err(FleetMqError::ResponseTimeout(_))));
    }

    #[tokio::test]
    async fn test_wait_for_response_timeout() {
        let (pool, _agent_id) = setup_test_pool_with_agent().await;
        let mgr = manager(pool);

        let result = mgr
            .wait_for_response("never-answered", Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(FleetMqError::ResponseTimeout(_))));
        assert_eq!(mgr.metrics().snapshot().response_timeouts, 1);
    }

    #[tokio::test]
    async fn test_failure_reschedules_then_dead_letters() {
        let (pool, agent_id) = setup_test_pool_with_agent().await;
        let mgr = manager(pool);

        let message = mgr
            .enqueue(
                NewMessage::command(&agent_id, "push_config", json!({}))
                    .with_max_attempts(2),
            )
            .await
            .unwrap();

        // First attempt: lease, fail → rescheduled
        let batch = mgr.poll(&agent_id, None).await.unwrap();
        assert_eq!(batch.len(), 1);
        let outcome = mgr
            .report_failure(&message.message_id, "agent offline")
            .await
            .unwrap();
        assert!(matches!(outcome, NackOutcome::Rescheduled { .. }));

        // Backoff gate keeps it out of the next poll
        let batch = mgr.poll(&agent_id, None).await.unwrap();
        assert!(batch.is_empty(), "rescheduled message must respect backoff");

        // Force eligibility, lease the second attempt, fail again → dead
        let id = message.message_id.clone();
        mgr.pool()
            .interact_raw(move |conn| {
                conn.execute(
                    "UPDATE message_queue SET next_attempt_at = NULL WHERE message_id = ?",
                    [&id],
                )
            })
            .await
            .unwrap();
        let batch = mgr.poll(&agent_id, None).await.unwrap();
        assert_eq!(batch.len(), 1);
        let outcome = mgr
            .report_failure(&message.message_id, "agent offline")
            .await
            .unwrap();
        assert_eq!(outcome, NackOutcome::DeadLettered);

        // Dead messages can be replayed
        mgr.requeue_dead(&message.message_id).await.unwrap();
        let batch = mgr.poll(&agent_id, None).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].attempts, 1, "requeue resets the attempt budget");
    }

    #[tokio::test]
    async fn test_stats_reflect_activity() {
        let (pool, agent_id) = setup_test_pool_with_agent().await;
        let mgr = manager(pool);

        mgr.enqueue(NewMessage::command(&agent_id, "a", json!({})))
            .await
            .unwrap();
        mgr.enqueue(NewMessage::command(&agent_id, "b", json!({})))
            .await
            .unwrap();
        let leased = mgr.poll(&agent_id, Some(1)).await.unwrap();
        mgr.acknowledge(&leased[0].message_id).await.unwrap();

        let stats = mgr.stats().await.unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.acknowledged, 1);
        assert_eq!(stats.per_agent_backlog.len(), 1);
        assert_eq!(stats.per_agent_backlog[0].pending, 1);

        let status = mgr.status().await.unwrap();
        assert_eq!(status.queue.pending, 1);
        assert_eq!(status.activity.enqueued, 2);
        assert_eq!(status.activity.leased, 1);
        assert_eq!(status.activity.acknowledged, 1);
    }
}
