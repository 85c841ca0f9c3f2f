// src/queue/metrics.rs
// In-process dispatch counters, reported periodically alongside DB stats

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Cumulative counters for broker activity since startup.
#[derive(Default)]
pub struct QueueMetrics {
    enqueued: AtomicU64,
    leased: AtomicU64,
    delivered: AtomicU64,
    acknowledged: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    expired: AtomicU64,
    responses_matched: AtomicU64,
    response_timeouts: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MetricsSnapshot {
    pub enqueued: u64,
    pub leased: u64,
    pub delivered: u64,
    pub acknowledged: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub expired: u64,
    pub responses_matched: u64,
    pub response_timeouts: u64,
}

impl QueueMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_leased(&self, count: usize) {
        self.leased.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_acknowledged(&self) {
        self.acknowledged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_lettered(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expired(&self, count: usize) {
        self.expired.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_response_matched(&self) {
        self.responses_matched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response_timeout(&self) {
        self.response_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            leased: self.leased.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            acknowledged: self.acknowledged.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            responses_matched: self.responses_matched.load(Ordering::Relaxed),
            response_timeouts: self.response_timeouts.load(Ordering::Relaxed),
        }
    }

    /// Log a one-line summary of activity since startup.
    pub fn report(&self) {
        let s = self.snapshot();
        info!(
            enqueued = s.enqueued,
            leased = s.leased,
            delivered = s.delivered,
            acknowledged = s.acknowledged,
            retried = s.retried,
            dead_lettered = s.dead_lettered,
            expired = s.expired,
            responses_matched = s.responses_matched,
            response_timeouts = s.response_timeouts,
            "queue activity"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = QueueMetrics::new();
        metrics.record_enqueued();
        metrics.record_enqueued();
        metrics.record_leased(3);
        metrics.record_dead_lettered();
        metrics.record_expired(5);

        let s = metrics.snapshot();
        assert_eq!(s.enqueued, 2);
        assert_eq!(s.leased, 3);
        assert_eq!(s.dead_lettered, 1);
        assert_eq!(s.expired, 5);
        assert_eq!(s.acknowledged, 0);
    }
}
