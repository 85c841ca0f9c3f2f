// src/queue/correlation.rs
// In-process registry matching responses to parked request waiters
//
// The durable half of correlation lives in the message_queue table
// (take_response). This registry only short-circuits the happy path: a
// caller awaiting a reply parks a oneshot here and is completed directly
// when the response is submitted, without polling the table.

use crate::db::types::QueuedMessage;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::oneshot;

/// Waiters keyed by correlation id. One waiter per correlation; registering
/// again drops the previous waiter (its receiver resolves to an error).
#[derive(Default)]
pub struct CorrelationRegistry {
    waiters: Mutex<HashMap<String, oneshot::Sender<QueuedMessage>>>,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, oneshot::Sender<QueuedMessage>>> {
        self.waiters.lock().expect("correlation registry mutex poisoned")
    }

    /// Park a waiter for a correlation id.
    pub fn register(&self, correlation_id: &str) -> oneshot::Receiver<QueuedMessage> {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(correlation_id.to_string(), tx);
        rx
    }

    /// Complete a parked waiter. Returns true if a waiter existed and was
    /// still listening.
    pub fn complete(&self, correlation_id: &str, message: QueuedMessage) -> bool {
        match self.lock().remove(correlation_id) {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    /// Drop a waiter without completing it (timeout, caller gone).
    pub fn cancel(&self, correlation_id: &str) {
        self.lock().remove(correlation_id);
    }

    /// Number of parked waiters.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
