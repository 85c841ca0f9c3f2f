// src/db/types.rs
// Shared record types for the broker's database layer

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Message lifecycle status.
///
/// `pending` and `leased` are the only states the dispatcher touches;
/// `acknowledged`, `expired` and `dead` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Leased,
    Delivered,
    Acknowledged,
    Expired,
    Dead,
}

impl MessageStatus {
    /// Terminal states are never dispatched again and are eligible for purging.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MessageStatus::Acknowledged | MessageStatus::Expired | MessageStatus::Dead
        )
    }
}

/// Message direction relative to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Server → agent command
    Outbound,
    /// Agent → server result/report
    Inbound,
}

/// Dispatch priority. Lower value dispatches first; FIFO within a band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    Critical,
    High,
    Normal,
    Low,
}

impl MessagePriority {
    pub fn as_i64(self) -> i64 {
        match self {
            MessagePriority::Critical => 0,
            MessagePriority::High => 1,
            MessagePriority::Normal => 2,
            MessagePriority::Low => 3,
        }
    }

    /// Total mapping: out-of-range values collapse to Normal rather than
    /// failing row parses.
    pub fn from_i64(value: i64) -> Self {
        match value {
            0 => MessagePriority::Critical,
            1 => MessagePriority::High,
            3 => MessagePriority::Low,
            _ => MessagePriority::Normal,
        }
    }
}

impl Default for MessagePriority {
    fn default() -> Self {
        MessagePriority::Normal
    }
}

/// Agent liveness as tracked by heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Online,
    Offline,
}

/// A row from `message_queue`
#[derive(Debug, Clone, Serialize)]
pub struct QueuedMessage {
    pub id: i64,
    pub message_id: String,
    pub correlation_id: Option<String>,
    pub agent_id: String,
    pub direction: Direction,
    pub message_type: String,
    /// JSON body, stored verbatim
    pub payload: String,
    pub status: MessageStatus,
    pub priority: MessagePriority,
    pub attempts: u32,
    pub max_attempts: u32,
    pub next_attempt_at: Option<String>,
    pub lease_expires_at: Option<String>,
    pub expires_at: Option<String>,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub delivered_at: Option<String>,
    pub acknowledged_at: Option<String>,
}

impl QueuedMessage {
    /// Parse the stored payload back into JSON.
    pub fn payload_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.payload)
    }
}

/// Parameters for enqueueing a message.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub agent_id: String,
    pub direction: Direction,
    pub message_type: String,
    pub payload: serde_json::Value,
    pub priority: MessagePriority,
    pub correlation_id: Option<String>,
    /// Absolute TTL; None means the message never expires on its own
    pub ttl_secs: Option<i64>,
    /// Per-message override of the configured attempt budget
    pub max_attempts: Option<u32>,
}

impl NewMessage {
    /// An outbound command addressed to an agent.
    pub fn command(
        agent_id: impl Into<String>,
        message_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            direction: Direction::Outbound,
            message_type: message_type.into(),
            payload,
            priority: MessagePriority::Normal,
            correlation_id: None,
            ttl_secs: None,
            max_attempts: None,
        }
    }

    /// An inbound message from an agent (result, status report).
    pub fn response(
        agent_id: impl Into<String>,
        correlation_id: impl Into<String>,
        message_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            direction: Direction::Inbound,
            message_type: message_type.into(),
            payload,
            priority: MessagePriority::Normal,
            correlation_id: Some(correlation_id.into()),
            ttl_secs: None,
            max_attempts: None,
        }
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_ttl_secs(mut self, secs: i64) -> Self {
        self.ttl_secs = Some(secs);
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }
}

/// Outcome of a failure report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NackOutcome {
    /// Message returned to pending, eligible again at the given time
    Rescheduled { next_attempt_at: String },
    /// Attempt budget exhausted; message moved to the dead letter state
    DeadLettered,
}

/// A row from `agents`
#[derive(Debug, Clone, Serialize)]
pub struct AgentRecord {
    pub id: i64,
    pub agent_id: String,
    pub hostname: Option<String>,
    pub status: AgentStatus,
    pub registered_at: String,
    pub last_seen: String,
}

/// Per-agent outbound backlog.
#[derive(Debug, Clone, Serialize)]
pub struct AgentBacklog {
    pub agent_id: String,
    pub pending: i64,
}

/// Aggregated queue counters, gathered in one pass for reporting.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub pending: i64,
    pub leased: i64,
    pub delivered: i64,
    pub acknowledged: i64,
    pub expired: i64,
    pub dead: i64,
    /// Inbound rows the server has not consumed yet
    pub inbound_pending: i64,
    pub per_agent_backlog: Vec<AgentBacklog>,
    /// Age of the oldest dispatchable outbound message
    pub oldest_pending_secs: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_round_trip() {
        for status in [
            MessageStatus::Pending,
            MessageStatus::Leased,
            MessageStatus::Delivered,
            MessageStatus::Acknowledged,
            MessageStatus::Expired,
            MessageStatus::Dead,
        ] {
            let text = status.to_string();
            assert_eq!(MessageStatus::from_str(&text).unwrap(), status);
        }
    }

    #[test]
    fn test_status_terminal() {
        assert!(!MessageStatus::Pending.is_terminal());
        assert!(!MessageStatus::Leased.is_terminal());
        assert!(!MessageStatus::Delivered.is_terminal());
        assert!(MessageStatus::Acknowledged.is_terminal());
        assert!(MessageStatus::Expired.is_terminal());
        assert!(MessageStatus::Dead.is_terminal());
    }

    #[test]
    fn test_priority_mapping() {
        assert_eq!(MessagePriority::Critical.as_i64(), 0);
        assert_eq!(MessagePriority::from_i64(0), MessagePriority::Critical);
        assert_eq!(MessagePriority::from_i64(3), MessagePriority::Low);
        // Unknown values collapse to Normal
        assert_eq!(MessagePriority::from_i64(99), MessagePriority::Normal);
        assert_eq!(MessagePriority::from_i64(-1), MessagePriority::Normal);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(MessagePriority::Critical < MessagePriority::High);
        assert!(MessagePriority::High < MessagePriority::Normal);
        assert!(MessagePriority::Normal < MessagePriority::Low);
    }

    #[test]
    fn test_new_message_builders() {
        let cmd = NewMessage::command("agent-1", "run_script", serde_json::json!({"path": "/x"}))
            .with_priority(MessagePriority::High)
            .with_ttl_secs(300)
            .with_max_attempts(2);
        assert_eq!(cmd.direction, Direction::Outbound);
        assert_eq!(cmd.priority, MessagePriority::High);
        assert_eq!(cmd.ttl_secs, Some(300));
        assert_eq!(cmd.max_attempts, Some(2));
        assert!(cmd.correlation_id.is_none());

        let resp =
            NewMessage::response("agent-1", "corr-1", "command_result", serde_json::json!({}));
        assert_eq!(resp.direction, Direction::Inbound);
        assert_eq!(resp.correlation_id.as_deref(), Some("corr-1"));
    }
}
