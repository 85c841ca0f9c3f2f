// src/lib.rs
// fleetmq - durable SQLite-backed message broker for fleet agent communication

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod background;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod queue;

pub use db::pool::DatabasePool;
pub use db::types::{
    AgentRecord, Direction, MessagePriority, MessageStatus, NackOutcome, NewMessage, QueueStats,
    QueuedMessage,
};
pub use error::{FleetMqError, Result};
pub use queue::{BrokerStatus, QueueManager};
