// src/error.rs
// Standardized error types for fleetmq

use thiserror::Error;

/// Main error type for the fleetmq library
#[derive(Error, Debug)]
pub enum FleetMqError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("message not found: {0}")]
    MessageNotFound(String),

    #[error("timed out waiting for response to correlation {0}")]
    ResponseTimeout(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("task cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown error: {0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Convenience type alias for Result using FleetMqError
pub type Result<T> = std::result::Result<T, FleetMqError>;

impl From<String> for FleetMqError {
    fn from(s: String) -> Self {
        FleetMqError::Other(s)
    }
}

impl From<tokio::task::JoinError> for FleetMqError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            FleetMqError::Cancelled
        } else {
            FleetMqError::Other(err.to_string())
        }
    }
}

impl From<FleetMqError> for String {
    fn from(err: FleetMqError) -> Self {
        err.to_string()
    }
}
