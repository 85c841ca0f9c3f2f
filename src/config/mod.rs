// src/config/mod.rs
// Configuration: toml file plus environment overrides

pub mod file;

pub use file::{FleetMqConfig, MetricsConfig, QueueConfig, RetentionConfig, SweepConfig};

use std::path::PathBuf;

/// Resolve the database path: FLEETMQ_DB_PATH wins, then
/// ~/.fleetmq/fleetmq.db.
pub fn default_db_path() -> PathBuf {
    if let Some(path) = read_env("FLEETMQ_DB_PATH") {
        return PathBuf::from(path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".fleetmq")
        .join("fleetmq.db")
}

/// Read an environment variable, filtering empty values
fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
