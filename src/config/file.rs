// src/config/file.rs
// File-based configuration from ~/.fleetmq/config.toml

use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Top-level config structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct FleetMqConfig {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Dispatch and retry tuning
#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    /// Attempt budget for messages that don't override it
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: u32,
    /// How long a leased message stays invisible to other pollers
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,
    /// Messages handed out per poll unless the caller asks for fewer
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
    /// First retry delay
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Retry delay ceiling
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
}

/// Sweeper cadence and agent liveness window
#[derive(Debug, Deserialize, Clone)]
pub struct SweepConfig {
    #[serde(default = "default_sweep_interval_secs")]
    pub interval_secs: u64,
    /// Agents silent this long are flipped offline
    #[serde(default = "default_agent_idle_secs")]
    pub agent_idle_secs: u64,
}

/// Terminal-message purging
#[derive(Debug, Deserialize, Clone)]
pub struct RetentionConfig {
    #[serde(default = "default_retention_enabled")]
    pub enabled: bool,
    #[serde(default = "default_retention_days")]
    pub days: u32,
    #[serde(default = "default_retention_interval_secs")]
    pub interval_secs: u64,
}

/// Periodic activity reporting
#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_lease_secs() -> u64 {
    60
}
fn default_batch_limit() -> usize {
    10
}
fn default_backoff_base_ms() -> u64 {
    2_000
}
fn default_backoff_cap_ms() -> u64 {
    900_000
}
fn default_sweep_interval_secs() -> u64 {
    30
}
fn default_agent_idle_secs() -> u64 {
    300
}
fn default_retention_enabled() -> bool {
    true
}
fn default_retention_days() -> u32 {
    30
}
fn default_retention_interval_secs() -> u64 {
    3_600
}
fn default_report_interval_secs() -> u64 {
    300
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_max_attempts: default_max_attempts(),
            lease_secs: default_lease_secs(),
            batch_limit: default_batch_limit(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval_secs(),
            agent_idle_secs: default_agent_idle_secs(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: default_retention_enabled(),
            days: default_retention_days(),
            interval_secs: default_retention_interval_secs(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: default_report_interval_secs(),
        }
    }
}

impl FleetMqConfig {
    /// Load config from ~/.fleetmq/config.toml
    pub fn load() -> Self {
        let path = Self::config_path();

        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    debug!(path = %path.display(), "Loaded config from file");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config file");
                    Self::default()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
        }
    }

    /// Get the config file path
    fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".fleetmq")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
[queue]
default_max_attempts = 3
lease_secs = 120

[retention]
enabled = false
"#;
        let config: FleetMqConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.queue.default_max_attempts, 3);
        assert_eq!(config.queue.lease_secs, 120);
        // Unspecified fields fall back to defaults
        assert_eq!(config.queue.batch_limit, 10);
        assert!(!config.retention.enabled);
        assert_eq!(config.retention.days, 30);
    }

    #[test]
    fn test_parse_empty_config() {
        let config: FleetMqConfig = toml::from_str("").unwrap();
        assert_eq!(config.queue.default_max_attempts, 5);
        assert_eq!(config.sweep.interval_secs, 30);
        assert!(config.retention.enabled);
        assert_eq!(config.metrics.report_interval_secs, 300);
    }

    #[test]
    fn test_default_config() {
        let config = FleetMqConfig::default();
        assert_eq!(config.queue.lease_secs, 60);
        assert_eq!(config.queue.backoff_base_ms, 2_000);
        assert_eq!(config.queue.backoff_cap_ms, 900_000);
    }
}
