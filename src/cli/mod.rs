// src/cli/mod.rs
// CLI commands for the broker binary

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{self, FleetMqConfig};
use crate::db::pool::DatabasePool;
use crate::db::{agents, queue, retention};
use crate::queue::metrics::QueueMetrics;

#[derive(Parser)]
#[command(name = "fleetmq")]
#[command(about = "Durable SQLite-backed message broker for fleet agents")]
#[command(version)]
pub struct Cli {
    /// Database path (default: ~/.fleetmq/fleetmq.db, or FLEETMQ_DB_PATH)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the broker housekeeping daemon (default)
    Serve,

    /// Show queue counters and per-agent backlog
    Stats {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List registered agents
    Agents,

    /// List dead-lettered messages
    Dead {
        /// How many to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Requeue a dead-lettered message by its message id
    Requeue {
        message_id: String,
    },

    /// Purge old terminal messages
    Purge {
        /// Age cutoff in days (default: retention.days from config)
        #[arg(long)]
        days: Option<u32>,

        /// Count candidates without deleting
        #[arg(long)]
        dry_run: bool,
    },
}

impl Cli {
    pub fn db_path(&self) -> PathBuf {
        self.db.clone().unwrap_or_else(config::default_db_path)
    }
}

async fn open_pool(path: &PathBuf) -> Result<Arc<DatabasePool>> {
    let pool = DatabasePool::open(path)
        .await
        .with_context(|| format!("Failed to open broker database at {}", path.display()))?;
    Ok(Arc::new(pool))
}

/// Run the housekeeping daemon until Ctrl-C.
pub async fn run_serve(db_path: PathBuf, config: FleetMqConfig) -> Result<()> {
    let pool = open_pool(&db_path).await?;
    let metrics = Arc::new(QueueMetrics::new());

    tracing::info!("Broker database: {}", db_path.display());
    let shutdown_tx = crate::background::spawn(pool, &config, metrics);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    // Give workers a moment to log their exit
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    Ok(())
}

/// Print queue counters.
pub async fn run_stats(db_path: PathBuf, json: bool) -> Result<()> {
    let pool = open_pool(&db_path).await?;
    let stats = pool.interact_raw(queue::queue_stats_sync).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("pending:       {}", stats.pending);
    println!("leased:        {}", stats.leased);
    println!("delivered:     {}", stats.delivered);
    println!("acknowledged:  {}", stats.acknowledged);
    println!("expired:       {}", stats.expired);
    println!("dead:          {}", stats.dead);
    println!("inbound queue: {}", stats.inbound_pending);
    if let Some(age) = stats.oldest_pending_secs {
        println!("oldest pending: {}s", age);
    }
    if !stats.per_agent_backlog.is_empty() {
        println!("backlog by agent:");
        for entry in &stats.per_agent_backlog {
            println!("  {:<24} {}", entry.agent_id, entry.pending);
        }
    }
    Ok(())
}

/// List registered agents.
pub async fn run_agents(db_path: PathBuf) -> Result<()> {
    let pool = open_pool(&db_path).await?;
    let list = pool.interact_raw(agents::list_agents_sync).await?;

    if list.is_empty() {
        println!("No agents registered");
        return Ok(());
    }
    for agent in list {
        println!(
            "{:<24} {:<8} last seen {}  ({})",
            agent.agent_id,
            agent.status,
            agent.last_seen,
            agent.hostname.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

/// List dead-lettered messages.
pub async fn run_dead(db_path: PathBuf, limit: usize) -> Result<()> {
    let pool = open_pool(&db_path).await?;
    let dead = pool
        .interact_raw(move |conn| queue::list_dead_sync(conn, limit))
        .await?;

    if dead.is_empty() {
        println!("Dead letter queue is empty");
        return Ok(());
    }
    for msg in dead {
        println!(
            "{}  {:<16} agent={} attempts={}/{} error={}",
            msg.message_id,
            msg.message_type,
            msg.agent_id,
            msg.attempts,
            msg.max_attempts,
            msg.last_error.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

/// Requeue a dead-lettered message.
pub async fn run_requeue(db_path: PathBuf, message_id: String) -> Result<()> {
    let pool = open_pool(&db_path).await?;
    let id = message_id.clone();
    let requeued = pool
        .interact_raw(move |conn| queue::requeue_dead_sync(conn, &id))
        .await?;

    if !requeued {
        bail!("No dead-lettered message with id {}", message_id);
    }
    println!("Requeued {}", message_id);
    Ok(())
}

/// Purge old terminal messages (or count them with --dry-run).
pub async fn run_purge(
    db_path: PathBuf,
    config: &FleetMqConfig,
    days: Option<u32>,
    dry_run: bool,
) -> Result<()> {
    let pool = open_pool(&db_path).await?;
    let days = days.unwrap_or(config.retention.days);

    if dry_run {
        let candidates = pool
            .interact_raw(move |conn| retention::count_purge_candidates(conn, days))
            .await?;
        println!("{} terminal messages older than {} days", candidates, days);
        return Ok(());
    }

    let deleted = pool
        .interact_raw(move |conn| retention::purge_terminal_sync(conn, days))
        .await?;
    println!("Purged {} terminal messages older than {} days", deleted, days);
    Ok(())
}
