// src/main.rs
// fleetmq - durable SQLite-backed message broker for fleet agent communication

use anyhow::Result;
use clap::Parser;
use fleetmq::cli::{self, Cli, Commands};
use fleetmq::config::FleetMqConfig;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env files (global first, then project - project overrides)
    if let Some(home) = dirs::home_dir() {
        let _ = dotenvy::from_path(home.join(".fleetmq/.env"));
    }
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Daemon is verbose; one-shot inspection commands stay quiet
    let log_level = match &cli.command {
        None | Some(Commands::Serve) => Level::INFO,
        Some(_) => Level::WARN,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = FleetMqConfig::load();
    let db_path = cli.db_path();

    match cli.command {
        None | Some(Commands::Serve) => {
            cli::run_serve(db_path, config).await?;
        }
        Some(Commands::Stats { json }) => {
            cli::run_stats(db_path, json).await?;
        }
        Some(Commands::Agents) => {
            cli::run_agents(db_path).await?;
        }
        Some(Commands::Dead { limit }) => {
            cli::run_dead(db_path, limit).await?;
        }
        Some(Commands::Requeue { message_id }) => {
            cli::run_requeue(db_path, message_id).await?;
        }
        Some(Commands::Purge { days, dry_run }) => {
            cli::run_purge(db_path, &config, days, dry_run).await?;
        }
    }

    Ok(())
}
