//! Operator entry point for the outbox queue.
//!
//! Intended to be driven by cron or a scheduler:
//! - `outbox send`: run one processing cycle
//! - `outbox resend [id]`: re-queue failed records as fresh copies
//! - `outbox prune`: remove terminal records past the retention window
//! - `outbox unlock`: release records stuck mid-send after a crash

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use outbox::{EmailId, OutboxConfig};

/// Manage the outbox e-mail queue
#[derive(Parser, Debug)]
#[command(name = "outbox")]
#[command(about = "Manage the outbox e-mail queue", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send all eligible queued e-mails (one cycle)
    Send,
    /// Re-queue failed e-mails, optionally a single one by id
    Resend {
        /// Record id to resend
        id: Option<String>,
    },
    /// Remove terminal records past the retention window
    Prune,
    /// Unlock records stuck in the sending state
    Unlock {
        /// How long a record must have been stuck, in minutes
        #[arg(long, default_value_t = 30)]
        minutes: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    outbox::logging::init();

    let cli = Cli::parse();

    let config_path = cli.config.map_or_else(find_config_file, Ok)?;
    let raw = std::fs::read_to_string(&config_path)
        .with_context(|| format!("failed to read config from {}", config_path.display()))?;
    let config: OutboxConfig = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config {}", config_path.display()))?;

    let outbox = config.build()?;

    match cli.command {
        Commands::Send => {
            let summary = outbox.runner().run_cycle().await?;
            println!("{summary}");
        }
        Commands::Resend { id } => {
            let id = id
                .map(|id| id.parse::<EmailId>())
                .transpose()
                .context("invalid record id")?;

            let retried = outbox.runner().retry_failed(id).await?;
            if retried.is_empty() {
                println!("There is nothing to resend.");
            } else {
                println!("Queued {} e-mail(s) for resending.", retried.len());
            }
        }
        Commands::Prune => {
            let pruned = outbox.runner().prune().await?;
            println!("Pruned {pruned} record(s).");
        }
        Commands::Unlock { minutes } => {
            let released = outbox
                .runner()
                .release_stale(chrono::Duration::minutes(minutes))
                .await?;
            println!("Unlocked {released} record(s).");
        }
    }

    Ok(())
}

/// Find the configuration file using the following precedence:
/// 1. `OUTBOX_CONFIG` environment variable
/// 2. `./outbox.toml` (current working directory)
/// 3. `/etc/outbox/outbox.toml` (system-wide config)
fn find_config_file() -> anyhow::Result<PathBuf> {
    if let Ok(env_path) = std::env::var("OUTBOX_CONFIG") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!("OUTBOX_CONFIG points to non-existent file: {}", path.display());
    }

    let default_paths = [
        PathBuf::from("./outbox.toml"),
        PathBuf::from("/etc/outbox/outbox.toml"),
    ];

    for path in &default_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - OUTBOX_CONFIG environment variable\n{paths_tried}"
    )
}
