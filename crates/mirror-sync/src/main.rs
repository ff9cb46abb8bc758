//! Manifest Mirror - sync service entry point

use anyhow::{Context, Result};
use clap::Parser;
use mirror_common::logging::{init_logging, LogConfig, LogLevel};
use mirror_sync::config::SyncConfig;
use mirror_sync::orchestrator::Orchestrator;
use mirror_sync::store::PgStoreProvider;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "mirror-sync")]
#[command(author, version, about = "Manifest synchronization service")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Run one sync cycle across all configured languages
    Run {
        /// Limit the run to a single language
        #[arg(short, long)]
        language: Option<String>,
    },

    /// Print the effective configuration and exit
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("mirror-sync".to_string())
        .build();

    // Environment variables take precedence over CLI defaults
    let log_config = log_config.merged_with_env()?;

    init_logging(&log_config)?;

    let config = SyncConfig::from_env()?;

    match cli.command {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            return Ok(());
        },
        Command::Run { language } => {
            let database_url =
                std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(&database_url)
                .await
                .context("Failed to connect to the destination database")?;

            let prefix = config.namespace_prefix.clone();
            let provider = Arc::new(PgStoreProvider::new(pool, prefix));
            let orchestrator = Orchestrator::new(config, provider)?;

            match language {
                Some(language) => {
                    info!(language = %language, "Syncing single language");
                    let outcome = orchestrator.run_language(&language).await;
                    info!(status = ?outcome.status, "Sync finished");
                    if !matches!(
                        outcome.status,
                        mirror_sync::CycleStatus::Versioned { .. }
                            | mirror_sync::CycleStatus::UpToDate
                            | mirror_sync::CycleStatus::NoUpdate
                    ) {
                        anyhow::bail!("Sync failed for language {}", language);
                    }
                },
                None => {
                    let report = orchestrator.run_all().await;
                    if !report.is_clean() {
                        anyhow::bail!(
                            "{} of {} languages failed to sync",
                            report.failed_count(),
                            report.outcomes.len()
                        );
                    }
                },
            }
        },
    }

    Ok(())
}
