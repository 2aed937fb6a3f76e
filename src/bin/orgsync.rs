//! orgsync command line
//!
//! # Usage
//!
//! ```bash
//! # Apply the schema
//! orgsync migrate
//!
//! # Reconcile against the upstream feeds
//! orgsync run
//!
//! # Full pass, then roll back
//! orgsync run --dry-run --format json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use orgsync::{
    ConsoleProgress, HttpFeedClient, PostgresStore, ProgressSink, RunMode, SyncConfig, SyncReport,
    SyncRunner, TracingProgress,
};

#[derive(Parser)]
#[command(name = "orgsync")]
#[command(version)]
#[command(about = "Reconcile local organisations and regions with the upstream feeds")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// YAML config file (environment variables are used when omitted)
    #[arg(long, short, global = true, env = "ORGSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Report format
    #[arg(long, short = 'o', global = true, default_value = "text", value_enum)]
    format: OutputFormat,

    /// Only print stage banners and the final report
    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reconciliation pass
    Run {
        /// Roll back instead of committing
        #[arg(long)]
        dry_run: bool,
    },

    /// Apply database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "orgsync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "orgsync failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => SyncConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => SyncConfig::from_env().context("Failed to load config from environment")?,
    };

    let store = PostgresStore::connect(&config.database)
        .await
        .context("Failed to connect to database")?;

    match cli.command {
        Commands::Migrate => {
            store.migrate().await.context("Migration failed")?;
            println!("Migrations applied");
        }
        Commands::Run { dry_run } => {
            let feeds = HttpFeedClient::new(&config.feeds)?;
            let mode = if dry_run {
                RunMode::DryRun
            } else {
                RunMode::Commit
            };

            // JSON goes to stdout, so progress moves to the log
            let progress: Arc<dyn ProgressSink> = match cli.format {
                OutputFormat::Text => Arc::new(ConsoleProgress { quiet: cli.quiet }),
                OutputFormat::Json => Arc::new(TracingProgress),
            };

            let runner = SyncRunner::new(feeds, store.clone()).with_progress(progress);
            let report = runner.run(mode).await?;
            print_report(&report, cli.format)?;
        }
    }

    store.close().await;
    Ok(())
}

fn print_report(report: &SyncReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => println!("{report}"),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
    }
    Ok(())
}
