//! crmsync CLI
//!
//! Replicates remote CRM entities into one SQLite store per tenant.
//!
//! # Commands
//!
//! - `run` - Synchronize data (auto, full or incremental)
//! - `catalog` - Refresh field catalogs and physical schemas only
//! - `inspect` - Display local catalogs and row counts
//! - `version` - Show version information

mod commands;
mod config;
mod curl;
mod error;

use clap::{Parser, Subcommand, ValueEnum};
use commands::WebhookConnector;
use config::Config;
use crmsync_engine::{FileRunLog, SyncMode};
use crmsync_remote::HttpClient;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Field-evolving CRM replicator.
#[derive(Parser)]
#[command(name = "crmsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the tenant configuration file
    #[arg(global = true, short, long, default_value = "crmsync.json")]
    config: PathBuf,

    /// Path to the run log
    #[arg(global = true, long, default_value = "sync.log")]
    run_log: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize tenant data
    Run {
        /// Only this tenant
        #[arg(short, long)]
        tenant: Option<String>,

        /// Only this entity
        #[arg(short, long)]
        entity: Option<String>,

        /// Run mode
        #[arg(short, long, value_enum, default_value = "auto")]
        mode: Mode,

        /// Incremental window in hours (defaults to the configured window)
        #[arg(long)]
        hours: Option<u32>,

        /// Process tenants in parallel
        #[arg(short, long)]
        parallel: bool,
    },

    /// Refresh field catalogs and physical schemas without moving data
    Catalog {
        /// Only this tenant
        #[arg(short, long)]
        tenant: Option<String>,

        /// Only this entity
        #[arg(short, long)]
        entity: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Display local catalogs and row counts
    Inspect {
        /// Only this tenant
        #[arg(short, long)]
        tenant: Option<String>,

        /// Only this entity
        #[arg(short, long)]
        entity: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Full pass for new entities, incremental otherwise
    Auto,
    /// Full pass with divergence checks
    Full,
    /// Deletion sweep plus recent changes
    Incremental,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over the default level.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run {
            tenant,
            entity,
            mode,
            hours,
            parallel,
        } => {
            let config = Config::load(&cli.config)?;
            let mode = match mode {
                Mode::Auto => SyncMode::Auto,
                Mode::Full => SyncMode::Full,
                Mode::Incremental => SyncMode::Incremental {
                    hours: hours.unwrap_or(config.sync_config().incremental_window_hours),
                },
            };
            let connector = connector(&config);
            commands::run::run(
                &config,
                tenant.as_deref(),
                entity.as_deref(),
                mode,
                parallel,
                &connector,
                Arc::new(FileRunLog::new(&cli.run_log)),
            )?;
        }
        Commands::Catalog {
            tenant,
            entity,
            format,
        } => {
            let config = Config::load(&cli.config)?;
            commands::catalog::run(
                &config,
                tenant.as_deref(),
                entity.as_deref(),
                &connector(&config),
                &format,
            )?;
        }
        Commands::Inspect {
            tenant,
            entity,
            format,
        } => {
            let config = Config::load(&cli.config)?;
            commands::inspect::run(&config, tenant.as_deref(), entity.as_deref(), &format)?;
        }
        Commands::Version => {
            println!("crmsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn connector(config: &Config) -> WebhookConnector {
    let client = config.curl_client();
    if !client.is_healthy() {
        warn!("curl is not available; every remote call will fail");
    }
    WebhookConnector::new(client)
}
