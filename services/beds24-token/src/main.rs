//! Beds24 token tool
//!
//! Thin driver over `beds24-auth`:
//! 1. Loads configuration (file, env, CLI flags)
//! 2. Opens the record store and the authentication client
//! 3. Runs one command: status, setup, token, validate, or the full `run` sequence
//! 4. Optionally writes a Prometheus snapshot of the credential counters

mod config;
mod driver;
mod metrics;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use beds24_auth::{CredentialManager, FileStore, HttpAuthClient};
use clap::{Parser, Subcommand};
use common::Secret;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "beds24-token", version, about = "Manage Beds24 API v2 credentials")]
struct Cli {
    /// Config file (defaults to CONFIG_PATH, then ./beds24-token.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Write a Prometheus snapshot of the credential counters here on exit
    #[arg(long, global = true)]
    metrics_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show presence and validity of the stored credentials
    Status,
    /// Exchange an invite code for access and refresh tokens
    Setup {
        /// Invite code (defaults to BEDS24_INVITE_CODE, invite_code_file, then the stored invite)
        #[arg(long)]
        code: Option<String>,
        /// Validity window for the new refresh token
        #[arg(long)]
        refresh_validity_days: Option<u32>,
    },
    /// Print a valid access token, refreshing it if needed
    Token,
    /// Check a token against the details endpoint
    Validate {
        /// Token to check (defaults to the current access token)
        #[arg(long)]
        token: Option<String>,
    },
    /// Check status, set up if needed, then obtain and validate a token
    Run,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let (config_path, explicit) = Config::resolve_path(cli.config.as_deref());
    let config = Config::load_or_default(&config_path, explicit)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.remote.base_url,
        storage_dir = %config.storage.dir.display(),
        timeout_secs = config.remote.timeout_secs,
        refresh_validity_days = config.credentials.refresh_validity_days,
        "configuration loaded"
    );

    let metrics_handle = if cli.metrics_file.is_some() {
        Some(metrics::install_recorder()?)
    } else {
        None
    };

    let client = HttpAuthClient::new(config.remote.base_url.clone(), config.timeout())
        .context("failed to build authentication client")?;
    let store = FileStore::new(config.storage.dir.clone());
    let manager = CredentialManager::load(Arc::new(store), Arc::new(client))
        .await
        .with_refresh_validity(config.refresh_validity());

    let outcome = execute(cli.command.unwrap_or(Command::Run), &manager, &config).await;

    if let (Some(handle), Some(path)) = (metrics_handle, cli.metrics_file.as_deref()) {
        if let Err(e) = metrics::write_snapshot(&handle, path) {
            warn!(error = %e, "failed to write metrics snapshot");
        }
    }

    outcome
}

async fn execute(command: Command, manager: &CredentialManager, config: &Config) -> Result<()> {
    match command {
        Command::Status => {
            println!("{}", driver::status(manager).await?);
        }
        Command::Setup {
            code,
            refresh_validity_days,
        } => {
            let validity = match refresh_validity_days {
                Some(0) => bail!("--refresh-validity-days must be greater than 0"),
                Some(days) => chrono::TimeDelta::days(i64::from(days)),
                None => config.refresh_validity(),
            };
            let code = driver::resolve_invite_code(
                code.map(Secret::new),
                config.credentials.invite_code.as_ref(),
                manager,
            )
            .await;
            driver::setup(manager, code, validity).await?;
            println!("setup completed");
        }
        Command::Token => {
            println!("{}", driver::token(manager).await?);
        }
        Command::Validate { token } => {
            if driver::validate(manager, token).await? {
                println!("token is valid");
            } else {
                bail!("token is not valid");
            }
        }
        Command::Run => {
            let line = driver::run(
                manager,
                config.credentials.invite_code.as_ref(),
                config.refresh_validity(),
            )
            .await?;
            println!("{line}");
        }
    }

    Ok(())
}
