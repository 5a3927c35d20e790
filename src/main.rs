//! Main entry point for the catalog-export CLI

use anyhow::Context;
use catalog_export::cli::{Cli, Commands};
use catalog_export::config::{ExportConfig, LogConfig};
use catalog_export::metrics::init_metrics;
use catalog_export::output::OutputPathBuilder;
use chrono::{DateTime, Utc};
use clap::Parser;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Initialize tracing: console output (JSON when `LOG_FORMAT=json`) plus an
/// optional plain-text log file.
fn init_tracing(log: &LogConfig, log_file: Option<&Path>) -> anyhow::Result<()> {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("catalog_export={}", log.level)));

    let console = if json_format {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_writer(std::io::stderr).boxed()
    };

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating log directory {}", parent.display()))?;
            }
            let file = File::create(path)
                .with_context(|| format!("creating log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Arc::new(file)).boxed())
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .context("installing tracing subscriber")?;
    Ok(())
}

async fn run(cli: Cli, config: ExportConfig, start_time: DateTime<Utc>) -> anyhow::Result<i32> {
    if let Some(addr) = cli.metrics_addr {
        if let Err(e) = init_metrics(addr).await {
            warn!("Metrics disabled: {}", e);
        }
    }

    match cli.command {
        Commands::Export(cmd) => {
            let status = cmd
                .execute(config, start_time, cli.output_format)
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            Ok(status.exit_code())
        }
        Commands::Validate(cmd) => {
            cmd.execute(&config).map_err(|e| anyhow::anyhow!(e))?;
            Ok(0)
        }
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let start_time = Utc::now();

    let args = match &cli.command {
        Commands::Export(cmd) => &cmd.config,
        Commands::Validate(cmd) => &cmd.config,
    };
    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let log_file = config
        .log
        .dir
        .as_ref()
        .map(|dir| OutputPathBuilder::new(dir, start_time).log_file());
    if let Err(e) = init_tracing(&config.log, log_file.as_deref()) {
        eprintln!("Failed to initialize logging: {e:#}");
    }

    let code = match run(cli, config, start_time).await {
        Ok(code) => code,
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("Error: {e}");
            1
        }
    };
    std::process::exit(code);
}
