//! Export command and shared configuration flags

use chrono::{DateTime, Utc};
use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use super::CliError;
use crate::config::ExportConfig;
use crate::downloader::config::BackoffType;
use crate::downloader::{ExportExecutor, ExportStatus, RunOutcome};

/// Catalog export CLI
#[derive(Parser, Debug)]
#[command(name = "catalog-export")]
#[command(about = "Export every record of an organization's catalog into one JSON file", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Summary format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9000)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download all records changed since the last successful run
    Export(ExportCommand),

    /// Check configuration and the last run cursor without downloading
    Validate(super::ValidateCommand),
}

/// Summary output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

/// Settings shared by every command. Flags win over environment variables,
/// which win over the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// JSON config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Organization id (UUID)
    #[arg(long, env = "ORGID")]
    pub org_id: Option<String>,

    /// Bearer token
    #[arg(long, env = "BEARER", hide_env_values = true)]
    pub bearer: Option<String>,

    /// API base URL
    #[arg(long, env = "BASEURL")]
    pub base_url: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, env = "LOGLEVEL")]
    pub log_level: Option<String>,

    /// Write a log file into this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Prefix the output file with a UTF-8 BOM
    #[arg(
        long,
        env = "INCLUDEBOM",
        value_parser = BoolishValueParser::new(),
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub include_bom: Option<bool>,

    /// Output directory
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Output file name (default: <YYYYMMDD_HHMMSS>_results.json)
    #[arg(long)]
    pub output_file: Option<String>,

    /// Records per page (1-1000)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub page_size: Option<u32>,

    /// Per-request timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Only records updated since this ISO-8601 timestamp; ignores the last run cursor
    #[arg(long)]
    pub updated_since: Option<String>,

    #[arg(long)]
    pub transform_name: Option<String>,

    #[arg(long)]
    pub system: Option<String>,

    /// Requests in flight at once
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Initial request budget
    #[arg(long)]
    pub reservoir: Option<u32>,

    /// Minimum spacing between request starts in milliseconds
    #[arg(long)]
    pub min_time_ms: Option<u64>,

    /// Attempts for error responses
    #[arg(long)]
    pub retry: Option<u32>,

    /// Attempts when no response arrives
    #[arg(long)]
    pub no_response_retries: Option<u32>,

    /// Backoff strategy: exponential, linear or static
    #[arg(long)]
    pub backoff: Option<BackoffType>,

    /// Last run cursor file
    #[arg(long)]
    pub cursor_file: Option<PathBuf>,
}

impl ConfigArgs {
    /// Layer flags and environment over the config file (or defaults).
    pub fn into_config(&self) -> Result<ExportConfig, CliError> {
        let mut config = ExportConfig::load(self.config.as_deref())?;

        let request = &mut config.request;
        overlay(&mut request.org_id, &self.org_id);
        overlay(&mut request.bearer, &self.bearer);
        overlay(&mut request.base_url, &self.base_url);
        overlay(&mut request.updated_since, &self.updated_since);
        overlay(&mut request.transform_name, &self.transform_name);
        overlay(&mut request.system, &self.system);
        if let Some(page_size) = self.page_size {
            request.max = page_size;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            request.timeout_ms = timeout_ms;
        }

        let limits = &mut config.rate_limit;
        if let Some(max_concurrent) = self.max_concurrent {
            limits.max_concurrent = max_concurrent;
        }
        if let Some(reservoir) = self.reservoir {
            limits.reservoir = reservoir;
        }
        if let Some(min_time_ms) = self.min_time_ms {
            limits.min_time_ms = min_time_ms;
        }

        let retry = &mut config.retry;
        if let Some(attempts) = self.retry {
            retry.retry = attempts;
        }
        if let Some(attempts) = self.no_response_retries {
            retry.no_response_retries = attempts;
        }
        if let Some(backoff) = self.backoff {
            retry.backoff_type = backoff;
        }

        if let Some(dir) = &self.output_dir {
            config.output.dir = dir.clone();
        }
        overlay(&mut config.output.file_name, &self.output_file);
        if let Some(include_bom) = self.include_bom {
            config.output.include_bom = include_bom;
        }

        if let Some(level) = &self.log_level {
            config.log.level = level.trim().to_lowercase();
        }
        if let Some(dir) = &self.log_dir {
            config.log.dir = Some(dir.clone());
        }
        if let Some(path) = &self.cursor_file {
            config.cursor_path = path.clone();
        }

        Ok(config)
    }
}

fn overlay(target: &mut Option<String>, value: &Option<String>) {
    if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        *target = Some(value.to_string());
    }
}

/// Export command arguments
#[derive(Parser, Debug)]
pub struct ExportCommand {
    #[command(flatten)]
    pub config: ConfigArgs,
}

impl ExportCommand {
    /// Run the export described by `config`, started at `start_time`.
    pub async fn execute(
        &self,
        config: ExportConfig,
        start_time: DateTime<Utc>,
        format: OutputFormat,
    ) -> Result<ExportStatus, CliError> {
        let executor = ExportExecutor::new(config)?.with_start_time(start_time);
        let outcome = executor.execute().await?;
        print_summary(&outcome, format);

        Ok(outcome.status())
    }
}

fn print_summary(outcome: &RunOutcome, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let summary = serde_json::json!({
                "status": outcome.status(),
                "records_expected": outcome.records_expected,
                "records_downloaded": outcome.records_downloaded,
                "pages": outcome.pages_dispatched,
                "failed_offsets": outcome.failed_offsets(),
                "saved": outcome.saved,
                "output_path": outcome.output_path.as_ref().map(|p| p.display().to_string()),
            });
            println!("{summary}");
        }
        OutputFormat::Human => match outcome.status() {
            ExportStatus::NoRecords => println!("No records to download"),
            status => {
                println!(
                    "{status:?}: {} of {} records downloaded",
                    outcome.records_downloaded, outcome.records_expected
                );
                if let Some(path) = outcome.output_path.as_ref().filter(|_| outcome.saved) {
                    println!("Output: {}", path.display());
                }
                if !outcome.is_complete() {
                    println!("Failed page offsets: {:?}", outcome.failed_offsets());
                }
            }
        },
    }
}
