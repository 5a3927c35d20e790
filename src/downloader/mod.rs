//! Run orchestration and rate limiting
//!
//! The downloader drives one export run end to end:
//!
//! 1. **Cursor**: resume from the last successful run via [`crate::resume`]
//! 2. **Probe**: ask the API for the total record count
//! 3. **Fetch**: dispatch every page through the shared [`rate_limit::RateLimiter`]
//! 4. **Output**: stream records into one JSON array file
//! 5. **Commit**: store the new cursor when no page failed
//!
//! # Quick Start
//!
//! ```no_run
//! use catalog_export::config::ExportConfig;
//! use catalog_export::downloader::ExportExecutor;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = ExportConfig::default();
//! config.request.org_id = Some("0b7c5d1e-2f3a-4b5c-8d9e-0f1a2b3c4d5e".to_string());
//! config.request.bearer = Some("token".to_string());
//! config.request.base_url = Some("https://api.example.com".to_string());
//!
//! let outcome = ExportExecutor::new(config)?.execute().await?;
//! println!("{} records, exit code {}", outcome.records_downloaded, outcome.status().exit_code());
//! # Ok(())
//! # }
//! ```
//!
//! # Components
//!
//! - [`executor`] - Run driver
//! - [`job`] - Run outcome and status
//! - [`progress`] - Progress reporting
//! - [`rate_limit`] - Request budget
//! - [`config`] - Defaults and backoff calculation

pub mod config;
pub mod executor;
pub mod job;
pub mod progress;
pub mod rate_limit;

pub use executor::ExportExecutor;
pub use job::{ExportStatus, FailedPage, RunOutcome};
pub use rate_limit::{RateLimitError, RateLimitSettings, RateLimiter};

use crate::config::ConfigError;
use crate::fetcher::FetcherError;
use crate::output::OutputError;

/// Run-fatal errors
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Configuration is incomplete or invalid
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The count probe failed, so nothing could be planned
    #[error("record count probe failed: {0}")]
    CountProbe(#[source] FetcherError),

    /// Output could not be written
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// Fetcher error
    #[error("fetcher error: {0}")]
    Fetcher(#[from] FetcherError),
}
