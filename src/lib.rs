//! # Catalog Export Library
//!
//! Bulk, resumable export of an organization's catalog from a paginated HTTP
//! API into a single JSON array file.
//!
//! ## Features
//!
//! - **Shared request budget**: every page goes through one rate limiter
//!   (refilling reservoir, concurrency cap, minimum spacing)
//! - **Per-class retries**: network failures and error responses have
//!   separate attempt ceilings, with "still processing" responses polled
//! - **Independent pages**: a failed page is reported, never fatal to the run
//! - **Streaming output**: records are appended as pages arrive
//! - **Incremental runs**: the start time of the last fully successful run
//!   is stored per organization and sent as `updatedSince` next time
//!
//! ## Quick Start
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
//! assert!(outcome.records_downloaded <= outcome.records_expected || !outcome.is_complete());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`config`] - Layered run configuration
//! - [`identifier`] - Organization id parsing
//! - [`fetcher`] - Request building, transport, retries and pagination
//! - [`downloader`] - Run driver, rate limiter and progress
//! - [`output`] - JSON array sink and output naming
//! - [`resume`] - Last-run cursor
//! - [`metrics`] - Prometheus metrics

#![warn(clippy::all)]

/// CLI command implementations
pub mod cli;

/// Run configuration
pub mod config;

/// Run orchestration
pub mod downloader;

/// Catalog API access
pub mod fetcher;

/// Organization id parsing and validation
pub mod identifier;

/// Prometheus metrics
pub mod metrics;

/// Record sinks
pub mod output;

/// Last-run cursor for incremental exports
pub mod resume;

pub use config::ExportConfig;
pub use downloader::{ExportExecutor, ExportStatus, RunOutcome};
pub use identifier::OrgId;
