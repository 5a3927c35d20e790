//! CLI error types and conversions

use crate::config::ConfigError;
use crate::downloader::DownloadError;
use crate::resume::CursorError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Export error
    #[error("export failed: {0}")]
    Download(#[from] DownloadError),

    /// Cursor error
    #[error("cursor error: {0}")]
    Cursor(#[from] CursorError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
