//! Catalog API access: request building, transport, retry and pagination

use std::fmt;

use crate::downloader::rate_limit::RateLimitError;
use crate::output::OutputError;

pub mod client;
pub mod page;
pub mod pagination;
pub mod request;
pub mod retry;
pub mod stages;
pub mod transport;

pub use client::CatalogClient;
pub use page::{PageFetcher, PageResult, RecordCount};
pub use pagination::{page_offsets, PaginationOrchestrator};
pub use request::{HttpMethod, RequestSpec, RequestTemplate};
pub use retry::{RetryErrorType, RetryPolicy};
pub use stages::{ApiResponse, ResponseBody, ResponsePipeline, ResponseStage};
pub use transport::{HttpTransport, RawResponse, Timings, Transport};

/// Why no response arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    /// Per-attempt timeout elapsed
    Timeout,
    /// Connection refused, reset or DNS failure
    Connect,
    /// Anything else that left us without a response
    Other,
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NetworkErrorKind::Timeout => "timeout",
            NetworkErrorKind::Connect => "connect",
            NetworkErrorKind::Other => "other",
        };
        write!(f, "{s}")
    }
}

/// Fetcher errors
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// No response was received
    #[error("network error ({kind}): {message}")]
    Network {
        kind: NetworkErrorKind,
        message: String,
    },

    /// A response arrived with an error status
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    /// Non-empty body that is not valid JSON
    #[error("response is not valid JSON: {0}")]
    NotJson(String),

    /// The API is still assembling the report
    #[error("request is still processing on the server")]
    StillProcessing,

    /// Response parsed but is missing something we need
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Request could not be built
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Rate limiter could not grant a permit
    #[error("rate limiter error: {0}")]
    RateLimit(#[from] RateLimitError),

    /// Writing records to the output failed
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// Retryable failure that hit its attempt ceiling
    #[error("giving up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<FetcherError>,
    },
}

impl FetcherError {
    /// Errors that must abort the whole run rather than fail a single page.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetcherError::Output(_))
    }

    /// The error behind any retry wrapper.
    pub fn root(&self) -> &FetcherError {
        match self {
            FetcherError::RetriesExhausted { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;
