//! Single HTTP attempt with timing capture
//!
//! [`Transport`] is the seam between the retry loop and the network. The
//! production implementation wraps a shared `reqwest::Client`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::fetcher::request::RequestSpec;
use crate::fetcher::{FetcherError, FetcherResult, NetworkErrorKind};

/// Error bodies are truncated to this many characters in error messages.
const ERROR_BODY_PREVIEW: usize = 512;

/// When an attempt was sent, when its response arrived, and how long it took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub sent: DateTime<Utc>,
    pub received: DateTime<Utc>,
    pub duration: Duration,
}

impl Timings {
    /// Timings for an attempt that completed just now after `duration`.
    pub fn ending_now(duration: Duration) -> Self {
        let received = Utc::now();
        let sent = chrono::Duration::from_std(duration)
            .map(|d| received - d)
            .unwrap_or(received);
        Self {
            sent,
            received,
            duration,
        }
    }
}

/// A successful (2xx) response before any body interpretation
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
    pub timings: Timings,
}

/// Executes exactly one attempt of a request.
///
/// Implementations return `FetcherError::Network` when no response arrived
/// and `FetcherError::Http` for a non-2xx status.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, spec: &RequestSpec) -> FetcherResult<RawResponse>;
}

/// reqwest-backed transport
#[derive(Clone)]
pub struct HttpTransport {
    client: Arc<Client>,
}

impl HttpTransport {
    /// Create a transport over a shared client (Arc for cheap cloning)
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }

    /// Transport with a pooled client tuned for long-running page downloads.
    pub fn with_defaults() -> FetcherResult<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(20)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetcherError::InvalidRequest(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::new(Arc::new(client)))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, spec: &RequestSpec) -> FetcherResult<RawResponse> {
        debug!(
            correlation_id = %spec.correlation_id(),
            url = %spec.url(),
            params = ?spec.query(),
            "REQUEST"
        );

        let mut request = self
            .client
            .request(spec.method().into(), spec.url())
            .bearer_auth(spec.bearer())
            .timeout(spec.timeout())
            .query(spec.query());
        if let Some(body) = spec.body() {
            request = request.json(body);
        }

        let sent = Utc::now();
        let start = Instant::now();

        let response = request.send().await.map_err(network_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(network_error)?;

        let timings = Timings {
            sent,
            received: Utc::now(),
            duration: start.elapsed(),
        };

        debug!(
            correlation_id = %spec.correlation_id(),
            status = status.as_u16(),
            duration_ms = timings.duration.as_millis(),
            "RESPONSE"
        );

        if !status.is_success() {
            return Err(FetcherError::Http {
                status: status.as_u16(),
                message: preview(&body),
            });
        }

        Ok(RawResponse {
            status,
            headers,
            body,
            timings,
        })
    }
}

/// Classify a reqwest failure as a "no response" error.
fn network_error(e: reqwest::Error) -> FetcherError {
    let kind = if e.is_timeout() {
        NetworkErrorKind::Timeout
    } else if e.is_connect() {
        NetworkErrorKind::Connect
    } else {
        NetworkErrorKind::Other
    };
    FetcherError::Network {
        kind,
        message: e.to_string(),
    }
}

fn preview(body: &str) -> String {
    if body.chars().count() <= ERROR_BODY_PREVIEW {
        body.to_string()
    } else {
        let mut truncated: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
        truncated.push_str("...");
        truncated
    }
}
