//! Retry classification and attempt bookkeeping
//!
//! Failures fall in two classes with separate attempt ceilings: "no response"
//! (network errors, timeouts) and "error response" (retryable statuses,
//! bodies that are not JSON, still-processing reports). A ceiling is the total
//! number of attempts allowed once that class of failure is seen.

use std::time::Duration;

use crate::downloader::config::{
    calculate_backoff, BackoffType, DEFAULT_NO_RESPONSE_RETRIES, DEFAULT_RETRY,
    DEFAULT_RETRY_STATUS_CODES, INITIAL_BACKOFF_MS, MAX_BACKOFF_MS,
};
use crate::fetcher::{FetcherError, NetworkErrorKind};

/// Classification of failed attempts for retry decisions and log messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryErrorType {
    /// Per-attempt timeout elapsed
    NetworkTimeout,
    /// Connection refused, reset, DNS failure
    NetworkOffline,
    /// No response for another reason
    NetworkGeneric,
    /// HTTP 429
    RateLimit,
    /// HTTP 5xx
    ServerError(u16),
    /// HTTP 401/403
    AuthFailed(u16),
    /// Other HTTP 4xx
    ClientError(u16),
    /// Body was not JSON
    NotJson,
    /// Report still being assembled server-side
    StillProcessing,
    /// Request could not be built or sent
    InvalidRequest,
    /// Output could not be written
    OutputFailed,
}

/// Which attempt ceiling applies to a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    NoResponse,
    ErrorResponse,
}

impl RetryErrorType {
    /// Classify a fetcher error. Retry wrappers are looked through.
    pub fn from_error(err: &FetcherError) -> Self {
        match err.root() {
            FetcherError::Network { kind, .. } => match kind {
                NetworkErrorKind::Timeout => Self::NetworkTimeout,
                NetworkErrorKind::Connect => Self::NetworkOffline,
                NetworkErrorKind::Other => Self::NetworkGeneric,
            },
            FetcherError::Http { status, .. } => match status {
                429 => Self::RateLimit,
                401 | 403 => Self::AuthFailed(*status),
                s if (500..600).contains(s) => Self::ServerError(*s),
                s => Self::ClientError(*s),
            },
            FetcherError::NotJson(_) | FetcherError::InvalidResponse(_) => Self::NotJson,
            FetcherError::StillProcessing => Self::StillProcessing,
            FetcherError::InvalidRequest(_) | FetcherError::RateLimit(_) => Self::InvalidRequest,
            FetcherError::Output(_) => Self::OutputFailed,
            FetcherError::RetriesExhausted { .. } => Self::NetworkGeneric,
        }
    }

    pub fn class(&self) -> FailureClass {
        match self {
            Self::NetworkTimeout | Self::NetworkOffline | Self::NetworkGeneric => {
                FailureClass::NoResponse
            }
            _ => FailureClass::ErrorResponse,
        }
    }

    /// Stable label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "timeout",
            Self::NetworkOffline => "connect",
            Self::NetworkGeneric => "network",
            Self::RateLimit => "rate_limit",
            Self::ServerError(_) => "server_error",
            Self::AuthFailed(_) => "auth",
            Self::ClientError(_) => "client_error",
            Self::NotJson => "not_json",
            Self::StillProcessing => "still_processing",
            Self::InvalidRequest => "invalid_request",
            Self::OutputFailed => "output",
        }
    }

    /// User-friendly description string used inside retry log messages.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "network timeout",
            Self::NetworkOffline => "connection failed",
            Self::NetworkGeneric => "network error",
            Self::RateLimit => "rate limit exceeded",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::AuthFailed(_) => "authentication failed",
            Self::ClientError(code) => match code {
                404 => "resource not found",
                408 => "request timeout",
                _ => "client error",
            },
            Self::NotJson => "response was not JSON",
            Self::StillProcessing => "report still processing",
            Self::InvalidRequest => "invalid request",
            Self::OutputFailed => "output write failed",
        }
    }

    /// Suggested remediation shown with the final failure.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "Consider raising the request timeout for large pages",
            Self::NetworkOffline | Self::NetworkGeneric => {
                "Verify network connectivity and the configured base URL"
            }
            Self::RateLimit => "Lower the reservoir or concurrency settings",
            Self::ServerError(_) | Self::NotJson => "The API may be degraded, try again later",
            Self::AuthFailed(_) => "Verify the bearer token and its permissions for this organization",
            Self::ClientError(_) | Self::InvalidRequest => {
                "Review the organization id, URI template and query parameters"
            }
            Self::StillProcessing => "Raise the retry ceiling or the backoff delay",
            Self::OutputFailed => "Check free disk space and permissions of the output directory",
        }
    }
}

/// Retry configuration for one client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempt ceiling once an error response was seen
    pub retry: u32,
    /// Attempt ceiling once a request got no response
    pub no_response_retries: u32,
    pub backoff_type: BackoffType,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Retryable statuses besides every 5xx
    pub status_codes_to_retry: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry: DEFAULT_RETRY,
            no_response_retries: DEFAULT_NO_RESPONSE_RETRIES,
            backoff_type: BackoffType::default(),
            base_delay: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
            status_codes_to_retry: DEFAULT_RETRY_STATUS_CODES.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// Total attempts allowed for a class (never below one).
    pub fn ceiling(&self, class: FailureClass) -> u32 {
        match class {
            FailureClass::NoResponse => self.no_response_retries,
            FailureClass::ErrorResponse => self.retry,
        }
        .max(1)
    }

    /// Whether a failure of this type may be retried at all.
    pub fn is_retryable(&self, error_type: RetryErrorType) -> bool {
        match error_type {
            RetryErrorType::NetworkTimeout
            | RetryErrorType::NetworkOffline
            | RetryErrorType::NetworkGeneric
            | RetryErrorType::NotJson
            | RetryErrorType::StillProcessing
            | RetryErrorType::ServerError(_) => true,
            RetryErrorType::RateLimit => self.status_codes_to_retry.contains(&429),
            RetryErrorType::AuthFailed(code) | RetryErrorType::ClientError(code) => {
                self.status_codes_to_retry.contains(&code)
            }
            RetryErrorType::InvalidRequest | RetryErrorType::OutputFailed => false,
        }
    }

    /// Delay before retry number `retry_count` (0-based).
    pub fn backoff(&self, retry_count: u32) -> Duration {
        calculate_backoff(self.backoff_type, self.base_delay, self.max_delay, retry_count)
    }
}

/// Outcome of judging a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep, then try again
    Retry { delay: Duration },
    /// Not worth retrying
    Terminal,
    /// Retryable, but the class ceiling is reached
    Exhausted,
}

/// Attempt bookkeeping for one request's attempt chain
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Attempts made so far (1-based once started)
    pub attempt: u32,
    /// Classification of the latest failure
    pub last_error: Option<RetryErrorType>,
    /// Ceiling of the latest failure's class
    pub max_attempts: u32,
    /// Correlation id of the request
    pub correlation_id: String,
}

impl RetryContext {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            attempt: 0,
            last_error: None,
            max_attempts: 0,
            correlation_id: correlation_id.into(),
        }
    }

    /// Count a new attempt and return its ordinal.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    /// Judge the failure of the current attempt.
    pub fn decide(&mut self, err: &FetcherError, policy: &RetryPolicy) -> RetryDecision {
        let error_type = RetryErrorType::from_error(err);
        self.last_error = Some(error_type);
        self.max_attempts = policy.ceiling(error_type.class());

        if !policy.is_retryable(error_type) {
            return RetryDecision::Terminal;
        }
        if self.attempt >= self.max_attempts {
            return RetryDecision::Exhausted;
        }
        RetryDecision::Retry {
            delay: policy.backoff(self.attempt.saturating_sub(1)),
        }
    }

    /// Format standardized retry message with attempt counters.
    pub fn format_retry(&self, delay: Duration) -> String {
        format!(
            "Retrying (attempt {}/{}) after {} - waiting {:.1} seconds...",
            self.attempt + 1,
            self.max_attempts,
            self.last_error
                .map(|e| e.description())
                .unwrap_or("unknown error"),
            delay.as_secs_f64()
        )
    }

    /// Format final failure summary with a remediation hint.
    pub fn format_failure(&self, err: &FetcherError) -> String {
        let hint = self
            .last_error
            .map(|e| e.suggestion())
            .unwrap_or("Check the log for details");
        format!(
            "[FAILED] Request failed after {} attempt(s): {err}. {hint}",
            self.attempt
        )
    }
}
