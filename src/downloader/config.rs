//! Export defaults and backoff calculation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Largest page the catalog API accepts for `max`.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Default page size (`max` query parameter).
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Default per-attempt request timeout in milliseconds (3 minutes).
/// Large catalog pages are assembled server-side and can take well over a minute.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 3 * 60 * 1000;

/// Default service path of the catalog endpoint.
pub const DEFAULT_URI_TEMPLATE: &str = "/content-discovery/v2/organizations/{orgId}/catalog-content";

/// Initial token reservoir.
/// The API allows 100 requests per 20 seconds per service account.
pub const DEFAULT_RESERVOIR: u32 = 20;

/// Interval between reservoir replenishments in milliseconds.
pub const DEFAULT_RESERVOIR_INCREASE_INTERVAL_MS: u64 = 1000;

/// Tokens added per replenishment.
pub const DEFAULT_RESERVOIR_INCREASE_AMOUNT: u32 = 5;

/// Ceiling the reservoir is replenished up to.
pub const DEFAULT_RESERVOIR_INCREASE_MAXIMUM: u32 = 20;

/// Maximum requests in flight at once.
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

/// Minimum spacing between two dispatches in milliseconds.
pub const DEFAULT_MIN_TIME_MS: u64 = 500;

/// Attempt ceiling for failures where a response was received.
pub const DEFAULT_RETRY: u32 = 5;

/// Attempt ceiling for failures where no response was received.
pub const DEFAULT_NO_RESPONSE_RETRIES: u32 = 4;

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1000;

/// Maximum backoff delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Status codes retried in addition to every 5xx.
pub const DEFAULT_RETRY_STATUS_CODES: &[u16] = &[408, 429];

/// Flush interval for the output writer (flush every N records)
pub const FLUSH_INTERVAL: u64 = 1_000;

/// Name of the persisted last-run cursor, relative to the working directory.
pub const DEFAULT_CURSOR_FILE: &str = "lastrun.json";

/// Default directory for output files.
pub const DEFAULT_OUTPUT_DIR: &str = "results";

/// How backoff grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffType {
    /// `base * 2^n`
    #[default]
    Exponential,
    /// `base * (n + 1)`
    Linear,
    /// `base`
    Static,
}

impl fmt::Display for BackoffType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackoffType::Exponential => "exponential",
            BackoffType::Linear => "linear",
            BackoffType::Static => "static",
        };
        write!(f, "{s}")
    }
}

impl FromStr for BackoffType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exponential" => Ok(BackoffType::Exponential),
            "linear" => Ok(BackoffType::Linear),
            "static" => Ok(BackoffType::Static),
            _ => Err(format!(
                "Invalid backoff type: {s}. Valid options: exponential, linear, static"
            )),
        }
    }
}

/// Calculate the delay before retry number `retry_count` (0-based).
pub fn calculate_backoff(
    backoff_type: BackoffType,
    base: Duration,
    max: Duration,
    retry_count: u32,
) -> Duration {
    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    let delay_ms = match backoff_type {
        BackoffType::Exponential => 2u64
            .checked_pow(retry_count)
            .and_then(|factor| base_ms.checked_mul(factor))
            .unwrap_or(u64::MAX),
        BackoffType::Linear => base_ms.saturating_mul(u64::from(retry_count) + 1),
        BackoffType::Static => base_ms,
    };
    Duration::from_millis(delay_ms).min(max)
}
