//! Export configuration
//!
//! Layered lowest to highest: built-in defaults, an optional JSON config
//! file, environment variables, command line flags. The CLI folds the upper
//! layers in; this module owns the shape, the defaults and validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::level_filters::LevelFilter;

use crate::downloader::config::{
    BackoffType, DEFAULT_CURSOR_FILE, DEFAULT_MAX_CONCURRENT, DEFAULT_MIN_TIME_MS,
    DEFAULT_NO_RESPONSE_RETRIES, DEFAULT_OUTPUT_DIR, DEFAULT_PAGE_SIZE,
    DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_RESERVOIR, DEFAULT_RESERVOIR_INCREASE_AMOUNT,
    DEFAULT_RESERVOIR_INCREASE_INTERVAL_MS, DEFAULT_RESERVOIR_INCREASE_MAXIMUM, DEFAULT_RETRY,
    DEFAULT_RETRY_STATUS_CODES, DEFAULT_URI_TEMPLATE, INITIAL_BACKOFF_MS, MAX_BACKOFF_MS,
    MAX_PAGE_SIZE,
};
use crate::downloader::rate_limit::RateLimitSettings;
use crate::fetcher::request::{HttpMethod, RequestTemplate};
use crate::fetcher::retry::RetryPolicy;
use crate::identifier::{OrgId, OrgIdError};
use crate::output::OutputPathBuilder;
use crate::resume::cursor::parse_iso8601;

/// Largest config file we are willing to read
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Placeholder shown instead of the bearer token
const REDACTED: &str = "[REDACTED]";

/// Catalog API request settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// API origin, e.g. `https://api.example.com`
    pub base_url: Option<String>,
    /// Bearer token
    pub bearer: Option<String>,
    /// Organization to export (UUID)
    pub org_id: Option<String>,
    /// Path template; `{orgId}` is substituted
    pub uri_template: String,
    pub method: HttpMethod,
    /// Per-attempt timeout
    pub timeout_ms: u64,
    /// Page size (`max`)
    pub max: u32,
    pub transform_name: Option<String>,
    /// Fixed incremental filter; when set the last-run cursor is ignored
    pub updated_since: Option<String>,
    pub system: Option<String>,
    /// JSON body sent with every request
    pub body: Option<Value>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            bearer: None,
            org_id: None,
            uri_template: DEFAULT_URI_TEMPLATE.to_string(),
            method: HttpMethod::default(),
            timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            max: DEFAULT_PAGE_SIZE,
            transform_name: None,
            updated_since: None,
            system: None,
            body: None,
        }
    }
}

/// Request budget settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub reservoir: u32,
    pub reservoir_increase_interval_ms: u64,
    pub reservoir_increase_amount: u32,
    pub reservoir_increase_maximum: u32,
    pub max_concurrent: usize,
    pub min_time_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            reservoir: DEFAULT_RESERVOIR,
            reservoir_increase_interval_ms: DEFAULT_RESERVOIR_INCREASE_INTERVAL_MS,
            reservoir_increase_amount: DEFAULT_RESERVOIR_INCREASE_AMOUNT,
            reservoir_increase_maximum: DEFAULT_RESERVOIR_INCREASE_MAXIMUM,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            min_time_ms: DEFAULT_MIN_TIME_MS,
        }
    }
}

/// Retry settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempt ceiling for error responses
    pub retry: u32,
    /// Attempt ceiling when no response arrives
    pub no_response_retries: u32,
    pub backoff_type: BackoffType,
    pub retry_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Retryable statuses besides every 5xx
    pub status_codes_to_retry: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry: DEFAULT_RETRY,
            no_response_retries: DEFAULT_NO_RESPONSE_RETRIES,
            backoff_type: BackoffType::default(),
            retry_delay_ms: INITIAL_BACKOFF_MS,
            max_delay_ms: MAX_BACKOFF_MS,
            status_codes_to_retry: DEFAULT_RETRY_STATUS_CODES.to_vec(),
        }
    }
}

/// Output file settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// Fixed file name; defaults to `<YYYYMMDD_HHMMSS>_results.json`
    pub file_name: Option<String>,
    /// Prefix the output with a UTF-8 BOM
    pub include_bom: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            file_name: None,
            include_bom: false,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Level for this crate's events (`error` .. `trace`)
    pub level: String,
    /// When set, a log file is written here as well
    pub dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
        }
    }
}

/// Complete configuration of one export run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub request: RequestConfig,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub output: OutputConfig,
    pub log: LogConfig,
    /// Last-run cursor file
    pub cursor_path: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            request: RequestConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            output: OutputConfig::default(),
            log: LogConfig::default(),
            cursor_path: PathBuf::from(DEFAULT_CURSOR_FILE),
        }
    }
}

impl ExportConfig {
    /// Read a JSON config file; missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "config file {} is larger than {MAX_CONFIG_FILE_SIZE} bytes",
                path.display()
            )));
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&contents)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))
    }

    /// Defaults, or the given file over the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Reject configurations no run could succeed with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.org_id()?;
        self.bearer()?;
        let base_url = self.base_url()?;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "base URL must start with http:// or https://: {base_url}"
            )));
        }

        let request = &self.request;
        if !(1..=MAX_PAGE_SIZE).contains(&request.max) {
            return Err(ConfigError::Invalid(format!(
                "page size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                request.max
            )));
        }
        if request.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeout must be positive".to_string()));
        }
        if let Some(updated_since) = &request.updated_since {
            if parse_iso8601(updated_since).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "updated_since is not an ISO-8601 timestamp: {updated_since}"
                )));
            }
        }

        let limits = &self.rate_limit;
        if limits.max_concurrent == 0 {
            return Err(ConfigError::Invalid("max_concurrent must be at least 1".to_string()));
        }
        if limits.reservoir_increase_maximum == 0 && limits.reservoir == 0 {
            return Err(ConfigError::Invalid(
                "rate limit reservoir and its ceiling cannot both be zero".to_string(),
            ));
        }
        if limits.reservoir_increase_interval_ms == 0 || limits.reservoir_increase_amount == 0 {
            return Err(ConfigError::Invalid(
                "reservoir increase interval and amount must be positive".to_string(),
            ));
        }

        if self.retry.max_delay_ms < self.retry.retry_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "max retry delay ({}ms) is below the base delay ({}ms)",
                self.retry.max_delay_ms, self.retry.retry_delay_ms
            )));
        }

        self.log
            .level
            .parse::<LevelFilter>()
            .map_err(|_| ConfigError::Invalid(format!("unknown log level: {}", self.log.level)))?;

        Ok(())
    }

    pub fn org_id(&self) -> Result<OrgId, ConfigError> {
        let raw = self
            .request
            .org_id
            .as_deref()
            .ok_or(ConfigError::Missing("org id (ORGID)"))?;
        Ok(OrgId::parse(raw)?)
    }

    fn bearer(&self) -> Result<&str, ConfigError> {
        self.request
            .bearer
            .as_deref()
            .filter(|b| !b.trim().is_empty())
            .ok_or(ConfigError::Missing("bearer token (BEARER)"))
    }

    fn base_url(&self) -> Result<&str, ConfigError> {
        self.request
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(ConfigError::Missing("base URL (BASEURL)"))
    }

    /// Immutable request template for this run.
    pub fn request_template(&self) -> Result<RequestTemplate, ConfigError> {
        let org_id = self.org_id()?;
        let params = BTreeMap::from([("orgId".to_string(), org_id.to_string())]);
        let request = &self.request;

        let template = RequestTemplate::new(
            self.base_url()?,
            &request.uri_template,
            &params,
            self.bearer()?,
        )
        .map_err(|e| ConfigError::Invalid(e.to_string()))?
        .with_method(request.method)
        .with_timeout(Duration::from_millis(request.timeout_ms))
        .with_page_size(request.max)
        .with_transform_name(request.transform_name.clone())
        .with_system(request.system.clone())
        .with_updated_since(request.updated_since.clone())
        .with_body(request.body.clone());

        Ok(template)
    }

    pub fn rate_limit_settings(&self) -> RateLimitSettings {
        let limits = &self.rate_limit;
        RateLimitSettings {
            reservoir: limits.reservoir,
            reservoir_increase_interval: Duration::from_millis(limits.reservoir_increase_interval_ms),
            reservoir_increase_amount: limits.reservoir_increase_amount,
            reservoir_increase_maximum: limits.reservoir_increase_maximum,
            max_concurrent: limits.max_concurrent,
            min_time: Duration::from_millis(limits.min_time_ms),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let retry = &self.retry;
        RetryPolicy {
            retry: retry.retry,
            no_response_retries: retry.no_response_retries,
            backoff_type: retry.backoff_type,
            base_delay: Duration::from_millis(retry.retry_delay_ms),
            max_delay: Duration::from_millis(retry.max_delay_ms),
            status_codes_to_retry: retry.status_codes_to_retry.clone(),
        }
    }

    /// Output path builder for a run started at `start`.
    pub fn output_paths(&self, start: chrono::DateTime<chrono::Utc>) -> OutputPathBuilder {
        OutputPathBuilder::new(&self.output.dir, start).with_file_name(self.output.file_name.clone())
    }

    /// Copy safe to log: the bearer token is replaced.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.request.bearer.is_some() {
            copy.request.bearer = Some(REDACTED.to_string());
        }
        copy
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(String),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid setting: {0}")]
    Invalid(String),

    #[error(transparent)]
    OrgId(#[from] OrgIdError),
}
