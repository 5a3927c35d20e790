//! Export run metrics
//!
//! Counters and histograms for HTTP attempts, retries, limiter waits, pages
//! and written records. Without an installed recorder every call is a no-op;
//! `init_metrics` installs a Prometheus scrape endpoint.

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Initialize metrics system with Prometheus exporter
///
/// Idempotent: a second call is a no-op.
///
/// # Arguments
/// * `addr` - Socket address to bind the scrape endpoint (e.g., "0.0.0.0:9090")
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "http_requests_total",
        Unit::Count,
        "Total number of HTTP attempts made to the catalog API"
    );
    describe_counter!(
        "http_retries_total",
        Unit::Count,
        "Total number of retry attempts"
    );
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "HTTP attempt duration in seconds"
    );
    describe_histogram!(
        "retry_backoff_duration_seconds",
        Unit::Seconds,
        "Duration of retry backoff in seconds"
    );
    describe_counter!(
        "rate_limit_permits_acquired_total",
        Unit::Count,
        "Total number of rate limit permits acquired"
    );
    describe_gauge!(
        "rate_limit_reservoir",
        Unit::Count,
        "Tokens left in the rate limit reservoir after the last grant"
    );
    describe_histogram!(
        "rate_limit_queue_wait_seconds",
        Unit::Seconds,
        "Time spent waiting for rate limit permits"
    );
    describe_counter!(
        "pages_completed_total",
        Unit::Count,
        "Pages fetched successfully"
    );
    describe_counter!("pages_failed_total", Unit::Count, "Pages that failed");
    describe_counter!(
        "records_written_total",
        Unit::Count,
        "Records written to the output file"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Record one HTTP attempt with timing
pub struct HttpRequestMetrics {
    correlation_id: String,
    start_time: Instant,
    attempt: u32,
}

impl HttpRequestMetrics {
    /// Start recording an attempt
    pub fn start(correlation_id: impl Into<String>, attempt: u32) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            start_time: Instant::now(),
            attempt,
        }
    }

    /// Record completion with the response status
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "status" => status_code.to_string(),
            "attempt" => self.attempt.to_string(),
        )
        .increment(1);
        histogram!("http_request_duration_seconds").record(duration.as_secs_f64());

        if status_code == 429 {
            warn!(
                correlation_id = %self.correlation_id,
                attempt = self.attempt,
                duration_ms = duration.as_millis(),
                "Rate limit error (429) recorded"
            );
        }
    }

    /// Record a network error (no status code)
    pub fn record_network_error(&self) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "status" => "network_error",
            "attempt" => self.attempt.to_string(),
        )
        .increment(1);
        histogram!("http_request_duration_seconds").record(duration.as_secs_f64());
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record retry backoff duration
pub fn record_retry_backoff(duration: Duration, attempt: u32) {
    counter!(
        "http_retries_total",
        "attempt" => attempt.to_string(),
    )
    .increment(1);

    histogram!("retry_backoff_duration_seconds").record(duration.as_secs_f64());
}

/// Rate limiter metrics helper
pub struct RateLimiterMetrics;

impl RateLimiterMetrics {
    /// Record a granted permit and the wait it took
    pub fn record_permit(wait: Duration, reservoir_left: u32) {
        histogram!("rate_limit_queue_wait_seconds").record(wait.as_secs_f64());
        counter!("rate_limit_permits_acquired_total").increment(1);
        gauge!("rate_limit_reservoir").set(f64::from(reservoir_left));

        if wait.as_millis() > 100 {
            debug!(
                wait_ms = wait.as_millis(),
                reservoir_left, "Rate limit permit acquired after wait"
            );
        }
    }
}

/// Per-run page and record counters
pub struct ExportMetrics;

impl ExportMetrics {
    pub fn record_page(records: u64) {
        counter!("pages_completed_total").increment(1);
        counter!("records_written_total").increment(records);
    }

    pub fn record_page_failure(error_type: &'static str) {
        counter!("pages_failed_total", "error" => error_type).increment(1);
    }
}

/// Check if metrics system is initialized
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}
