//! Catalog API client
//!
//! Sends a [`RequestSpec`] through the rate limiter and transport, runs the
//! response stage chain and retries classified failures with backoff.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::downloader::rate_limit::RateLimiter;
use crate::fetcher::request::RequestSpec;
use crate::fetcher::retry::{RetryContext, RetryDecision, RetryErrorType, RetryPolicy};
use crate::fetcher::stages::{ApiResponse, ResponsePipeline};
use crate::fetcher::transport::Transport;
use crate::fetcher::{FetcherError, FetcherResult};
use crate::metrics::{record_retry_backoff, HttpRequestMetrics};

/// Client shared by every page of a run
pub struct CatalogClient {
    transport: Arc<dyn Transport>,
    rate_limiter: Arc<RateLimiter>,
    retry_policy: RetryPolicy,
    pipeline: ResponsePipeline,
}

impl CatalogClient {
    /// Create a client with the standard response pipeline
    ///
    /// # Arguments
    /// * `transport` - Executes single attempts
    /// * `rate_limiter` - Shared limiter (Arc for global quota enforcement)
    /// * `retry_policy` - Attempt ceilings and backoff
    pub fn new(
        transport: Arc<dyn Transport>,
        rate_limiter: Arc<RateLimiter>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            rate_limiter,
            retry_policy,
            pipeline: ResponsePipeline::standard(),
        }
    }

    pub fn with_pipeline(mut self, pipeline: ResponsePipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Send a request, retrying until success, a terminal failure, or the
    /// ceiling of the failure's class.
    ///
    /// # Errors
    /// Terminal failures are returned as-is; exhausted retries are wrapped in
    /// `FetcherError::RetriesExhausted`.
    pub async fn send(&self, spec: &RequestSpec) -> FetcherResult<ApiResponse> {
        let mut context = RetryContext::new(spec.correlation_id());

        loop {
            let attempt = context.begin_attempt();
            debug!(
                correlation_id = %spec.correlation_id(),
                attempt,
                offset = ?spec.offset(),
                "Sending request"
            );

            let err = match self.attempt(spec, attempt).await {
                Ok(response) => {
                    if attempt > 1 {
                        info!(
                            correlation_id = %spec.correlation_id(),
                            attempt,
                            "Request succeeded after retry"
                        );
                    }
                    return Ok(response);
                }
                Err(err) => err,
            };

            match context.decide(&err, &self.retry_policy) {
                RetryDecision::Retry { delay } => {
                    warn!(
                        correlation_id = %spec.correlation_id(),
                        attempt,
                        error_type = RetryErrorType::from_error(&err).label(),
                        backoff_ms = delay.as_millis(),
                        error = %err,
                        "{}",
                        context.format_retry(delay)
                    );
                    record_retry_backoff(delay, attempt);
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::Terminal => {
                    error!(
                        correlation_id = %spec.correlation_id(),
                        attempt,
                        "{}",
                        context.format_failure(&err)
                    );
                    return Err(err);
                }
                RetryDecision::Exhausted => {
                    error!(
                        correlation_id = %spec.correlation_id(),
                        attempt,
                        max_attempts = context.max_attempts,
                        "{}",
                        context.format_failure(&err)
                    );
                    return Err(FetcherError::RetriesExhausted {
                        attempts: attempt,
                        source: Box::new(err),
                    });
                }
            }
        }
    }

    /// One attempt: permit, transport, stage chain. The permit is released
    /// before any backoff sleep.
    async fn attempt(&self, spec: &RequestSpec, attempt: u32) -> FetcherResult<ApiResponse> {
        let _permit = self.rate_limiter.acquire(1).await?;
        let metrics = HttpRequestMetrics::start(spec.correlation_id(), attempt);

        let raw = match self.transport.execute(spec).await {
            Ok(raw) => {
                metrics.record_complete(raw.status.as_u16());
                raw
            }
            Err(err) => {
                match &err {
                    FetcherError::Http { status, .. } => metrics.record_complete(*status),
                    _ => metrics.record_network_error(),
                }
                return Err(err);
            }
        };

        self.pipeline.run(ApiResponse::from(raw))
    }
}
