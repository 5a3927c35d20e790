//! Shared test helpers

use async_trait::async_trait;
use catalog_export::downloader::config::BackoffType;
use catalog_export::downloader::{RateLimitSettings, RateLimiter};
use catalog_export::fetcher::{
    CatalogClient, FetcherError, FetcherResult, NetworkErrorKind, RawResponse, RequestSpec,
    RetryPolicy, Timings, Transport,
};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const ORG: &str = "0b7c5d1e-2f3a-4b5c-8d9e-0f1a2b3c4d5e";

type Responder = dyn Fn(u32, &RequestSpec) -> FetcherResult<RawResponse> + Send + Sync;

/// Transport answering from a closure of (call number starting at 1, request)
pub struct ScriptedTransport {
    responder: Box<Responder>,
    calls: AtomicU32,
}

impl ScriptedTransport {
    pub fn new(
        responder: impl Fn(u32, &RequestSpec) -> FetcherResult<RawResponse> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, spec: &RequestSpec) -> FetcherResult<RawResponse> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        (self.responder)(call, spec)
    }
}

pub fn ok_body(body: &str) -> FetcherResult<RawResponse> {
    Ok(RawResponse {
        status: StatusCode::OK,
        headers: HeaderMap::new(),
        body: body.to_string(),
        timings: Timings::ending_now(Duration::from_millis(1)),
    })
}

pub fn http_error(status: u16) -> FetcherResult<RawResponse> {
    Err(FetcherError::Http {
        status,
        message: "scripted".to_string(),
    })
}

pub fn connection_refused() -> FetcherResult<RawResponse> {
    Err(FetcherError::Network {
        kind: NetworkErrorKind::Connect,
        message: "connection refused".to_string(),
    })
}

/// Policy with millisecond backoff so retry tests finish quickly
pub fn fast_policy(retry: u32, no_response_retries: u32) -> RetryPolicy {
    RetryPolicy {
        retry,
        no_response_retries,
        backoff_type: BackoffType::Static,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(1),
        status_codes_to_retry: vec![408, 429],
    }
}

pub fn client_with(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Arc<CatalogClient> {
    let limiter = Arc::new(RateLimiter::new(RateLimitSettings::unlimited(8)));
    Arc::new(CatalogClient::new(transport, limiter, policy))
}
