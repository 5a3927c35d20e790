//! Response stage chain
//!
//! Each attempt's response passes through an ordered list of stages. A stage
//! either hands the (possibly transformed) response on or rejects it with a
//! classified error that the retry loop then judges.

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::Arc;

use crate::fetcher::transport::{RawResponse, Timings};
use crate::fetcher::{FetcherError, FetcherResult};

/// Value of the `status` field while the API is still assembling a result.
pub const IN_PROGRESS_STATUS: &str = "IN_PROGRESS";

/// Response body, raw until a decoding stage has run
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Text(String),
    Json(Value),
}

/// Response travelling through the stage chain
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
    pub timings: Timings,
}

impl From<RawResponse> for ApiResponse {
    fn from(raw: RawResponse) -> Self {
        Self {
            status: raw.status,
            headers: raw.headers,
            body: ResponseBody::Text(raw.body),
            timings: raw.timings,
        }
    }
}

impl ApiResponse {
    /// Decoded body, if a decoding stage has run.
    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            ResponseBody::Json(value) => Some(value),
            ResponseBody::Text(_) => None,
        }
    }

    /// Decoded body as records; anything but an array holds none.
    pub fn into_records(self) -> Vec<Value> {
        match self.body {
            ResponseBody::Json(Value::Array(records)) => records,
            _ => Vec::new(),
        }
    }

    /// Header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// One step of response handling
pub trait ResponseStage: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, response: ApiResponse) -> FetcherResult<ApiResponse>;
}

/// Decode the body as JSON.
///
/// An empty body decodes to `null`; a non-empty body that does not parse is
/// rejected as `NotJson`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExpectJson;

impl ResponseStage for ExpectJson {
    fn name(&self) -> &'static str {
        "expect_json"
    }

    fn apply(&self, mut response: ApiResponse) -> FetcherResult<ApiResponse> {
        if let ResponseBody::Text(text) = &response.body {
            let value = if text.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str(text).map_err(|e| FetcherError::NotJson(e.to_string()))?
            };
            response.body = ResponseBody::Json(value);
        }
        Ok(response)
    }
}

/// Reject responses whose `status` field says the result is not ready yet.
#[derive(Debug, Default, Clone, Copy)]
pub struct PollingCheck;

impl ResponseStage for PollingCheck {
    fn name(&self) -> &'static str {
        "polling_check"
    }

    fn apply(&self, response: ApiResponse) -> FetcherResult<ApiResponse> {
        let in_progress = response
            .json()
            .and_then(|body| body.get("status"))
            .and_then(Value::as_str)
            .is_some_and(|status| status.eq_ignore_ascii_case(IN_PROGRESS_STATUS));

        if in_progress {
            return Err(FetcherError::StillProcessing);
        }
        Ok(response)
    }
}

/// Ordered chain of stages
#[derive(Clone)]
pub struct ResponsePipeline {
    stages: Vec<Arc<dyn ResponseStage>>,
}

impl Default for ResponsePipeline {
    fn default() -> Self {
        Self::standard()
    }
}

impl ResponsePipeline {
    /// JSON decoding followed by the polling check.
    pub fn standard() -> Self {
        Self {
            stages: vec![Arc::new(ExpectJson), Arc::new(PollingCheck)],
        }
    }

    pub fn empty() -> Self {
        Self { stages: Vec::new() }
    }

    pub fn with_stage(mut self, stage: Arc<dyn ResponseStage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage in order, stopping at the first rejection.
    pub fn run(&self, response: ApiResponse) -> FetcherResult<ApiResponse> {
        self.stages
            .iter()
            .try_fold(response, |response, stage| stage.apply(response))
    }
}
