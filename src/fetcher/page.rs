//! Single-page fetcher
//!
//! Turns one offset into one [`PageResult`], handing every returned record to
//! the sink before resolving. Also issues the count probe that sizes a run.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::fetcher::client::CatalogClient;
use crate::fetcher::request::RequestTemplate;
use crate::fetcher::{FetcherError, FetcherResult};
use crate::output::RecordSink;

/// Header carrying the total number of matching records
pub const TOTAL_COUNT_HEADER: &str = "x-total-count";

/// Header carrying the paging session id to reuse on every page
pub const PAGING_REQUEST_ID_HEADER: &str = "x-paging-request-id";

/// Size of a run, as reported by the probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordCount {
    pub total: u64,
    pub paging_request_id: Option<String>,
}

/// Outcome of one successfully fetched page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResult {
    /// Records returned (0 if the body was not an array)
    pub count: u64,
    /// Requested window start (the offset)
    pub start: u64,
    /// Requested window end (exclusive)
    pub end: u64,
    /// Round trip of the successful attempt
    pub duration: Duration,
    /// When the successful attempt was sent
    pub sent: DateTime<Utc>,
    pub correlation_id: String,
}

/// Fetches pages through the shared client
#[derive(Clone)]
pub struct PageFetcher {
    client: Arc<CatalogClient>,
}

impl PageFetcher {
    pub fn new(client: Arc<CatalogClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<CatalogClient> {
        &self.client
    }

    /// Ask for a single record to learn the total count.
    ///
    /// # Errors
    /// Transport failures propagate; a missing or non-numeric
    /// `x-total-count` header is `InvalidResponse`.
    pub async fn probe_count(&self, template: &RequestTemplate) -> FetcherResult<RecordCount> {
        let spec = template.probe_spec();
        let response = self.client.send(&spec).await?;

        let raw_total = response.header(TOTAL_COUNT_HEADER).ok_or_else(|| {
            FetcherError::InvalidResponse(format!("missing {TOTAL_COUNT_HEADER} header"))
        })?;
        let total = raw_total.trim().parse::<u64>().map_err(|e| {
            FetcherError::InvalidResponse(format!(
                "invalid {TOTAL_COUNT_HEADER} header '{raw_total}': {e}"
            ))
        })?;
        let paging_request_id = response
            .header(PAGING_REQUEST_ID_HEADER)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        debug!(
            correlation_id = %spec.correlation_id(),
            total,
            paging_request_id = ?paging_request_id,
            "Record count probe complete"
        );

        Ok(RecordCount {
            total,
            paging_request_id,
        })
    }

    /// Fetch the page at `offset` and write its records to `sink` in
    /// response order.
    pub async fn fetch_page(
        &self,
        template: &RequestTemplate,
        offset: u64,
        sink: &dyn RecordSink,
    ) -> FetcherResult<PageResult> {
        let spec = template.page_spec(offset);
        let start = offset;
        let end = offset.saturating_add(u64::from(spec.max()));

        let response = self.client.send(&spec).await?;
        let timings = response.timings;
        let records = response.into_records();
        let count = records.len() as u64;

        sink.write_batch(&records).await?;

        info!(
            correlation_id = %spec.correlation_id(),
            offset,
            duration_ms = timings.duration.as_millis(),
            records = count,
            "Records Requested: {} to {}, Records Returned: {}",
            start,
            end,
            count
        );

        Ok(PageResult {
            count,
            start,
            end,
            duration: timings.duration,
            sent: timings.sent,
            correlation_id: spec.correlation_id().to_string(),
        })
    }
}
