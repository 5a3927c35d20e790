//! Pagination orchestrator
//!
//! Partitions the offset space `0, max, 2*max, ...` up to and including the
//! record count, dispatches every page at once and lets the rate limiter pace
//! them. Pages fail independently; a failed page never cancels its siblings.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::downloader::job::{FailedPage, RunOutcome};
use crate::downloader::progress::ProgressTracker;
use crate::downloader::DownloadError;
use crate::fetcher::page::PageFetcher;
use crate::fetcher::request::RequestTemplate;
use crate::fetcher::retry::RetryErrorType;
use crate::fetcher::FetcherError;
use crate::metrics::ExportMetrics;
use crate::output::RecordSink;

/// Page start offsets for `total_records` records in pages of `page_size`.
///
/// The last offset may equal `total_records`, yielding an empty page when the
/// count is an exact multiple of the page size.
pub fn page_offsets(total_records: u64, page_size: u32) -> Vec<u64> {
    let step = usize::try_from(page_size.max(1)).unwrap_or(usize::MAX);
    (0..=total_records).step_by(step).collect()
}

/// Runs all pages of an export
pub struct PaginationOrchestrator {
    fetcher: PageFetcher,
    progress: ProgressTracker,
}

impl PaginationOrchestrator {
    pub fn new(fetcher: PageFetcher) -> Self {
        Self {
            fetcher,
            progress: ProgressTracker::default(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressTracker) -> Self {
        self.progress = progress;
        self
    }

    /// Fetch every page into `sink`, then finalize it.
    ///
    /// # Errors
    /// Only run-fatal failures: an output error inside any page (reported
    /// after all pages settle, with the sink discarded) or a failure to
    /// finalize the sink. Ordinary page failures are listed in the outcome.
    pub async fn fetch_all(
        &self,
        template: Arc<RequestTemplate>,
        total_records: u64,
        sink: Arc<dyn RecordSink>,
    ) -> Result<RunOutcome, DownloadError> {
        let page_size = template.page_size();
        let offsets = page_offsets(total_records, page_size);
        info!(
            pages = offsets.len(),
            total_records, page_size, "Dispatching page requests"
        );

        let mut tasks = JoinSet::new();
        for &offset in &offsets {
            let fetcher = self.fetcher.clone();
            let template = Arc::clone(&template);
            let sink = Arc::clone(&sink);
            tasks.spawn(async move {
                let result = fetcher.fetch_page(&template, offset, sink.as_ref()).await;
                (offset, result)
            });
        }

        let mut progress = self.progress.create_state(offsets.len(), total_records);
        let mut settled = HashSet::with_capacity(offsets.len());
        let mut failed_pages = Vec::new();
        let mut records_downloaded = 0u64;
        let mut fatal: Option<FetcherError> = None;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((offset, Ok(page))) => {
                    settled.insert(offset);
                    records_downloaded += page.count;
                    progress.record_page(page.count);
                    ExportMetrics::record_page(page.count);
                }
                Ok((offset, Err(err))) => {
                    settled.insert(offset);
                    progress.record_failure();
                    ExportMetrics::record_page_failure(RetryErrorType::from_error(&err).label());
                    error!(offset, error = %err, "Page request failed");

                    if err.is_fatal() {
                        fatal.get_or_insert(err);
                    } else {
                        failed_pages.push(FailedPage {
                            offset,
                            end: offset.saturating_add(u64::from(page_size)),
                            error: err.to_string(),
                        });
                    }
                }
                Err(join_error) => {
                    progress.record_failure();
                    error!(error = %join_error, "Page task did not complete");
                }
            }

            if progress.should_emit_update() {
                info!("{}", progress.format_progress());
                progress.mark_emitted();
            }
        }

        for &offset in offsets.iter().filter(|o| !settled.contains(*o)) {
            failed_pages.push(FailedPage {
                offset,
                end: offset.saturating_add(u64::from(page_size)),
                error: "page task aborted".to_string(),
            });
        }

        if let Some(err) = fatal {
            if let Err(e) = sink.discard().await {
                warn!(error = %e, "Partial output left on disk");
            }
            return Err(match err {
                FetcherError::Output(e) => DownloadError::Output(e),
                other => DownloadError::Fetcher(other),
            });
        }

        let summary = sink.finalize().await?;
        failed_pages.sort_by_key(|page| page.offset);

        info!(
            records_downloaded,
            records_expected = total_records,
            saved = summary.saved,
            "Total records downloaded: {}",
            records_downloaded
        );
        if !failed_pages.is_empty() {
            let offsets: Vec<u64> = failed_pages.iter().map(|p| p.offset).collect();
            warn!(
                failed = failed_pages.len(),
                offsets = ?offsets,
                "Failed to complete download. {} requests failed.",
                failed_pages.len()
            );
        }

        Ok(RunOutcome {
            records_expected: total_records,
            records_downloaded,
            pages_dispatched: offsets.len(),
            failed_pages,
            saved: summary.saved,
            output_path: Some(summary.path),
        })
    }
}
