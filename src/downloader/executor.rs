//! Export run driver
//!
//! Cursor -> count probe -> paged fetch into the JSON sink -> cursor update.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

use crate::config::ExportConfig;
use crate::downloader::job::RunOutcome;
use crate::downloader::progress::ProgressTracker;
use crate::downloader::rate_limit::RateLimiter;
use crate::downloader::DownloadError;
use crate::fetcher::{CatalogClient, HttpTransport, PageFetcher, PaginationOrchestrator};
use crate::identifier::OrgId;
use crate::output::{JsonArraySink, RecordSink};
use crate::resume::cursor::{format_timestamp, CursorStore};

/// Runs one export for the configured organization
pub struct ExportExecutor {
    config: ExportConfig,
    client: Arc<CatalogClient>,
    cursor_store: CursorStore,
    progress_tracker: ProgressTracker,
    start_time: DateTime<Utc>,
}

impl ExportExecutor {
    /// Validate `config` and build the HTTP client, limiter and retry policy
    /// from it. The run start time is captured now.
    pub fn new(config: ExportConfig) -> Result<Self, DownloadError> {
        let start_time = Utc::now();
        config.validate()?;

        let transport = Arc::new(HttpTransport::with_defaults()?);
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_settings()));
        let client = Arc::new(CatalogClient::new(
            transport,
            rate_limiter,
            config.retry_policy(),
        ));

        Ok(Self::assemble(config, client, start_time))
    }

    /// Executor over an existing client (custom transport or limiter).
    pub fn with_client(config: ExportConfig, client: Arc<CatalogClient>) -> Result<Self, DownloadError> {
        let start_time = Utc::now();
        config.validate()?;
        Ok(Self::assemble(config, client, start_time))
    }

    fn assemble(config: ExportConfig, client: Arc<CatalogClient>, start_time: DateTime<Utc>) -> Self {
        let cursor_store = CursorStore::new(config.cursor_path.clone());
        Self {
            config,
            client,
            cursor_store,
            progress_tracker: ProgressTracker::default(),
            start_time,
        }
    }

    /// Override the run start time (stored as the next cursor).
    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn with_progress_tracker(mut self, tracker: ProgressTracker) -> Self {
        self.progress_tracker = tracker;
        self
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Run the export.
    ///
    /// # Errors
    /// Run-fatal failures only: configuration, the count probe, or output I/O.
    /// Failed pages are reported in the returned [`RunOutcome`].
    pub async fn execute(&self) -> Result<RunOutcome, DownloadError> {
        let org_id = self.config.org_id()?;
        let span = tracing::info_span!("export", org_id = %org_id);
        self.run(org_id).instrument(span).await
    }

    async fn run(&self, org_id: OrgId) -> Result<RunOutcome, DownloadError> {
        info!(
            started = %format_timestamp(self.start_time),
            "{} {} export started",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        );
        debug!(config = ?self.config.redacted(), "Effective configuration");

        let mut template = self.config.request_template()?;

        if let Some(updated_since) = &self.config.request.updated_since {
            info!(updated_since = %updated_since, "Using configured updatedSince, last run cursor ignored");
        } else if let Some(last_run) = self.load_cursor(org_id).await {
            template = template.with_updated_since(Some(format_timestamp(last_run)));
        } else {
            info!("No usable last run cursor, requesting all records");
        }

        let fetcher = PageFetcher::new(Arc::clone(&self.client));
        let count = fetcher
            .probe_count(&template)
            .await
            .map_err(DownloadError::CountProbe)?;
        info!(total = count.total, "Total records to download: {}", count.total);

        if count.total == 0 {
            info!("No records to download");
            return Ok(RunOutcome::empty());
        }
        if count.paging_request_id.is_some() {
            template = template.with_paging_request_id(count.paging_request_id.clone());
        }

        let output_path = self.config.output_paths(self.start_time).results_file();
        let sink: Arc<dyn RecordSink> =
            Arc::new(JsonArraySink::create(&output_path, self.config.output.include_bom).await?);

        let orchestrator =
            PaginationOrchestrator::new(fetcher).with_progress(self.progress_tracker.clone());
        let outcome = orchestrator
            .fetch_all(Arc::new(template), count.total, sink)
            .await?;

        if outcome.is_complete() {
            self.store_cursor(org_id).await;
        } else {
            warn!(
                failed_pages = outcome.failed_pages.len(),
                "Last run cursor not updated because some pages failed"
            );
        }

        let elapsed = (Utc::now() - self.start_time).to_std().unwrap_or_default();
        info!(
            status = ?outcome.status(),
            elapsed_secs = elapsed.as_secs_f64(),
            "{} export finished",
            env!("CARGO_PKG_NAME")
        );
        Ok(outcome)
    }

    /// Cursor file I/O and its advisory lock block, so they run off the runtime.
    async fn load_cursor(&self, org_id: OrgId) -> Option<DateTime<Utc>> {
        let store = self.cursor_store.clone();
        let span = tracing::Span::current();
        match tokio::task::spawn_blocking(move || span.in_scope(|| store.load(&org_id))).await {
            Ok(last_run) => last_run,
            Err(e) => {
                warn!(error = %e, "Last run cursor load did not complete, requesting all records");
                None
            }
        }
    }

    async fn store_cursor(&self, org_id: OrgId) {
        let store = self.cursor_store.clone();
        let start_time = self.start_time;
        let span = tracing::Span::current();
        let saved =
            tokio::task::spawn_blocking(move || span.in_scope(|| store.store(&org_id, start_time)))
                .await;
        match saved {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Failed to save last run cursor"),
            Err(e) => error!(error = %e, "Cursor save task did not complete"),
        }
    }
}
