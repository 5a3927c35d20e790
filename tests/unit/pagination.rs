//! Page dispatch and failure isolation with a scripted transport

use crate::common::{client_with, fast_policy, http_error, ok_body, ScriptedTransport, ORG};
use catalog_export::downloader::{DownloadError, ExportStatus};
use catalog_export::fetcher::{PageFetcher, PaginationOrchestrator, RequestSpec, RequestTemplate};
use async_trait::async_trait;
use catalog_export::output::{JsonArraySink, OutputError, OutputResult, RecordSink, SinkSummary};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn records_for(spec: &RequestSpec, total: u64) -> String {
    let offset = spec.offset().unwrap_or(0);
    let end = (offset + u64::from(spec.max())).min(total);
    let records: Vec<Value> = (offset..end).map(|id| json!({ "id": id })).collect();
    Value::Array(records).to_string()
}

/// Writes the first batch, then fails like a full disk.
struct DiskFullSink {
    inner: JsonArraySink,
    batches: AtomicUsize,
}

#[async_trait]
impl RecordSink for DiskFullSink {
    async fn write(&self, record: &Value) -> OutputResult<()> {
        self.write_batch(std::slice::from_ref(record)).await
    }

    async fn write_batch(&self, records: &[Value]) -> OutputResult<()> {
        if self.batches.fetch_add(1, Ordering::SeqCst) == 0 {
            self.inner.write_batch(records).await
        } else {
            Err(OutputError::IoError("No space left on device".to_string()))
        }
    }

    async fn finalize(&self) -> OutputResult<SinkSummary> {
        self.inner.finalize().await
    }

    async fn discard(&self) -> OutputResult<()> {
        self.inner.discard().await
    }
}

fn template(page_size: u32) -> Arc<RequestTemplate> {
    Arc::new(
        RequestTemplate::for_org("https://api.example.com", ORG, "token")
            .unwrap()
            .with_page_size(page_size),
    )
}

#[tokio::test]
async fn test_all_pages_written() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.json");
    let transport = ScriptedTransport::new(|_, spec| ok_body(&records_for(spec, 25)));
    let fetcher = PageFetcher::new(client_with(transport.clone(), fast_policy(3, 3)));
    let sink: Arc<dyn RecordSink> = Arc::new(JsonArraySink::create(&path, false).await.unwrap());

    let outcome = PaginationOrchestrator::new(fetcher)
        .fetch_all(template(10), 25, sink)
        .await
        .unwrap();

    assert_eq!(transport.calls(), 3);
    assert_eq!(outcome.pages_dispatched, 3);
    assert_eq!(outcome.records_downloaded, 25);
    assert_eq!(outcome.status(), ExportStatus::Completed);
    assert!(outcome.saved);

    let parsed: Vec<Value> = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let mut ids: Vec<u64> = parsed.iter().map(|r| r["id"].as_u64().unwrap()).collect();
    ids.sort_unstable();
    assert_eq!(ids, (0..25).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_exact_multiple_requests_trailing_empty_page() {
    let dir = TempDir::new().unwrap();
    let transport = ScriptedTransport::new(|_, spec| ok_body(&records_for(spec, 20)));
    let fetcher = PageFetcher::new(client_with(transport.clone(), fast_policy(3, 3)));
    let sink: Arc<dyn RecordSink> =
        Arc::new(JsonArraySink::create(dir.path().join("out.json"), false).await.unwrap());

    let outcome = PaginationOrchestrator::new(fetcher)
        .fetch_all(template(10), 20, sink)
        .await
        .unwrap();

    assert_eq!(transport.calls(), 3);
    assert_eq!(outcome.records_downloaded, 20);
    assert!(outcome.is_complete());
}

#[tokio::test]
async fn test_failed_page_does_not_stop_siblings() {
    let dir = TempDir::new().unwrap();
    let transport = ScriptedTransport::new(|_, spec| {
        if spec.offset() == Some(10) {
            http_error(500)
        } else {
            ok_body(&records_for(spec, 30))
        }
    });
    let fetcher = PageFetcher::new(client_with(transport.clone(), fast_policy(2, 2)));
    let sink: Arc<dyn RecordSink> =
        Arc::new(JsonArraySink::create(dir.path().join("out.json"), false).await.unwrap());

    let outcome = PaginationOrchestrator::new(fetcher)
        .fetch_all(template(10), 30, sink)
        .await
        .unwrap();

    // 3 good pages (0, 20, 30) plus 2 attempts at offset 10
    assert_eq!(transport.calls(), 5);
    assert_eq!(outcome.records_downloaded, 20);
    assert_eq!(outcome.failed_offsets(), vec![10]);
    assert_eq!(outcome.status(), ExportStatus::Partial);
    assert_eq!(outcome.status().exit_code(), 2);
    assert!(outcome.saved);
}

#[tokio::test]
async fn test_output_failure_is_fatal() {
    let dir = TempDir::new().unwrap();
    let transport = ScriptedTransport::new(|_, spec| ok_body(&records_for(spec, 5)));
    let fetcher = PageFetcher::new(client_with(transport, fast_policy(2, 2)));
    let sink = Arc::new(JsonArraySink::create(dir.path().join("out.json"), false).await.unwrap());
    sink.finalize().await.unwrap();

    let result = PaginationOrchestrator::new(fetcher)
        .fetch_all(template(10), 5, sink)
        .await;

    assert!(matches!(result, Err(DownloadError::Output(_))));
}

#[tokio::test]
async fn test_output_failure_removes_partial_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.json");
    let transport = ScriptedTransport::new(|_, spec| ok_body(&records_for(spec, 25)));
    let fetcher = PageFetcher::new(client_with(transport.clone(), fast_policy(2, 2)));
    let sink = Arc::new(DiskFullSink {
        inner: JsonArraySink::create(&path, false).await.unwrap(),
        batches: AtomicUsize::new(0),
    });
    assert!(path.exists());

    let result = PaginationOrchestrator::new(fetcher)
        .fetch_all(template(10), 25, sink)
        .await;

    assert!(matches!(result, Err(DownloadError::Output(OutputError::IoError(_)))));
    assert_eq!(transport.calls(), 3);
    assert!(!path.exists());
}
