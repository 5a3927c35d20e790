//! End-to-end export runs against a mock catalog API

use crate::common::{client_with, fast_policy, ORG};
use catalog_export::config::ExportConfig;
use catalog_export::downloader::{ExportExecutor, ExportStatus};
use catalog_export::fetcher::{HttpTransport, Transport};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const CATALOG_PATH: &str =
    "/content-discovery/v2/organizations/0b7c5d1e-2f3a-4b5c-8d9e-0f1a2b3c4d5e/catalog-content";

fn config_for(server: &MockServer, dir: &Path) -> ExportConfig {
    let mut config = ExportConfig::default();
    config.request.org_id = Some(ORG.to_string());
    config.request.bearer = Some("test-token".to_string());
    config.request.base_url = Some(server.uri());
    config.output.dir = dir.join("results");
    config.cursor_path = dir.join("lastrun.json");
    config
}

fn executor(config: ExportConfig) -> ExportExecutor {
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::with_defaults().unwrap());
    ExportExecutor::with_client(config, client_with(transport, fast_policy(2, 2)))
        .unwrap()
        .with_start_time(Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap())
}

/// Answers each page with the records in `[offset, offset + max)` up to `total`
fn page_responder(total: u64) -> impl Fn(&Request) -> ResponseTemplate + Send + Sync + 'static {
    move |request: &Request| {
        let param = |name: &str| {
            request
                .url
                .query_pairs()
                .find(|(k, _)| k == name)
                .and_then(|(_, v)| v.parse::<u64>().ok())
        };
        let offset = param("offset").unwrap_or(0);
        let max = param("max").unwrap_or(1000);
        let end = (offset + max).min(total);
        let records: Vec<Value> = (offset..end).map(|id| json!({ "id": id })).collect();
        ResponseTemplate::new(200).set_body_json(records)
    }
}

async fn mount_probe(server: &MockServer, total: u64) {
    Mock::given(method("GET"))
        .and(path(CATALOG_PATH))
        .and(query_param("max", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-total-count", total.to_string().as_str())
                .insert_header("x-paging-request-id", "paging-42")
                .set_body_json(json!([{ "id": 0 }])),
        )
        .expect(1)
        .mount(server)
        .await;
}

fn read_ids(path: &Path) -> Vec<u64> {
    let parsed: Vec<Value> = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    let mut ids: Vec<u64> = parsed.iter().map(|r| r["id"].as_u64().unwrap()).collect();
    ids.sort_unstable();
    ids
}

#[tokio::test]
async fn test_full_export_writes_every_record_and_cursor() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_probe(&server, 2500).await;
    Mock::given(method("GET"))
        .and(path(CATALOG_PATH))
        .and(query_param("max", "1000"))
        .and(query_param("pagingRequestId", "paging-42"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(page_responder(2500))
        .expect(3)
        .mount(&server)
        .await;

    let outcome = executor(config_for(&server, dir.path())).execute().await.unwrap();

    assert_eq!(outcome.status(), ExportStatus::Completed);
    assert_eq!(outcome.records_expected, 2500);
    assert_eq!(outcome.records_downloaded, 2500);
    assert_eq!(outcome.pages_dispatched, 3);
    assert!(outcome.saved);

    let output = outcome.output_path.unwrap();
    assert_eq!(
        output,
        dir.path().join("results").join("20240601_083000_results.json")
    );
    assert_eq!(read_ids(&output), (0..2500).collect::<Vec<_>>());

    let cursor: Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("lastrun.json")).unwrap())
            .unwrap();
    assert_eq!(cursor["orgid"], ORG);
    assert_eq!(cursor["updatedSince"], "2024-06-01T08:30:00.000Z");
}

#[tokio::test]
async fn test_second_run_sends_updated_since() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("lastrun.json"),
        format!(r#"{{"orgid": "{ORG}", "updatedSince": "2024-05-31T00:00:00.000Z"}}"#),
    )
    .unwrap();

    Mock::given(method("GET"))
        .and(path(CATALOG_PATH))
        .and(query_param("max", "1"))
        .and(query_param("updatedSince", "2024-05-31T00:00:00.000Z"))
        .respond_with(ResponseTemplate::new(200).insert_header("x-total-count", "3"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CATALOG_PATH))
        .and(query_param("updatedSince", "2024-05-31T00:00:00.000Z"))
        .and(query_param("max", "1000"))
        .respond_with(page_responder(3))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = executor(config_for(&server, dir.path())).execute().await.unwrap();

    assert_eq!(outcome.records_downloaded, 3);
    assert!(outcome.is_complete());
}

#[tokio::test]
async fn test_zero_records_creates_nothing() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    Mock::given(method("GET"))
        .and(path(CATALOG_PATH))
        .respond_with(ResponseTemplate::new(200).insert_header("x-total-count", "0"))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = executor(config_for(&server, dir.path())).execute().await.unwrap();

    assert_eq!(outcome.status(), ExportStatus::NoRecords);
    assert_eq!(outcome.status().exit_code(), 0);
    assert!(outcome.output_path.is_none());
    assert!(!dir.path().join("results").exists());
    assert!(!dir.path().join("lastrun.json").exists());
}

#[tokio::test]
async fn test_failed_page_skips_cursor() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_probe(&server, 2500).await;
    Mock::given(method("GET"))
        .and(path(CATALOG_PATH))
        .and(query_param("offset", "1000"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CATALOG_PATH))
        .and(query_param("max", "1000"))
        .respond_with(page_responder(2500))
        .mount(&server)
        .await;

    let outcome = executor(config_for(&server, dir.path())).execute().await.unwrap();

    assert_eq!(outcome.status(), ExportStatus::Partial);
    assert_eq!(outcome.status().exit_code(), 2);
    assert_eq!(outcome.failed_offsets(), vec![1000]);
    assert_eq!(outcome.records_downloaded, 1500);
    assert!(outcome.saved);
    assert_eq!(read_ids(&outcome.output_path.unwrap()).len(), 1500);
    assert!(!dir.path().join("lastrun.json").exists());
}

#[tokio::test]
async fn test_server_errors_exhaust_retries_for_one_page() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_probe(&server, 2500).await;
    Mock::given(method("GET"))
        .and(path(CATALOG_PATH))
        .and(query_param("offset", "2000"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CATALOG_PATH))
        .and(query_param("max", "1000"))
        .respond_with(page_responder(2500))
        .mount(&server)
        .await;

    let outcome = executor(config_for(&server, dir.path())).execute().await.unwrap();

    assert_eq!(outcome.failed_offsets(), vec![2000]);
    assert_eq!(outcome.records_downloaded, 2000);
}

#[tokio::test]
async fn test_probe_failure_is_fatal() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    Mock::given(method("GET"))
        .and(path(CATALOG_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = executor(config_for(&server, dir.path())).execute().await;

    assert!(matches!(
        result,
        Err(catalog_export::downloader::DownloadError::CountProbe(_))
    ));
    assert!(!dir.path().join("lastrun.json").exists());
}
