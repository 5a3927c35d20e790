//! Log output of an export run

use crate::common::{client_with, fast_policy, http_error, ok_body, ScriptedTransport, ORG};
use catalog_export::fetcher::{PageFetcher, RequestTemplate};
use catalog_export::output::{JsonArraySink, RecordSink};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Collects formatted log lines in memory
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn subscriber(logs: &CapturedLogs) -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("catalog_export=debug"))
        .with_writer(logs.clone())
        .with_ansi(false)
        .finish()
}

#[tokio::test]
async fn test_page_log_line() {
    let logs = CapturedLogs::default();
    let _guard = tracing::subscriber::set_default(subscriber(&logs));

    let dir = TempDir::new().unwrap();
    let transport = ScriptedTransport::new(|_, _| ok_body(r#"[{"id": 1}, {"id": 2}]"#));
    let fetcher = PageFetcher::new(client_with(transport, fast_policy(2, 2)));
    let template = RequestTemplate::for_org("https://api.example.com", ORG, "token")
        .unwrap()
        .with_page_size(500);
    let sink = JsonArraySink::create(dir.path().join("out.json"), false)
        .await
        .unwrap();

    fetcher.fetch_page(&template, 1000, &sink).await.unwrap();
    sink.finalize().await.unwrap();

    let output = logs.contents();
    assert!(output.contains("Records Requested: 1000 to 1500, Records Returned: 2"));
}

#[tokio::test]
async fn test_retry_and_failure_are_logged() {
    let logs = CapturedLogs::default();
    let _guard = tracing::subscriber::set_default(subscriber(&logs));

    let transport = ScriptedTransport::new(|_, _| http_error(503));
    let client = client_with(transport, fast_policy(2, 2));
    let template = RequestTemplate::for_org("https://api.example.com", ORG, "token").unwrap();

    assert!(client.send(&template.page_spec(0)).await.is_err());

    let output = logs.contents();
    assert!(output.contains("WARN"));
    assert!(output.contains("Retrying (attempt 2/2)"));
    assert!(output.contains("[FAILED] Request failed after 2 attempt(s)"));
}

