//! Attempt ceilings per failure class

use crate::common::{client_with, connection_refused, fast_policy, http_error, ok_body, ScriptedTransport, ORG};
use catalog_export::fetcher::{
    FetcherError, HttpTransport, NetworkErrorKind, RequestTemplate, Transport,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn template() -> RequestTemplate {
    RequestTemplate::for_org("https://api.example.com", ORG, "token").unwrap()
}

#[tokio::test]
async fn test_network_failures_use_no_response_ceiling() {
    let transport = ScriptedTransport::new(|_, _| connection_refused());
    let client = client_with(transport.clone(), fast_policy(5, 3));

    let err = client.send(&template().page_spec(0)).await.unwrap_err();

    assert_eq!(transport.calls(), 3);
    assert!(matches!(err, FetcherError::RetriesExhausted { attempts: 3, .. }));
    assert!(matches!(err.root(), FetcherError::Network { .. }));
}

#[tokio::test]
async fn test_server_errors_use_error_response_ceiling() {
    let transport = ScriptedTransport::new(|_, _| http_error(500));
    let client = client_with(transport.clone(), fast_policy(4, 2));

    let err = client.send(&template().page_spec(0)).await.unwrap_err();

    assert_eq!(transport.calls(), 4);
    assert!(matches!(err.root(), FetcherError::Http { status: 500, .. }));
}

#[tokio::test]
async fn test_client_error_is_terminal() {
    let transport = ScriptedTransport::new(|_, _| http_error(404));
    let client = client_with(transport.clone(), fast_policy(5, 5));

    let err = client.send(&template().page_spec(0)).await.unwrap_err();

    assert_eq!(transport.calls(), 1);
    assert!(matches!(err, FetcherError::Http { status: 404, .. }));
}

#[tokio::test]
async fn test_listed_status_is_retried() {
    let transport = ScriptedTransport::new(|call, _| {
        if call < 3 {
            http_error(429)
        } else {
            ok_body("[]")
        }
    });
    let client = client_with(transport.clone(), fast_policy(5, 5));

    assert!(client.send(&template().page_spec(0)).await.is_ok());
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn test_recovers_after_transient_failure() {
    let transport = ScriptedTransport::new(|call, _| match call {
        1 => connection_refused(),
        2 => http_error(503),
        _ => ok_body(r#"[{"id": 1}]"#),
    });
    let client = client_with(transport.clone(), fast_policy(5, 5));

    let response = client.send(&template().page_spec(0)).await.unwrap();
    assert_eq!(response.into_records().len(), 1);
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn test_polls_while_in_progress() {
    let transport = ScriptedTransport::new(|call, _| {
        if call <= 2 {
            ok_body(r#"{"status": "in_progress"}"#)
        } else {
            ok_body(r#"[{"id": 1}, {"id": 2}]"#)
        }
    });
    let client = client_with(transport.clone(), fast_policy(4, 4));

    let response = client.send(&template().page_spec(0)).await.unwrap();
    assert_eq!(response.into_records().len(), 2);
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn test_polling_gives_up_at_ceiling() {
    let transport = ScriptedTransport::new(|_, _| ok_body(r#"{"status": "IN_PROGRESS"}"#));
    let client = client_with(transport.clone(), fast_policy(3, 3));

    let err = client.send(&template().page_spec(0)).await.unwrap_err();
    assert_eq!(transport.calls(), 3);
    assert!(matches!(err.root(), FetcherError::StillProcessing));
}

#[tokio::test]
async fn test_non_json_body_is_retried() {
    let transport = ScriptedTransport::new(|call, _| {
        if call == 1 {
            ok_body("<html>gateway</html>")
        } else {
            ok_body("[]")
        }
    });
    let client = client_with(transport.clone(), fast_policy(3, 3));

    let response = client.send(&template().page_spec(0)).await.unwrap();
    assert!(response.into_records().is_empty());
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_timeouts_use_no_response_ceiling() {
    let server = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([]))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::with_defaults().unwrap());
    let client = client_with(transport, fast_policy(5, 2));
    let template = RequestTemplate::for_org(server.uri(), ORG, "token")
        .unwrap()
        .with_timeout(Duration::from_millis(50));

    let err = client.send(&template.page_spec(0)).await.unwrap_err();

    assert!(matches!(err, FetcherError::RetriesExhausted { attempts: 2, .. }));
    assert!(matches!(
        err.root(),
        FetcherError::Network {
            kind: NetworkErrorKind::Timeout,
            ..
        }
    ));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}
