use std::time::Duration;

use bytes::Bytes;
use deluge_http::{HttpClient, HttpRequest, HttpTransportErrorKind};
use deluge_testserver::TestServer;

type TestResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::test]
async fn status_codes_are_passed_through() -> TestResult {
    let server = TestServer::start().await?;
    let client = HttpClient::default();

    for code in [200_u16, 201, 404, 503] {
        let res = client.get(&server.urls().status(code)).await?;
        assert_eq!(res.status, code);
    }
    assert_eq!(server.stats().requests_total(), 4);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn echo_sends_headers_and_body() -> TestResult {
    let server = TestServer::start().await?;
    let client = HttpClient::default();

    let req = HttpRequest::post(&server.urls().echo, Bytes::from_static(b"ping"))
        .with_header("x-test", "1");
    let res = client.request(req).await?;

    assert_eq!(res.status, 200);
    assert_eq!(res.body_utf8(), Some("ping"));
    assert!(res.headers.iter().all(|(k, _)| k == &k.to_ascii_lowercase()));
    assert_eq!(server.stats().saw_test_header(), 1);
    assert_eq!(server.stats().saw_ping_body(), 1);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn head_timeout_is_reported_as_timeout() -> TestResult {
    let server = TestServer::start().await?;
    let client = HttpClient::default();

    let mut req = HttpRequest::get(&server.urls().slow);
    req.timeout = Some(Duration::from_millis(5));

    let err = match client.send(req).await {
        Ok(_) => return Err("expected timeout".into()),
        Err(err) => err,
    };
    assert_eq!(err.transport_error_kind(), HttpTransportErrorKind::Timeout);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn pending_response_resolves_body_after_head() -> TestResult {
    let server = TestServer::start().await?;
    let client = HttpClient::default();

    let pending = client.send(HttpRequest::get(&server.urls().hello)).await?;
    assert_eq!(pending.status, 200);

    let res = pending.into_response().await?;
    assert_eq!(res.body_utf8(), Some("Hello World!"));

    server.shutdown().await;
    Ok(())
}
