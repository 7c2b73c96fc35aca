//! End-to-end interception through a transport slot

mod common;

use std::sync::Arc;

use common::{init_test_logging, request, spawn_server};
use hyper::body::Bytes;
use hyper::{Request, StatusCode};
use stubwire::{
    cookies, reason_phrase, CallsLimit, Mock, MockConfig, RequestSpec, ResponseTemplate,
    StubwireError, Transport, TransportSlot,
};

fn get(url: &str) -> Request<Bytes> {
    request("GET", url)
}

#[tokio::test]
async fn test_simple_body() -> anyhow::Result<()> {
    init_test_logging();
    let slot = TransportSlot::http();
    let mock = Mock::new();
    mock.add("http://example.com", "ok")?;

    mock.activate(&slot, || async {
        let response = slot.send(get("http://example.com/")).await?;
        assert_eq!(response.body(), "ok");

        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].request.url, "http://example.com/");
        Ok::<_, anyhow::Error>(())
    })
    .await
}

#[tokio::test]
async fn test_default_error() -> anyhow::Result<()> {
    init_test_logging();
    let slot = TransportSlot::http();
    let mock = Mock::new();
    mock.add("http://example.com", ResponseTemplate::new())?;

    mock.activate(&slot, || async {
        let err = slot.send(get("http://example.com/foo")).await.unwrap_err();
        assert!(err.is_connection_refused());
        assert_eq!(err.to_string(), "Connection refused: GET http://example.com/foo");

        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].request.url, "http://example.com/foo");
        assert!(calls[0].outcome.is_failure());

        slot.send(get("http://example.com/")).await?;
        Ok::<_, anyhow::Error>(())
    })
    .await
}

#[tokio::test]
async fn test_arbitrary_status_code() {
    let slot = TransportSlot::http();
    let mock = Mock::new();
    mock.add(
        "http://example.com/",
        ResponseTemplate::from("test").status(StatusCode::IM_A_TEAPOT),
    )
    .unwrap();

    let scope = mock.start(&slot).unwrap();
    let response = slot.send(get("http://example.com/")).await.unwrap();
    assert_eq!(response.status().as_u16(), 418);
    assert_eq!(reason_phrase(&response), Some("I'm a teapot"));
    scope.stop(true).unwrap();
}

#[tokio::test]
async fn test_response_cookies() {
    let slot = TransportSlot::http();
    let mock = Mock::new();
    let cookie_header = "session_id=12345; a=b; c=d";
    mock.add(
        RequestSpec::any()
            .url("http://example.com/")
            .header("set-cookie", cookie_header),
        "test",
    )
    .unwrap();

    let scope = mock.start(&slot).unwrap();
    let request = Request::get("http://example.com/")
        .header("set-cookie", cookie_header)
        .body(Bytes::new())
        .unwrap();
    let response = slot.send(request).await.unwrap();

    assert_eq!(response.body(), "test");
    assert_eq!(response.status(), StatusCode::OK);
    let jar = cookies(&response).unwrap();
    assert!(jar.contains("session_id"));
    assert_eq!(jar.get("session_id"), Some("12345"));
    assert_eq!(jar.get("a"), Some("b"));
    assert_eq!(jar.get("c"), Some("d"));

    let calls = mock.calls();
    let recorded = calls[0].outcome.response().unwrap();
    assert_eq!(recorded.cookies.as_ref(), Some(jar));
    scope.stop(true).unwrap();
}

#[tokio::test]
async fn test_arbitrary_headers() {
    let slot = TransportSlot::http();
    let mock = Mock::new();
    mock.add(
        RequestSpec::any()
            .url("http://example.com/")
            .header("some-header", "request"),
        ResponseTemplate::from("test").header("some-header", "response"),
    )
    .unwrap();

    let scope = mock.start(&slot).unwrap();

    let mismatch = Request::get("http://example.com/")
        .header("some", "request")
        .body(Bytes::new())
        .unwrap();
    assert!(slot.send(mismatch).await.unwrap_err().is_connection_refused());

    let matching = Request::get("http://example.com/")
        .header("Some-Header", "request")
        .body(Bytes::new())
        .unwrap();
    let response = slot.send(matching).await.unwrap();
    assert_eq!(response.body(), "test");
    assert_eq!(response.headers().len(), 1);
    assert_eq!(response.headers()["some-header"], "response");

    scope.stop(true).unwrap();
}

#[tokio::test]
async fn test_headers_mismatch_and_extra() {
    let slot = TransportSlot::http();
    let mock = Mock::new();
    mock.add(RequestSpec::any().header("h", "1"), "ok").unwrap();

    let scope = mock.start(&slot).unwrap();

    let wrong = Request::get("http://x/").header("h", "2").body(Bytes::new()).unwrap();
    assert!(slot.send(wrong).await.unwrap_err().is_connection_refused());

    let extra = Request::get("http://x/")
        .header("h", "1")
        .header("x", "y")
        .body(Bytes::new())
        .unwrap();
    assert_eq!(slot.send(extra).await.unwrap().body(), "ok");

    scope.stop(true).unwrap();
}

#[tokio::test]
async fn test_handles_unicode_url() {
    let slot = TransportSlot::http();
    let mock = Mock::new();
    let unicode = "http://www.संजाल.भारत/hi/वेबसाइट-डिजाइन";
    mock.add(unicode, "ok").unwrap();

    // Clients put the ASCII serialization on the wire
    let wire = url::Url::parse(unicode).unwrap();
    let scope = mock.start(&slot).unwrap();
    let response = slot.send(get(wire.as_str())).await.unwrap();

    assert_eq!(response.body(), "ok");
    assert_eq!(mock.calls().len(), 1);
    scope.stop(true).unwrap();
}

#[tokio::test]
async fn test_query_matching() {
    let slot = TransportSlot::http();
    let mock = Mock::new();
    let registered = "http://example.com/test?type=2&ie=utf8&query=汉";
    mock.add(registered, "ok").unwrap();

    let scope = mock.start(&slot).unwrap();

    let other = url::Url::parse("http://example.com/test?type=2&ie=utf8&query=汉字").unwrap();
    assert!(slot.send(get(other.as_str())).await.unwrap_err().is_connection_refused());

    let same = url::Url::parse(registered).unwrap();
    assert_eq!(slot.send(get(same.as_str())).await.unwrap().body(), "ok");

    scope.stop(true).unwrap();
}

#[tokio::test]
async fn test_query_subset() {
    let slot = TransportSlot::http();
    let mock = Mock::new();
    mock.add_with_limit("http://x/?a=1", "ok", CallsLimit::Unlimited)
        .unwrap();

    let scope = mock.start(&slot).unwrap();
    assert!(slot.send(get("http://x/?a=1&b=2")).await.is_ok());
    assert!(slot
        .send(get("http://x/?a=2"))
        .await
        .unwrap_err()
        .is_connection_refused());
    scope.stop(false).unwrap();
}

#[tokio::test]
async fn test_http_method_match() {
    for method in ["GET", "POST", "PUT"] {
        let slot = TransportSlot::http();
        let mock = Mock::new();
        mock.add(
            RequestSpec::any().url("http://example.com/test").method(method),
            "ok",
        )
        .unwrap();

        mock.activate(&slot, || async {
            let response = slot.send(request(method, "http://example.com/test")).await?;
            assert_eq!(response.body(), "ok");
            Ok::<_, StubwireError>(())
        })
        .await
        .unwrap();
    }
}

#[tokio::test]
async fn test_multiple_urls() {
    let slot = TransportSlot::http();
    let mock = Mock::new();
    mock.add("http://example.com/one", "one ok").unwrap();
    mock.add("http://example.com/two", "two ok").unwrap();

    let scope = mock.start(&slot).unwrap();
    assert_eq!(slot.send(get("http://example.com/one")).await.unwrap().body(), "one ok");
    assert_eq!(slot.send(get("http://example.com/two")).await.unwrap().body(), "two ok");
    scope.stop(true).unwrap();
}

#[tokio::test]
async fn test_same_url_consumed_in_order() {
    let slot = TransportSlot::http();
    let mock = Mock::new();
    mock.add("http://example.com/", "one ok").unwrap();
    mock.add("http://example.com/", "two ok").unwrap();

    let scope = mock.start(&slot).unwrap();
    assert_eq!(slot.send(get("http://example.com/")).await.unwrap().body(), "one ok");
    assert_eq!(slot.send(get("http://example.com/")).await.unwrap().body(), "two ok");
    scope.stop(true).unwrap();
}

#[tokio::test]
async fn test_default_calls_limit() {
    let slot = TransportSlot::http();
    let mock = Mock::new();
    mock.add("http://example.com/one", ResponseTemplate::new()).unwrap();

    let scope = mock.start(&slot).unwrap();
    slot.send(get("http://example.com/one")).await.unwrap();
    assert!(slot
        .send(get("http://example.com/one"))
        .await
        .unwrap_err()
        .is_connection_refused());
    scope.stop(true).unwrap();
}

#[tokio::test]
async fn test_calls_limit_param() {
    let slot = TransportSlot::http();
    let mock = Mock::new();
    mock.add_with_limit("http://example.com/one", "ok", CallsLimit::Times(3))
        .unwrap();

    let scope = mock.start(&slot).unwrap();
    for _ in 0..3 {
        assert_eq!(slot.send(get("http://example.com/one")).await.unwrap().body(), "ok");
    }
    assert!(slot
        .send(get("http://example.com/one"))
        .await
        .unwrap_err()
        .is_connection_refused());
    assert_eq!(mock.calls().len(), 4);
    scope.stop(true).unwrap();
}

#[tokio::test]
async fn test_unlimited_calls() {
    let slot = TransportSlot::http();
    let mock = Mock::new();
    mock.add_with_limit("http://example.com/one", "ok", CallsLimit::Unlimited)
        .unwrap();

    let scope = mock.start(&slot).unwrap();
    for _ in 0..20 {
        slot.send(get("http://example.com/one")).await.unwrap();
    }
    // Unlimited expectations are never exhausted
    assert!(scope.stop(true).is_err());
}

#[tokio::test]
async fn test_not_called_raises_on_clean_exit() {
    let slot = TransportSlot::http();
    let mock = Mock::new();
    mock.add(RequestSpec::any().url("http://example.com/").method("GET"), "ok")
        .unwrap();

    let err = mock
        .activate(&slot, || async { Ok::<_, StubwireError>(()) })
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Not all mocked requests have been called: GET http://example.com/"
    );
    assert!(!slot.is_intercepted());
}

#[derive(Debug)]
enum TestFailure {
    Body(&'static str),
    Mock(StubwireError),
}

impl From<StubwireError> for TestFailure {
    fn from(e: StubwireError) -> Self {
        Self::Mock(e)
    }
}

#[tokio::test]
async fn test_body_error_wins_over_not_called() {
    let slot = TransportSlot::http();
    let mock = Mock::new();
    mock.add("http://example.com/", "ok").unwrap();

    let result = mock
        .activate(&slot, || async { Err::<(), _>(TestFailure::Body("boom")) })
        .await;

    assert!(matches!(result, Err(TestFailure::Body("boom"))));
    assert!(!slot.is_intercepted());
    assert_eq!(mock.pending_count(), 0);
}

#[tokio::test]
async fn test_calls_reset_after_scope() {
    let slot = TransportSlot::http();
    let mock = Mock::new();
    mock.add("http://example.com/", "ok").unwrap();

    let scope = mock.start(&slot).unwrap();
    slot.send(get("http://example.com/")).await.unwrap();
    assert_eq!(scope.calls().len(), 1);
    scope.stop(true).unwrap();

    assert!(mock.calls().is_empty());
}

#[test]
fn test_panic_restores_slot() {
    let slot = TransportSlot::http();
    let mock = Mock::new();
    mock.add("http://example.com/", "ok").unwrap();

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _scope = mock.start(&slot).unwrap();
        panic!("test body failed");
    }));

    assert!(result.is_err());
    assert!(!slot.is_intercepted());
    assert!(!mock.is_active());
}

#[tokio::test]
async fn test_passthrough_to_local_server() {
    init_test_logging();
    let addr = spawn_server("real").await;
    let slot = TransportSlot::http();
    let mock = Mock::new();
    let real_url = format!("http://{addr}/passthru");
    mock.add(real_url.as_str(), ResponseTemplate::new().passthrough())
        .unwrap();
    mock.add(format!("http://{addr}/mocked"), "mocked").unwrap();

    let scope = mock.start(&slot).unwrap();

    let response = slot.send(get(&real_url)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body(), "real /passthru");

    let response = slot.send(get(&format!("http://{addr}/mocked"))).await.unwrap();
    assert_eq!(response.body(), "mocked");

    let calls = scope.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].outcome.response().unwrap().body, "real /passthru");

    scope.stop(true).unwrap();

    // Restored transport reaches the server again
    let response = slot.send(get(&format!("http://{addr}/after"))).await.unwrap();
    assert_eq!(response.body(), "real /after");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_consume_exactly_once() {
    let slot = TransportSlot::http();
    let mock = Mock::new();
    mock.add_with_limit("http://example.com/", "ok", CallsLimit::Times(50))
        .unwrap();

    let scope = mock.start(&slot).unwrap();

    let mut handles = Vec::new();
    for _ in 0..100 {
        let slot = slot.clone();
        handles.push(tokio::spawn(async move {
            slot.send(get("http://example.com/")).await.is_ok()
        }));
    }

    let mut served = 0;
    for handle in handles {
        if handle.await.unwrap() {
            served += 1;
        }
    }

    assert_eq!(served, 50);
    assert_eq!(scope.calls().len(), 100);
    scope.stop(true).unwrap();
}

#[tokio::test]
async fn test_mock_from_config() {
    let config = MockConfig::from_toml_str(
        r#"
        [[expectations]]
        url = "http://api.example.com/users?page=1"
        method = "GET"
        headers = { accept = "application/json" }

        [expectations.response]
        status = 200
        body = "[]"
        headers = { content-type = "application/json" }

        [[expectations]]
        url = "http://api.example.com/health"
        calls_limit = 2
        response = { status = 204 }
        "#,
    )
    .unwrap();

    let slot = TransportSlot::http();
    let mock = Mock::from_config(&config).unwrap();
    assert_eq!(mock.pending_count(), 2);

    mock.activate(&slot, || async {
        let users = Request::get("http://api.example.com/users?page=1&sort=asc")
            .header("Accept", "application/json")
            .body(Bytes::new())
            .unwrap();
        let response = slot.send(users).await?;
        assert_eq!(response.body(), "[]");
        assert_eq!(response.headers()["content-type"], "application/json");

        for _ in 0..2 {
            let response = slot.send(get("http://api.example.com/health")).await?;
            assert_eq!(response.status(), StatusCode::NO_CONTENT);
        }
        Ok::<_, StubwireError>(())
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_custom_original_transport() {
    struct Refuse;

    impl Transport for Refuse {
        fn send(&self, _request: Request<Bytes>) -> stubwire::transport::TransportFuture<'_> {
            Box::pin(async { Err(StubwireError::Transport("no network".to_string())) })
        }
    }

    let slot = TransportSlot::new(Arc::new(Refuse));
    let mock = Mock::new();
    mock.add("http://x/", ResponseTemplate::new().passthrough())
        .unwrap();

    let scope = mock.start(&slot).unwrap();
    let err = slot.send(get("http://x/")).await.unwrap_err();
    assert!(matches!(err, StubwireError::Transport(_)));
    scope.stop(true).unwrap();
}
