//! Integration tests for the tether HTTP client

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mockall::mock;
use serde_json::json;
use tether_core::{EventBus, EventName, KeyValueStore, MemoryStore, Role};
use tether_http::types::{LogoutRequest, RefreshRequest};
use tether_http::client::{HttpRequest, HttpResponse, Transport, TransportError};
use tether_http::{AuthClient, ClientError, FailureSink, ServerCode};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

mock! {
    Sink {}
    impl FailureSink for Sink {
        fn on_failure(&self, path: &str, error: &ClientError);
    }
}

fn client_for(server: &MockServer, store: Arc<MemoryStore>) -> AuthClient {
    AuthClient::builder()
        .base_url(server.uri())
        .store(store)
        .retries(0)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_client_builder() {
    let client = AuthClient::builder()
        .base_url("http://localhost:5000/")
        .timeout(Duration::from_secs(3))
        .retries(4)
        .build()
        .unwrap();

    assert_eq!(client.base_url(), "http://localhost:5000");
    assert_eq!(client.config().timeout_ms, 3000);
    assert_eq!(client.config().retries, 4);
}

#[tokio::test]
async fn test_client_builder_requires_base_url() {
    let result = AuthClient::builder().build();
    assert!(matches!(result, Err(ClientError::Configuration(_))));
}

#[tokio::test]
async fn test_stored_access_token_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/dashboard"))
        .and(header("authorization", "Bearer access-1"))
        .and(header("x-token-type", "access"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "username": "ana", "rol": "User", "device_id": "d-1", "exp": 1_900_000_000, "jti": "j"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    store.set("access_token", "access-1").unwrap();
    let client = client_for(&server, store);

    let dashboard = client.dashboard(Role::User).await.unwrap();
    assert_eq!(dashboard.device_id, "d-1");
    assert_eq!(dashboard.jti.as_deref(), Some("j"));
}

#[tokio::test]
async fn test_text_and_json_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/profile"))
        .and(body_json(json!({"name": "ana"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"saved": true})))
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(MemoryStore::new()));

    let text = client.get("/health").await.unwrap();
    assert_eq!(text, tether_http::ResponseBody::Text("ok".into()));

    let saved = client.put("/profile", &json!({"name": "ana"})).await.unwrap();
    assert_eq!(saved.as_json(), Some(&json!({"saved": true})));
}

/// Transport that never answers, noting when each attempt went out
#[derive(Debug, Default)]
struct StalledTransport {
    sent_at: Mutex<Vec<tokio::time::Instant>>,
}

#[async_trait]
impl Transport for StalledTransport {
    async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.sent_at.lock().unwrap().push(tokio::time::Instant::now());
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(TransportError::new("unreachable"))
    }
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_use_the_retry_budget() {
    let transport = Arc::new(StalledTransport::default());
    let events = EventBus::new();
    let notices = Arc::new(AtomicUsize::new(0));
    let counter = notices.clone();
    events.subscribe(EventName::Notice, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let client = AuthClient::builder()
        .base_url("http://tether.test")
        .transport(transport.clone())
        .timeout(Duration::from_millis(50))
        .retries(2)
        .retry_delay(Duration::from_millis(100))
        .events(events)
        .build()
        .unwrap();

    let result = client.post("/slow", &json!({})).await;
    assert!(matches!(
        result,
        Err(ClientError::Timeout { ref resource, deadline })
            if resource.ends_with("/slow") && deadline == Duration::from_millis(50)
    ));

    // each gap is one deadline plus the backoff: 100ms, then 200ms
    let sent_at = transport.sent_at.lock().unwrap().clone();
    assert_eq!(sent_at.len(), 3);
    assert_eq!(sent_at[1] - sent_at[0], Duration::from_millis(150));
    assert_eq!(sent_at[2] - sent_at[1], Duration::from_millis(250));
    assert_eq!(notices.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_error_body_that_is_not_json_keeps_status() {
    let server = MockServer::start().await;
    Mock::given(path("/gateway"))
        .respond_with(
            ResponseTemplate::new(502).set_body_raw("<html>Bad Gateway</html>", "application/json"),
        )
        .expect(1)
        .mount(&server)
        .await;
    let client = client_for(&server, Arc::new(MemoryStore::new()));

    let err = client.get("/gateway").await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::RequestFailed { status: 502, ref message, .. }
            if message == "<html>Bad Gateway</html>"
    ));
}

#[tokio::test]
async fn test_retry_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"msg": "boom"})))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"msg": "done"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = AuthClient::builder()
        .base_url(server.uri())
        .retry_delay(Duration::from_millis(10))
        .build()
        .unwrap();

    let body = client.delete("/flaky").await.unwrap();
    assert_eq!(body.as_json().unwrap()["msg"], "done");
}

#[tokio::test]
async fn test_error_classification() {
    let server = MockServer::start().await;
    Mock::given(path("/bad"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "msg": "Faltan campos", "code": "MISSING_FIELDS"
        })))
        .mount(&server)
        .await;
    Mock::given(path("/blocked"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "msg": "bloqueado", "code": "USER_BLOCKED", "bloqueado_hasta": "2030-01-01T00:00:00Z"
        })))
        .mount(&server)
        .await;
    Mock::given(path("/expired"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "msg": "Token expirado", "code": "Expired"
        })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let client = client_for(&server, store.clone());

    assert!(matches!(
        client.post("/bad", &json!({})).await,
        Err(ClientError::BadRequest { code: ServerCode::MissingFields, .. })
    ));
    assert!(matches!(
        client.post("/blocked", &json!({})).await,
        Err(ClientError::Blocked { until: Some(_), code: ServerCode::UserBlocked, .. })
    ));
    assert!(matches!(
        client.get("/expired").await,
        Err(ClientError::RequestFailed { status: 401, .. })
    ));

    store.set("refresh_token", "refresh-1").unwrap();
    assert!(matches!(
        client.get("/expired").await,
        Err(ClientError::Unauthorized { code: ServerCode::ExpiredSignature, .. })
    ));
}

#[tokio::test]
async fn test_exhausted_failure_reaches_sink() {
    let server = MockServer::start().await;
    Mock::given(path("/boom"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut sink = MockSink::new();
    sink.expect_on_failure()
        .withf(|path, error| path.to_string() == "/boom" && error.status() == Some(500))
        .times(1)
        .return_const(());

    let client = client_for(&server, Arc::new(MemoryStore::new()));
    client.set_failure_sink(Arc::new(sink));

    assert!(client.get("/boom").await.is_err());
}

#[tokio::test]
async fn test_refresh_is_single_shot_without_auth_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .and(|req: &Request| !req.headers.contains_key("authorization"))
        .and(body_json(json!({
            "refresh_token": "refresh-1", "device_id": "d-1", "user_agent": "ua"
        })))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "msg": "Reuso", "code": "ReuseDetected"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut sink = MockSink::new();
    sink.expect_on_failure().times(0);

    let store = Arc::new(MemoryStore::new());
    store.set("access_token", "access-1").unwrap();
    let client = AuthClient::builder()
        .base_url(server.uri())
        .store(store)
        .retry_delay(Duration::from_millis(10))
        .build()
        .unwrap();
    client.set_failure_sink(Arc::new(sink));

    let result = client
        .refresh(&RefreshRequest {
            refresh_token: "refresh-1".into(),
            device_id: "d-1".into(),
            user_agent: "ua".into(),
        })
        .await;
    assert!(matches!(result, Err(ClientError::Blocked { code: ServerCode::ReuseDetected, .. })));
}

#[tokio::test]
async fn test_logout_uses_refresh_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/logout"))
        .and(header("authorization", "Bearer refresh-1"))
        .and(header("x-token-type", "refresh"))
        .and(body_json(json!({
            "access_token": "access-1",
            "refresh_token": "refresh-1",
            "device_id": "d-1",
            "reason": "logout"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"msg": "Sesión cerrada"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Arc::new(MemoryStore::new()));
    let response = client
        .logout(&LogoutRequest {
            access_token: Some("access-1".into()),
            refresh_token: Some("refresh-1".into()),
            device_id: Some("d-1".into()),
            reason: tether_core::LogoutReason::UserRequested,
        })
        .await
        .unwrap();
    assert_eq!(response.msg.as_deref(), Some("Sesión cerrada"));
}
