//! Concurrent 401 handling against a real HTTP backend.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rentline_core::testing::RecordingRedirect;
use rentline_core::TokenStore;
use rentline_domain::{ApiError, Config, TokenPair};
use rentline_infra::{ApiClient, MemoryTokenStore};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONCURRENT_REQUESTS: usize = 6;

fn config_for(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.api.base_url = format!("{}/api/v1", server.uri());
    config.health.enabled = false;
    config.auth.login_redirect_delay_ms = 20;
    config
}

async fn mount_expired_token(server: &MockServer) {
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "detail": "Token expired" })),
        )
        .mount(server)
        .await;
}

fn client_with(
    server: &MockServer,
    redirect: &RecordingRedirect,
) -> (ApiClient, Arc<MemoryTokenStore>) {
    let tokens = Arc::new(MemoryTokenStore::with_tokens(TokenPair::new(
        "stale",
        Some("refresh-1".to_string()),
    )));
    let client = ApiClient::builder()
        .config(config_for(server))
        .token_store(tokens.clone())
        .login_redirect(Arc::new(redirect.clone()))
        .build()
        .unwrap();
    (client, tokens)
}

#[tokio::test]
async fn test_concurrent_unauthorized_requests_share_one_refresh() {
    let server = MockServer::start().await;
    mount_expired_token(&server).await;
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(CONCURRENT_REQUESTS as u64)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/token/refresh/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access": "fresh", "refresh": "refresh-2" }))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let redirect = RecordingRedirect::new();
    let (client, tokens) = client_with(&server, &redirect);

    let calls = (0..CONCURRENT_REQUESTS).map(|i| {
        let client = client.clone();
        async move { client.get::<Value>(&format!("/maintenance/{i}/")).await }
    });
    let results = join_all(calls).await;

    for result in results {
        assert_eq!(result.unwrap()["ok"], true);
    }
    assert_eq!(tokens.access_token().await.unwrap().as_deref(), Some("fresh"));
    assert_eq!(tokens.refresh_token().await.unwrap().as_deref(), Some("refresh-2"));
    assert_eq!(client.metrics().refreshes, 1);
    assert_eq!(redirect.count(), 0);
}

#[tokio::test]
async fn test_failed_refresh_rejects_everyone_and_redirects_once() {
    let server = MockServer::start().await;
    mount_expired_token(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/token/refresh/"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({ "detail": "Token is blacklisted" }))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let redirect = RecordingRedirect::new();
    let (client, tokens) = client_with(&server, &redirect);

    let calls = (0..CONCURRENT_REQUESTS).map(|_| {
        let client = client.clone();
        async move { client.get::<Value>("/payments/").await }
    });
    let results = join_all(calls).await;

    for result in results {
        let err = result.unwrap_err();
        assert!(err.is_unauthorized(), "unexpected error: {err:?}");
    }
    assert!(tokens.access_token().await.unwrap().is_none());
    assert_eq!(client.metrics().refresh_failures, 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(redirect.count(), 1);
}

#[tokio::test]
async fn test_public_endpoint_unauthorized_is_not_refreshed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login/"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "detail": "Invalid credentials" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/token/refresh/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access": "x" })))
        .expect(0)
        .mount(&server)
        .await;

    let redirect = RecordingRedirect::new();
    let (client, _tokens) = client_with(&server, &redirect);

    let login = rentline_domain::RequestDescriptor::post("/auth/login/")
        .json(json!({ "email": "tenant@example.com", "password": "wrong" }))
        .skip_auth();
    let result: Result<Value, ApiError> = client.request(login).await;

    assert!(result.unwrap_err().is_unauthorized());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(redirect.count(), 0);
}
