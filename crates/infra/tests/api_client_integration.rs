//! End-to-end tests for the API client over real HTTP (wiremock).

use std::sync::Arc;

use rentline_core::testing::RecordingNotifier;
use rentline_core::TokenStore;
use rentline_domain::{ApiError, Config, ErrorCode, FormPart, TokenPair};
use rentline_infra::{ApiClient, MemoryTokenStore};
use serde::{Deserialize, Serialize};
use serde_json::json;
use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Serialize)]
struct NewProperty<'a> {
    title: &'a str,
    city: u64,
}

#[derive(Debug, Deserialize, PartialEq)]
struct Property {
    id: u64,
    title: String,
}

fn config_for(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.api.base_url = format!("{}/api/v1", server.uri());
    config.retry.delay_ms = 10;
    config.retry.max_delay_ms = 50;
    config.auth.login_redirect_delay_ms = 10;
    config
}

async fn mount_health(server: &MockServer, status: &str) {
    Mock::given(method("GET"))
        .and(path("/api/v1/health/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": status })))
        .mount(server)
        .await;
}

fn signed_in(access: &str) -> Arc<MemoryTokenStore> {
    Arc::new(MemoryTokenStore::with_tokens(TokenPair::new(access, Some("refresh-1".to_string()))))
}

#[tokio::test]
async fn test_create_property_sends_auth_and_json() {
    let server = MockServer::start().await;
    mount_health(&server, "healthy").await;
    Mock::given(method("POST"))
        .and(path("/api/v1/properties/"))
        .and(header("authorization", "Bearer access-1"))
        .and(header("content-type", "application/json"))
        .and(header_exists("x-request-id"))
        .and(body_json(json!({ "title": "Loft on 5th", "city": 3 })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "id": 41, "title": "Loft on 5th" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::builder()
        .config(config_for(&server))
        .token_store(signed_in("access-1"))
        .build()
        .unwrap();

    let created: Property = client
        .post("/properties/", &NewProperty { title: "Loft on 5th", city: 3 })
        .await
        .unwrap();

    assert_eq!(created, Property { id: 41, title: "Loft on 5th".to_string() });
    let metrics = client.metrics();
    assert_eq!(metrics.requests, 1);
    assert_eq!(metrics.successes, 1);
}

#[tokio::test]
async fn test_query_parameters_and_upload() {
    let server = MockServer::start().await;
    mount_health(&server, "healthy").await;
    Mock::given(method("GET"))
        .and(path("/api/v1/properties/"))
        .and(query_param("city", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/properties/41/images/"))
        .and(header_exists("content-type"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 9 })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::builder()
        .config(config_for(&server))
        .token_store(signed_in("access-1"))
        .build()
        .unwrap();

    let listed: Vec<Property> = client
        .request(rentline_domain::RequestDescriptor::get("/properties/").query("city", "3"))
        .await
        .unwrap();
    assert!(listed.is_empty());

    let uploaded: serde_json::Value = client
        .upload(
            "/properties/41/images/",
            vec![
                FormPart::text("caption", "Living room"),
                FormPart::file("image", "living.jpg", vec![0xff, 0xd8, 0xff]),
            ],
        )
        .await
        .unwrap();
    assert_eq!(uploaded["id"], 9);
}

#[tokio::test]
async fn test_expired_token_is_refreshed_and_request_replayed() {
    let server = MockServer::start().await;
    mount_health(&server, "healthy").await;
    Mock::given(method("GET"))
        .and(path("/api/v1/leases/"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "detail": "Token expired" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/leases/"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1 }])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/token/refresh/"))
        .and(body_json(json!({ "refresh": "refresh-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access": "fresh" })))
        .expect(1)
        .mount(&server)
        .await;

    let tokens = signed_in("stale");
    let client = ApiClient::builder()
        .config(config_for(&server))
        .token_store(tokens.clone())
        .build()
        .unwrap();

    let leases: Vec<serde_json::Value> = client.get("/leases/").await.unwrap();

    assert_eq!(leases.len(), 1);
    assert_eq!(tokens.access_token().await.unwrap().as_deref(), Some("fresh"));
    assert_eq!(tokens.refresh_token().await.unwrap().as_deref(), Some("refresh-1"));
    assert_eq!(client.metrics().refreshes, 1);
}

#[tokio::test]
async fn test_unhealthy_backend_rejects_without_calling_endpoint() {
    let server = MockServer::start().await;
    mount_health(&server, "degraded").await;
    Mock::given(method("GET"))
        .and(path("/api/v1/cities/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let notifier = RecordingNotifier::new();
    let client = ApiClient::builder()
        .config(config_for(&server))
        .notifier(Arc::new(notifier.clone()))
        .build()
        .unwrap();

    let result: Result<serde_json::Value, ApiError> = client.get("/cities/").await;

    let err = result.unwrap_err();
    assert_eq!(err.code(), ErrorCode::BackendUnhealthy);
    assert_eq!(notifier.notices().len(), 1);
    assert_eq!(client.metrics().health_rejections, 1);
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let server = MockServer::start().await;
    mount_health(&server, "healthy").await;
    Mock::given(method("GET"))
        .and(path("/api/v1/cities/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/cities/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "id": 3, "name": "Austin" }])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::builder().config(config_for(&server)).build().unwrap();

    let cities: Vec<serde_json::Value> = client.get("/cities/").await.unwrap();
    assert_eq!(cities[0]["name"], "Austin");
    assert_eq!(client.metrics().retries, 1);
}

#[tokio::test]
async fn test_validation_error_carries_response_data() {
    let server = MockServer::start().await;
    mount_health(&server, "healthy").await;
    Mock::given(method("POST"))
        .and(path("/api/v1/leases/"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "rent": ["Must be positive."] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::builder()
        .config(config_for(&server))
        .token_store(signed_in("access-1"))
        .build()
        .unwrap();

    let result: Result<serde_json::Value, ApiError> =
        client.post("/leases/", &json!({ "rent": -5 })).await;

    let err = result.unwrap_err();
    assert_eq!(err.status(), 400);
    assert_eq!(err.data().and_then(|data| data.get("rent")), Some(&json!(["Must be positive."])));
}
