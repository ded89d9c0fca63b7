use std::time::Duration;

use axum::{body::Body, http::Request, http::StatusCode};
use corkboard_server::{build_router, AppConfig};
use tower::ServiceExt;

async fn register(app: &axum::Router, ip: &str) -> String {
    let request = Request::builder()
        .method("POST")
        .uri("/users")
        .header("x-forwarded-for", ip)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    value["user_id"].as_str().unwrap().to_owned()
}

#[tokio::test]
async fn rejects_body_over_limit() {
    let config = AppConfig {
        max_body_bytes: 32,
        request_timeout: Duration::from_secs(1),
        rate_limit_requests_per_minute: 60,
        ..AppConfig::default()
    };
    let app = build_router(&config).unwrap();
    let user = register(&app, "203.0.113.7").await;

    let request = Request::builder()
        .method("POST")
        .uri("/workspaces")
        .header("content-type", "application/json")
        .header("x-forwarded-for", "203.0.113.7")
        .header("x-corkboard-user", user)
        .body(Body::from(
            r#"{"name":"this workspace name is definitely too large for the limit"}"#,
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn rejects_unknown_fields_and_invalid_names() {
    let app = build_router(&AppConfig::default()).unwrap();
    let user = register(&app, "203.0.113.8").await;

    let request = |body: &'static str| {
        Request::builder()
            .method("POST")
            .uri("/workspaces")
            .header("content-type", "application/json")
            .header("x-forwarded-for", "203.0.113.8")
            .header("x-corkboard-user", user.as_str())
            .body(Body::from(body))
            .unwrap()
    };

    let unknown = app
        .clone()
        .oneshot(request(r#"{"name":"Acme","owner":"someone"}"#))
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let blank = app.oneshot(request(r#"{"name":"   "}"#)).await.unwrap();
    assert_eq!(blank.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rate_limits_per_client_ip() {
    let config = AppConfig {
        max_body_bytes: 1024,
        request_timeout: Duration::from_secs(1),
        rate_limit_requests_per_minute: 2,
        ..AppConfig::default()
    };
    let app = build_router(&config).unwrap();

    let request = |ip: &str| {
        Request::builder()
            .method("GET")
            .uri("/health")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    };

    let first = app.clone().oneshot(request("198.51.100.9")).await.unwrap();
    let second = app.clone().oneshot(request("198.51.100.9")).await.unwrap();
    let third = app.clone().oneshot(request("198.51.100.9")).await.unwrap();
    let other_client = app.oneshot(request("198.51.100.10")).await.unwrap();

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(other_client.status(), StatusCode::OK);
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let app = build_router(&AppConfig::default()).unwrap();
    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .header("x-forwarded-for", "203.0.113.9")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn metrics_endpoint_exposes_permission_denials() {
    let app = build_router(&AppConfig::default()).unwrap();
    let owner = register(&app, "203.0.113.10").await;
    let outsider = register(&app, "203.0.113.10").await;

    let create = Request::builder()
        .method("POST")
        .uri("/workspaces")
        .header("content-type", "application/json")
        .header("x-forwarded-for", "203.0.113.10")
        .header("x-corkboard-user", owner.as_str())
        .body(Body::from(r#"{"name":"Metrics"}"#))
        .unwrap();
    let response = app.clone().oneshot(create).await.unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let workspace: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let workspace_id = workspace["workspace_id"].as_str().unwrap();

    let denied = Request::builder()
        .method("GET")
        .uri(format!("/workspaces/{workspace_id}"))
        .header("x-forwarded-for", "203.0.113.10")
        .header("x-corkboard-user", outsider.as_str())
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(denied).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let metrics = Request::builder()
        .method("GET")
        .uri("/metrics")
        .header("x-forwarded-for", "203.0.113.10")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(metrics).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("corkboard_permission_denials_total{scope=\"workspace\""));
}

#[test]
fn rejects_invalid_router_configuration() {
    let oversized = AppConfig {
        max_realtime_event_bytes: corkboard_server::DEFAULT_MAX_REALTIME_EVENT_BYTES + 1,
        ..AppConfig::default()
    };
    assert!(build_router(&oversized).is_err());

    let no_rate = AppConfig {
        rate_limit_requests_per_minute: 0,
        ..AppConfig::default()
    };
    assert!(build_router(&no_rate).is_err());
}
