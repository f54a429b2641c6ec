//! Router tests for the /v1 API.
//!
//! Requests go through the full axum stack with `tower::ServiceExt::oneshot`.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use rollgate_api::{create_app, ApiConfig, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> (Router, AppState) {
    let state = AppState::from_config(&ApiConfig::default()).unwrap();
    (create_app(state.clone()), state)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-actor-id", "alice")
        .header("x-actor-email", "alice@company.com");
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn boolean_flag(default: &str) -> Value {
    json!({
        "variations": {"enabled": true, "disabled": false},
        "defaultRule": {"variation": default}
    })
}

// =============================================================================
// Validation endpoints
// =============================================================================

#[tokio::test]
async fn test_health() {
    let (app, _) = app();
    let (status, body) = send(&app, "GET", "/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_validate_config() {
    let (app, _) = app();
    let (status, body) = send(&app, "POST", "/v1/validate", Some(boolean_flag("enabled"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);

    let (status, body) = send(&app, "POST", "/v1/validate", Some(boolean_flag("missing"))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "invalid_config");
    assert_eq!(body["field"], "defaultRule.variation");
    assert!(body["error"].as_str().unwrap().contains("'missing'"));
}

#[tokio::test]
async fn test_validate_query() {
    let (app, _) = app();
    let (status, body) = send(
        &app,
        "POST",
        "/v1/validate/query",
        Some(json!({"query": "role eq \"admin\" or beta eq true"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["attributes"], json!(["role", "beta"]));

    let (status, body) = send(
        &app,
        "POST",
        "/v1/validate/query",
        Some(json!({"query": "role equals \"admin\""})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "syntax_error");
    assert_eq!(body["line"], 1);
}

// =============================================================================
// Change request lifecycle
// =============================================================================

#[tokio::test]
async fn test_create_review_apply() {
    let (app, state) = app();
    let (status, created) = send(
        &app,
        "POST",
        "/v1/change-requests",
        Some(json!({
            "title": "Enable checkout",
            "project": "web",
            "flagKey": "new-checkout",
            "proposedConfig": boolean_flag("enabled")
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "pending");
    assert_eq!(created["author"]["id"], "alice");
    let id = created["id"].as_str().unwrap().to_string();

    let (_, count) = send(&app, "GET", "/v1/change-requests/count", None).await;
    assert_eq!(count["count"], 1);

    let (status, reviewed) = send(
        &app,
        "POST",
        &format!("/v1/change-requests/{}/review", id),
        Some(json!({"decision": "approved", "comment": "lgtm"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reviewed["request"]["status"], "approved");

    let (status, applied) = send(&app, "POST", &format!("/v1/change-requests/{}/apply", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(applied["changeRequest"]["status"], "applied");
    assert_eq!(applied["projectCreated"], true);

    let (status, flag) = send(&app, "GET", "/v1/projects/web/flags/new-checkout", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(flag["revision"], 1);
    assert_eq!(flag["config"]["defaultRule"], json!({"variation": "enabled"}));

    let (_, detail) = send(&app, "GET", &format!("/v1/change-requests/{}", id), None).await;
    assert_eq!(detail["reviews"].as_array().unwrap().len(), 1);
    assert_eq!(detail["appliedBy"]["id"], "alice");

    let (_, audit) = send(&app, "GET", &format!("/v1/audit?resourceId={}", id), None).await;
    assert_eq!(audit["events"].as_array().unwrap().len(), 3);
    assert_eq!(audit["events"][0]["action"], "change_request.applied");

    assert_eq!(state.metrics.count("applied"), 1);
}

#[tokio::test]
async fn test_cancel_then_apply_conflicts() {
    let (app, _) = app();
    let (_, created) = send(
        &app,
        "POST",
        "/v1/change-requests",
        Some(json!({
            "title": "Later",
            "project": "web",
            "flagKey": "later",
            "proposedConfig": boolean_flag("enabled")
        })),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, cancelled) = send(&app, "POST", &format!("/v1/change-requests/{}/cancel", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    let (status, body) = send(&app, "POST", &format!("/v1/change-requests/{}/apply", id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "invalid_state");
    assert_eq!(body["status"], "cancelled");
}

#[tokio::test]
async fn test_bad_requests() {
    let (app, _) = app();
    let (status, body) = send(
        &app,
        "POST",
        "/v1/change-requests",
        Some(json!({
            "title": "",
            "project": "web",
            "flagKey": "x",
            "proposedConfig": {}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_request");

    let missing = uuid::Uuid::new_v4();
    let (status, _) = send(&app, "GET", &format!("/v1/change-requests/{}", missing), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/v1/change-requests/{}/review", missing),
        Some(json!({"decision": "maybe"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "decision must be approved, rejected, or commented");

    let (status, _) = send(&app, "GET", "/v1/change-requests?status=unknown", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "GET", "/v1/projects/web/flags/nothing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_filters() {
    let (app, _) = app();
    for (title, key) in [("Dark mode", "dark-mode"), ("Pricing", "pricing")] {
        send(
            &app,
            "POST",
            "/v1/change-requests",
            Some(json!({
                "title": title,
                "project": "web",
                "flagKey": key,
                "proposedConfig": boolean_flag("enabled")
            })),
        )
        .await;
    }

    let (_, all) = send(&app, "GET", "/v1/change-requests", None).await;
    assert_eq!(all["total"], 2);

    let (_, found) = send(&app, "GET", "/v1/change-requests?status=pending&search=dark", None).await;
    assert_eq!(found["total"], 1);
    assert_eq!(found["changeRequests"][0]["flagKey"], "dark-mode");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, state) = app();
    state.metrics.record("created");

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("rollgate_change_request_transitions_total"));
}
