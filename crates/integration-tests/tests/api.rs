//! HTTP surface of the sync API.
//!
//! The pool is connected lazily and never used by these routes, so no
//! database is needed.

use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use secrecy::SecretString;
use serde_json::{Value, json};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

use dispatch_sync_integration_tests::{Harness, credential, engine_settings, order, remote};
use dispatch_sync_server::provider::ReferenceData;
use dispatch_sync_server::routes;
use dispatch_sync_server::services::AccountService;
use dispatch_sync_server::state::AppState;
use dispatch_sync_server::sync::SessionRegistry;

const TOKEN: &str = "test-api-token-0123456789abcdef";

fn app(harness: &Harness) -> Router {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://localhost/dispatch_sync_test")
        .expect("lazy pool");
    let sessions = SessionRegistry::new(harness.deps(), engine_settings(), false);
    let accounts = AccountService::new(harness.credentials.clone(), harness.provider.clone());
    let reference = ReferenceData::new(harness.provider.clone(), Duration::from_secs(60));

    routes::router(AppState::new(
        SecretString::from(TOKEN),
        pool,
        sessions,
        accounts,
        reference,
    ))
}

fn seeded() -> Harness {
    let harness = Harness::new();
    harness.credentials.insert(credential(
        1,
        7,
        "ali",
        "tok_a",
        chrono::Duration::days(1),
        true,
    ));
    harness
        .orders
        .insert(order(1, 7, "RY-1", chrono::Duration::hours(1)));
    harness
        .provider
        .list("tok_a", remote("501", "RY-1", "delivered"));
    harness
}

fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
        .header("x-actor-id", "7")
        .header("x-actor-role", "staff");
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request")
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), 1 << 20).await.expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let response = app(&Harness::new())
        .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let response = app(&Harness::new())
        .oneshot(
            Request::get("/sync/state")
                .header("x-actor-id", "7")
                .header("x-actor-role", "staff")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_role_is_bad_request() {
    let response = app(&Harness::new())
        .oneshot(
            Request::get("/sync/state")
                .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
                .header("x-actor-id", "7")
                .header("x-actor-role", "owner")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_state_starts_in_standby() {
    let response = app(&Harness::new())
        .oneshot(request("GET", "/sync/state", None))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["mode"], "standby");
    assert_eq!(body["periodic_enabled"], false);
}

#[tokio::test]
async fn test_fast_sync_returns_report() {
    let harness = seeded();
    let response = app(&harness)
        .oneshot(request(
            "POST",
            "/sync/fast",
            Some(json!({"show_notifications": false})),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["report"]["checked"], 1);
    assert_eq!(body["report"]["updated"], 1);
}

#[tokio::test]
async fn test_unknown_order_is_not_found() {
    let response = app(&seeded())
        .oneshot(request("POST", "/sync/orders/RY-404", None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_accounts_list_hides_tokens() {
    let response = app(&seeded())
        .oneshot(request("GET", "/accounts", None))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body[0]["username"], "ali");
    assert_eq!(body[0]["is_default"], true);
    assert!(!body.to_string().contains("tok_a"));
}

#[tokio::test]
async fn test_deleting_only_default_account_conflicts() {
    let response = app(&seeded())
        .oneshot(request("DELETE", "/accounts/ali", None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_reference_cities_use_actor_account() {
    let response = app(&seeded())
        .oneshot(request("GET", "/reference/cities", None))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body[0]["name"], "Baghdad");
}

#[tokio::test]
async fn test_reference_without_account_conflicts() {
    let response = app(&Harness::new())
        .oneshot(request("GET", "/reference/cities", None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}
