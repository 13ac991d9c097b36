use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use mongodb::Client;
use serde_json::Value;
use tower::ServiceExt;

use tutorconnected_api::{
    build_router,
    config::{AppConfig, PaymentRules},
    state::AppState,
};

// Nothing listens on port 1; the client connects lazily, so only requests
// that never reach the database are exercised here.
async fn app() -> Router {
    let client = Client::with_uri_str("mongodb://127.0.0.1:1/?serverSelectionTimeoutMS=200")
        .await
        .unwrap();
    let config = AppConfig {
        database_url: "mongodb://127.0.0.1:1".into(),
        database_name: "tutorconnected_test".into(),
        jwt_secret: "test-secret".into(),
        jwt_expire_hours: 1,
        host: "127.0.0.1".into(),
        port: 0,
        base_url: "http://localhost:5000".into(),
        frontend_url: "http://localhost:3000".into(),
        meeting_base_url: "https://meet.jit.si".into(),
        cors_origins: Vec::new(),
        gateway: None,
        payment_rules: PaymentRules::default(),
    };
    build_router(AppState::new(client, config))
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn root_reports_running() {
    let response = app()
        .await
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn health_is_ok_without_database() {
    let response = app()
        .await
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["database"], "disconnected");
    assert_eq!(body["gateway"], false);
}

#[tokio::test]
async fn me_requires_bearer_token() {
    let response = app()
        .await
        .oneshot(Request::get("/api/auth/me").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Not authorized");
}

#[tokio::test]
async fn malformed_token_is_unauthorized() {
    let response = app()
        .await
        .oneshot(
            Request::get("/api/bookings")
                .header(header::AUTHORIZATION, "Bearer not.a.jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_rejects_invalid_email() {
    let payload = serde_json::json!({
        "name": "Nadia Rahman",
        "email": "not-an-email",
        "password": "secret123",
        "role": "student",
    });
    let response = app()
        .await
        .oneshot(
            Request::post("/api/auth/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["details"][0]["field"], "email");
}

#[tokio::test]
async fn register_cannot_self_assign_admin() {
    let payload = serde_json::json!({
        "name": "Nadia Rahman",
        "email": "nadia@example.com",
        "password": "secret123",
        "role": "admin",
    });
    let response = app()
        .await
        .oneshot(
            Request::post("/api/auth/register")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_gig_id_is_bad_request() {
    let response = app()
        .await
        .oneshot(Request::get("/api/gigs/not-an-id").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ipn_without_tran_id_is_rejected() {
    let response = app()
        .await
        .oneshot(
            Request::post("/api/payments/ipn")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("status=VALID"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn wallet_requires_authentication() {
    let response = app()
        .await
        .oneshot(Request::get("/api/wallet/balance").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let response = app()
        .await
        .oneshot(Request::get("/api/nothing-here").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn huge_page_query_reaches_the_database_without_panicking() {
    let response = app()
        .await
        .oneshot(
            Request::get("/api/gigs?page=18446744073709551615&limit=100")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
}
