// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use feeder_sync::config::Config;
use feeder_sync::db::Db;
use feeder_sync::middleware::auth::create_jwt;
use feeder_sync::models::{Pet, Plan, User};
use feeder_sync::routes::create_router;
use feeder_sync::services::BroadcastNotifier;
use feeder_sync::AppState;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

/// Owner seeded by `create_test_app` (free plan).
#[allow(dead_code)]
pub const OWNER_ID: u64 = 1;
#[allow(dead_code)]
pub const OWNER_EMAIL: &str = "owner@example.com";

/// Second user, for ownership checks (premium plan).
#[allow(dead_code)]
pub const OTHER_ID: u64 = 2;

/// Create a test app with an in-memory store seeded with two users.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub async fn create_test_app() -> (Router, Arc<AppState>) {
    create_test_app_with_plan(Plan::Free).await
}

#[allow(dead_code)]
pub async fn create_test_app_with_plan(owner_plan: Plan) -> (Router, Arc<AppState>) {
    let config = Config::test_default();
    let db = Db::in_memory().await.unwrap();

    db.upsert_user(&User {
        id: OWNER_ID,
        email: OWNER_EMAIL.to_string(),
        name: "Owner".to_string(),
        plan: owner_plan,
    })
    .await
    .unwrap();
    db.upsert_user(&User {
        id: OTHER_ID,
        email: "other@example.com".to_string(),
        name: "Other".to_string(),
        plan: Plan::Premium,
    })
    .await
    .unwrap();

    let notifier = Arc::new(BroadcastNotifier::new(64));
    let state = Arc::new(AppState::new(config, db, notifier));

    (create_router(state.clone()), state)
}

/// Add a pet for `owner_id`, optionally configured on a device.
#[allow(dead_code)]
pub async fn seed_pet(state: &AppState, id: u64, owner_id: u64, name: &str, device: Option<&str>) {
    state
        .db
        .upsert_pet(&Pet {
            id,
            owner_id,
            device_id: device.map(str::to_string),
            name: name.to_string(),
        })
        .await
        .unwrap();
}

/// Bearer token for a user session.
#[allow(dead_code)]
pub fn bearer(state: &AppState, user_id: u64) -> String {
    let token = create_jwt(user_id, &state.config.jwt_signing_key).unwrap();
    format!("Bearer {}", token)
}

/// Send one request and decode the JSON body (`Value::Null` when empty).
#[allow(dead_code)]
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

/// JSON request without auth (device traffic).
#[allow(dead_code)]
pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// JSON request with a user session.
#[allow(dead_code)]
pub fn user_request(method: &str, uri: &str, auth: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, auth);
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

#[allow(dead_code)]
pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Register `device_id` to the seeded owner and return its auth token.
#[allow(dead_code)]
pub async fn register_device(app: &Router, device_id: &str) -> String {
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/api/devices/register",
            serde_json::json!({
                "deviceId": device_id,
                "ownerToken": OWNER_EMAIL,
                "firmwareVersion": "2.1.0",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
    body["authToken"].as_str().unwrap().to_string()
}
