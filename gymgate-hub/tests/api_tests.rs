//! HTTP API integration tests
//!
//! Drives the router with `tower::ServiceExt::oneshot`; no sockets.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{Duration as ChronoDuration, Utc};
use gymgate_common::events::ScanEvent;
use gymgate_common::{GymChannels, GymEvent, ScanOutcome, ScanResult, TokenKey};
use gymgate_hub::directory::{InMemoryDirectory, Member, Membership};
use gymgate_hub::{build_router, AccessAuthority, AppState};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn signing_key() -> TokenKey {
    TokenKey::new(b"an-api-test-signing-key-32-bytes").unwrap()
}

fn test_state() -> AppState {
    let directory = InMemoryDirectory::new();
    directory.upsert(
        Member {
            member_id: "m-1".to_string(),
            full_name: "Amina Benali".to_string(),
            photo_url: None,
        },
        vec![Membership {
            gym_id: "gym-1".to_string(),
            active: true,
            subscription_end: Some(Utc::now() + ChronoDuration::days(30)),
        }],
    );
    let authority =
        AccessAuthority::new(Arc::new(directory), signing_key(), Duration::from_secs(30));
    AppState::new(authority, GymChannels::new(16))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn issue(app: &Router, gym_id: &str, member_id: &str) -> (StatusCode, Value) {
    send(
        app,
        post_json(
            &format!("/api/gyms/{}/access-token", gym_id),
            json!({ "member_id": member_id }),
        ),
    )
    .await
}

#[tokio::test]
async fn test_health_check() {
    let app = build_router(test_state());
    let (status, body) = send(
        &app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "gymgate-hub");
}

#[tokio::test]
async fn test_issue_then_check_in() {
    let app = build_router(test_state());

    let (status, issued) = issue(&app, "gym-1", "m-1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(issued["success"], true);
    let token = issued["data"]["token"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        post_json("/api/gyms/gym-1/check-in", json!({ "token": token })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["member_name"], "Amina Benali");
    assert!(body["data"]["subscription_expiry"].is_string());
}

#[tokio::test]
async fn test_issued_token_expires_thirty_seconds_out() {
    let app = build_router(test_state());
    let (_, issued) = issue(&app, "gym-1", "m-1").await;

    let issued_at: chrono::DateTime<Utc> =
        serde_json::from_value(issued["data"]["issued_at"].clone()).unwrap();
    let expires_at: chrono::DateTime<Utc> =
        serde_json::from_value(issued["data"]["expires_at"].clone()).unwrap();
    assert_eq!(expires_at - issued_at, ChronoDuration::seconds(30));
}

#[tokio::test]
async fn test_check_in_at_wrong_gym_is_denied() {
    let app = build_router(test_state());
    let (_, issued) = issue(&app, "gym-1", "m-1").await;
    let token = issued["data"]["token"].as_str().unwrap();

    let (status, body) = send(
        &app,
        post_json("/api/gyms/gym-2/check-in", json!({ "token": token })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Token not valid for this gym");
    assert_eq!(body["error"], "ACCESS_DENIED");
}

#[tokio::test]
async fn test_garbage_check_in_is_logged_as_denied() {
    let app = build_router(test_state());

    let (status, body) = send(
        &app,
        post_json("/api/gyms/gym-1/check-in", json!({ "token": "hello world" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Invalid QR Code");

    let (status, logs) = send(
        &app,
        Request::builder().uri("/api/gyms/gym-1/logs").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let records = logs["data"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["status"], "denied");
    assert_eq!(records[0]["notes"], "Invalid QR Code");
}

#[tokio::test]
async fn test_unknown_member_cannot_get_token() {
    let app = build_router(test_state());
    let (status, body) = issue(&app, "gym-1", "nobody").await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Member not found");
}

#[tokio::test]
async fn test_blank_member_id_is_bad_request() {
    let app = build_router(test_state());
    let (status, body) = issue(&app, "gym-1", "  ").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_publish_reaches_only_that_gym() {
    let state = test_state();
    let mut gym1 = state.channels.join("gym-1");
    let gym2 = state.channels.join("gym-2");
    let app = build_router(state.clone());

    let scan = ScanEvent {
        gym_id: "ignored".to_string(),
        origin: None,
        result: ScanResult::denied(Some("Membership has expired".to_string())),
    };
    let (status, body) = send(
        &app,
        post_json("/api/gyms/gym-1/events", serde_json::to_value(&scan).unwrap()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["delivered"], 1);

    let GymEvent::ScanResolved(received) = gym1.recv().await.unwrap();
    assert_eq!(received.gym_id, "gym-1");
    assert!(matches!(
        received.result.outcome,
        ScanOutcome::Denied { ref reason } if reason == "Membership has expired"
    ));
    assert_eq!(state.channels.subscriber_count("gym-2"), 1);
    drop(gym2);
}

#[tokio::test]
async fn test_publishing_verifying_is_rejected() {
    let app = build_router(test_state());
    let scan = ScanEvent {
        gym_id: "gym-1".to_string(),
        origin: None,
        result: ScanResult::verifying(),
    };

    let (status, _) = send(
        &app,
        post_json("/api/gyms/gym-1/events", serde_json::to_value(&scan).unwrap()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sse_stream_joins_and_leaves_gym() {
    let state = test_state();
    let app = build_router(state.clone());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/gyms/gym-1/events")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    assert_eq!(state.channels.subscriber_count("gym-1"), 1);

    let mut body = response.into_body();
    let joined = body.frame().await.unwrap().unwrap().into_data().unwrap();
    assert!(String::from_utf8_lossy(&joined).contains("joined gym-1"));

    state.channels.publish(
        "gym-1",
        GymEvent::ScanResolved(ScanEvent {
            gym_id: "gym-1".to_string(),
            origin: None,
            result: ScanResult::denied(None),
        }),
    );
    let frame = body.frame().await.unwrap().unwrap().into_data().unwrap();
    let text = String::from_utf8_lossy(&frame);
    assert!(text.contains("event: ScanResolved"));
    assert!(text.contains("\"status\":\"denied\""));

    drop(body);
    assert_eq!(state.channels.subscriber_count("gym-1"), 0);
}
