//! REST routes exercised through the router without a socket.

use std::time::Duration;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::Value;
use studyroom_proto::{ChatMessage, RoomId, UserId};
use studyroom_server::{
    AppState, GatewayConfig, JwtVerifier, MemoryStorage, MessageStore,
    http::{HealthResponse, router},
};
use tower::ServiceExt;

const SECRET: &str = "http-test-secret";

fn state() -> AppState<MemoryStorage> {
    let verifier = JwtVerifier::new(SECRET).unwrap();
    AppState::new(MemoryStorage::new(), verifier, GatewayConfig::default(), 16)
}

fn bearer(user: &str) -> String {
    let token = JwtVerifier::new(SECRET)
        .unwrap()
        .issue(&UserId::new(user), Some("someone@example.com"), Duration::from_secs(600))
        .unwrap();
    format!("Bearer {token}")
}

fn seed(state: &AppState<MemoryStorage>, room: &str, sender: &str, content: &str) -> ChatMessage {
    state
        .gateway()
        .store()
        .append(&RoomId::new(room), &UserId::new(sender), content, 1_000)
        .unwrap()
}

async fn send(state: &AppState<MemoryStorage>, request: Request<Body>) -> (StatusCode, Value) {
    let resp = router(state.clone()).oneshot(request).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), 1_000_000).await.unwrap();
    let json = if body.is_empty() { Value::Null } else { serde_json::from_slice(&body).unwrap() };
    (status, json)
}

fn get(uri: &str, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder.body(Body::empty()).unwrap()
}

fn delete(uri: &str, auth: &str) -> Request<Body> {
    Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .header(header::AUTHORIZATION, auth)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn health_reports_counts() {
    let state = state();
    let (status, body) = send(&state, get("/health", None)).await;

    assert_eq!(status, StatusCode::OK);
    let health: HealthResponse = serde_json::from_value(body).unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.connections, 0);
    assert_eq!(health.rooms, 0);
}

#[tokio::test]
async fn history_requires_token() {
    let state = state();

    let (status, body) = send(&state, get("/api/chat/g1", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = send(&state, get("/api/chat/g1", Some("Bearer forged"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&state, get("/api/chat/g1", Some("Basic abc"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn history_returns_room_messages_ascending() {
    let state = state();
    let first = seed(&state, "g1", "u1", "first");
    let second = seed(&state, "g1", "u2", "second");
    seed(&state, "g2", "u1", "elsewhere");

    let auth = bearer("u1");
    let (status, body) = send(&state, get("/api/chat/g1", Some(&auth))).await;

    assert_eq!(status, StatusCode::OK);
    let history: Vec<ChatMessage> = serde_json::from_value(body.clone()).unwrap();
    assert_eq!(history, vec![first, second]);
    assert_eq!(body[0]["groupId"], "g1");
}

#[tokio::test]
async fn delete_by_sender_succeeds() {
    let state = state();
    let message = seed(&state, "g1", "u1", "oops");

    let (status, body) =
        send(&state, delete(&format!("/api/chat/{}", message.id), &bearer("u1"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Message deleted successfully");
    assert!(state.gateway().store().find_by_id(message.id).unwrap().is_none());
}

#[tokio::test]
async fn delete_by_other_user_is_forbidden() {
    let state = state();
    let message = seed(&state, "g1", "u1", "mine");

    let (status, body) =
        send(&state, delete(&format!("/api/chat/{}", message.id), &bearer("u2"))).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].is_string());
    assert!(state.gateway().store().find_by_id(message.id).unwrap().is_some());
}

#[tokio::test]
async fn delete_unknown_or_malformed_id() {
    let state = state();
    let message = seed(&state, "g1", "u1", "gone soon");
    state.gateway().store().delete_by_id(message.id).unwrap();

    let (status, _) =
        send(&state, delete(&format!("/api/chat/{}", message.id), &bearer("u1"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&state, delete("/api/chat/not-an-id", &bearer("u1"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
