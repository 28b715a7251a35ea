//! Admin API integration tests.
//!
//! Drive the manager router with `tower::ServiceExt::oneshot`. Sessions are
//! backed by `sleep` so no relay is needed.

#![cfg(unix)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tokio::process::{Child, Command};
use tower::ServiceExt;

use relay_tunnel::manage::{create_router, Launcher, ManageState, SessionOrchestrator};
use relay_tunnel::session::{Feature, SessionId};
use relay_tunnel::{Result, TunnelError};

struct SleepLauncher;

impl Launcher for SleepLauncher {
    fn launch(&self, _: Feature, _: &SessionId, _: Option<u16>) -> Result<Child> {
        Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TunnelError::Spawn(e.to_string()))
    }
}

fn setup() -> (SessionOrchestrator, Router) {
    let orchestrator = SessionOrchestrator::new(Arc::new(SleepLauncher));
    let router = create_router(ManageState::new(orchestrator.clone()));
    (orchestrator, router)
}

async fn post(router: &Router, feature: &str, body: Value) -> (StatusCode, Value) {
    send(
        router,
        Request::post(format!("/api/feature/{}", feature))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

async fn start(router: &Router, feature: &str, id: &str) -> (StatusCode, Value) {
    post(router, feature, json!({"action": "start", "sessionId": id})).await
}

async fn status(router: &Router) -> Value {
    let (code, body) = send(
        router,
        Request::get("/api/status").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(code, StatusCode::OK);
    body
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let code = response.status();
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    (code, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_status_shape() {
    let (_, router) = setup();
    let body = status(&router).await;

    for feature in ["shell", "http"] {
        assert_eq!(body[feature]["enabled"], json!(true));
        assert_eq!(body[feature]["running"], json!(false));
        assert_eq!(body[feature]["sessions"], json!([]));
        assert_eq!(body[feature]["history"], json!([]));
    }
}

#[tokio::test]
async fn test_start_status_stop() {
    let (orchestrator, router) = setup();

    let start = json!({"action": "start", "sessionId": "web", "port": 8080});
    let (code, body) = post(&router, "http", start).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));

    let body = status(&router).await;
    let http = &body["http"];
    assert_eq!(http["running"], json!(true));
    assert_eq!(http["sessions"][0]["sessionId"], json!("web"));
    assert_eq!(http["sessions"][0]["port"], json!(8080));
    assert_eq!(http["sessions"][0]["status"], json!("running"));
    assert!(http["sessions"][0]["pid"].is_u64());
    assert_eq!(http["last"]["action"], json!("start"));

    let stop = json!({"action": "stop", "sessionId": "web", "port": "8080"});
    let (code, _) = post(&router, "http", stop).await;
    assert_eq!(code, StatusCode::OK);

    let body = status(&router).await;
    assert_eq!(body["http"]["running"], json!(false));
    assert_eq!(body["http"]["last"]["action"], json!("stop"));
    assert_eq!(body["http"]["history"].as_array().unwrap().len(), 2);

    orchestrator.shutdown().unwrap();
}

#[tokio::test]
async fn test_duplicate_start_does_not_spawn_twice() {
    let (orchestrator, router) = setup();

    let (code, _) = start(&router, "ssh", "lab").await;
    assert_eq!(code, StatusCode::OK);
    let (code, body) = start(&router, "shell", "lab").await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("already running"));

    let body = status(&router).await;
    assert_eq!(body["shell"]["sessions"].as_array().unwrap().len(), 1);

    orchestrator.shutdown().unwrap();
}

#[tokio::test]
async fn test_disable_stops_all_sessions() {
    let (_, router) = setup();

    for id in ["a", "b"] {
        let (code, _) = start(&router, "shell", id).await;
        assert_eq!(code, StatusCode::OK);
    }

    let (code, _) = post(&router, "shell", json!({"action": "disable"})).await;
    assert_eq!(code, StatusCode::OK);

    let body = status(&router).await;
    assert_eq!(body["shell"]["enabled"], json!(false));
    assert_eq!(body["shell"]["sessions"], json!([]));

    let (code, body) = start(&router, "shell", "c").await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("feature disabled"));

    let (code, _) = post(&router, "shell", json!({"action": "enable"})).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(status(&router).await["shell"]["enabled"], json!(true));
}

#[tokio::test]
async fn test_error_messages() {
    let (_, router) = setup();

    let cases = [
        ("ftp", json!({"action": "start", "sessionId": "a"}), "invalid feature"),
        ("shell", json!({"action": "restart", "sessionId": "a"}), "unknown action"),
        ("shell", json!({"action": "start"}), "session id is required"),
        ("shell", json!({"action": "start", "sessionId": ""}), "session id is required"),
        ("shell", json!({"action": "stop", "sessionId": "ghost"}), "no such session"),
    ];

    for (feature, body, expected) in cases {
        let (code, response) = post(&router, feature, body).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        let error = response["error"].as_str().unwrap();
        assert!(error.contains(expected), "{error} should mention {expected}");
    }
}

#[tokio::test]
async fn test_malformed_json() {
    let (_, router) = setup();

    let (code, body) = send(
        &router,
        Request::post("/api/feature/shell")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{ not json"))
            .unwrap(),
    )
    .await;

    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Invalid request"}));
}
