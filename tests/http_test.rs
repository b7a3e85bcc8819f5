//! Tests for the HTTP endpoint guards and status mapping
//!
//! Requests go straight into the axum router with `oneshot`; an echoing
//! fake stands in for the protocol server.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use gitlab_mcp::config::HttpConfig;
use gitlab_mcp::transport::http::session::{
    ProtocolServer, SESSION_ID_HEADER, ServerFactory, SessionError, SessionManager, SessionMode,
};
use gitlab_mcp::transport::http::{HttpState, router};

struct EchoServer;

#[async_trait]
impl ProtocolServer for EchoServer {
    async fn dispatch(&self, message: Value) -> Result<Option<Value>, SessionError> {
        Ok(message
            .get("id")
            .cloned()
            .map(|id| json!({ "jsonrpc": "2.0", "id": id, "result": {} })))
    }

    async fn close(&self) {}
}

struct EchoFactory;

#[async_trait]
impl ServerFactory for EchoFactory {
    async fn open(&self) -> Result<Arc<dyn ProtocolServer>, SessionError> {
        Ok(Arc::new(EchoServer))
    }
}

fn app(config: HttpConfig) -> axum::Router {
    let mode = if config.stateful {
        SessionMode::Stateful {
            max_sessions: config.max_sessions,
        }
    } else {
        SessionMode::Stateless
    };
    let manager = Arc::new(SessionManager::new(Arc::new(EchoFactory), mode));
    router(HttpState::new(manager, &config), &config.path)
}

fn initialize() -> String {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": { "protocolVersion": "2024-11-05", "capabilities": {}, "clientInfo": { "name": "t", "version": "0" } }
    })
    .to_string()
}

fn post() -> axum::http::request::Builder {
    Request::builder()
        .method(Method::POST)
        .uri("/mcp")
        .header(header::HOST, "localhost:3000")
        .header(header::CONTENT_TYPE, "application/json")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Tests that every verb is rejected without the configured bearer token
#[tokio::test]
async fn test_bearer_token_required_on_every_verb() {
    let app = app(HttpConfig {
        bearer_token: Some("s3cret".into()),
        ..Default::default()
    });

    for method in [Method::POST, Method::GET, Method::DELETE] {
        let request = Request::builder()
            .method(method.clone())
            .uri("/mcp")
            .header(header::HOST, "localhost")
            .header(header::AUTHORIZATION, "Bearer wrong")
            .body(Body::from(initialize()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", method);
    }

    let request = Request::builder()
        .method(Method::POST)
        .uri("/mcp")
        .header(header::HOST, "localhost")
        .header(header::AUTHORIZATION, "Bearer s3cret")
        .body(Body::from(initialize()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// Tests that a Host outside the allowlist is refused before authentication
#[tokio::test]
async fn test_host_allowlist() {
    let app = app(HttpConfig {
        allowed_hosts: vec!["localhost".into()],
        bearer_token: Some("s3cret".into()),
        ..Default::default()
    });

    let request = Request::builder()
        .method(Method::POST)
        .uri("/mcp")
        .header(header::HOST, "attacker.example")
        .body(Body::from(initialize()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

/// Tests the stateful flow: initialize mints a session id, later calls must present it
#[tokio::test]
async fn test_stateful_initialize_and_follow_up() {
    let app = app(HttpConfig::default());

    let response = app
        .clone()
        .oneshot(post().body(Body::from(initialize())).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let session_id = response
        .headers()
        .get(SESSION_ID_HEADER)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(body_json(response).await["id"], 1);

    let list = json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }).to_string();
    let missing = app
        .clone()
        .oneshot(post().body(Body::from(list.clone())).unwrap())
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let unknown = app
        .clone()
        .oneshot(
            post()
                .header(SESSION_ID_HEADER, "not-a-session")
                .body(Body::from(list.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let notification = json!({ "jsonrpc": "2.0", "method": "notifications/initialized" });
    let accepted = app
        .clone()
        .oneshot(
            post()
                .header(SESSION_ID_HEADER, session_id.as_str())
                .body(Body::from(notification.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(accepted.status(), StatusCode::ACCEPTED);

    let delete = Request::builder()
        .method(Method::DELETE)
        .uri("/mcp")
        .header(SESSION_ID_HEADER, session_id.as_str())
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.clone().oneshot(delete).await.unwrap().status(), StatusCode::OK);

    let after_delete = app
        .oneshot(
            post()
                .header(SESSION_ID_HEADER, session_id.as_str())
                .body(Body::from(list))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(after_delete.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_bodies() {
    let app = app(HttpConfig::default());

    let parse_error = app
        .clone()
        .oneshot(post().body(Body::from("{not json")).unwrap())
        .await
        .unwrap();
    assert_eq!(parse_error.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(parse_error).await["error"]["code"], -32700);

    let batch = app
        .oneshot(post().body(Body::from(format!("[{}]", initialize()))).unwrap())
        .await
        .unwrap();
    assert_eq!(batch.status(), StatusCode::BAD_REQUEST);
}

/// Tests stateless mode: no session header and no DELETE
#[tokio::test]
async fn test_stateless_mode() {
    let app = app(HttpConfig {
        stateful: false,
        ..Default::default()
    });

    let list = json!({ "jsonrpc": "2.0", "id": 5, "method": "tools/list" }).to_string();
    let response = app
        .clone()
        .oneshot(post().body(Body::from(list)).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(SESSION_ID_HEADER).is_none());
    assert_eq!(body_json(response).await["id"], 5);

    let delete = Request::builder()
        .method(Method::DELETE)
        .uri("/mcp")
        .body(Body::empty())
        .unwrap();
    assert_eq!(
        app.clone().oneshot(delete).await.unwrap().status(),
        StatusCode::METHOD_NOT_ALLOWED
    );

    let get = Request::builder()
        .method(Method::GET)
        .uri("/mcp")
        .body(Body::empty())
        .unwrap();
    assert_eq!(
        app.oneshot(get).await.unwrap().status(),
        StatusCode::METHOD_NOT_ALLOWED
    );
}
