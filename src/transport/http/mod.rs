//! MCP over HTTP
//!
//! One endpoint (`/mcp` by default) accepts JSON-RPC messages by `POST`.
//! Responses are plain JSON; notifications are acknowledged with `202`.
//! `DELETE` ends a stateful session. Every verb passes the same Host
//! allowlist and bearer-token checks before anything else happens.

pub mod duplex;
pub mod session;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use self::duplex::ToolsFactory;
use self::session::{SESSION_ID_HEADER, SessionError, SessionManager, SessionMode};
use crate::config::HttpConfig;
use crate::tools::GitLabTools;

/// Shared state of the HTTP endpoint
#[derive(Clone)]
pub struct HttpState {
    pub manager: Arc<SessionManager>,
    pub bearer_token: Option<String>,
    pub allowed_hosts: Vec<String>,
}

impl HttpState {
    pub fn new(manager: Arc<SessionManager>, config: &HttpConfig) -> Self {
        Self {
            manager,
            bearer_token: config.bearer_token.clone(),
            allowed_hosts: config
                .allowed_hosts
                .iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
        }
    }
}

fn json_rpc_error(status: StatusCode, code: i64, message: &str) -> Response {
    let body = json!({
        "jsonrpc": "2.0",
        "error": { "code": code, "message": message },
        "id": Value::Null,
    });
    (status, axum::Json(body)).into_response()
}

fn session_failure(err: &SessionError) -> Response {
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    json_rpc_error(status, -32000, &err.to_string())
}

fn host_allowed(allowed: &[String], headers: &HeaderMap) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let Some(host) = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(|h| h.to_ascii_lowercase())
    else {
        return false;
    };
    let hostname = host
        .rsplit_once(':')
        .filter(|(_, port)| port.chars().all(|c| c.is_ascii_digit()))
        .map(|(name, _)| name.to_string())
        .unwrap_or_else(|| host.clone());
    allowed.iter().any(|entry| *entry == host || *entry == hostname)
}

fn bearer_matches(expected: &str, headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|presented| tokens_equal(presented.trim(), expected))
}

/// Compares fixed-length digests so timing does not depend on where tokens differ
fn tokens_equal(presented: &str, expected: &str) -> bool {
    let presented = Sha256::digest(presented.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    presented
        .iter()
        .zip(expected.iter())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

/// Host allowlist first, then the bearer token
fn guard(state: &HttpState, headers: &HeaderMap) -> Result<(), Response> {
    if !host_allowed(&state.allowed_hosts, headers) {
        warn!("Rejected request with disallowed Host header");
        return Err(json_rpc_error(StatusCode::FORBIDDEN, -32000, "Forbidden: Host not allowed"));
    }
    if let Some(expected) = &state.bearer_token {
        if !bearer_matches(expected, headers) {
            return Err(json_rpc_error(StatusCode::UNAUTHORIZED, -32001, "Unauthorized"));
        }
    }
    Ok(())
}

fn session_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

async fn handle_post(State(state): State<HttpState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Err(rejection) = guard(&state, &headers) {
        return rejection;
    }
    let message: Value = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(e) => {
            return json_rpc_error(StatusCode::BAD_REQUEST, -32700, &format!("Parse error: {}", e));
        }
    };

    match state.manager.handle(session_header(&headers), message).await {
        Ok(reply) => {
            let mut response = match reply.body {
                Some(body) => (StatusCode::OK, axum::Json(body)).into_response(),
                None => StatusCode::ACCEPTED.into_response(),
            };
            if let Some(value) = reply
                .session_id
                .and_then(|id| HeaderValue::from_str(&id).ok())
            {
                response.headers_mut().insert(SESSION_ID_HEADER, value);
            }
            response
        }
        Err(err) => session_failure(&err),
    }
}

async fn handle_get(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    if let Err(rejection) = guard(&state, &headers) {
        return rejection;
    }
    json_rpc_error(StatusCode::METHOD_NOT_ALLOWED, -32000, "Method not allowed")
}

async fn handle_delete(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    if let Err(rejection) = guard(&state, &headers) {
        return rejection;
    }
    if state.manager.mode() == SessionMode::Stateless {
        return json_rpc_error(StatusCode::METHOD_NOT_ALLOWED, -32000, "Method not allowed");
    }
    let Some(session_id) = session_header(&headers) else {
        return session_failure(&SessionError::MissingSessionId);
    };
    match state.manager.close(session_id).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => session_failure(&err),
    }
}

/// Router serving the MCP endpoint at `path`
pub fn router(state: HttpState, path: &str) -> Router {
    Router::new()
        .route(
            path,
            post(handle_post).get(handle_get).delete(handle_delete),
        )
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Runs the HTTP transport until Ctrl-C, then closes every session
pub async fn serve(tools: GitLabTools, config: HttpConfig, addr: SocketAddr) -> Result<()> {
    let mode = if config.stateful {
        SessionMode::Stateful {
            max_sessions: config.max_sessions,
        }
    } else {
        SessionMode::Stateless
    };
    let manager = Arc::new(SessionManager::new(
        Arc::new(ToolsFactory::new(tools)),
        mode,
    ));
    let app = router(HttpState::new(Arc::clone(&manager), &config), &config.path);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        "GitLab MCP server listening on http://{}{} ({})",
        addr,
        config.path,
        if config.stateful { "stateful" } else { "stateless" }
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down HTTP transport");
    manager.close_all().await;
    Ok(())
}
