//! Session bookkeeping for the HTTP transport
//!
//! In stateful mode a session is minted for an `initialize` request that
//! carries no `Mcp-Session-Id`, and every later call must present that id.
//! The table is bounded: admitting a session beyond the limit evicts the
//! oldest one first. In stateless mode each call gets a throwaway server,
//! and the manager performs the initialization handshake itself when the
//! call is not an `initialize`.
//!
//! The protocol is only touched through [`ProtocolServer`], which moves raw
//! JSON-RPC messages in and out of one server instance.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Header carrying the session identifier
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// Protocol revision used when the manager initializes a stateless server
pub const HANDSHAKE_PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Bad Request: Mcp-Session-Id header is required")]
    MissingSessionId,

    #[error("Session not found: {0}")]
    UnknownSession(String),

    #[error("Bad Request: {0}")]
    InvalidMessage(String),

    #[error("Session transport failed: {0}")]
    Transport(String),
}

impl SessionError {
    /// HTTP status reported for this error
    pub fn status(&self) -> u16 {
        match self {
            SessionError::MissingSessionId | SessionError::InvalidMessage(_) => 400,
            SessionError::UnknownSession(_) => 404,
            SessionError::Transport(_) => 500,
        }
    }
}

/// One running protocol server
#[async_trait]
pub trait ProtocolServer: Send + Sync {
    /// Delivers one message; requests yield their response, notifications `None`
    async fn dispatch(&self, message: Value) -> Result<Option<Value>, SessionError>;

    /// Stops the server; later dispatches fail
    async fn close(&self);
}

/// Creates isolated protocol servers
#[async_trait]
pub trait ServerFactory: Send + Sync {
    async fn open(&self) -> Result<Arc<dyn ProtocolServer>, SessionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Stateful { max_sessions: usize },
    Stateless,
}

/// Outcome of one inbound call
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Session the call belongs to; echoed back in the response header
    pub session_id: Option<String>,
    pub body: Option<Value>,
}

/// Whether `message` is a JSON-RPC `initialize` request
pub fn is_initialize_request(message: &Value) -> bool {
    message.get("method").and_then(Value::as_str) == Some("initialize")
        && message.get("id").is_some()
}

#[derive(Default)]
struct SessionTable {
    servers: HashMap<String, Arc<dyn ProtocolServer>>,
    order: VecDeque<String>,
}

pub struct SessionManager {
    factory: Arc<dyn ServerFactory>,
    mode: SessionMode,
    table: parking_lot::Mutex<SessionTable>,
}

impl SessionManager {
    pub fn new(factory: Arc<dyn ServerFactory>, mode: SessionMode) -> Self {
        Self {
            factory,
            mode,
            table: parking_lot::Mutex::new(SessionTable::default()),
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn session_count(&self) -> usize {
        self.table.lock().servers.len()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.table.lock().servers.contains_key(session_id)
    }

    /// Routes one inbound message
    pub async fn handle(&self, session_id: Option<&str>, message: Value) -> Result<Reply, SessionError> {
        if !message.is_object() {
            return Err(SessionError::InvalidMessage(
                "expected a single JSON-RPC message object".to_string(),
            ));
        }
        match self.mode {
            SessionMode::Stateless => self.handle_stateless(message).await,
            SessionMode::Stateful { max_sessions } => match session_id {
                Some(id) => {
                    let server = self
                        .lookup(id)
                        .ok_or_else(|| SessionError::UnknownSession(id.to_string()))?;
                    let body = match server.dispatch(message).await {
                        Ok(body) => body,
                        Err(err @ SessionError::Transport(_)) => {
                            self.discard(id, &server).await;
                            return Err(err);
                        }
                        Err(err) => return Err(err),
                    };
                    Ok(Reply {
                        session_id: Some(id.to_string()),
                        body,
                    })
                }
                None if is_initialize_request(&message) => {
                    self.open_session(message, max_sessions).await
                }
                None => Err(SessionError::MissingSessionId),
            },
        }
    }

    /// Closes a session explicitly
    pub async fn close(&self, session_id: &str) -> Result<(), SessionError> {
        let server = {
            let mut table = self.table.lock();
            let server = table
                .servers
                .remove(session_id)
                .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))?;
            table.order.retain(|id| id != session_id);
            server
        };
        server.close().await;
        info!(session_id, "Closed MCP session");
        Ok(())
    }

    /// Closes every open session
    pub async fn close_all(&self) {
        let servers: Vec<_> = {
            let mut table = self.table.lock();
            table.order.clear();
            table.servers.drain().collect()
        };
        let count = servers.len();
        for (_, server) in servers {
            server.close().await;
        }
        if count > 0 {
            info!(count, "Closed all MCP sessions");
        }
    }

    /// Drops a session whose server pipe failed, unless it was already replaced
    async fn discard(&self, session_id: &str, server: &Arc<dyn ProtocolServer>) {
        let removed = {
            let mut table = self.table.lock();
            let current = table
                .servers
                .get(session_id)
                .is_some_and(|entry| Arc::ptr_eq(entry, server));
            if current {
                table.servers.remove(session_id);
                table.order.retain(|id| id != session_id);
            }
            current
        };
        if removed {
            server.close().await;
            warn!(session_id, "Dropped MCP session after transport failure");
        }
    }

    fn lookup(&self, session_id: &str) -> Option<Arc<dyn ProtocolServer>> {
        self.table.lock().servers.get(session_id).cloned()
    }

    async fn open_session(&self, message: Value, max_sessions: usize) -> Result<Reply, SessionError> {
        let server = self.factory.open().await?;
        let body = match server.dispatch(message).await {
            Ok(body) => body,
            Err(err) => {
                server.close().await;
                return Err(err);
            }
        };

        let session_id = Uuid::new_v4().to_string();
        let evicted = {
            let mut table = self.table.lock();
            let mut evicted = Vec::new();
            while table.servers.len() >= max_sessions.max(1) {
                let Some(oldest) = table.order.pop_front() else {
                    break;
                };
                if let Some(server) = table.servers.remove(&oldest) {
                    evicted.push((oldest, server));
                }
            }
            table.servers.insert(session_id.clone(), server);
            table.order.push_back(session_id.clone());
            evicted
        };
        for (id, server) in evicted {
            info!(session_id = %id, "Evicting oldest MCP session");
            server.close().await;
        }
        info!(session_id = %session_id, "Opened MCP session");

        Ok(Reply {
            session_id: Some(session_id),
            body,
        })
    }

    async fn handle_stateless(&self, message: Value) -> Result<Reply, SessionError> {
        let server = self.factory.open().await?;
        let outcome = async {
            if !is_initialize_request(&message) {
                debug!("Initializing stateless MCP server");
                server.dispatch(handshake_request()).await?;
                server.dispatch(initialized_notification()).await?;
            }
            server.dispatch(message).await
        }
        .await;
        server.close().await;
        Ok(Reply {
            session_id: None,
            body: outcome?,
        })
    }
}

/// `initialize` request the manager sends on behalf of a stateless caller
pub fn handshake_request() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": "gitlab-mcp-handshake",
        "method": "initialize",
        "params": {
            "protocolVersion": HANDSHAKE_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": { "name": "gitlab-mcp-stateless", "version": env!("CARGO_PKG_VERSION") }
        }
    })
}

pub fn initialized_notification() -> Value {
    json!({ "jsonrpc": "2.0", "method": "notifications/initialized" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_initialize() {
        assert!(is_initialize_request(&handshake_request()));
        assert!(!is_initialize_request(&initialized_notification()));
        assert!(!is_initialize_request(
            &json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"})
        ));
    }

    #[test]
    fn statuses() {
        assert_eq!(SessionError::MissingSessionId.status(), 400);
        assert_eq!(SessionError::UnknownSession("x".into()).status(), 404);
        assert_eq!(SessionError::Transport("x".into()).status(), 500);
    }
}
