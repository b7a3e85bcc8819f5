//! In-process pipe between the HTTP transport and an rmcp server
//!
//! Each [`DuplexSession`] runs one [`GitLabTools`] instance over a
//! `tokio::io::duplex` pair speaking newline-delimited JSON-RPC, the same
//! framing rmcp uses on stdio. Calls into one session are serialized; the
//! response to a request is the first line whose `id` matches.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rmcp::ServiceExt;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::session::{ProtocolServer, ServerFactory, SessionError};
use crate::tools::GitLabTools;

const PIPE_CAPACITY: usize = 64 * 1024;

/// Longest time a single request may wait for its response
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(300);

struct Pipe {
    writer: WriteHalf<DuplexStream>,
    reader: Lines<BufReader<ReadHalf<DuplexStream>>>,
}

pub struct DuplexSession {
    pipe: tokio::sync::Mutex<Option<Pipe>>,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl DuplexSession {
    /// Starts `tools` on a fresh pipe
    pub fn spawn(tools: GitLabTools) -> Self {
        let (client, server) = tokio::io::duplex(PIPE_CAPACITY);
        let (server_read, server_write) = tokio::io::split(server);
        let task = tokio::spawn(async move {
            match tools.serve((server_read, server_write)).await {
                Ok(running) => {
                    if let Err(e) = running.waiting().await {
                        debug!("MCP session task ended: {}", e);
                    }
                }
                Err(e) => warn!("MCP session failed to initialize: {}", e),
            }
        });

        let (client_read, client_write) = tokio::io::split(client);
        Self {
            pipe: tokio::sync::Mutex::new(Some(Pipe {
                writer: client_write,
                reader: BufReader::new(client_read).lines(),
            })),
            task: parking_lot::Mutex::new(Some(task)),
        }
    }
}

fn is_request(message: &Value) -> bool {
    message.get("method").is_some() && message.get("id").is_some_and(|id| !id.is_null())
}

fn broken(err: impl std::fmt::Display) -> SessionError {
    SessionError::Transport(err.to_string())
}

async fn await_response(pipe: &mut Pipe, id: &Value) -> Result<Value, SessionError> {
    while let Some(line) = pipe.reader.next_line().await.map_err(broken)? {
        if line.trim().is_empty() {
            continue;
        }
        let message: Value = serde_json::from_str(&line).map_err(broken)?;
        let is_reply = message.get("method").is_none() && message.get("id") == Some(id);
        if is_reply {
            return Ok(message);
        }
        debug!("Dropping server-initiated message on HTTP session");
    }
    Err(SessionError::Transport("server closed the session".to_string()))
}

#[async_trait]
impl ProtocolServer for DuplexSession {
    async fn dispatch(&self, message: Value) -> Result<Option<Value>, SessionError> {
        let mut guard = self.pipe.lock().await;
        let pipe = guard
            .as_mut()
            .ok_or_else(|| SessionError::Transport("session is closed".to_string()))?;

        let mut line = serde_json::to_vec(&message).map_err(broken)?;
        line.push(b'\n');
        pipe.writer.write_all(&line).await.map_err(broken)?;
        pipe.writer.flush().await.map_err(broken)?;

        if !is_request(&message) {
            return Ok(None);
        }
        let id = message.get("id").cloned().unwrap_or(Value::Null);
        let response = tokio::time::timeout(RESPONSE_TIMEOUT, await_response(pipe, &id))
            .await
            .map_err(|_| SessionError::Transport("timed out waiting for response".to_string()))??;
        Ok(Some(response))
    }

    async fn close(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.pipe.lock().await.take();
    }
}

/// Opens one [`DuplexSession`] per session, each with its own tools instance
pub struct ToolsFactory {
    tools: GitLabTools,
}

impl ToolsFactory {
    pub fn new(tools: GitLabTools) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl ServerFactory for ToolsFactory {
    async fn open(&self) -> Result<Arc<dyn ProtocolServer>, SessionError> {
        Ok(Arc::new(DuplexSession::spawn(self.tools.for_session())))
    }
}
