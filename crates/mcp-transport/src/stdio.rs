//! stdio transport: NDJSON over stdin/stdout.
//!
//! Grounded on `turbomcp-server::transport::{stdio, line::LineTransportRunner}`:
//! one reader task parses lines off stdin and feeds the dispatcher, one
//! writer sink serializes writes to stdout behind a mutex so concurrent tool
//! tasks and notifications never interleave partial lines. A single
//! long-lived session is created per process, matching `turbomcp-server`'s
//! stdio entrypoint and the single-long-lived-session-per-process model.

use std::sync::Arc;

use mcp_server::{Dispatcher, OutboundChannel, Session};
use mcp_types::{IncomingMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::Mutex;
use tracing::{error, warn};

use crate::error::TransportResult;

/// Writes one JSON object per line to stdout, serialized behind a mutex.
#[derive(Debug)]
pub struct StdioChannel {
    stdout: Mutex<Stdout>,
}

impl StdioChannel {
    #[must_use]
    pub fn new(stdout: Stdout) -> Self {
        Self { stdout: Mutex::new(stdout) }
    }

    /// Write a pre-serialized JSON object as one terminated line.
    pub async fn write_line(&self, line: &str) -> mcp_server::McpResult<()> {
        let mut stdout = self.stdout.lock().await;
        stdout
            .write_all(line.as_bytes())
            .await
            .map_err(|e| mcp_server::McpError::Infrastructure(format!("stdout write failed: {e}")))?;
        stdout
            .write_all(b"\n")
            .await
            .map_err(|e| mcp_server::McpError::Infrastructure(format!("stdout write failed: {e}")))?;
        stdout
            .flush()
            .await
            .map_err(|e| mcp_server::McpError::Infrastructure(format!("stdout flush failed: {e}")))
    }
}

#[async_trait::async_trait]
impl OutboundChannel for StdioChannel {
    async fn send_request(&self, request: JsonRpcRequest) -> mcp_server::McpResult<()> {
        let line = serde_json::to_string(&request).map_err(mcp_server::McpError::from)?;
        self.write_line(&line).await
    }

    async fn send_notification(&self, notification: JsonRpcNotification) -> mcp_server::McpResult<()> {
        let line = serde_json::to_string(&notification).map_err(mcp_server::McpError::from)?;
        self.write_line(&line).await
    }
}

async fn write_response(channel: &StdioChannel, response: &JsonRpcResponse) {
    match serde_json::to_string(response) {
        Ok(text) => {
            if let Err(e) = channel.write_line(&text).await {
                warn!(error = %e, "failed to write response");
            }
        }
        Err(e) => error!(error = %e, "failed to serialize response"),
    }
}

/// Run the dispatcher against stdin/stdout until EOF.
///
/// # Errors
///
/// Returns [`crate::error::TransportError`] only for setup/IO failures that
/// abort the loop; malformed individual lines are reported to the client as
/// JSON-RPC parse errors and do not terminate it.
pub async fn run(dispatcher: Arc<Dispatcher>) -> TransportResult<()> {
    let session = Arc::new(Session::new());
    dispatcher.sessions.insert(Arc::clone(&session));

    // stdio carries no per-message headers; a bearer token for tools that
    // declare `requires_auth` comes from the launching process's environment
    // instead, read once for this process's single long-lived session.
    let bearer_token = std::env::var("MCP_BEARER_TOKEN").ok();

    let channel = Arc::new(StdioChannel::new(tokio::io::stdout()));
    let outbound: Arc<dyn OutboundChannel> = channel.clone();
    dispatcher.notifications.register_channel(session.id.clone(), Arc::clone(&outbound));

    let stdin: Stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await.map_err(crate::error::TransportError::Io)?;
        if bytes_read == 0 {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let message = match IncomingMessage::parse(trimmed) {
            Ok(message) => message,
            Err(err) => {
                write_response(&channel, &JsonRpcResponse::parse_error(err)).await;
                continue;
            }
        };

        if let Some(response) = dispatcher
            .handle(&session, Some(Arc::clone(&outbound)), bearer_token.clone(), message)
            .await
        {
            write_response(&channel, &response).await;
        }
    }

    dispatcher.drop_session(&session.id);
    Ok(())
}
