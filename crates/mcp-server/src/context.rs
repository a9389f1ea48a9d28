//! Tool invocation context.
//!
//! Grounded on `turbomcp-server::context::RequestContext`: that type bundles
//! transport metadata, a cancellation token, and an `McpSession` handle for
//! `elicit_form`/`elicit_url`/`sample`. [`ToolContext`] keeps that shape and
//! widens the bidirectional surface with `roots/list`, plus the logging,
//! progress, and secrets/auth facets a tool body needs from the same
//! context. Completion stays client-origin only; there is no `.complete()`
//! here.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mcp_types::{JsonRpcNotification, JsonRpcRequest, LogLevel, ProgressToken, RequestId};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{McpError, McpResult};
use crate::requests::RequestManager;
use crate::session::Session;

/// What a transport must provide so `ToolContext` can talk back to the
/// client. Implemented by each adapter in `mcp-transport`; kept here as a
/// trait object so `mcp-server` never depends on any concrete transport.
#[async_trait::async_trait]
pub trait OutboundChannel: Send + Sync + std::fmt::Debug {
    async fn send_request(&self, request: JsonRpcRequest) -> McpResult<()>;
    async fn send_notification(&self, notification: JsonRpcNotification) -> McpResult<()>;
}

/// The bidirectional half of a tool's execution environment: everything it
/// can ask the client for and report back to it, scoped to one call.
pub struct ToolContext {
    session: Arc<Session>,
    channel: Option<Arc<dyn OutboundChannel>>,
    requests: Arc<RequestManager>,
    call_id: String,
    progress_token: Option<ProgressToken>,
    secrets: Arc<HashMap<String, String>>,
    bearer_token: Option<String>,
    cancellation: CancellationToken,
    default_timeout: Duration,
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("call_id", &self.call_id)
            .field("session_id", &self.session.id)
            .field("progress_token", &self.progress_token)
            .finish_non_exhaustive()
    }
}

impl ToolContext {
    #[must_use]
    pub fn new(
        session: Arc<Session>,
        channel: Option<Arc<dyn OutboundChannel>>,
        requests: Arc<RequestManager>,
        secrets: Arc<HashMap<String, String>>,
    ) -> Self {
        Self {
            session,
            channel,
            requests,
            call_id: uuid::Uuid::new_v4().to_string(),
            progress_token: None,
            secrets,
            bearer_token: None,
            cancellation: CancellationToken::new(),
            default_timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_progress_token(mut self, token: ProgressToken) -> Self {
        self.session.track_progress_token(token.clone());
        self.progress_token = Some(token);
        self
    }

    #[must_use]
    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token;
        self
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    // --- logging facet --------------------------------

    /// Emit `notifications/message` at `level` if the session's negotiated
    /// minimum admits it.
    pub async fn log(&self, level: LogLevel, logger: Option<&str>, data: Value) -> McpResult<()> {
        if !self.session.negotiated().logging || !self.session.admits_log(level) {
            return Ok(());
        }
        let Some(channel) = &self.channel else {
            return Ok(());
        };
        let mut params = serde_json::json!({ "level": level.to_string(), "data": data });
        if let Some(logger) = logger {
            params["logger"] = Value::String(logger.to_string());
        }
        channel
            .send_notification(JsonRpcNotification::new("notifications/message", Some(params)))
            .await
    }

    pub async fn debug(&self, data: Value) -> McpResult<()> {
        self.log(LogLevel::Debug, None, data).await
    }

    pub async fn info(&self, data: Value) -> McpResult<()> {
        self.log(LogLevel::Info, None, data).await
    }

    pub async fn warning(&self, data: Value) -> McpResult<()> {
        self.log(LogLevel::Warning, None, data).await
    }

    pub async fn error(&self, data: Value) -> McpResult<()> {
        self.log(LogLevel::Error, None, data).await
    }

    // --- progress facet --------------------------------

    /// Open a scoped progress tracker against this call's token, or `None`
    /// if the client sent no `progressToken`. Call `update`/`increment` as
    /// work proceeds; on drop, if `total` was given and the last reported
    /// value hadn't reached it, a terminal `progress == total` notification
    /// is emitted so the client always sees completion, even on failure.
    #[must_use]
    pub fn progress(&self, total: Option<f64>) -> Option<ProgressScope> {
        let token = self.progress_token.clone()?;
        Some(ProgressScope::new(token, self.channel.clone(), total))
    }

    // --- secrets / auth facet --------------------------

    /// Fetch a named secret the tool declared in `requires_secrets`.
    ///
    /// # Errors
    ///
    /// [`McpError::MissingSecret`] if the name wasn't provisioned.
    pub fn get_secret(&self, name: &str) -> McpResult<&str> {
        self.secrets
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| McpError::MissingSecret(name.to_string()))
    }

    /// The caller's bearer token, if the transport attached one.
    ///
    /// # Errors
    ///
    /// [`McpError::MissingAuth`] if the tool requires auth but none is set.
    pub fn require_bearer_token(&self) -> McpResult<&str> {
        match self.bearer_token.as_deref() {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(McpError::MissingAuth),
        }
    }

    // --- bidirectional client API ----------------

    async fn client_request(&self, method: &str, params: Value) -> McpResult<Value> {
        if !self.session.negotiated().admits_client_request(method) {
            return Err(McpError::CapabilityUnavailable(method.to_string()));
        }
        let Some(channel) = &self.channel else {
            return Err(McpError::CapabilityUnavailable(
                "no outbound channel on this transport".into(),
            ));
        };
        let id = self.requests.next_id();
        let request = JsonRpcRequest::new(method, Some(params), id.clone());
        channel.send_request(request).await?;
        let response = self.requests.call(id, self.default_timeout).await?;
        match response.result() {
            Some(value) => Ok(value.clone()),
            None => Err(McpError::Internal(format!("{method} returned an error"))),
        }
    }

    /// Request LLM sampling from the client (`sampling/createMessage`).
    pub async fn sample(&self, request: Value) -> McpResult<Value> {
        self.client_request("sampling/createMessage", request).await
    }

    /// Request structured user input via a form (`elicitation/create`).
    pub async fn elicit_form(&self, message: impl Into<String>, schema: Value) -> McpResult<Value> {
        let params = serde_json::json!({
            "mode": "form",
            "message": message.into(),
            "requestedSchema": schema,
        });
        self.client_request("elicitation/create", params).await
    }

    /// Request the user perform an out-of-band action via a URL.
    pub async fn elicit_url(
        &self,
        message: impl Into<String>,
        url: impl Into<String>,
        elicitation_id: impl Into<String>,
    ) -> McpResult<Value> {
        let params = serde_json::json!({
            "mode": "url",
            "message": message.into(),
            "url": url.into(),
            "elicitationId": elicitation_id.into(),
        });
        self.client_request("elicitation/create", params).await
    }

    /// List the client's filesystem roots (`roots/list`).
    pub async fn list_roots(&self) -> McpResult<Value> {
        self.client_request("roots/list", Value::Null).await
    }
}

impl Drop for ToolContext {
    fn drop(&mut self) {
        if let Some(token) = self.progress_token.take() {
            self.session.untrack_progress_token(&token);
        }
    }
}

/// A scoped progress reporter for one tool call, acquired via
/// [`ToolContext::progress`]. Tracks the last reported value and, if a
/// `total` was declared, guarantees a terminal `progress == total`
/// notification on every exit path, including early return on error.
pub struct ProgressScope {
    token: ProgressToken,
    channel: Option<Arc<dyn OutboundChannel>>,
    total: Option<f64>,
    current: Mutex<f64>,
    completed: AtomicBool,
}

impl ProgressScope {
    fn new(token: ProgressToken, channel: Option<Arc<dyn OutboundChannel>>, total: Option<f64>) -> Self {
        Self {
            token,
            channel,
            total,
            current: Mutex::new(0.0),
            completed: AtomicBool::new(false),
        }
    }

    /// Report an absolute progress value.
    pub async fn update(&self, progress: f64, message: Option<String>) -> McpResult<()> {
        *self.current.lock().unwrap() = progress;
        self.mark_if_complete(progress);
        self.emit(progress, message).await
    }

    /// Report progress by adding `delta` to the last reported value.
    pub async fn increment(&self, delta: f64, message: Option<String>) -> McpResult<()> {
        let progress = {
            let mut current = self.current.lock().unwrap();
            *current += delta;
            *current
        };
        self.mark_if_complete(progress);
        self.emit(progress, message).await
    }

    fn mark_if_complete(&self, progress: f64) {
        if self.total.is_some_and(|total| progress >= total) {
            self.completed.store(true, Ordering::Relaxed);
        }
    }

    async fn emit(&self, progress: f64, message: Option<String>) -> McpResult<()> {
        let Some(channel) = &self.channel else {
            return Ok(());
        };
        let mut params = serde_json::json!({ "progressToken": self.token, "progress": progress });
        if let Some(total) = self.total {
            params["total"] = serde_json::json!(total);
        }
        if let Some(message) = message {
            params["message"] = Value::String(message);
        }
        channel
            .send_notification(JsonRpcNotification::new("notifications/progress", Some(params)))
            .await
    }
}

impl Drop for ProgressScope {
    fn drop(&mut self) {
        if self.completed.load(Ordering::Relaxed) {
            return;
        }
        let Some(total) = self.total else { return };
        let Some(channel) = self.channel.clone() else { return };
        let token = self.token.clone();

        tokio::spawn(async move {
            let params = serde_json::json!({ "progressToken": token, "progress": total, "total": total });
            let _ = channel
                .send_notification(JsonRpcNotification::new("notifications/progress", Some(params)))
                .await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingChannel {
        notifications: Mutex<Vec<JsonRpcNotification>>,
    }

    #[async_trait::async_trait]
    impl OutboundChannel for RecordingChannel {
        async fn send_request(&self, _request: JsonRpcRequest) -> McpResult<()> {
            Ok(())
        }

        async fn send_notification(&self, notification: JsonRpcNotification) -> McpResult<()> {
            self.notifications.lock().unwrap().push(notification);
            Ok(())
        }
    }

    fn ready_session() -> Arc<Session> {
        let session = Session::new();
        session
            .begin_initialize(
                "2025-06-18",
                &mcp_types::ServerCapabilities {
                    logging: Some(Default::default()),
                    ..Default::default()
                },
                &mcp_types::ClientCapabilities::default(),
                None,
            )
            .unwrap();
        session.mark_ready().unwrap();
        Arc::new(session)
    }

    #[tokio::test]
    async fn log_below_min_level_is_suppressed() {
        let session = ready_session();
        session.set_min_log_level(LogLevel::Error);
        let channel = Arc::new(RecordingChannel::default());
        let ctx = ToolContext::new(
            session,
            Some(channel.clone()),
            Arc::new(RequestManager::new()),
            Arc::new(HashMap::new()),
        );
        ctx.info(serde_json::json!("hi")).await.unwrap();
        assert!(channel.notifications.lock().unwrap().is_empty());

        ctx.error(serde_json::json!("boom")).await.unwrap();
        assert_eq!(channel.notifications.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn progress_scope_is_none_without_a_token() {
        let session = ready_session();
        let channel = Arc::new(RecordingChannel::default());
        let ctx = ToolContext::new(
            session,
            Some(channel.clone()),
            Arc::new(RequestManager::new()),
            Arc::new(HashMap::new()),
        );
        assert!(ctx.progress(Some(1.0)).is_none());
    }

    #[tokio::test]
    async fn progress_scope_emits_terminal_notification_on_early_drop() {
        let session = ready_session();
        let channel = Arc::new(RecordingChannel::default());
        let ctx = ToolContext::new(
            session,
            Some(channel.clone()),
            Arc::new(RequestManager::new()),
            Arc::new(HashMap::new()),
        )
        .with_progress_token(ProgressToken::String("p1".into()));

        {
            let scope = ctx.progress(Some(10.0)).expect("token was set");
            scope.update(3.0, None).await.unwrap();
        }
        // Drop ran the terminal-notification spawn; give it a chance to run.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let notifications = channel.notifications.lock().unwrap();
        assert_eq!(notifications.len(), 2);
        let last = notifications.last().unwrap().params.as_ref().unwrap();
        assert_eq!(last["progress"], 10.0);
        assert_eq!(last["total"], 10.0);
    }

    #[tokio::test]
    async fn progress_scope_skips_terminal_notification_once_total_is_reached() {
        let session = ready_session();
        let channel = Arc::new(RecordingChannel::default());
        let ctx = ToolContext::new(
            session,
            Some(channel.clone()),
            Arc::new(RequestManager::new()),
            Arc::new(HashMap::new()),
        )
        .with_progress_token(ProgressToken::String("p1".into()));

        {
            let scope = ctx.progress(Some(3.0)).expect("token was set");
            scope.increment(1.0, None).await.unwrap();
            scope.increment(1.0, None).await.unwrap();
            scope.increment(1.0, None).await.unwrap();
        }
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(channel.notifications.lock().unwrap().len(), 3);
    }

    #[test]
    fn missing_secret_errors_with_name() {
        let session = ready_session();
        let ctx = ToolContext::new(
            session,
            None,
            Arc::new(RequestManager::new()),
            Arc::new(HashMap::new()),
        );
        let err = ctx.get_secret("api_key").unwrap_err();
        assert!(matches!(err, McpError::MissingSecret(name) if name == "api_key"));
    }

    #[tokio::test]
    async fn client_request_rejected_when_capability_not_negotiated() {
        let session = ready_session();
        let ctx = ToolContext::new(
            session,
            None,
            Arc::new(RequestManager::new()),
            Arc::new(HashMap::new()),
        );
        let err = ctx.sample(serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::CapabilityUnavailable(_)));
    }
}
