//! Message processor and method dispatcher.
//!
//! Grounded on `turbomcp-server::router::route_request_with_config`: that
//! function enforces protocol negotiation and required-capability checks
//! around a handler lookup. [`Dispatcher`] generalizes the lookup from a
//! single `McpHandler` trait object into an explicit static method table,
//! and folds in the lifecycle/middleware rules `turbomcp-server` splits
//! across its router and `middleware` module (logging and error-handling
//! live here directly rather than as separate `tower` layers, since this
//! core has no HTTP service boundary of its own).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use mcp_types::{
    negotiate_protocol_version, CallToolResult, ClientCapabilities, Cursor, IncomingMessage,
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, LogLevel, ProgressToken, RequestId,
    ServerCapabilities, PROTOCOL_VERSION, SUPPORTED_VERSIONS,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::{Page, PromptProvider, ResourceProvider, SecretStore, ToolCatalog, ToolExecutor};
use crate::config::ServerConfig;
use crate::context::{OutboundChannel, ToolContext};
use crate::error::{McpError, McpResult};
use crate::notifications::NotificationManager;
use crate::requests::RequestManager;
use crate::session::{Session, SessionRegistry};

/// Suggestions for `completion/complete`, handled inbound-only per the
/// direction decision in the design notes.
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, r#ref: Value, argument: Value) -> McpResult<Value>;
}

/// Static information returned in `initialize`'s `serverInfo`.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub instructions: Option<String>,
}

/// Wires together every collaborator the dispatcher needs: the catalog,
/// optional resource/prompt/completion providers, the secret store, the
/// notification and request managers, and the session registry.
pub struct Dispatcher {
    pub sessions: SessionRegistry,
    pub notifications: Arc<NotificationManager>,
    request_managers: DashMap<String, Arc<RequestManager>>,
    cancellations: DashMap<RequestId, CancellationToken>,
    catalog: Arc<dyn ToolCatalog>,
    executor: Arc<dyn ToolExecutor>,
    resources: Option<Arc<dyn ResourceProvider>>,
    prompts: Option<Arc<dyn PromptProvider>>,
    completions: Option<Arc<dyn CompletionProvider>>,
    secrets: Arc<dyn SecretStore>,
    config: ServerConfig,
    server_capabilities: ServerCapabilities,
    server_info: ServerInfo,
    page_size: usize,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        sessions: SessionRegistry,
        notifications: Arc<NotificationManager>,
        catalog: Arc<dyn ToolCatalog>,
        executor: Arc<dyn ToolExecutor>,
        secrets: Arc<dyn SecretStore>,
        server_capabilities: ServerCapabilities,
        server_info: ServerInfo,
        config: ServerConfig,
    ) -> Self {
        Self {
            sessions,
            notifications,
            request_managers: DashMap::new(),
            cancellations: DashMap::new(),
            catalog,
            executor,
            resources: None,
            prompts: None,
            completions: None,
            secrets,
            config,
            server_capabilities,
            server_info,
            page_size: 50,
        }
    }

    #[must_use]
    pub fn with_resources(mut self, provider: Arc<dyn ResourceProvider>) -> Self {
        self.resources = Some(provider);
        self
    }

    #[must_use]
    pub fn with_prompts(mut self, provider: Arc<dyn PromptProvider>) -> Self {
        self.prompts = Some(provider);
        self
    }

    #[must_use]
    pub fn with_completions(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.completions = Some(provider);
        self
    }

    fn request_manager_for(&self, session_id: &str) -> Arc<RequestManager> {
        Arc::clone(
            self.request_managers
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(RequestManager::new()))
                .value(),
        )
    }

    /// Resolve a client response against the issuing session's request table.
    pub fn resolve_client_response(&self, session_id: &str, response: JsonRpcResponse) -> bool {
        self.request_manager_for(session_id).resolve(response)
    }

    /// Tear down a session: reject any outstanding server->client requests
    /// with [`McpError::SessionClosed`] so a tool task blocked in
    /// `ToolContext::sample`/`elicit_form`/etc. fails immediately instead of
    /// waiting out its own timeout, then drop its notification channel and
    /// registry entry.
    pub fn drop_session(&self, session_id: &str) {
        if let Some((_, manager)) = self.request_managers.remove(session_id) {
            manager.close();
        }
        self.notifications.unregister_channel(session_id);
        self.sessions.remove(session_id);
    }

    /// Process one already-classified incoming message for `session`.
    /// Returns `Some(response)` for requests, `None` for notifications and
    /// for responses to server-initiated requests (which are resolved as a
    /// side effect, not answered).
    pub async fn handle(
        &self,
        session: &Arc<Session>,
        channel: Option<Arc<dyn OutboundChannel>>,
        bearer_token: Option<String>,
        message: IncomingMessage,
    ) -> Option<JsonRpcResponse> {
        match message {
            IncomingMessage::Request(request) => Some(self.handle_request(session, channel, bearer_token, request).await),
            IncomingMessage::Notification(notification) => {
                self.handle_notification(session, &notification.method, notification.params).await;
                None
            }
            IncomingMessage::Response(response) => {
                if !self.resolve_client_response(&session.id, response) {
                    warn!(session_id = %session.id, "dropped response with no matching outstanding request");
                }
                None
            }
        }
    }

    async fn handle_request(
        &self,
        session: &Arc<Session>,
        channel: Option<Arc<dyn OutboundChannel>>,
        bearer_token: Option<String>,
        request: JsonRpcRequest,
    ) -> JsonRpcResponse {
        let started = Instant::now();
        let method = request.method.clone();
        let id = request.id.clone();

        if !session.admits_method(&method) {
            info!(method = %method, session_id = %session.id, "rejected: not initialized");
            return JsonRpcResponse::error(id, JsonRpcError::not_initialized());
        }

        let outcome = self
            .route(session, channel, bearer_token, &method, request.params, id.clone())
            .await;

        let elapsed = started.elapsed();
        match outcome {
            Ok(result) => {
                info!(method = %method, session_id = %session.id, ?elapsed, "ok");
                JsonRpcResponse::success(id, result)
            }
            Err(err) => {
                info!(method = %method, session_id = %session.id, ?elapsed, error = %err, "error");
                JsonRpcResponse::error(id, err.into_jsonrpc_error(self.config.mask_error_details))
            }
        }
    }

    async fn route(
        &self,
        session: &Arc<Session>,
        channel: Option<Arc<dyn OutboundChannel>>,
        bearer_token: Option<String>,
        method: &str,
        params: Option<Value>,
        request_id: RequestId,
    ) -> McpResult<Value> {
        match method {
            "initialize" => self.handle_initialize(session, params),
            "ping" => Ok(json!({})),
            "tools/list" => self.handle_tools_list(params),
            "tools/call" => {
                self.handle_tools_call(session, channel, bearer_token, params, request_id)
                    .await
            }
            "resources/list" => self.handle_resources_list(params).await,
            "resources/templates/list" => Ok(json!({ "resourceTemplates": [] })),
            "resources/read" => self.handle_resources_read(params).await,
            "prompts/list" => self.handle_prompts_list(params).await,
            "prompts/get" => self.handle_prompts_get(params).await,
            "logging/setLevel" => self.handle_set_level(session, params),
            "completion/complete" => self.handle_completion(params).await,
            other => Err(McpError::MethodNotFound(other.to_string())),
        }
    }

    fn handle_initialize(&self, session: &Arc<Session>, params: Option<Value>) -> McpResult<Value> {
        let params = params.ok_or_else(|| McpError::InvalidParams("missing params".into()))?;
        let requested_version = params.get("protocolVersion").and_then(Value::as_str);
        let client_caps: ClientCapabilities = params
            .get("capabilities")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();
        let client_name = params
            .pointer("/clientInfo/name")
            .and_then(Value::as_str)
            .map(str::to_string);

        let version = match negotiate_protocol_version(requested_version) {
            Some(v) => v,
            None if self.config.allow_protocol_fallback => PROTOCOL_VERSION,
            None => {
                return Err(McpError::InvalidParams(format!(
                    "unsupported protocolVersion {requested_version:?}; supported {SUPPORTED_VERSIONS:?}"
                )))
            }
        };

        session.begin_initialize(version, &self.server_capabilities, &client_caps, client_name)?;

        let mut result = json!({
            "protocolVersion": version,
            "capabilities": self.server_capabilities,
            "serverInfo": { "name": self.server_info.name, "version": self.server_info.version },
        });
        if let Some(instructions) = &self.server_info.instructions {
            result["instructions"] = json!(instructions);
        }
        Ok(result)
    }

    fn handle_tools_list(&self, params: Option<Value>) -> McpResult<Value> {
        let cursor = parse_cursor(params.as_ref())?;
        let page = self.catalog.list(cursor.as_ref(), self.page_size)?;
        Ok(list_response("tools", &page))
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_tools_call(
        &self,
        session: &Arc<Session>,
        channel: Option<Arc<dyn OutboundChannel>>,
        bearer_token: Option<String>,
        params: Option<Value>,
        request_id: RequestId,
    ) -> McpResult<Value> {
        let params = params.ok_or_else(|| McpError::InvalidParams("missing params".into()))?;
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| McpError::InvalidParams("missing 'name'".into()))?;
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
        let progress_token: Option<ProgressToken> = params
            .pointer("/_meta/progressToken")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?;

        let descriptor = self
            .catalog
            .get(name)
            .ok_or_else(|| McpError::ToolNotFound(name.to_string()))?;

        validate_arguments(&descriptor.input_schema, &arguments)?;

        if descriptor.requires_auth && bearer_token.as_deref().unwrap_or("").is_empty() {
            return Err(McpError::MissingAuth);
        }

        let secret_names = descriptor.requires_secrets.clone();
        let mut secrets = HashMap::new();
        for secret_name in &secret_names {
            let value = self
                .secrets
                .get(secret_name)
                .ok_or_else(|| McpError::MissingSecret(secret_name.clone()))?;
            secrets.insert(secret_name.clone(), value);
        }

        let mut ctx = ToolContext::new(
            Arc::clone(session),
            channel,
            self.request_manager_for(&session.id),
            Arc::new(secrets),
        )
        .with_bearer_token(bearer_token);
        if let Some(token) = progress_token.clone() {
            ctx = ctx.with_progress_token(token);
        }

        let cancel_token = ctx.cancellation_token();
        self.cancellations.insert(request_id.clone(), cancel_token);

        let outcome = self.executor.call(ctx, name, arguments).await;
        self.cancellations.remove(&request_id);

        let result = match outcome {
            Ok(outcome) => match outcome.structured_content {
                Some(structured) => CallToolResult::ok_structured(outcome.content, structured),
                None => CallToolResult::ok(outcome.content),
            },
            Err(err) if err.is_infrastructure() => {
                return Err(err);
            }
            Err(err) => CallToolResult::error(err.to_string()),
        };

        serde_json::to_value(result).map_err(McpError::from)
    }

    async fn handle_resources_list(&self, params: Option<Value>) -> McpResult<Value> {
        let cursor = parse_cursor(params.as_ref())?;
        match &self.resources {
            Some(provider) => {
                let page = provider.list(cursor.as_ref()).await?;
                Ok(list_response("resources", &page))
            }
            None => Ok(json!({ "resources": [] })),
        }
    }

    async fn handle_resources_read(&self, params: Option<Value>) -> McpResult<Value> {
        let params = params.ok_or_else(|| McpError::InvalidParams("missing params".into()))?;
        let uri = params
            .get("uri")
            .and_then(Value::as_str)
            .ok_or_else(|| McpError::InvalidParams("missing 'uri'".into()))?;
        match &self.resources {
            Some(provider) => {
                let contents = provider.read(uri).await?;
                Ok(json!({ "contents": [contents] }))
            }
            None => Err(McpError::InvalidParams(format!("no resource provider registered for {uri}"))),
        }
    }

    async fn handle_prompts_list(&self, params: Option<Value>) -> McpResult<Value> {
        let cursor = parse_cursor(params.as_ref())?;
        match &self.prompts {
            Some(provider) => {
                let page = provider.list(cursor.as_ref()).await?;
                Ok(list_response("prompts", &page))
            }
            None => Ok(json!({ "prompts": [] })),
        }
    }

    async fn handle_prompts_get(&self, params: Option<Value>) -> McpResult<Value> {
        let params = params.ok_or_else(|| McpError::InvalidParams("missing params".into()))?;
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| McpError::InvalidParams("missing 'name'".into()))?;
        let arguments = params.get("arguments").cloned();
        match &self.prompts {
            Some(provider) => {
                let messages = provider.get(name, arguments).await?;
                Ok(json!({ "messages": messages }))
            }
            None => Err(McpError::InvalidParams(format!("no prompt registered named {name}"))),
        }
    }

    fn handle_set_level(&self, session: &Arc<Session>, params: Option<Value>) -> McpResult<Value> {
        let params = params.ok_or_else(|| McpError::InvalidParams("missing params".into()))?;
        let level: LogLevel = params
            .get("level")
            .cloned()
            .ok_or_else(|| McpError::InvalidParams("missing 'level'".into()))
            .and_then(|v| serde_json::from_value(v).map_err(McpError::from))?;
        session.set_min_log_level(level);
        Ok(json!({}))
    }

    async fn handle_completion(&self, params: Option<Value>) -> McpResult<Value> {
        let params = params.ok_or_else(|| McpError::InvalidParams("missing params".into()))?;
        let reference = params
            .get("ref")
            .cloned()
            .ok_or_else(|| McpError::InvalidParams("missing 'ref'".into()))?;
        let argument = params
            .get("argument")
            .cloned()
            .ok_or_else(|| McpError::InvalidParams("missing 'argument'".into()))?;
        match &self.completions {
            Some(provider) => provider.complete(reference, argument).await,
            None => Ok(json!({ "completion": { "values": [], "total": 0, "hasMore": false } })),
        }
    }

    async fn handle_notification(&self, session: &Arc<Session>, method: &str, params: Option<Value>) {
        match method {
            "notifications/initialized" => {
                if let Err(err) = session.mark_ready() {
                    warn!(session_id = %session.id, error = %err, "notifications/initialized rejected");
                }
            }
            "notifications/cancelled" => {
                let request_id: Option<RequestId> = params
                    .as_ref()
                    .and_then(|p| p.get("requestId"))
                    .cloned()
                    .and_then(|v| serde_json::from_value(v).ok());
                if let Some(id) = request_id {
                    if let Some((_, token)) = self.cancellations.remove(&id) {
                        token.cancel();
                    }
                }
            }
            other => {
                info!(method = %other, session_id = %session.id, "unknown notification dropped");
            }
        }
    }
}

fn parse_cursor(params: Option<&Value>) -> McpResult<Option<Cursor>> {
    let Some(params) = params else { return Ok(None) };
    match params.get("cursor") {
        Some(Value::String(s)) => Ok(Some(Cursor(s.clone()))),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(McpError::InvalidParams("'cursor' must be a string".into())),
    }
}

fn list_response<T: serde::Serialize>(key: &str, page: &Page<T>) -> Value {
    let mut map = serde_json::Map::new();
    map.insert(key.to_string(), json!(page.items));
    if let Some(cursor) = &page.next_cursor {
        map.insert("nextCursor".to_string(), json!(cursor.0));
    }
    Value::Object(map)
}

fn validate_arguments(schema: &Value, arguments: &Value) -> McpResult<()> {
    let compiled = jsonschema::validator_for(schema)
        .map_err(|e| McpError::Internal(format!("invalid tool input_schema: {e}")))?;
    let errors: Vec<String> = compiled
        .iter_errors(arguments)
        .map(|e| format!("{}: {}", e.instance_path, e))
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(McpError::InvalidParams(errors.join("; ")))
    }
}

/// Default request timeout for server→client requests issued through a
/// `ToolContext`.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InMemoryCatalog, ToolOutcome};
    use crate::config::NotificationConfig;
    use std::collections::HashMap as StdHashMap;

    fn build_dispatcher() -> Dispatcher {
        let mut catalog = InMemoryCatalog::new();
        catalog.register(
            mcp_types::ToolDescriptor::new(
                "echo",
                json!({"type": "object", "properties": {"text": {"type": "string"}}, "required": ["text"]}),
            ),
            |_ctx, args| async move { Ok(ToolOutcome::text(args["text"].as_str().unwrap_or("").to_string())) },
        );
        let catalog = Arc::new(catalog);
        let sessions = SessionRegistry::new();
        let notifications = Arc::new(NotificationManager::new(sessions.clone(), NotificationConfig::default()));
        Dispatcher::new(
            sessions,
            notifications,
            catalog.clone(),
            catalog,
            Arc::new(StdHashMap::<String, String>::new()),
            ServerCapabilities { tools: Some(Default::default()), ..Default::default() },
            ServerInfo { name: "test".into(), version: "0.1.0".into(), instructions: None },
            ServerConfig::default(),
        )
    }

    async fn initialized_session(dispatcher: &Dispatcher) -> Arc<Session> {
        let session = Arc::new(Session::new());
        dispatcher.sessions.insert(Arc::clone(&session));
        let init = JsonRpcRequest::new(
            "initialize",
            Some(json!({"protocolVersion": "2025-06-18", "capabilities": {}})),
            1i64,
        );
        let response = dispatcher
            .handle(&session, None, None, IncomingMessage::Request(init))
            .await
            .unwrap();
        assert!(response.is_success());
        session.mark_ready().unwrap();
        session
    }

    #[tokio::test]
    async fn request_before_initialize_is_rejected() {
        let dispatcher = build_dispatcher();
        let session = Arc::new(Session::new());
        let request = JsonRpcRequest::new("tools/list", None, 1i64);
        let response = dispatcher
            .handle(&session, None, None, IncomingMessage::Request(request))
            .await
            .unwrap();
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn full_lifecycle_then_tool_call() {
        let dispatcher = build_dispatcher();
        let session = initialized_session(&dispatcher).await;

        let call = JsonRpcRequest::new(
            "tools/call",
            Some(json!({"name": "echo", "arguments": {"text": "hi"}})),
            2i64,
        );
        let response = dispatcher
            .handle(&session, None, None, IncomingMessage::Request(call))
            .await
            .unwrap();
        assert!(response.is_success());
        let result = response.result().unwrap();
        assert_eq!(result["isError"], false);
        assert_eq!(result["content"][0]["text"], "hi");
    }

    #[tokio::test]
    async fn invalid_arguments_rejected_before_invocation() {
        let dispatcher = build_dispatcher();
        let session = initialized_session(&dispatcher).await;

        let call = JsonRpcRequest::new("tools/call", Some(json!({"name": "echo", "arguments": {}})), 3i64);
        let response = dispatcher
            .handle(&session, None, None, IncomingMessage::Request(call))
            .await
            .unwrap();
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn drop_session_rejects_outstanding_client_requests() {
        let dispatcher = build_dispatcher();
        let session = initialized_session(&dispatcher).await;
        let manager = dispatcher.request_manager_for(&session.id);

        let call = {
            let manager = Arc::clone(&manager);
            let id = manager.next_id();
            tokio::spawn(async move { manager.call(id, Duration::from_secs(30)).await })
        };

        tokio::task::yield_now().await;
        dispatcher.drop_session(&session.id);

        let result = call.await.unwrap();
        assert!(matches!(result, Err(McpError::SessionClosed)));
    }

    #[tokio::test]
    async fn unknown_tool_is_protocol_error() {
        let dispatcher = build_dispatcher();
        let session = initialized_session(&dispatcher).await;
        let call = JsonRpcRequest::new("tools/call", Some(json!({"name": "nope", "arguments": {}})), 4i64);
        let response = dispatcher
            .handle(&session, None, None, IncomingMessage::Request(call))
            .await
            .unwrap();
        assert!(!response.is_success());
    }

    fn build_dispatcher_with_guarded_tool() -> Dispatcher {
        let mut catalog = InMemoryCatalog::new();
        catalog.register(
            mcp_types::ToolDescriptor::new("whoami", json!({"type": "object"})).requiring_auth(),
            |ctx, _args| async move { Ok(ToolOutcome::text(ctx.require_bearer_token()?.to_string())) },
        );
        let catalog = Arc::new(catalog);
        let sessions = SessionRegistry::new();
        let notifications = Arc::new(NotificationManager::new(sessions.clone(), NotificationConfig::default()));
        Dispatcher::new(
            sessions,
            notifications,
            catalog.clone(),
            catalog,
            Arc::new(StdHashMap::<String, String>::new()),
            ServerCapabilities { tools: Some(Default::default()), ..Default::default() },
            ServerInfo { name: "test".into(), version: "0.1.0".into(), instructions: None },
            ServerConfig::default(),
        )
    }

    #[tokio::test]
    async fn tool_requiring_auth_rejects_missing_bearer_token() {
        let dispatcher = build_dispatcher_with_guarded_tool();
        let session = initialized_session(&dispatcher).await;
        let call = JsonRpcRequest::new("tools/call", Some(json!({"name": "whoami", "arguments": {}})), 5i64);
        let response = dispatcher
            .handle(&session, None, None, IncomingMessage::Request(call))
            .await
            .unwrap();
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn tool_requiring_auth_succeeds_when_bearer_token_is_threaded_through() {
        let dispatcher = build_dispatcher_with_guarded_tool();
        let session = initialized_session(&dispatcher).await;
        let call = JsonRpcRequest::new("tools/call", Some(json!({"name": "whoami", "arguments": {}})), 6i64);
        let response = dispatcher
            .handle(&session, None, Some("secret-token".to_string()), IncomingMessage::Request(call))
            .await
            .unwrap();
        assert!(response.is_success());
        assert_eq!(response.result().unwrap()["content"][0]["text"], "secret-token");
    }
}
