//! # mcp
//!
//! Facade crate: wires [`mcp_server`]'s dispatcher, session registry, and
//! notification manager together with [`mcp_transport`]'s stdio/HTTP/SSE
//! adapters behind a single builder, the way `turbomcp`'s top-level crate
//! assembles `turbomcp-server` and `turbomcp-transport` behind its own
//! `ServerBuilder`.
//!
//! ```no_run
//! use mcp::prelude::*;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let server = McpServer::builder("calculator", "1.0.0")
//!     .capability_tools()
//!     .tool(
//!         ToolDescriptor::new("add", serde_json::json!({"type": "object"})),
//!         |_ctx, args| async move {
//!             let a = args["a"].as_i64().unwrap_or_default();
//!             let b = args["b"].as_i64().unwrap_or_default();
//!             Ok(ToolOutcome::text((a + b).to_string()))
//!         },
//!     )
//!     .build();
//!
//! server.run_stdio().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use mcp_server::{
    CompletionProvider, Dispatcher, InMemoryCatalog, NotificationManager, PromptProvider,
    ResourceProvider, SecretStore, ServerConfig, ServerInfo, SessionRegistry, ToolContext,
    ToolOutcome,
};
use mcp_transport::TransportResult;
use mcp_types::{ListChangedCapability, ServerCapabilities, ToolDescriptor, UnitCapability};
use serde_json::Value;

pub mod prelude;

pub use mcp_server;
pub use mcp_transport;
pub use mcp_types;

/// Builds a [`McpServer`] from a tool catalog, optional resource/prompt/
/// completion providers, capabilities, and configuration.
pub struct McpServerBuilder {
    server_info: ServerInfo,
    server_capabilities: ServerCapabilities,
    config: ServerConfig,
    catalog: InMemoryCatalog,
    secrets: HashMap<String, String>,
    resources: Option<Arc<dyn ResourceProvider>>,
    prompts: Option<Arc<dyn PromptProvider>>,
    completions: Option<Arc<dyn CompletionProvider>>,
}

impl McpServerBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            server_info: ServerInfo { name: name.into(), version: version.into(), instructions: None },
            server_capabilities: ServerCapabilities::default(),
            config: ServerConfig::default(),
            catalog: InMemoryCatalog::new(),
            secrets: HashMap::new(),
            resources: None,
            prompts: None,
            completions: None,
        }
    }

    #[must_use]
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.server_info.instructions = Some(instructions.into());
        self
    }

    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn capability_tools(mut self) -> Self {
        self.server_capabilities.tools = Some(ListChangedCapability { list_changed: Some(true) });
        self
    }

    #[must_use]
    pub fn capability_resources(mut self, subscribe: bool) -> Self {
        self.server_capabilities.resources = Some(mcp_types::ResourcesCapability {
            subscribe: Some(subscribe),
            list_changed: Some(true),
        });
        self
    }

    #[must_use]
    pub fn capability_prompts(mut self) -> Self {
        self.server_capabilities.prompts = Some(ListChangedCapability { list_changed: Some(true) });
        self
    }

    #[must_use]
    pub fn capability_logging(mut self) -> Self {
        self.server_capabilities.logging = Some(UnitCapability {});
        self
    }

    #[must_use]
    pub fn capability_completions(mut self) -> Self {
        self.server_capabilities.completions = Some(UnitCapability {});
        self
    }

    /// Register a tool descriptor and its handler.
    #[must_use]
    pub fn tool<F, Fut>(mut self, descriptor: ToolDescriptor, handler: F) -> Self
    where
        F: Fn(ToolContext, Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = mcp_server::McpResult<ToolOutcome>> + Send + 'static,
    {
        self.catalog.register(descriptor, handler);
        self
    }

    #[must_use]
    pub fn secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn resources(mut self, provider: Arc<dyn ResourceProvider>) -> Self {
        self.resources = Some(provider);
        self
    }

    #[must_use]
    pub fn prompts(mut self, provider: Arc<dyn PromptProvider>) -> Self {
        self.prompts = Some(provider);
        self
    }

    #[must_use]
    pub fn completions(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.completions = Some(provider);
        self
    }

    #[must_use]
    pub fn build(self) -> McpServer {
        let catalog = Arc::new(self.catalog);
        let sessions = SessionRegistry::new();
        let notifications = Arc::new(NotificationManager::new(sessions.clone(), self.config.notifications.clone()));
        let event_store_capacity = self.config.event_store_capacity;

        let mut dispatcher = Dispatcher::new(
            sessions,
            notifications,
            catalog.clone(),
            catalog,
            Arc::new(self.secrets),
            self.server_capabilities,
            self.server_info,
            self.config,
        );
        if let Some(provider) = self.resources {
            dispatcher = dispatcher.with_resources(provider);
        }
        if let Some(provider) = self.prompts {
            dispatcher = dispatcher.with_prompts(provider);
        }
        if let Some(provider) = self.completions {
            dispatcher = dispatcher.with_completions(provider);
        }

        McpServer { dispatcher: Arc::new(dispatcher), event_store_capacity }
    }
}

/// An assembled server, ready to be driven by one or more transports.
///
/// The dispatcher is transport-agnostic and `Send + Sync`; nothing stops a
/// single process from serving stdio and HTTP/SSE concurrently against the
/// same [`Dispatcher`] (each transport mints and owns its own sessions).
#[derive(Clone)]
pub struct McpServer {
    pub dispatcher: Arc<Dispatcher>,
    event_store_capacity: usize,
}

impl McpServer {
    #[must_use]
    pub fn builder(name: impl Into<String>, version: impl Into<String>) -> McpServerBuilder {
        McpServerBuilder::new(name, version)
    }

    /// A ring-buffered [`mcp_transport::EventStore`] sized from
    /// [`ServerConfig::event_store_capacity`], for callers that don't need a
    /// durable store of their own.
    #[must_use]
    pub fn default_event_store(&self) -> Arc<dyn mcp_transport::EventStore> {
        Arc::new(mcp_transport::InMemoryEventStore::new(self.event_store_capacity))
    }

    /// Run this server over stdio until stdin closes.
    ///
    /// # Errors
    ///
    /// Returns a [`mcp_transport::TransportError`] on setup/IO failure.
    pub async fn run_stdio(&self) -> TransportResult<()> {
        mcp_transport::run_stdio(Arc::clone(&self.dispatcher)).await
    }

    /// Build the single-shot HTTP streaming router.
    #[must_use]
    pub fn http_router(&self) -> axum::Router {
        mcp_transport::http_router(mcp_transport::HttpState::new(Arc::clone(&self.dispatcher)))
    }

    /// Build the SSE router with resumable replay.
    #[must_use]
    pub fn sse_router(&self, event_store: Arc<dyn mcp_transport::EventStore>) -> axum::Router {
        mcp_transport::sse_router(mcp_transport::SseState::new(Arc::clone(&self.dispatcher), event_store))
    }
}
