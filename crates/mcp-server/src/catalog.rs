//! External collaborator interfaces: tool catalog/executor, resource and
//! prompt providers, secret/auth resolvers.
//!
//! The core only ever consumes these through trait objects; it never owns a
//! concrete registry. Grounded on `turbomcp-core::handler`'s
//! handler-trait-plus-registry split, generalized to an explicit
//! name→(descriptor, callable) registry: decoration at the call site is a
//! convenience, the dispatcher only ever sees the registry.

use std::collections::HashMap;

use async_trait::async_trait;
use mcp_types::{Cursor, PromptDescriptor, ResourceDescriptor, ToolDescriptor};
use serde_json::Value;

use crate::context::ToolContext;
use crate::error::McpResult;

/// A page of list results plus an opaque continuation cursor.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<Cursor>,
}

/// Read-only access to the set of registered tools.
pub trait ToolCatalog: Send + Sync {
    fn get(&self, name: &str) -> Option<ToolDescriptor>;

    /// Slice the catalog starting after `cursor`, in a stable order.
    ///
    /// # Errors
    ///
    /// Implementations return [`crate::error::McpError::InvalidParams`] for
    /// a cursor that doesn't denote a valid offset.
    fn list(&self, cursor: Option<&Cursor>, page_size: usize) -> McpResult<Page<ToolDescriptor>>;
}

/// Invokes a named tool with a prepared context and validated arguments.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run `name` with `arguments`, returning whatever the tool body
    /// produced or the error it raised. The caller (the dispatcher) is
    /// responsible for translating a raised error into
    /// `CallToolResult{is_error:true}` — this trait only reports
    /// success/failure of execution itself, not protocol shaping.
    async fn call(&self, ctx: ToolContext, name: &str, arguments: Value) -> McpResult<ToolOutcome>;
}

/// What a tool handed back before the dispatcher wraps it into a `CallToolResult`.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub content: Vec<mcp_types::ContentBlock>,
    pub structured_content: Option<Value>,
}

impl ToolOutcome {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![mcp_types::ContentBlock::text(text)],
            structured_content: None,
        }
    }
}

/// An in-memory tool catalog + executor, sufficient for embedding tests and
/// small servers; production deployments may supply their own.
pub struct InMemoryCatalog {
    tools: HashMap<String, (ToolDescriptor, BoxedHandler)>,
}

type BoxedHandler = Box<
    dyn for<'a> Fn(
            ToolContext,
            Value,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = McpResult<ToolOutcome>> + Send + 'a>>
        + Send
        + Sync,
>;

impl std::fmt::Debug for InMemoryCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCatalog")
            .field("tool_count", &self.tools.len())
            .finish()
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    /// Register a tool and its handler. Last registration for a given name wins.
    pub fn register<F, Fut>(&mut self, descriptor: ToolDescriptor, handler: F)
    where
        F: Fn(ToolContext, Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = McpResult<ToolOutcome>> + Send + 'static,
    {
        let name = descriptor.name.clone();
        let boxed: BoxedHandler = Box::new(move |ctx, args| Box::pin(handler(ctx, args)));
        self.tools.insert(name, (descriptor, boxed));
    }
}

impl ToolCatalog for InMemoryCatalog {
    fn get(&self, name: &str) -> Option<ToolDescriptor> {
        self.tools.get(name).map(|(descriptor, _)| descriptor.clone())
    }

    fn list(&self, cursor: Option<&Cursor>, page_size: usize) -> McpResult<Page<ToolDescriptor>> {
        let offset = match cursor {
            Some(cursor) => cursor
                .offset()
                .ok_or_else(|| crate::error::McpError::InvalidParams("unrecognized cursor".into()))?,
            None => 0,
        };
        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort();
        let items: Vec<ToolDescriptor> = names
            .iter()
            .skip(offset)
            .take(page_size)
            .map(|name| self.tools[*name].0.clone())
            .collect();
        let next_cursor = if offset + items.len() < names.len() {
            Some(Cursor::from_offset(offset + items.len()))
        } else {
            None
        };
        Ok(Page { items, next_cursor })
    }
}

#[async_trait]
impl ToolExecutor for InMemoryCatalog {
    async fn call(&self, ctx: ToolContext, name: &str, arguments: Value) -> McpResult<ToolOutcome> {
        let (_, handler) = self
            .tools
            .get(name)
            .ok_or_else(|| crate::error::McpError::ToolNotFound(name.to_string()))?;
        handler(ctx, arguments).await
    }
}

/// Resource provider.
/// Stubbed by default — a server with no resources returns empty pages.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    async fn list(&self, cursor: Option<&Cursor>) -> McpResult<Page<ResourceDescriptor>>;
    async fn read(&self, uri: &str) -> McpResult<mcp_types::ResourceContents>;
}

/// Prompt provider. Stubbed by default.
#[async_trait]
pub trait PromptProvider: Send + Sync {
    async fn list(&self, cursor: Option<&Cursor>) -> McpResult<Page<PromptDescriptor>>;
    async fn get(&self, name: &str, arguments: Option<Value>) -> McpResult<Vec<mcp_types::ContentBlock>>;
}

/// Resolves tool-declared secrets by name.
pub trait SecretStore: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
}

impl SecretStore for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        HashMap::get(self, name).cloned()
    }
}
