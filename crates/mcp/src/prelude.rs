//! Common imports for building a server against this crate, mirroring the
//! `turbomcp::prelude` glob-import convention.

pub use mcp_server::{
    McpError, McpResult, Page, ProgressScope, PromptProvider, ResourceProvider, SecretStore,
    ToolCatalog, ToolContext, ToolExecutor, ToolOutcome,
};
pub use mcp_types::{
    CallToolResult, ContentBlock, LogLevel, PromptArgument, PromptDescriptor, ResourceDescriptor,
    ToolAnnotations, ToolDescriptor,
};

pub use crate::{McpServer, McpServerBuilder};
