//! # mcp-types
//!
//! Typed JSON-RPC envelope and MCP protocol types, shared by every
//! transport and by the session/dispatcher core. Leaf crate: no dependency
//! on any other crate in this workspace.
//!
//! ## Module Organization
//!
//! - [`jsonrpc`]: JSON-RPC 2.0 request/notification/response envelope
//! - [`capabilities`]: client/server capability negotiation
//! - [`content`]: content blocks and `CallToolResult`
//! - [`tools`]: tool/resource/prompt descriptors
//! - [`session`]: session state, log levels, progress tokens, cursors
//! - [`notification`]: internal notification envelope and SSE event record

#![warn(missing_docs, rust_2018_idioms)]
#![allow(missing_docs)]

pub mod capabilities;
pub mod content;
pub mod jsonrpc;
pub mod notification;
pub mod session;
pub mod tools;

pub use capabilities::{
    ClientCapabilities, ListChangedCapability, NegotiatedCapabilities, ResourcesCapability,
    RootsCapability, ServerCapabilities, UnitCapability,
};
pub use content::{CallToolResult, ContentBlock};
pub use jsonrpc::{
    IncomingMessage, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    JsonRpcVersion, RequestId, ResponseId, JSONRPC_VERSION,
};
pub use notification::{EventRecord, Notification};
pub use session::{Cursor, LogLevel, ProgressToken, SessionState};
pub use tools::{PromptArgument, PromptDescriptor, ResourceDescriptor, ToolAnnotations, ToolDescriptor};

/// The protocol version this core implements.
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Protocol versions this core accepts during negotiation, preference order.
pub const SUPPORTED_VERSIONS: &[&str] = &["2025-06-18"];

/// Negotiate a protocol version against the client's request.
///
/// Returns the requested version if this core supports it exactly; `None`
/// if there is no overlap at all. Callers that want to fall back to the server's
/// preferred version on mismatch (permissive mode) should do so explicitly
/// rather than have it hidden in this function.
#[must_use]
pub fn negotiate_protocol_version(requested: Option<&str>) -> Option<&'static str> {
    let requested = requested?;
    SUPPORTED_VERSIONS.iter().find(|&&v| v == requested).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiate_accepts_exact_match() {
        assert_eq!(
            negotiate_protocol_version(Some("2025-06-18")),
            Some("2025-06-18")
        );
    }

    #[test]
    fn negotiate_rejects_unsupported() {
        assert_eq!(negotiate_protocol_version(Some("1999-01-01")), None);
        assert_eq!(negotiate_protocol_version(None), None);
    }
}
