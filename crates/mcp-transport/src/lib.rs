//! Transport adapters for an MCP server: stdio, single-shot HTTP streaming,
//! and SSE with resumability. Each adapter wires a
//! [`mcp_server::Dispatcher`] to an I/O surface and, where the surface
//! supports server→client pushes, supplies an [`mcp_server::OutboundChannel`]
//! so tool calls can use the bidirectional client API.

pub mod error;
pub mod event_store;
pub mod http;
pub mod sse;
pub mod stdio;

pub use error::{TransportError, TransportResult};
pub use event_store::{EventStore, InMemoryEventStore};
pub use http::{router as http_router, HttpState, PROTOCOL_VERSION_HEADER, SESSION_ID_HEADER};
pub use sse::{router as sse_router, session_header_name, SseChannel, SseState};
pub use stdio::{run as run_stdio, StdioChannel};
