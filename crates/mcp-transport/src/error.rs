//! Transport-level errors — distinct from [`mcp_server::McpError`], which
//! covers protocol/call/infrastructure errors once a message has already
//! reached the dispatcher. These cover getting a message there at all.

pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown session id: {0}")]
    UnknownSession(String),
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),
    #[error("unsupported protocol version: {0}")]
    ProtocolVersionMismatch(String),
    #[error("duplicate initialize for session {0}")]
    DuplicateInitialize(String),
    #[error("bind failed: {0}")]
    Bind(String),
}
