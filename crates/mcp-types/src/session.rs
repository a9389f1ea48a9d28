//! Session lifecycle, log levels, and progress tokens.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A connection's lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Initializing,
    Ready,
    Closed,
}

/// The 8 RFC-5424 severities MCP logging uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Notice => "notice",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
            Self::Alert => "alert",
            Self::Emergency => "emergency",
        };
        write!(f, "{s}")
    }
}

/// Opaque client-supplied correlator for `notifications/progress`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressToken {
    String(String),
    Number(i64),
}

impl fmt::Display for ProgressToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// Opaque pagination cursor for list methods.
///
/// Implementations must treat an unrecognized cursor as invalid params
/// (-32602); here that's enforced by encoding the offset it denotes and
/// rejecting anything that doesn't decode back to a valid `usize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor(pub String);

impl Cursor {
    #[must_use]
    pub fn from_offset(offset: usize) -> Self {
        Self(offset.to_string())
    }

    /// Decode the offset this cursor denotes, or `None` if it's malformed.
    #[must_use]
    pub fn offset(&self) -> Option<usize> {
        self.0.parse().ok()
    }
}
