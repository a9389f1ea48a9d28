//! Internal notification envelope and SSE event record.
//!
//! These are not wire types — [`Notification`] is the shape the notification
//! manager accepts from anywhere in the server before it applies debouncing,
//! rate limiting, and fan-out (§4.2); [`EventRecord`] is what the SSE event
//! store persists for `Last-Event-ID` replay (§4.5.3).

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// An outbound notification, pre-debounce/pre-rate-limit.
#[derive(Debug, Clone)]
pub struct Notification {
    pub method: String,
    pub params: Option<Value>,
    /// Groups notifications for debounce coalescing (e.g. `resources/updated:<uri>`).
    pub key: Option<String>,
    /// Overrides the manager's `default_debounce_ms` for this notification.
    pub debounce_ms: Option<u64>,
    /// Restricts delivery to one session; absent means fan-out to all READY sessions.
    pub target_session: Option<String>,
}

impl Notification {
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            method: method.into(),
            params,
            key: None,
            debounce_ms: None,
            target_session: None,
        }
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = Some(ms);
        self
    }

    #[must_use]
    pub fn targeting(mut self, session_id: impl Into<String>) -> Self {
        self.target_session = Some(session_id.into());
        self
    }
}

/// A single recorded SSE event, kept for `Last-Event-ID` replay.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub stream_id: String,
    pub seq: i64,
    pub event_id: String,
    pub payload: Bytes,
    pub created_at: DateTime<Utc>,
}
