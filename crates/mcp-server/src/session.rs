//! Per-connection session state.
//!
//! Grounded on `turbomcp-server::context::RequestContext`, generalized from a
//! per-call record into a longer-lived per-connection one: everything a
//! connection accumulates across its lifetime — negotiated capabilities, the
//! minimum log level the client asked for, outstanding progress tokens —
//! lives behind a single lock here rather than being threaded through each
//! call.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use mcp_types::{ClientCapabilities, LogLevel, NegotiatedCapabilities, ProgressToken, ServerCapabilities};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{McpError, McpResult};

/// A connection's lifecycle state, stored atomically so reads never block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Pending = 0,
    Initializing = 1,
    Ready = 2,
    Closed = 3,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Pending,
            1 => Self::Initializing,
            2 => Self::Ready,
            _ => Self::Closed,
        }
    }
}

impl From<SessionState> for mcp_types::SessionState {
    fn from(s: SessionState) -> Self {
        match s {
            SessionState::Pending => mcp_types::SessionState::Pending,
            SessionState::Initializing => mcp_types::SessionState::Initializing,
            SessionState::Ready => mcp_types::SessionState::Ready,
            SessionState::Closed => mcp_types::SessionState::Closed,
        }
    }
}

/// Mutable fields that change together and are read together.
#[derive(Debug, Default)]
struct SessionInner {
    negotiated: NegotiatedCapabilities,
    protocol_version: Option<&'static str>,
    min_log_level: LogLevel,
    active_progress_tokens: HashSet<ProgressToken>,
    client_info_name: Option<String>,
}

/// A single client connection, tracked for its entire lifetime.
///
/// State transitions: `Pending` -> `Initializing` (on
/// `initialize`) -> `Ready` (on `notifications/initialized`) -> `Closed`
/// (transport teardown or explicit shutdown). Any request other than
/// `initialize`/`ping` received in `Pending`/`Initializing` is rejected with
/// -32002.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    state: AtomicU8,
    inner: RwLock<SessionInner>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            state: AtomicU8::new(SessionState::Pending as u8),
            inner: RwLock::new(SessionInner::default()),
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Validate and record `initialize`, moving `Pending` -> `Initializing`.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::InvalidRequest`] if `initialize` is received twice,
    /// or a version-negotiation failure is reported by the caller beforehand.
    pub fn begin_initialize(
        &self,
        protocol_version: &'static str,
        server_caps: &ServerCapabilities,
        client_caps: &ClientCapabilities,
        client_info_name: Option<String>,
    ) -> McpResult<()> {
        if self.state() != SessionState::Pending {
            return Err(McpError::InvalidRequest(
                "initialize already in progress or complete".into(),
            ));
        }
        let mut inner = self.inner.write();
        inner.negotiated = server_caps.intersect(client_caps);
        inner.protocol_version = Some(protocol_version);
        inner.client_info_name = client_info_name;
        drop(inner);
        self.set_state(SessionState::Initializing);
        Ok(())
    }

    /// Move `Initializing` -> `Ready` on `notifications/initialized`.
    pub fn mark_ready(&self) -> McpResult<()> {
        if self.state() != SessionState::Initializing {
            return Err(McpError::InvalidRequest(
                "notifications/initialized received outside Initializing state".into(),
            ));
        }
        self.set_state(SessionState::Ready);
        Ok(())
    }

    pub fn close(&self) {
        self.set_state(SessionState::Closed);
    }

    /// Whether a request for `method` is allowed in the current state.
    /// `initialize` and `ping` are always allowed; everything else requires
    /// `Ready`.
    #[must_use]
    pub fn admits_method(&self, method: &str) -> bool {
        match method {
            "initialize" | "ping" => true,
            _ => self.state() == SessionState::Ready,
        }
    }

    #[must_use]
    pub fn negotiated(&self) -> NegotiatedCapabilities {
        self.inner.read().negotiated
    }

    #[must_use]
    pub fn protocol_version(&self) -> Option<&'static str> {
        self.inner.read().protocol_version
    }

    #[must_use]
    pub fn min_log_level(&self) -> LogLevel {
        self.inner.read().min_log_level
    }

    pub fn set_min_log_level(&self, level: LogLevel) {
        self.inner.write().min_log_level = level;
    }

    /// Whether a log record at `level` should be delivered to this session.
    #[must_use]
    pub fn admits_log(&self, level: LogLevel) -> bool {
        level >= self.min_log_level()
    }

    pub fn track_progress_token(&self, token: ProgressToken) {
        self.inner.write().active_progress_tokens.insert(token);
    }

    pub fn untrack_progress_token(&self, token: &ProgressToken) {
        self.inner.write().active_progress_tokens.remove(token);
    }

    #[must_use]
    pub fn is_progress_token_active(&self, token: &ProgressToken) -> bool {
        self.inner.read().active_progress_tokens.contains(token)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of all sessions a server is tracking, keyed by session id.
///
/// Grounded on `turbomcp-server::runtime`'s `dashmap`-backed connection
/// table; shards lookups across sessions instead of a single global lock.
#[derive(Debug, Default, Clone)]
pub struct SessionRegistry {
    sessions: Arc<dashmap::DashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Arc<Session>) {
        self.sessions.insert(session.id.clone(), session);
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, id: &str) {
        if let Some((_, session)) = self.sessions.remove(id) {
            session.close();
        }
    }

    /// All sessions currently in `Ready`, for notification fan-out.
    #[must_use]
    pub fn ready_sessions(&self) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .filter(|entry| entry.value().state() == SessionState::Ready)
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps() -> (ServerCapabilities, ClientCapabilities) {
        (ServerCapabilities::default(), ClientCapabilities::default())
    }

    #[test]
    fn lifecycle_rejects_out_of_order_transitions() {
        let session = Session::new();
        assert!(session.mark_ready().is_err());

        let (server, client) = caps();
        session
            .begin_initialize("2025-06-18", &server, &client, None)
            .unwrap();
        assert_eq!(session.state(), SessionState::Initializing);
        assert!(session
            .begin_initialize("2025-06-18", &server, &client, None)
            .is_err());

        session.mark_ready().unwrap();
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[test]
    fn non_lifecycle_methods_rejected_before_ready() {
        let session = Session::new();
        assert!(session.admits_method("initialize"));
        assert!(session.admits_method("ping"));
        assert!(!session.admits_method("tools/list"));
    }

    #[test]
    fn registry_tracks_ready_sessions_only() {
        let registry = SessionRegistry::new();
        let session = Arc::new(Session::new());
        registry.insert(Arc::clone(&session));
        assert!(registry.ready_sessions().is_empty());

        let (server, client) = caps();
        session
            .begin_initialize("2025-06-18", &server, &client, None)
            .unwrap();
        session.mark_ready().unwrap();
        assert_eq!(registry.ready_sessions().len(), 1);

        registry.remove(&session.id);
        assert_eq!(session.state(), SessionState::Closed);
        assert!(registry.get(&session.id).is_none());
    }

    #[test]
    fn log_level_gate_respects_severity_order() {
        let session = Session::new();
        session.set_min_log_level(LogLevel::Warning);
        assert!(!session.admits_log(LogLevel::Info));
        assert!(session.admits_log(LogLevel::Error));
    }
}
