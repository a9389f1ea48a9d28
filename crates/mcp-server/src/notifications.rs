//! Notification manager: debouncing, rate limiting, and per-session fan-out.
//!
//! The rate-limit half reuses `turbomcp-server::config::{RateLimiter,
//! TokenBucket}` (see [`crate::config`]) near-verbatim. The debounce/fan-out
//! half follows the broadcaster-to-transport bridge pattern used by other
//! MCP HTTP server implementations: a per-session notification sink
//! registered against a session id, written to serially. Debouncing itself
//! (coalesce-by-key with last-write-wins) is implemented with a
//! `tokio::time::sleep` timer per `(session, key)` held in a `DashMap`,
//! restarted on every call that arrives before it fires.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use mcp_types::{JsonRpcNotification, Notification};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use crate::config::{NotificationConfig, RateLimitConfig, RateLimiter};
use crate::context::OutboundChannel;
use crate::session::SessionRegistry;

/// Per-`(session, key)` debounce state: the most recently requested payload
/// and the timer racing to flush it.
struct DebounceSlot {
    handle: JoinHandle<()>,
    latest: Arc<AsyncMutex<Option<Notification>>>,
}

/// Coordinates outbound notifications for every session a server is
/// tracking: applies rate limiting, coalesces same-key notifications within
/// a debounce window, and fans out to each session's registered channel
/// serially (one write in flight per session, matching the single-writer-
/// per-connection transports elsewhere in this workspace).
pub struct NotificationManager {
    registry: SessionRegistry,
    channels: DashMap<String, Arc<dyn OutboundChannel>>,
    rate_limiter: RateLimiter,
    config: NotificationConfig,
    debounced: Arc<DashMap<(String, String), DebounceSlot>>,
}

impl std::fmt::Debug for NotificationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationManager")
            .field("sessions", &self.channels.len())
            .field("debounced", &self.debounced.len())
            .finish()
    }
}

impl NotificationManager {
    #[must_use]
    pub fn new(registry: SessionRegistry, config: NotificationConfig) -> Self {
        Self {
            registry,
            channels: DashMap::new(),
            rate_limiter: RateLimiter::new(RateLimitConfig {
                max_requests: config.rate_limit_per_minute,
                window: Duration::from_secs(60),
                per_session: true,
            }),
            config,
            debounced: Arc::new(DashMap::new()),
        }
    }

    /// Register (or replace) the outbound channel a session's notifications
    /// are written through.
    pub fn register_channel(&self, session_id: impl Into<String>, channel: Arc<dyn OutboundChannel>) {
        self.channels.insert(session_id.into(), channel);
    }

    pub fn unregister_channel(&self, session_id: &str) {
        self.channels.remove(session_id);
        self.debounced.retain(|(sid, _), _| sid != session_id);
    }

    /// Submit a notification for delivery. Dispatches to one session if
    /// `target_session` is set, otherwise fans out to every `Ready` session
    /// whose negotiated capabilities admit the method.
    pub async fn notify(&self, notification: Notification) {
        match &notification.target_session {
            Some(session_id) => self.deliver_to(session_id.clone(), notification).await,
            None => {
                for session in self.registry.ready_sessions() {
                    if session.negotiated().admits_notification(&notification.method) {
                        self.deliver_to(session.id.clone(), notification.clone()).await;
                    }
                }
            }
        }
    }

    async fn deliver_to(&self, session_id: String, notification: Notification) {
        if !self.rate_limiter.check(Some(&session_id)) {
            warn!(session_id, method = %notification.method, "notification dropped: rate limited");
            return;
        }

        match notification.key.clone() {
            Some(key) => self.deliver_debounced(session_id, key, notification).await,
            None => self.flush(&session_id, notification).await,
        }
    }

    async fn deliver_debounced(&self, session_id: String, key: String, notification: Notification) {
        let debounce_ms = notification.debounce_ms.unwrap_or(self.config.default_debounce_ms);
        let slot_key = (session_id.clone(), key);

        if let Some(mut existing) = self.debounced.get_mut(&slot_key) {
            if !existing.handle.is_finished() {
                *existing.latest.lock().await = Some(notification);
                return;
            }
        }
        self.debounced.remove(&slot_key);

        let backlog = self.debounced.iter().filter(|entry| entry.key().0 == session_id).count();
        if backlog >= self.config.max_queued_notifications as usize {
            warn!(session_id, "notification dropped: debounce backlog full");
            return;
        }

        let latest = Arc::new(AsyncMutex::new(Some(notification)));
        let latest_for_task = Arc::clone(&latest);
        let channels = self.clone_channel_handle(&session_id);
        let session_id_for_task = session_id.clone();
        let task_key = slot_key.clone();
        let debounced = Arc::clone(&self.debounced);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(debounce_ms)).await;
            if let Some(notification) = latest_for_task.lock().await.take() {
                if let Some(channel) = channels {
                    send(&channel, &session_id_for_task, notification).await;
                }
            }
            debounced.remove(&task_key);
        });

        self.debounced.insert(slot_key, DebounceSlot { handle, latest });
    }

    async fn flush(&self, session_id: &str, notification: Notification) {
        if let Some(channel) = self.clone_channel_handle(session_id) {
            send(&channel, session_id, notification).await;
        } else {
            trace!(session_id, "notification dropped: no channel registered");
        }
    }

    fn clone_channel_handle(&self, session_id: &str) -> Option<Arc<dyn OutboundChannel>> {
        self.channels.get(session_id).map(|entry| Arc::clone(entry.value()))
    }
}

impl Drop for NotificationManager {
    fn drop(&mut self) {
        for entry in self.debounced.iter() {
            entry.handle.abort();
        }
    }
}

async fn send(channel: &Arc<dyn OutboundChannel>, session_id: &str, notification: Notification) {
    let message = JsonRpcNotification::new(notification.method.clone(), notification.params);
    if let Err(err) = channel.send_notification(message).await {
        warn!(session_id, error = %err, "failed to deliver notification");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::McpResult;
    use mcp_types::JsonRpcRequest;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingChannel {
        received: Mutex<Vec<JsonRpcNotification>>,
    }

    #[async_trait::async_trait]
    impl OutboundChannel for RecordingChannel {
        async fn send_request(&self, _request: JsonRpcRequest) -> McpResult<()> {
            Ok(())
        }

        async fn send_notification(&self, notification: JsonRpcNotification) -> McpResult<()> {
            self.received.lock().unwrap().push(notification);
            Ok(())
        }
    }

    #[tokio::test]
    async fn undebounced_notification_delivers_immediately() {
        let manager = NotificationManager::new(SessionRegistry::new(), NotificationConfig::default());
        let channel = Arc::new(RecordingChannel::default());
        manager.register_channel("s1", channel.clone());

        manager
            .notify(Notification::new("notifications/progress", None).targeting("s1"))
            .await;

        assert_eq!(channel.received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn debounced_notifications_coalesce_to_latest() {
        let manager = NotificationManager::new(SessionRegistry::new(), NotificationConfig::default());
        let channel = Arc::new(RecordingChannel::default());
        manager.register_channel("s1", channel.clone());

        for i in 0..5 {
            manager
                .notify(
                    Notification::new("notifications/resources/updated", Some(serde_json::json!({"i": i})))
                        .with_key("res:/a")
                        .with_debounce_ms(30)
                        .targeting("s1"),
                )
                .await;
        }

        tokio::time::sleep(Duration::from_millis(80)).await;
        let received = channel.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].params.as_ref().unwrap()["i"], 4);
    }

    #[tokio::test]
    async fn same_key_debounces_independently_across_successive_windows() {
        let manager = NotificationManager::new(SessionRegistry::new(), NotificationConfig::default());
        let channel = Arc::new(RecordingChannel::default());
        manager.register_channel("s1", channel.clone());

        for i in 0..3 {
            manager
                .notify(
                    Notification::new("notifications/resources/updated", Some(serde_json::json!({"i": i})))
                        .with_key("res:/a")
                        .with_debounce_ms(20)
                        .targeting("s1"),
                )
                .await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(channel.received.lock().unwrap().len(), 1, "first window should flush once");

        for i in 3..6 {
            manager
                .notify(
                    Notification::new("notifications/resources/updated", Some(serde_json::json!({"i": i})))
                        .with_key("res:/a")
                        .with_debounce_ms(20)
                        .targeting("s1"),
                )
                .await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;
        let received = channel.received.lock().unwrap();
        assert_eq!(received.len(), 2, "second window must also flush, not be swallowed by the stale slot");
        assert_eq!(received[1].params.as_ref().unwrap()["i"], 5);
    }

    #[tokio::test]
    async fn unregistered_session_silently_drops() {
        let manager = NotificationManager::new(SessionRegistry::new(), NotificationConfig::default());
        manager
            .notify(Notification::new("notifications/progress", None).targeting("ghost"))
            .await;
    }
}
