//! Debounce coalescing and rate limiting.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mcp_server::{McpResult, NotificationConfig, NotificationManager, OutboundChannel, SessionRegistry};
use mcp_types::{JsonRpcNotification, JsonRpcRequest, Notification};

#[derive(Debug, Default)]
struct RecordingChannel {
    received: Mutex<Vec<JsonRpcNotification>>,
}

#[async_trait]
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
async fn ten_rapid_updates_coalesce_to_one_delivery_of_the_latest() {
    let manager = NotificationManager::new(SessionRegistry::new(), NotificationConfig::default());
    let channel = Arc::new(RecordingChannel::default());
    manager.register_channel("s1", channel.clone());

    for i in 0..10 {
        manager
            .notify(
                Notification::new("notifications/resources/updated", Some(serde_json::json!({"seq": i})))
                    .with_key("resources:///doc.md")
                    .with_debounce_ms(100)
                    .targeting("s1"),
            )
            .await;
    }

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(channel.received.lock().unwrap().is_empty(), "debounce window hasn't elapsed yet");

    tokio::time::sleep(Duration::from_millis(120)).await;
    let received = channel.received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].params.as_ref().unwrap()["seq"], 9);
}

#[tokio::test]
async fn steady_overrate_emission_is_capped_near_the_configured_limit() {
    // The manager's per-session bucket starts full at `rate_limit_per_minute`
    // and only refills once >=10ms has elapsed since the last check; emitting
    // the whole burst in a tight loop leaves no time for a meaningful refill,
    // so delivery is capped at the initial capacity.
    let config = NotificationConfig {
        default_debounce_ms: 100,
        rate_limit_per_minute: 60,
        max_queued_notifications: 1000,
    };
    let manager = NotificationManager::new(SessionRegistry::new(), config);
    let channel = Arc::new(RecordingChannel::default());
    manager.register_channel("s1", channel.clone());

    for i in 0..120 {
        manager
            .notify(Notification::new("notifications/message", Some(serde_json::json!({"i": i}))).targeting("s1"))
            .await;
    }

    let delivered = channel.received.lock().unwrap().len();
    assert!((55..=65).contains(&delivered), "delivered {delivered} outside expected [55,65] band");
}

#[tokio::test]
async fn queued_notifications_beyond_backlog_limit_are_dropped_without_error() {
    let config = NotificationConfig {
        default_debounce_ms: 5_000,
        rate_limit_per_minute: 10_000,
        max_queued_notifications: 3,
    };
    let manager = NotificationManager::new(SessionRegistry::new(), config);
    let channel = Arc::new(RecordingChannel::default());
    manager.register_channel("s1", channel.clone());

    for i in 0..5 {
        manager
            .notify(
                Notification::new("notifications/resources/updated", Some(serde_json::json!({"i": i})))
                    .with_key(format!("resources:///doc{i}.md"))
                    .targeting("s1"),
            )
            .await;
    }

    assert!(channel.received.lock().unwrap().is_empty(), "debounce window hasn't elapsed yet");
    let debug = format!("{manager:?}");
    assert!(debug.contains("debounced: 3"), "backlog should be capped at 3, got: {debug}");
}
