//! End-to-end lifecycle scenarios.

use std::collections::HashMap;
use std::sync::Arc;

use mcp_server::{
    Dispatcher, InMemoryCatalog, NotificationConfig, NotificationManager, ServerConfig, ServerInfo,
    Session, SessionRegistry,
};
use mcp_types::{IncomingMessage, JsonRpcNotification, JsonRpcRequest, ServerCapabilities, ToolDescriptor};
use serde_json::json;

fn build_dispatcher() -> Dispatcher {
    let mut catalog = InMemoryCatalog::new();
    for name in ["alpha", "beta", "gamma"] {
        catalog.register(ToolDescriptor::new(name, json!({"type": "object"})), |_ctx, _args| async move {
            Ok(mcp_server::ToolOutcome::text("ok"))
        });
    }
    let catalog = Arc::new(catalog);
    let sessions = SessionRegistry::new();
    let notifications = Arc::new(NotificationManager::new(sessions.clone(), NotificationConfig::default()));
    Dispatcher::new(
        sessions,
        notifications,
        catalog.clone(),
        catalog,
        Arc::new(HashMap::<String, String>::new()),
        ServerCapabilities { tools: Some(Default::default()), ..Default::default() },
        ServerInfo { name: "lifecycle-test".into(), version: "0.1.0".into(), instructions: None },
        ServerConfig::default(),
    )
}

#[tokio::test]
async fn lifecycle_initialize_then_ready_then_ping() {
    let dispatcher = build_dispatcher();
    let session = Arc::new(Session::new());
    dispatcher.sessions.insert(Arc::clone(&session));

    let init = JsonRpcRequest::new(
        "initialize",
        Some(json!({"protocolVersion": "2025-06-18", "capabilities": {}})),
        1i64,
    );
    let response = dispatcher
        .handle(&session, None, None, IncomingMessage::Request(init))
        .await
        .expect("initialize always answers");
    assert!(response.is_success());
    let result = response.result().unwrap();
    assert_eq!(result["protocolVersion"], "2025-06-18");
    assert_eq!(result["serverInfo"]["name"], "lifecycle-test");

    let initialized = JsonRpcNotification::new("notifications/initialized", None);
    assert!(dispatcher
        .handle(&session, None, None, IncomingMessage::Notification(initialized))
        .await
        .is_none());

    // `ping -> {}` is idempotent: N calls produce N identical empty results.
    for id in 2..6 {
        let ping = JsonRpcRequest::new("ping", None, id as i64);
        let response = dispatcher
            .handle(&session, None, None, IncomingMessage::Request(ping))
            .await
            .unwrap();
        assert!(response.is_success());
        assert_eq!(response.result().unwrap(), &json!({}));
    }
}

#[tokio::test]
async fn request_before_initialize_is_lifecycle_violation() {
    let dispatcher = build_dispatcher();
    let session = Arc::new(Session::new());
    dispatcher.sessions.insert(Arc::clone(&session));

    let list = JsonRpcRequest::new("tools/list", None, 1i64);
    let response = dispatcher
        .handle(&session, None, None, IncomingMessage::Request(list))
        .await
        .unwrap();
    assert!(!response.is_success());
    assert_eq!(response.result(), None);
}

#[tokio::test]
async fn tools_list_cursor_continues_without_overlap_or_gap() {
    use mcp_server::ToolCatalog;

    let mut catalog = InMemoryCatalog::new();
    for name in ["alpha", "beta", "gamma"] {
        catalog.register(ToolDescriptor::new(name, json!({"type": "object"})), |_ctx, _args| async move {
            Ok(mcp_server::ToolOutcome::text("ok"))
        });
    }

    let first = catalog.list(None, 2).unwrap();
    assert_eq!(first.items.len(), 2);
    assert!(first.next_cursor.is_some());

    let second = catalog.list(first.next_cursor.as_ref(), 2).unwrap();
    assert_eq!(second.items.len(), 1);
    assert!(second.next_cursor.is_none());

    let first_names: Vec<&str> = first.items.iter().map(|t| t.name.as_str()).collect();
    let second_names: Vec<&str> = second.items.iter().map(|t| t.name.as_str()).collect();
    for name in &second_names {
        assert!(!first_names.contains(name), "page overlap on {name}");
    }
    let mut combined: Vec<&str> = first_names.into_iter().chain(second_names).collect();
    combined.sort_unstable();
    assert_eq!(combined, vec!["alpha", "beta", "gamma"]);
}
