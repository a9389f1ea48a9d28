//! SSE transport with resumability.
//!
//! `GET /mcp` opens the event stream; `POST /mcp` carries client→server
//! messages for the same session. Grounded on
//! `turbomcp-server::transport::http::SessionManager`'s `broadcast`-channel
//! push pattern, extended with the [`crate::event_store::EventStore`] this
//! crate adds for `Last-Event-ID` replay, which `turbomcp-server`'s HTTP
//! transport does not support.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use dashmap::DashMap;
use futures::stream::{self, Stream};
use mcp_server::{Dispatcher, OutboundChannel, Session};
use mcp_types::{IncomingMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::warn;

use crate::event_store::EventStore;
use crate::http::{PROTOCOL_VERSION_HEADER, SESSION_ID_HEADER};

const KEEP_ALIVE_SECS: u64 = 15;
const BROADCAST_CAPACITY: usize = 256;

/// Per-session broadcast sender, doubling as the session's [`OutboundChannel`].
#[derive(Debug)]
pub struct SseChannel {
    session_id: String,
    sender: broadcast::Sender<String>,
    event_store: Arc<dyn EventStore>,
}

impl SseChannel {
    fn new(session_id: String, event_store: Arc<dyn EventStore>) -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { session_id, sender, event_store }
    }

    async fn publish(&self, payload: Value) -> mcp_server::McpResult<()> {
        let bytes = serde_json::to_vec(&payload).map_err(mcp_server::McpError::from)?;
        let record = self.event_store.append(&self.session_id, bytes::Bytes::from(bytes)).await;
        let framed = format!("{}\u{1}{}", record.event_id, String::from_utf8_lossy(&record.payload));
        // Best-effort: no receiver (no open GET stream right now) isn't an error.
        let _ = self.sender.send(framed);
        Ok(())
    }
}

#[async_trait::async_trait]
impl OutboundChannel for SseChannel {
    async fn send_request(&self, request: JsonRpcRequest) -> mcp_server::McpResult<()> {
        self.publish(serde_json::to_value(request).map_err(mcp_server::McpError::from)?).await
    }

    async fn send_notification(&self, notification: JsonRpcNotification) -> mcp_server::McpResult<()> {
        self.publish(serde_json::to_value(notification).map_err(mcp_server::McpError::from)?).await
    }
}

/// Shared state for the SSE router.
#[derive(Clone)]
pub struct SseState {
    pub dispatcher: Arc<Dispatcher>,
    pub event_store: Arc<dyn EventStore>,
    channels: Arc<DashMap<String, Arc<SseChannel>>>,
}

impl SseState {
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>, event_store: Arc<dyn EventStore>) -> Self {
        Self { dispatcher, event_store, channels: Arc::new(DashMap::new()) }
    }

    fn channel_for(&self, session_id: &str) -> Arc<SseChannel> {
        Arc::clone(
            self.channels
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(SseChannel::new(session_id.to_string(), Arc::clone(&self.event_store))))
                .value(),
        )
    }
}

#[must_use]
pub fn router(state: SseState) -> Router {
    Router::new()
        .route("/mcp", get(handle_get).post(handle_post))
        .with_state(state)
}

async fn handle_get(State(state): State<SseState>, headers: HeaderMap) -> Response {
    let Some(session_id) = headers.get(SESSION_ID_HEADER).and_then(|v| v.to_str().ok()).map(str::to_string) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if state.dispatcher.sessions.get(&session_id).is_none() {
        return StatusCode::NOT_FOUND.into_response();
    }

    let channel = state.channel_for(&session_id);
    state
        .dispatcher
        .notifications
        .register_channel(session_id.clone(), channel.clone() as Arc<dyn OutboundChannel>);

    let last_event_id: Option<i64> = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());

    let backlog: Vec<Event> = match last_event_id {
        Some(id) => match state.event_store.replay_after(&session_id, id).await {
            Some(records) => records
                .into_iter()
                .map(|r| Event::default().id(r.event_id).data(String::from_utf8_lossy(&r.payload).into_owned()))
                .collect(),
            None => vec![Event::default().event("replay-impossible").data("retention window exceeded")],
        },
        None => Vec::new(),
    };

    let live = tokio_stream_from_broadcast(channel.sender.subscribe());
    let combined = stream::iter(backlog.into_iter().map(Ok::<_, Infallible>)).chain(live);

    Sse::new(combined).keep_alive(KeepAlive::new().interval(Duration::from_secs(KEEP_ALIVE_SECS))).into_response()
}

fn tokio_stream_from_broadcast(mut rx: broadcast::Receiver<String>) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(framed) => {
                    if let Some((id, data)) = framed.split_once('\u{1}') {
                        yield Ok(Event::default().id(id).data(data.to_string()));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "SSE receiver lagged; some events were dropped from this stream");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

async fn handle_post(State(state): State<SseState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    match headers.get(PROTOCOL_VERSION_HEADER).and_then(|v| v.to_str().ok()) {
        Some(v) if v == PROTOCOL_VERSION => {}
        _ => return StatusCode::BAD_REQUEST.into_response(),
    }

    let Some(session_id) = headers.get(SESSION_ID_HEADER).and_then(|v| v.to_str().ok()).map(str::to_string) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(session) = state.dispatcher.sessions.get(&session_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let message = match IncomingMessage::from_value(body) {
        Ok(message) => message,
        Err(err) => return Json(JsonRpcResponse::parse_error(err)).into_response(),
    };

    let channel = state.channel_for(&session_id) as Arc<dyn OutboundChannel>;
    let bearer_token = crate::http::extract_bearer_token(&headers);
    match state.dispatcher.handle(&session, Some(channel), bearer_token, message).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

#[must_use]
pub fn session_header_name() -> &'static str {
    SESSION_ID_HEADER
}
