//! HTTP streaming transport: one JSON-RPC object per POST.
//!
//! Grounded on `turbomcp-server::transport::http`'s axum `Router` wiring,
//! narrowed to a single-shot request/response exchange with no server push
//! (no SSE push here — that's [`crate::sse`]). A session created through
//! this adapter gets no [`mcp_server::OutboundChannel`] registered, since a
//! single-shot POST has nowhere to push a server-initiated request; tools
//! that need the bidirectional client API require the SSE adapter.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use mcp_server::{Dispatcher, Session, SessionState};
use mcp_types::{IncomingMessage, JsonRpcResponse, PROTOCOL_VERSION};
use serde_json::Value;

pub const SESSION_ID_HEADER: &str = "mcp-session-id";
pub const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

/// Shared state for the streaming HTTP router.
#[derive(Clone)]
pub struct HttpState {
    pub dispatcher: Arc<Dispatcher>,
}

impl HttpState {
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

/// Build the `POST /mcp` router for the streaming transport.
#[must_use]
pub fn router(state: HttpState) -> Router {
    Router::new().route("/mcp", post(handle_post)).with_state(state)
}

/// Extract a bearer token from an `Authorization: Bearer <token>` header.
pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

async fn handle_post(State(state): State<HttpState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    match headers.get(PROTOCOL_VERSION_HEADER).and_then(|v| v.to_str().ok()) {
        Some(v) if v == PROTOCOL_VERSION => {}
        _ => return StatusCode::BAD_REQUEST.into_response(),
    }

    let message = match IncomingMessage::from_value(body) {
        Ok(message) => message,
        Err(err) => return Json(JsonRpcResponse::parse_error(err)).into_response(),
    };

    let existing_session_id = headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let is_initialize = matches!(&message, IncomingMessage::Request(r) if r.method == "initialize");

    let (session, minted) = match existing_session_id {
        Some(id) => match state.dispatcher.sessions.get(&id) {
            Some(session) => {
                if is_initialize && session.state() != SessionState::Pending {
                    return StatusCode::CONFLICT.into_response();
                }
                (session, false)
            }
            None => return StatusCode::NOT_FOUND.into_response(),
        },
        None => {
            if !is_initialize {
                return StatusCode::NOT_FOUND.into_response();
            }
            let session = Arc::new(Session::new());
            state.dispatcher.sessions.insert(Arc::clone(&session));
            (session, true)
        }
    };

    let bearer_token = extract_bearer_token(&headers);
    let response = state.dispatcher.handle(&session, None, bearer_token, message).await;

    let mut http_response = match response {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    };

    if minted {
        if let Ok(header_value) = HeaderValue::from_str(&session.id) {
            http_response.headers_mut().insert(HeaderName::from_static(SESSION_ID_HEADER), header_value);
        }
    }

    http_response
}
