//! Bidirectional request manager.
//!
//! Grounded on the id-keyed pending-table pattern shared by several MCP
//! client implementations (`mcp_client.rs` and `rustbot::mcp_client`), which
//! both key an outstanding server-bound request by its `RequestId` in a
//! concurrent map and resolve it from a response handler elsewhere. Here the
//! direction is reversed: the server issues the request and awaits the
//! client's response, but the mechanics are the same: a `oneshot` per
//! outstanding id, a timeout race, and a tombstone so a response arriving
//! after the timeout doesn't panic on a missing entry.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use mcp_types::{JsonRpcResponse, RequestId};
use tokio::sync::oneshot;

use crate::error::{McpError, McpResult};

/// Outcome recorded for an id after its future resolves, so a late response
/// can be recognized and dropped instead of erroring as "unknown id".
enum Slot {
    Pending(oneshot::Sender<McpResult<JsonRpcResponse>>),
    /// The waiter gave up (timeout or cancellation); a response arriving
    /// after this is logged and discarded, never delivered.
    TombStoned,
}

/// Tracks outstanding server-to-client requests (`sampling/createMessage`,
/// `elicitation/create`, `roots/list`, `completion/complete`) by id, and
/// resolves them when the transport hands back a matching response.
#[derive(Debug, Default)]
pub struct RequestManager {
    next_id: AtomicI64,
    pending: DashMap<RequestId, SlotHandle>,
}

/// Boxed so `Slot`'s non-`Debug` sender doesn't need `DashMap` to derive `Debug`.
struct SlotHandle(Option<Slot>);

impl std::fmt::Debug for RequestManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestManager")
            .field("outstanding", &self.pending.len())
            .finish()
    }
}

impl RequestManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            pending: DashMap::new(),
        }
    }

    /// Allocate a fresh id for a new server->client request.
    #[must_use]
    pub fn next_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register `id` as awaiting a response, returning the receiving half.
    fn register(&self, id: RequestId) -> oneshot::Receiver<McpResult<JsonRpcResponse>> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, SlotHandle(Some(Slot::Pending(tx))));
        rx
    }

    /// Wait for the client's response to `id`, or time out.
    ///
    /// # Errors
    ///
    /// [`McpError::Timeout`] if no response arrives within `timeout`;
    /// [`McpError::SessionClosed`] if [`Self::close`] rejected it first;
    /// [`McpError::Internal`] if the sender was dropped without a response.
    pub async fn call(&self, id: RequestId, timeout: Duration) -> McpResult<JsonRpcResponse> {
        let rx = self.register(id.clone());
        let outcome = tokio::time::timeout(timeout, rx).await;
        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                self.pending.remove(&id);
                Err(McpError::Internal(
                    "request manager sender dropped without a response".into(),
                ))
            }
            Err(_) => {
                if let Some(mut entry) = self.pending.get_mut(&id) {
                    entry.0 = Some(Slot::TombStoned);
                }
                Err(McpError::Timeout)
            }
        }
    }

    /// Resolve a response arriving from the client. Returns `true` if it
    /// matched a pending request, `false` if the id was unknown or already
    /// tombstoned — in which case the caller should log and drop it rather
    /// than propagate an error up to the transport.
    pub fn resolve(&self, response: JsonRpcResponse) -> bool {
        let Some(id) = response.id.0.clone() else {
            return false;
        };
        let Some((_, mut slot)) = self.pending.remove(&id) else {
            return false;
        };
        match slot.0.take() {
            Some(Slot::Pending(tx)) => tx.send(Ok(response)).is_ok(),
            Some(Slot::TombStoned) | None => false,
        }
    }

    /// Reject every outstanding request with [`McpError::SessionClosed`],
    /// waking any tool task blocked in [`Self::call`] immediately instead of
    /// leaving it to wait out its own timeout. Called when the owning
    /// session closes.
    pub fn close(&self) {
        let ids: Vec<RequestId> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            if let Some((_, mut slot)) = self.pending.remove(&id) {
                if let Some(Slot::Pending(tx)) = slot.0.take() {
                    let _ = tx.send(Err(McpError::SessionClosed));
                }
            }
        }
    }

    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }
}
