//! SSE event store: pluggable, default in-memory bounded ring.
//!
//! `turbomcp-server`'s HTTP transport has no replay concept; this follows
//! the SSE resumability idiom used by other MCP HTTP servers (monotonic
//! per-stream `event_id`, `Last-Event-ID` replay), implemented here as a
//! small trait so a server can swap in a durable store without touching
//! the SSE adapter.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use mcp_types::EventRecord;
use parking_lot::Mutex;

/// Persists events for `Last-Event-ID` replay within a retention window.
///
/// Implementations must keep `event_id`s strictly increasing and
/// contiguous from the first event within a stream.
#[async_trait::async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, stream_id: &str, payload: bytes::Bytes) -> EventRecord;

    /// Events with `event_id > last_event_id`, in order. `None` means the
    /// requested id has fallen out of the retention window — the caller
    /// must start a fresh stream and signal replay-impossible to the client.
    async fn replay_after(&self, stream_id: &str, last_event_id: i64) -> Option<Vec<EventRecord>>;
}

/// Default store: a fixed-capacity ring buffer per stream.
#[derive(Debug)]
pub struct InMemoryEventStore {
    capacity: usize,
    streams: DashMap<String, Arc<Mutex<StreamLog>>>,
}

#[derive(Debug, Default)]
struct StreamLog {
    next_seq: i64,
    events: VecDeque<EventRecord>,
}

impl InMemoryEventStore {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { capacity, streams: DashMap::new() }
    }

    fn log_for(&self, stream_id: &str) -> Arc<Mutex<StreamLog>> {
        Arc::clone(
            self.streams
                .entry(stream_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(StreamLog::default()))),
        )
    }
}

#[async_trait::async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, stream_id: &str, payload: bytes::Bytes) -> EventRecord {
        let log = self.log_for(stream_id);
        let mut log = log.lock();
        log.next_seq += 1;
        let record = EventRecord {
            stream_id: stream_id.to_string(),
            seq: log.next_seq,
            event_id: log.next_seq.to_string(),
            payload,
            created_at: Utc::now(),
        };
        log.events.push_back(record.clone());
        while log.events.len() > self.capacity {
            log.events.pop_front();
        }
        record
    }

    async fn replay_after(&self, stream_id: &str, last_event_id: i64) -> Option<Vec<EventRecord>> {
        let log = self.log_for(stream_id);
        let log = log.lock();
        let Some(oldest) = log.events.front() else {
            return Some(Vec::new());
        };
        if last_event_id + 1 < oldest.seq {
            // The client's watermark has fallen out of the retention window.
            return None;
        }
        Some(log.events.iter().filter(|e| e.seq > last_event_id).cloned().collect())
    }
}
