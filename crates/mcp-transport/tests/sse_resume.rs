//! SSE resume semantics: after `Last-Event-ID: L`,
//! replay begins at `L+1` and is strictly increasing, with no overlap or gap
//! against what the client already consumed.

use bytes::Bytes;
use mcp_transport::{EventStore, InMemoryEventStore};

#[tokio::test]
async fn reconnect_after_third_event_replays_exactly_the_rest() {
    let store = InMemoryEventStore::new(16);
    for i in 0..5 {
        store.append("session-1", Bytes::from(format!("payload-{i}"))).await;
    }

    // Client read events 1..=3 before disconnecting, then reconnects.
    let replayed = store.replay_after("session-1", 3).await.expect("within retention window");

    assert_eq!(replayed.len(), 2);
    assert_eq!(replayed[0].seq, 4);
    assert_eq!(replayed[1].seq, 5);
    assert_eq!(replayed[0].event_id, "4");
    assert_eq!(replayed[1].event_id, "5");

    // Strictly increasing, no repeat of already-consumed events.
    assert!(replayed.windows(2).all(|w| w[0].seq < w[1].seq));
}

#[tokio::test]
async fn independent_streams_do_not_share_sequence_numbers() {
    let store = InMemoryEventStore::new(16);
    store.append("a", Bytes::from_static(b"a-1")).await;
    let first_b = store.append("b", Bytes::from_static(b"b-1")).await;
    assert_eq!(first_b.seq, 1, "each stream starts its own sequence at 1");

    let replay_a = store.replay_after("a", 0).await.unwrap();
    assert_eq!(replay_a.len(), 1);
    assert_eq!(replay_a[0].stream_id, "a");
}
