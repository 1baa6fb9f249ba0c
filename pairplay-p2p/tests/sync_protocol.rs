mod support;

use pairplay_p2p::{
    ConnectionEngine, ConnectionStatus, EngineConfig, LocalCode, LoopbackNetwork,
    MultiplayerSync, PeerConnector, PeerLink, SessionDescription,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use support::{drain, init_test_tracing, settle, LoopbackEngine, LoopbackSync, SyncPair};
use tokio::sync::mpsc;

async fn next(rx: &mut mpsc::UnboundedReceiver<Value>) -> Value {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("no message arrived")
        .expect("sender dropped")
}

fn counting_handlers(sync: &LoopbackSync) -> Arc<AtomicUsize> {
    let calls = Arc::new(AtomicUsize::new(0));
    let state_calls = calls.clone();
    sync.on_game_state(move |_| {
        state_calls.fetch_add(1, Ordering::SeqCst);
    });
    let action_calls = calls.clone();
    sync.on_action(move |_| {
        action_calls.fetch_add(1, Ordering::SeqCst);
    });
    let reset_calls = calls.clone();
    sync.on_reset(move || {
        reset_calls.fetch_add(1, Ordering::SeqCst);
    });
    calls
}

/// Raw engine on the host side, sync layer on the guest side.
async fn raw_host_pair() -> (LoopbackNetwork, LoopbackEngine, LoopbackSync) {
    let network = LoopbackNetwork::new();
    let host = ConnectionEngine::new(network.connector(), EngineConfig::default());
    let guest = MultiplayerSync::new(network.connector(), EngineConfig::default());

    host.create_room().await;
    guest.join_room(host.local_code().as_str()).await;
    host.complete_connection(guest.local_code().as_str()).await;
    settle(&host, ConnectionStatus::Connected).await;
    settle(guest.engine(), ConnectionStatus::Connected).await;

    (network, host, guest)
}

#[tokio::test]
async fn test_state_action_and_reset_reach_their_handlers() {
    init_test_tracing();
    let pair = SyncPair::new();
    pair.connect().await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let state_tx = tx.clone();
    pair.guest.on_game_state(move |state| {
        let _ = state_tx.send(json!({ "state": state }));
    });
    let action_tx = tx.clone();
    pair.host.on_action(move |action| {
        let _ = action_tx.send(json!({ "action": action }));
    });
    pair.guest.on_reset(move || {
        let _ = tx.send(json!("reset"));
    });

    pair.host.send_game_state(&json!({ "board": [[0, 1], [1, 0]], "turn": "red" }));
    assert_eq!(
        next(&mut rx).await,
        json!({ "state": { "board": [[0, 1], [1, 0]], "turn": "red" } })
    );

    pair.guest.send_action(&json!({ "col": 4 }));
    assert_eq!(next(&mut rx).await, json!({ "action": { "col": 4 } }));

    pair.host.send_reset();
    assert_eq!(next(&mut rx).await, json!("reset"));
}

#[tokio::test]
async fn test_ping_is_answered_and_never_surfaces() {
    let (_network, host, guest) = raw_host_pair().await;
    let calls = counting_handlers(&guest);

    let (tx, mut rx) = mpsc::unbounded_channel();
    host.on_message(move |raw| {
        let _ = tx.send(raw);
    });

    host.send(&json!({ "type": "ping", "timestamp": 1 }));

    let reply = next(&mut rx).await;
    assert_eq!(reply["type"], "pong");
    assert!(reply["timestamp"].as_u64().unwrap() > 1);

    drain().await;
    assert!(rx.try_recv().is_err(), "exactly one pong expected");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_send_ping_measures_round_trip() {
    let pair = SyncPair::new();
    pair.connect().await;
    let calls = counting_handlers(&pair.guest);

    pair.host.send_ping();

    tokio::time::timeout(Duration::from_secs(1), async {
        while pair.host.last_round_trip().is_none() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("pong never arrived");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_registering_a_handler_replaces_the_previous_one() {
    let pair = SyncPair::new();
    pair.connect().await;

    let (first_tx, mut first_rx) = mpsc::unbounded_channel();
    let (second_tx, mut second_rx) = mpsc::unbounded_channel();
    pair.guest.on_action(move |action| {
        let _ = first_tx.send(action);
    });
    pair.guest.on_action(move |action| {
        let _ = second_tx.send(action);
    });

    pair.host.send_action(&json!({ "cell": 4 }));

    assert_eq!(next(&mut second_rx).await, json!({ "cell": 4 }));
    drain().await;
    assert!(first_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_unhandled_types_are_dropped() {
    let pair = SyncPair::new();
    pair.connect().await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    pair.guest.on_action(move |action| {
        let _ = tx.send(action);
    });

    // No state handler registered on the guest
    pair.host.send_game_state(&json!({ "ignored": true }));
    pair.host.send_action(&json!("after"));

    assert_eq!(next(&mut rx).await, json!("after"));
}

#[tokio::test]
async fn test_sends_outside_connected_write_nothing() {
    let pair = SyncPair::new();

    pair.host.send_action(&json!(1));
    pair.host.create_room().await;
    pair.guest.join_room(pair.host.local_code().as_str()).await;
    pair.host.send_game_state(&json!(2));
    pair.guest.send_reset();
    assert_eq!(pair.network.writes(), 0);

    pair.host
        .complete_connection(pair.guest.local_code().as_str())
        .await;
    settle(pair.host.engine(), ConnectionStatus::Connected).await;
    pair.host.send_action(&json!(3));
    assert_eq!(pair.network.writes(), 1);

    pair.host.disconnect();
    pair.host.send_action(&json!(4));
    assert_eq!(pair.network.writes(), 1);
}

#[tokio::test]
async fn test_missing_payload_is_delivered_as_null() {
    let (_network, host, guest) = raw_host_pair().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    guest.on_action(move |action| {
        let _ = tx.send(action);
    });

    host.send(&json!({ "type": "action", "timestamp": 5 }));

    assert_eq!(next(&mut rx).await, Value::Null);
}

#[tokio::test]
async fn test_non_envelope_json_is_dropped() {
    let (_network, host, guest) = raw_host_pair().await;
    let calls = counting_handlers(&guest);
    let (tx, mut rx) = mpsc::unbounded_channel();
    guest.on_action(move |action| {
        let _ = tx.send(action);
    });

    host.send(&json!("just a string"));
    host.send(&json!({ "type": "chat", "payload": "hi" }));
    host.send(&json!({ "payload": 1 }));
    host.send(&json!({ "type": "action", "payload": "valid" }));

    assert_eq!(next(&mut rx).await, json!("valid"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_malformed_text_from_raw_link_is_dropped() {
    let network = LoopbackNetwork::new();
    let guest = MultiplayerSync::new(network.connector(), EngineConfig::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    guest.on_game_state(move |state| {
        let _ = tx.send(state);
    });

    // Drive the host side by hand through the transport seam
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let link = network.connector().open(&[], events_tx).await.unwrap();
    link.create_channel("game").await.unwrap();
    let offer = link.create_offer().await.unwrap();
    link.set_local_description(offer.clone()).await.unwrap();

    guest
        .join_room(LocalCode::encode(&offer).unwrap().as_str())
        .await;
    let answer: SessionDescription = LocalCode::decode(guest.local_code().as_str()).unwrap();
    link.set_remote_description(answer).await.unwrap();
    settle(guest.engine(), ConnectionStatus::Connected).await;

    link.send_text("{ not json".to_string()).unwrap();
    link.send_text(String::new()).unwrap();
    link.send_text(r#"{"type":"state","payload":{"ok":true},"timestamp":7}"#.to_string())
        .unwrap();

    assert_eq!(next(&mut rx).await, json!({ "ok": true }));
    assert_eq!(guest.status(), ConnectionStatus::Connected);
}

#[tokio::test]
async fn test_messages_arrive_in_send_order() {
    let pair = SyncPair::new();
    pair.connect().await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    pair.guest.on_action(move |action| {
        let _ = tx.send(action);
    });

    for i in 0..50 {
        pair.host.send_action(&json!(i));
    }

    for i in 0..50 {
        assert_eq!(next(&mut rx).await, json!(i));
    }
}

#[tokio::test]
async fn test_turn_ownership_follows_role() {
    let pair = SyncPair::new();
    pair.connect().await;

    assert!(pair.host.is_my_turn("red", "red", "yellow"));
    assert!(!pair.guest.is_my_turn("red", "red", "yellow"));
    assert!(pair.guest.is_my_turn("yellow", "red", "yellow"));

    pair.host.disconnect();
    assert!(!pair.host.is_my_turn("red", "red", "yellow"));
}

#[tokio::test]
async fn test_sends_right_after_complete_connection_write_nothing() {
    let pair = SyncPair::new();

    pair.host.create_room().await;
    pair.guest.join_room(pair.host.local_code().as_str()).await;
    pair.host
        .complete_connection(pair.guest.local_code().as_str())
        .await;

    // Channels are open but neither pump has reported it yet
    pair.guest.send_action(&json!({ "from": "e2", "to": "e4" }));
    pair.host.send_reset();
    pair.guest.send_ping();
    assert_eq!(pair.network.writes(), 0);

    settle(pair.host.engine(), ConnectionStatus::Connected).await;
    settle(pair.guest.engine(), ConnectionStatus::Connected).await;
    pair.guest.send_ping();
    assert_eq!(pair.network.writes(), 1);
}

#[tokio::test]
async fn test_guest_receives_action_exactly_once() {
    let pair = SyncPair::new();
    pair.connect().await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    pair.guest.on_action(move |action| {
        let _ = tx.send(action);
    });

    pair.host.send_action(&json!({ "from": "e2", "to": "e4" }));

    assert_eq!(next(&mut rx).await, json!({ "from": "e2", "to": "e4" }));
    drain().await;
    assert!(rx.try_recv().is_err(), "action delivered more than once");
}

#[tokio::test]
async fn test_only_one_ping_in_flight() {
    let (_network, host, guest) = raw_host_pair().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    host.on_message(move |raw| {
        let _ = tx.send(raw);
    });

    guest.send_ping();
    guest.send_ping();

    assert_eq!(next(&mut rx).await["type"], "ping");
    drain().await;
    assert!(rx.try_recv().is_err(), "second ping went out before the pong");

    host.send(&json!({ "type": "pong", "timestamp": 1 }));
    tokio::time::timeout(Duration::from_secs(1), async {
        while guest.last_round_trip().is_none() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("pong never arrived");

    guest.send_ping();
    assert_eq!(next(&mut rx).await["type"], "ping");
}
