use cucumber::{given, then, when};
use pairplay_tests::{RoomWorld, Side, SETTLE_TIMEOUT};
use serde_json::{json, Value};
use std::time::Duration;

fn json_arg(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|e| panic!("bad JSON '{}': {}", text, e))
}

// ===== Given Steps =====

#[given("both sides record game traffic")]
async fn record_traffic(world: &mut RoomWorld) {
    world.record_traffic();
}

#[given(expr = "the host plays {string} and the guest plays {string}")]
async fn turn_values(world: &mut RoomWorld, host: String, guest: String) {
    world.turn_values = Some((host, guest));
}

// ===== When Steps =====

#[when(expr = "the {word} sends the game state {string}")]
async fn sends_state(world: &mut RoomWorld, side: Side, state: String) {
    world.side(side).send_game_state(&json_arg(&state));
}

#[when(expr = "the {word} sends the action {string}")]
async fn sends_action(world: &mut RoomWorld, side: Side, action: String) {
    world.side(side).send_action(&json_arg(&action));
}

#[when(expr = "the {word} sends a reset")]
async fn sends_reset(world: &mut RoomWorld, side: Side) {
    world.side(side).send_reset();
}

#[when(expr = "the {word} sends a ping")]
async fn sends_ping(world: &mut RoomWorld, side: Side) {
    world.side(side).send_ping();
}

#[when(expr = "the {word} sends actions {int} to {int}")]
async fn sends_actions(world: &mut RoomWorld, side: Side, first: u32, last: u32) {
    for i in first..=last {
        world.side(side).send_action(&json!(i));
    }
}

// ===== Then Steps =====

#[then(expr = "the {word} receives {string} with payload {string}")]
async fn receives(world: &mut RoomWorld, side: Side, kind: String, payload: String) {
    let received = world.wait_for_deliveries(side, 1).await;

    assert_eq!(received.len(), 1, "received {:?}", received);
    assert_eq!(received[0].kind, kind);
    assert_eq!(received[0].payload, json_arg(&payload));
}

#[then(expr = "the {word} receives actions {int} to {int} in order")]
async fn receives_in_order(world: &mut RoomWorld, side: Side, first: u32, last: u32) {
    let expected: Vec<Value> = (first..=last).map(|i| json!(i)).collect();
    let received = world.wait_for_deliveries(side, expected.len()).await;

    let payloads: Vec<Value> = received
        .into_iter()
        .filter(|d| d.kind == "action")
        .map(|d| d.payload)
        .collect();
    assert_eq!(payloads, expected);
}

#[then(expr = "the {word} measures a round trip")]
async fn measures_round_trip(world: &mut RoomWorld, side: Side) {
    let sync = world.side(side);
    let measured = tokio::time::timeout(SETTLE_TIMEOUT, async {
        while sync.last_round_trip().is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(measured.is_ok(), "no pong arrived");
}

#[then(expr = "the {word} has received nothing")]
async fn received_nothing(world: &mut RoomWorld, side: Side) {
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(world.received_by(side).is_empty());
}

#[then(expr = "on turn {string} only the {word} may move")]
async fn only_one_may_move(world: &mut RoomWorld, turn: String, side: Side) {
    let (host_value, guest_value) = world
        .turn_values
        .clone()
        .expect("turn values not set");

    for candidate in [Side::Host, Side::Guest] {
        let allowed = world
            .side(candidate)
            .is_my_turn(turn.as_str(), host_value.as_str(), guest_value.as_str());
        assert_eq!(allowed, candidate == side, "{:?} on turn {}", candidate, turn);
    }
}
