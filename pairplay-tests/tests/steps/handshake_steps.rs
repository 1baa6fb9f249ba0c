use cucumber::{given, then, when};
use pairplay_p2p::{ConnectionStatus, Role};
use pairplay_tests::{RoomWorld, Side};

fn status_named(name: &str) -> ConnectionStatus {
    use ConnectionStatus::*;
    [Idle, Creating, Waiting, Connecting, Connected, Failed]
        .into_iter()
        .find(|status| status.as_str() == name)
        .unwrap_or_else(|| panic!("unknown status '{}'", name))
}

// ===== Given Steps =====

#[given("a host and a guest on the same network")]
async fn host_and_guest(world: &mut RoomWorld) {
    assert_eq!(world.network.link_count(), 0);
    assert_eq!(world.host.status(), ConnectionStatus::Idle);
    assert_eq!(world.guest.status(), ConnectionStatus::Idle);
}

#[given("the room is connected")]
async fn room_connected(world: &mut RoomWorld) {
    world.connect().await;
}

// ===== When Steps =====

#[when(expr = "the {word} creates a room")]
async fn creates_room(world: &mut RoomWorld, side: Side) {
    world.side(side).create_room().await;
}

#[when(expr = "the {word} joins with the host's code")]
async fn joins_with_host_code(world: &mut RoomWorld, side: Side) {
    let code = world.host.local_code();
    world.side(side).join_room(code.as_str()).await;
}

#[when(expr = "the {word} joins with the code {string}")]
async fn joins_with_code(world: &mut RoomWorld, side: Side, code: String) {
    world.side(side).join_room(&code).await;
}

#[when(expr = "the {word} completes the connection with the guest's code")]
async fn completes_with_guest_code(world: &mut RoomWorld, side: Side) {
    let code = world.guest.local_code();
    world.side(side).complete_connection(code.as_str()).await;
}

#[when(expr = "the {word} completes the connection with the code {string}")]
async fn completes_with_code(world: &mut RoomWorld, side: Side, code: String) {
    world.side(side).complete_connection(&code).await;
}

#[when(expr = "the {word} completes the connection with its own code")]
async fn completes_with_own_code(world: &mut RoomWorld, side: Side) {
    let sync = world.side(side);
    let code = sync.local_code();
    sync.complete_connection(code.as_str()).await;
}

#[when(expr = "the {word} disconnects")]
async fn disconnects(world: &mut RoomWorld, side: Side) {
    world.side(side).disconnect();
}

#[when("the network fails")]
async fn network_fails(world: &mut RoomWorld) {
    world.network.fail_links();
}

// ===== Then Steps =====

#[then(expr = "the {word} is {string}")]
async fn is_in_status(world: &mut RoomWorld, side: Side, status: String) {
    let expected = status_named(&status);
    assert_eq!(world.settle(side, expected).await, expected);
}

#[then(expr = "the {word} is {string} as {string}")]
async fn is_in_status_as(world: &mut RoomWorld, side: Side, status: String, role: String) {
    let expected = status_named(&status);
    assert_eq!(world.settle(side, expected).await, expected);

    let role = match role.as_str() {
        "host" => Role::Host,
        "guest" => Role::Guest,
        other => panic!("unknown role '{}'", other),
    };
    let state = world.side(side).state();
    assert_eq!(state.role, Some(role));
    assert!(state.error.is_none());
    assert!(state.is_consistent());
}

#[then(expr = "the {word} is {string} with error {string}")]
async fn is_in_status_with_error(world: &mut RoomWorld, side: Side, status: String, error: String) {
    let expected = status_named(&status);
    assert_eq!(world.settle(side, expected).await, expected);
    assert_eq!(world.side(side).error_message(), Some(error));
    assert!(world.side(side).local_code().is_empty());
}

#[then(expr = "the {word} has no role")]
async fn has_no_role(world: &mut RoomWorld, side: Side) {
    assert!(world.side(side).role().is_none());
}

#[then("no frames have been written")]
async fn nothing_written(world: &mut RoomWorld) {
    assert_eq!(world.network.writes(), 0);
}
