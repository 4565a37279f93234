//! In-room and out-of-room messaging through the engine facade.

use roomlink::{
    codes, ConnectionState, Engine, EngineConfig, EngineEvent, MessageDeliveryError,
    MessagePayload, RoomEvent, Switchboard, MAX_BINARY_MESSAGE_BYTES, MAX_TEXT_MESSAGE_BYTES,
};
use roomlink_core::EventStream;
use std::sync::Arc;
use std::time::Duration;

fn engine_pair() -> (Engine, Engine) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let board = Arc::new(Switchboard::new());
    (
        Engine::with_switchboard(EngineConfig::new("mtest"), Arc::clone(&board)),
        Engine::with_switchboard(EngineConfig::new("mtest"), board),
    )
}

async fn next_room_event(stream: &mut EventStream<RoomEvent>) -> RoomEvent {
    tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("timed out waiting for a room event")
        .expect("room event stream closed")
}

async fn next_engine_event(stream: &mut EventStream<EngineEvent>) -> EngineEvent {
    tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("timed out waiting for an engine event")
        .expect("engine event stream closed")
}

async fn wait_room<F>(stream: &mut EventStream<RoomEvent>, mut pred: F) -> RoomEvent
where
    F: FnMut(&RoomEvent) -> bool,
{
    loop {
        let event = next_room_event(stream).await;
        if pred(&event) {
            return event;
        }
    }
}

async fn wait_engine<F>(stream: &mut EventStream<EngineEvent>, mut pred: F) -> EngineEvent
where
    F: FnMut(&EngineEvent) -> bool,
{
    loop {
        let event = next_engine_event(stream).await;
        if pred(&event) {
            return event;
        }
    }
}

/// Join `user` into `room_id` on `engine` and wait out the confirmation.
async fn joined_room(
    engine: &Engine,
    room_id: &str,
    user: &str,
) -> (roomlink::Room, EventStream<RoomEvent>) {
    let room = engine.room(room_id).user(user).build().unwrap();
    let mut events = room.events().unwrap();
    room.join("tk").unwrap();
    wait_room(&mut events, |e| {
        matches!(
            e,
            RoomEvent::StateChanged {
                state: ConnectionState::Connected,
                ..
            }
        )
    })
    .await;
    (room, events)
}

#[tokio::test]
async fn test_room_broadcast_reaches_other_members_only() {
    let (alice_engine, bob_engine) = engine_pair();
    let (alice_room, mut alice_events) = joined_room(&alice_engine, "meet", "alice").await;
    let (_bob_room, mut bob_events) = joined_room(&bob_engine, "meet", "bob").await;
    wait_room(&mut alice_events, |e| {
        matches!(e, RoomEvent::UserJoined { .. })
    })
    .await;

    let msg_id = alice_room
        .send_room_message(MessagePayload::text("hello room"))
        .unwrap();

    let event = wait_room(&mut bob_events, |e| {
        matches!(e, RoomEvent::RoomMessageReceived { .. })
    })
    .await;
    if let RoomEvent::RoomMessageReceived { from, message } = event {
        assert_eq!(from.as_str(), "alice");
        assert_eq!(message, "hello room");
    }

    // The sender gets the delivery result, never its own broadcast.
    let event = wait_room(&mut alice_events, |e| {
        matches!(e, RoomEvent::RoomMessageSendResult { .. })
    })
    .await;
    if let RoomEvent::RoomMessageSendResult { msg_id: got, error } = event {
        assert_eq!(got, msg_id);
        assert!(error.is_none());
    }

    alice_engine.destroy().await;
    bob_engine.destroy().await;
}

#[tokio::test]
async fn test_room_binary_messages_are_delivered() {
    let (alice_engine, bob_engine) = engine_pair();
    let (alice_room, _alice_events) = joined_room(&alice_engine, "meet", "alice").await;
    let (_bob_room, mut bob_events) = joined_room(&bob_engine, "meet", "bob").await;

    let body = vec![0xAB; 512];
    alice_room
        .send_room_message(MessagePayload::binary(body.clone()))
        .unwrap();

    let event = wait_room(&mut bob_events, |e| {
        matches!(e, RoomEvent::RoomBinaryMessageReceived { .. })
    })
    .await;
    if let RoomEvent::RoomBinaryMessageReceived { message, .. } = event {
        assert_eq!(message.as_ref(), body.as_slice());
    }

    alice_engine.destroy().await;
    bob_engine.destroy().await;
}

#[tokio::test]
async fn test_message_ids_are_monotonic_across_both_room_sends() {
    let (alice_engine, bob_engine) = engine_pair();
    let (alice_room, _alice_events) = joined_room(&alice_engine, "meet", "alice").await;
    let (_bob_room, _bob_events) = joined_room(&bob_engine, "meet", "bob").await;

    // Broadcast and unicast share one ID sequence per session.
    let first = alice_room
        .send_room_message(MessagePayload::text("one"))
        .unwrap();
    let second = alice_room
        .send_user_message("bob", MessagePayload::text("two"))
        .unwrap();
    let third = alice_room
        .send_room_message(MessagePayload::text("three"))
        .unwrap();
    assert_eq!(first, 1);
    assert_eq!(second, 2);
    assert_eq!(third, 3);

    alice_engine.destroy().await;
    bob_engine.destroy().await;
}

#[tokio::test]
async fn test_oversize_payload_fails_without_consuming_an_id() {
    let (alice_engine, bob_engine) = engine_pair();
    let (alice_room, _alice_events) = joined_room(&alice_engine, "meet", "alice").await;
    let (_bob_room, _bob_events) = joined_room(&bob_engine, "meet", "bob").await;

    let oversize = MessagePayload::text("x".repeat(MAX_TEXT_MESSAGE_BYTES + 1));
    let err = alice_room.send_room_message(oversize).unwrap_err();
    assert_eq!(err.return_code(), codes::MESSAGE_TOO_LARGE);

    let oversize = MessagePayload::binary(vec![0u8; MAX_BINARY_MESSAGE_BYTES + 1]);
    let err = alice_room.send_user_message("bob", oversize).unwrap_err();
    assert_eq!(err.return_code(), codes::MESSAGE_TOO_LARGE);

    // Failed sends consumed no IDs.
    let msg_id = alice_room
        .send_room_message(MessagePayload::text("fits"))
        .unwrap();
    assert_eq!(msg_id, 1);

    alice_engine.destroy().await;
    bob_engine.destroy().await;
}

#[tokio::test]
async fn test_unicast_to_absent_member_reports_unknown_target() {
    let (alice_engine, bob_engine) = engine_pair();
    let (alice_room, mut alice_events) = joined_room(&alice_engine, "meet", "alice").await;

    let msg_id = alice_room
        .send_user_message("nobody", MessagePayload::text("anyone there"))
        .unwrap();
    let event = wait_room(&mut alice_events, |e| {
        matches!(e, RoomEvent::UserMessageSendResult { .. })
    })
    .await;
    if let RoomEvent::UserMessageSendResult { msg_id: got, error } = event {
        assert_eq!(got, msg_id);
        assert_eq!(error, Some(MessageDeliveryError::UnknownTarget));
    }

    alice_engine.destroy().await;
    bob_engine.destroy().await;
}

#[tokio::test]
async fn test_in_room_unicast_is_private() {
    let (alice_engine, bob_engine) = engine_pair();
    let (alice_room, mut alice_events) = joined_room(&alice_engine, "meet", "alice").await;
    let (_bob_room, mut bob_events) = joined_room(&bob_engine, "meet", "bob").await;

    alice_room
        .send_user_message("bob", MessagePayload::text("just for you"))
        .unwrap();

    let event = wait_room(&mut bob_events, |e| {
        matches!(e, RoomEvent::UserMessageReceived { .. })
    })
    .await;
    if let RoomEvent::UserMessageReceived { from, message } = event {
        assert_eq!(from.as_str(), "alice");
        assert_eq!(message, "just for you");
    }

    let event = wait_room(&mut alice_events, |e| {
        matches!(e, RoomEvent::UserMessageSendResult { .. })
    })
    .await;
    if let RoomEvent::UserMessageSendResult { error, .. } = event {
        assert!(error.is_none());
    }

    alice_engine.destroy().await;
    bob_engine.destroy().await;
}

#[tokio::test]
async fn test_out_of_room_messaging_requires_confirmed_login() {
    let (alice_engine, bob_engine) = engine_pair();

    let err = alice_engine
        .send_user_message("bob", MessagePayload::text("hi"))
        .unwrap_err();
    assert_eq!(err.return_code(), codes::NOT_LOGGED_IN);

    let mut alice_events = alice_engine.events().unwrap();
    let mut bob_events = bob_engine.events().unwrap();

    alice_engine.login("alice", "tk").unwrap();
    let event = wait_engine(&mut alice_events, |e| {
        matches!(e, EngineEvent::LoginResult { .. })
    })
    .await;
    if let EngineEvent::LoginResult { user_id, code } = event {
        assert_eq!(user_id.as_str(), "alice");
        assert_eq!(code, 0);
    }

    bob_engine.login("bob", "tk").unwrap();
    wait_engine(&mut bob_events, |e| {
        matches!(e, EngineEvent::LoginResult { code: 0, .. })
    })
    .await;

    let msg_id = alice_engine
        .send_user_message("bob", MessagePayload::text("psst"))
        .unwrap();
    assert_eq!(msg_id, 1);

    let event = wait_engine(&mut bob_events, |e| {
        matches!(e, EngineEvent::UserMessageReceived { .. })
    })
    .await;
    if let EngineEvent::UserMessageReceived { from, message } = event {
        assert_eq!(from.as_str(), "alice");
        assert_eq!(message, "psst");
    }

    let event = wait_engine(&mut alice_events, |e| {
        matches!(e, EngineEvent::UserMessageSendResult { .. })
    })
    .await;
    if let EngineEvent::UserMessageSendResult { msg_id: got, error } = event {
        assert_eq!(got, msg_id);
        assert!(error.is_none());
    }

    alice_engine.destroy().await;
    bob_engine.destroy().await;
}

#[tokio::test]
async fn test_out_of_room_message_to_offline_peer_fails() {
    let (alice_engine, bob_engine) = engine_pair();
    let mut alice_events = alice_engine.events().unwrap();

    alice_engine.login("alice", "tk").unwrap();
    wait_engine(&mut alice_events, |e| {
        matches!(e, EngineEvent::LoginResult { code: 0, .. })
    })
    .await;

    // Bob never logged in.
    let msg_id = alice_engine
        .send_user_message("bob", MessagePayload::text("hello?"))
        .unwrap();
    let event = wait_engine(&mut alice_events, |e| {
        matches!(e, EngineEvent::UserMessageSendResult { .. })
    })
    .await;
    if let EngineEvent::UserMessageSendResult { msg_id: got, error } = event {
        assert_eq!(got, msg_id);
        assert_eq!(error, Some(MessageDeliveryError::UnknownTarget));
    }

    alice_engine.destroy().await;
    bob_engine.destroy().await;
}

#[tokio::test]
async fn test_server_messages_need_an_attached_server() {
    let (alice_engine, _bob_engine) = engine_pair();
    let mut alice_events = alice_engine.events().unwrap();

    alice_engine.login("alice", "tk").unwrap();
    wait_engine(&mut alice_events, |e| {
        matches!(e, EngineEvent::LoginResult { code: 0, .. })
    })
    .await;

    // No server attached: the send resolves with an error.
    alice_engine
        .send_server_message(MessagePayload::text("ping"))
        .unwrap();
    let event = wait_engine(&mut alice_events, |e| {
        matches!(e, EngineEvent::ServerMessageSendResult { .. })
    })
    .await;
    if let EngineEvent::ServerMessageSendResult { error, .. } = event {
        assert_eq!(error, Some(MessageDeliveryError::ServerUnavailable));
    }

    // Attach a server inbox and retry.
    let mut inbox = alice_engine.attach_server();
    let msg_id = alice_engine
        .send_server_message(MessagePayload::text("ping"))
        .unwrap();
    let delivered = tokio::time::timeout(Duration::from_secs(2), inbox.recv())
        .await
        .expect("timed out waiting for the server inbox")
        .expect("server inbox closed");
    assert_eq!(delivered.from.as_str(), "alice");
    assert_eq!(delivered.msg_id, msg_id);
    assert_eq!(delivered.payload, MessagePayload::text("ping"));

    let event = wait_engine(&mut alice_events, |e| {
        matches!(e, EngineEvent::ServerMessageSendResult { msg_id: got, .. } if *got == msg_id)
    })
    .await;
    if let EngineEvent::ServerMessageSendResult { error, .. } = event {
        assert!(error.is_none());
    }

    alice_engine.destroy().await;
}

#[tokio::test]
async fn test_leave_stats_count_both_directions() {
    let (alice_engine, bob_engine) = engine_pair();
    let (alice_room, mut alice_events) = joined_room(&alice_engine, "meet", "alice").await;
    let (bob_room, mut bob_events) = joined_room(&bob_engine, "meet", "bob").await;

    alice_room
        .send_room_message(MessagePayload::text("ping"))
        .unwrap();
    wait_room(&mut bob_events, |e| {
        matches!(e, RoomEvent::RoomMessageReceived { .. })
    })
    .await;
    bob_room
        .send_room_message(MessagePayload::text("pong"))
        .unwrap();
    wait_room(&mut alice_events, |e| {
        matches!(e, RoomEvent::RoomMessageReceived { .. })
    })
    .await;

    alice_room.leave().unwrap();
    let event = wait_room(&mut alice_events, |e| {
        matches!(e, RoomEvent::LeftRoom { .. })
    })
    .await;
    if let RoomEvent::LeftRoom { stats } = event {
        assert_eq!(stats.messages_sent, 1);
        assert_eq!(stats.messages_received, 1);
        assert_eq!(stats.peak_remote_users, 1);
    }

    alice_engine.destroy().await;
    bob_engine.destroy().await;
}
