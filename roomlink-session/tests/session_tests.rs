//! Driver-level session tests: two sessions against one switchboard.

use roomlink_core::{
    codes, event_channel, ConnectionState, EventStream, JoinKind, MediaType, PublishConfig,
    PublishState, RoomEvent, RoomFault, RoomId, RoomStateInfo, StreamKey, StreamRemoveReason,
    SubscribeMode, SubscribeOutcome, UserId,
};
use roomlink_session::{SessionConfig, SessionHandle};
use roomlink_signaling::Switchboard;
use std::sync::Arc;
use std::time::Duration;

fn spawn_session(
    board: &Arc<Switchboard>,
    room: &str,
    user: &str,
    config: SessionConfig,
) -> (SessionHandle, EventStream<RoomEvent>) {
    let (sink, stream) = event_channel();
    let handle = SessionHandle::spawn(
        RoomId::new(room).unwrap(),
        UserId::new(user).unwrap(),
        config,
        Arc::clone(board),
        sink,
    );
    (handle, stream)
}

async fn next_event(stream: &mut EventStream<RoomEvent>) -> RoomEvent {
    tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("timed out waiting for an event")
        .expect("event stream closed")
}

/// Wait until an event matching the predicate arrives, discarding others.
async fn wait_for<F>(stream: &mut EventStream<RoomEvent>, mut pred: F) -> RoomEvent
where
    F: FnMut(&RoomEvent) -> bool,
{
    loop {
        let event = next_event(stream).await;
        if pred(&event) {
            return event;
        }
    }
}

#[tokio::test]
async fn test_join_confirms_asynchronously_with_join_kind() {
    let board = Arc::new(Switchboard::new());
    let (alice, mut events) = spawn_session(&board, "meet", "alice", SessionConfig::default());

    alice.join("tk").unwrap();
    // Synchronous view flips to connecting immediately.
    assert!(matches!(
        alice.connection_state(),
        ConnectionState::Connecting | ConnectionState::Connected
    ));

    match next_event(&mut events).await {
        RoomEvent::StateChanged {
            state,
            code,
            extra_info,
            ..
        } => {
            assert_eq!(state, ConnectionState::Connected);
            assert_eq!(code, codes::OK);
            let info = RoomStateInfo::from_extra_info(&extra_info).unwrap();
            assert_eq!(info.join_kind, JoinKind::First);
        }
        other => panic!("expected StateChanged, got {other:?}"),
    }
    assert_eq!(alice.connection_state(), ConnectionState::Connected);

    // A second join while joined is rejected synchronously.
    let err = alice.join("tk").unwrap_err();
    assert_eq!(err.return_code(), codes::ALREADY_JOINED);

    alice.destroy().await;
}

#[tokio::test]
async fn test_rejoin_reports_rejoin_kind() {
    let board = Arc::new(Switchboard::new());
    let (alice, mut events) = spawn_session(&board, "meet", "alice", SessionConfig::default());

    alice.join("tk").unwrap();
    wait_for(&mut events, |e| {
        matches!(e, RoomEvent::StateChanged { state: ConnectionState::Connected, .. })
    })
    .await;

    alice.leave().unwrap();
    wait_for(&mut events, |e| matches!(e, RoomEvent::LeftRoom { .. })).await;

    alice.join("tk").unwrap();
    let event = wait_for(&mut events, |e| {
        matches!(e, RoomEvent::StateChanged { state: ConnectionState::Connected, .. })
    })
    .await;
    if let RoomEvent::StateChanged { extra_info, .. } = event {
        let info = RoomStateInfo::from_extra_info(&extra_info).unwrap();
        assert_eq!(info.join_kind, JoinKind::Rejoin);
    }

    alice.destroy().await;
}

#[tokio::test]
async fn test_leave_is_idempotent_and_reports_stats() {
    let board = Arc::new(Switchboard::new());
    let (alice, mut events) = spawn_session(&board, "meet", "alice", SessionConfig::default());

    // Leaving while idle is a no-op.
    alice.leave().unwrap();

    alice.join("tk").unwrap();
    wait_for(&mut events, |e| {
        matches!(e, RoomEvent::StateChanged { state: ConnectionState::Connected, .. })
    })
    .await;

    alice.leave().unwrap();
    alice.leave().unwrap();
    let event = wait_for(&mut events, |e| matches!(e, RoomEvent::LeftRoom { .. })).await;
    if let RoomEvent::LeftRoom { stats } = event {
        assert_eq!(stats.messages_sent, 0);
        assert_eq!(stats.peak_remote_users, 0);
    }
    assert_eq!(alice.connection_state(), ConnectionState::Disconnected);

    alice.destroy().await;
}

#[tokio::test]
async fn test_duplicate_login_surfaces_fatal_error() {
    let board = Arc::new(Switchboard::new());
    let (first, mut first_events) = spawn_session(&board, "meet", "alice", SessionConfig::default());

    first.join("tk").unwrap();
    wait_for(&mut first_events, |e| {
        matches!(e, RoomEvent::StateChanged { state: ConnectionState::Connected, .. })
    })
    .await;

    let (second, mut second_events) =
        spawn_session(&board, "meet", "alice", SessionConfig::default());
    second.join("tk").unwrap();
    wait_for(&mut second_events, |e| {
        matches!(e, RoomEvent::StateChanged { state: ConnectionState::Connected, .. })
    })
    .await;

    let fault = wait_for(&mut first_events, |e| matches!(e, RoomEvent::Error { .. })).await;
    if let RoomEvent::Error { fault } = fault {
        assert!(fault.is_fatal());
        assert!(matches!(fault, RoomFault::DuplicateLogin { .. }));
    }
    assert_eq!(first.connection_state(), ConnectionState::Disconnected);

    first.destroy().await;
    second.destroy().await;
}

#[tokio::test]
async fn test_publish_flows_to_remote_and_auto_subscribe() {
    let board = Arc::new(Switchboard::new());
    let (alice, mut alice_events) = spawn_session(&board, "meet", "alice", SessionConfig::default());
    let (bob, mut bob_events) = spawn_session(&board, "meet", "bob", SessionConfig::default());

    alice.join("tk").unwrap();
    wait_for(&mut alice_events, |e| {
        matches!(e, RoomEvent::StateChanged { state: ConnectionState::Connected, .. })
    })
    .await;
    bob.join("tk").unwrap();
    wait_for(&mut bob_events, |e| {
        matches!(e, RoomEvent::StateChanged { state: ConnectionState::Connected, .. })
    })
    .await;

    let key = StreamKey::main(MediaType::Video);
    alice.publish(key, PublishConfig::simulcast_video()).unwrap();

    // Local lifecycle: publishing then published.
    let event = wait_for(&mut alice_events, |e| {
        matches!(e, RoomEvent::LocalPublishChanged { .. })
    })
    .await;
    assert!(matches!(
        event,
        RoomEvent::LocalPublishChanged {
            state: PublishState::Publishing,
            ..
        }
    ));
    wait_for(&mut alice_events, |e| {
        matches!(
            e,
            RoomEvent::LocalPublishChanged {
                state: PublishState::Published,
                ..
            }
        )
    })
    .await;

    // Remote side observes the publish and auto-subscribes.
    wait_for(&mut bob_events, |e| {
        matches!(e, RoomEvent::UserPublishStream { .. })
    })
    .await;
    let event = wait_for(&mut bob_events, |e| {
        matches!(e, RoomEvent::StreamSubscribed { .. })
    })
    .await;
    assert!(matches!(
        event,
        RoomEvent::StreamSubscribed {
            outcome: SubscribeOutcome::Subscribed,
            ..
        }
    ));

    alice.destroy().await;
    bob.destroy().await;
}

#[tokio::test]
async fn test_remote_unpublish_tears_down_subscription() {
    let board = Arc::new(Switchboard::new());
    let (alice, mut alice_events) = spawn_session(&board, "meet", "alice", SessionConfig::default());
    let (bob, mut bob_events) = spawn_session(&board, "meet", "bob", SessionConfig::default());

    alice.join("tk").unwrap();
    wait_for(&mut alice_events, |e| {
        matches!(e, RoomEvent::StateChanged { state: ConnectionState::Connected, .. })
    })
    .await;
    bob.join("tk").unwrap();
    wait_for(&mut bob_events, |e| {
        matches!(e, RoomEvent::StateChanged { state: ConnectionState::Connected, .. })
    })
    .await;

    let key = StreamKey::main(MediaType::Video);
    alice.publish(key, PublishConfig::default()).unwrap();
    wait_for(&mut bob_events, |e| {
        matches!(
            e,
            RoomEvent::StreamSubscribed {
                outcome: SubscribeOutcome::Subscribed,
                ..
            }
        )
    })
    .await;

    // Bob never calls unsubscribe; alice withdrawing the stream is enough.
    alice.unpublish(key).unwrap();
    let event = wait_for(&mut bob_events, |e| {
        matches!(e, RoomEvent::UserUnpublishStream { .. })
    })
    .await;
    if let RoomEvent::UserUnpublishStream { user_id, reason, .. } = event {
        assert_eq!(user_id.as_str(), "alice");
        assert_eq!(reason, StreamRemoveReason::ExplicitUnpublish);
    }
    let event = wait_for(&mut bob_events, |e| {
        matches!(e, RoomEvent::StreamSubscribed { .. })
    })
    .await;
    assert!(matches!(
        event,
        RoomEvent::StreamSubscribed {
            outcome: SubscribeOutcome::Unsubscribed,
            ..
        }
    ));
    assert!(bob.snapshot().subscriptions.is_empty());

    alice.destroy().await;
    bob.destroy().await;
}

#[tokio::test]
async fn test_manual_subscribe_window_lapses_to_not_found() {
    let board = Arc::new(Switchboard::new());
    let config = SessionConfig {
        subscribe_mode: SubscribeMode::Manual,
        subscribe_window: Duration::from_millis(50),
        ..SessionConfig::default()
    };
    let (alice, mut events) = spawn_session(&board, "meet", "alice", config);

    alice.join("tk").unwrap();
    wait_for(&mut events, |e| {
        matches!(e, RoomEvent::StateChanged { state: ConnectionState::Connected, .. })
    })
    .await;

    // Nobody publishes this stream; the request waits out the window.
    alice
        .subscribe(UserId::new("ghost").unwrap(), StreamKey::main(MediaType::Video))
        .unwrap();
    let event = wait_for(&mut events, |e| {
        matches!(e, RoomEvent::StreamSubscribed { .. })
    })
    .await;
    assert!(matches!(
        event,
        RoomEvent::StreamSubscribed {
            outcome: SubscribeOutcome::NotFound,
            ..
        }
    ));

    alice.destroy().await;
}

#[tokio::test]
async fn test_mute_survives_unpublish_and_is_replayed() {
    let board = Arc::new(Switchboard::new());
    let (alice, mut alice_events) = spawn_session(&board, "meet", "alice", SessionConfig::default());
    let (bob, mut bob_events) = spawn_session(&board, "meet", "bob", SessionConfig::default());

    alice.join("tk").unwrap();
    wait_for(&mut alice_events, |e| {
        matches!(e, RoomEvent::StateChanged { state: ConnectionState::Connected, .. })
    })
    .await;
    bob.join("tk").unwrap();
    wait_for(&mut bob_events, |e| {
        matches!(e, RoomEvent::StateChanged { state: ConnectionState::Connected, .. })
    })
    .await;

    let key = StreamKey::main(MediaType::Audio);
    // Mute before any publish; valid in every phase.
    alice.set_local_mute(key, true).unwrap();
    alice.publish(key, PublishConfig::default()).unwrap();

    // Bob sees the publish immediately followed by the mute replay.
    wait_for(&mut bob_events, |e| {
        matches!(e, RoomEvent::UserPublishStream { .. })
    })
    .await;
    let event = wait_for(&mut bob_events, |e| {
        matches!(e, RoomEvent::UserMuteStream { .. })
    })
    .await;
    assert!(matches!(event, RoomEvent::UserMuteStream { muted: true, .. }));

    // Unpublish and republish: the mute is still in force.
    alice.unpublish(key).unwrap();
    wait_for(&mut bob_events, |e| {
        matches!(e, RoomEvent::UserUnpublishStream { .. })
    })
    .await;
    alice.publish(key, PublishConfig::default()).unwrap();
    wait_for(&mut bob_events, |e| {
        matches!(e, RoomEvent::UserPublishStream { .. })
    })
    .await;
    let event = wait_for(&mut bob_events, |e| {
        matches!(e, RoomEvent::UserMuteStream { .. })
    })
    .await;
    assert!(matches!(event, RoomEvent::UserMuteStream { muted: true, .. }));

    alice.destroy().await;
    bob.destroy().await;
}

#[tokio::test]
async fn test_publish_while_invisible_warns() {
    let board = Arc::new(Switchboard::new());
    let config = SessionConfig {
        visible: false,
        ..SessionConfig::default()
    };
    let (alice, mut events) = spawn_session(&board, "meet", "alice", config);

    alice.join("tk").unwrap();
    wait_for(&mut events, |e| {
        matches!(e, RoomEvent::StateChanged { state: ConnectionState::Connected, .. })
    })
    .await;

    alice
        .publish(StreamKey::main(MediaType::Video), PublishConfig::default())
        .unwrap();
    let event = wait_for(&mut events, |e| matches!(e, RoomEvent::Warning { .. })).await;
    if let RoomEvent::Warning { warning } = event {
        assert_eq!(warning.warning_code(), "PUBLISH_WHILE_INVISIBLE");
    }
    // No publish slot was created.
    assert!(alice.snapshot().published.is_empty());

    alice.destroy().await;
}

#[tokio::test]
async fn test_operations_require_joined_session() {
    let board = Arc::new(Switchboard::new());
    let (alice, _events) = spawn_session(&board, "meet", "alice", SessionConfig::default());

    let err = alice
        .publish(StreamKey::main(MediaType::Video), PublishConfig::default())
        .unwrap_err();
    assert_eq!(err.return_code(), codes::NOT_IN_ROOM);

    let err = alice
        .send_room_message(roomlink_messaging::MessagePayload::text("hi"))
        .unwrap_err();
    assert_eq!(err.return_code(), codes::NOT_IN_ROOM);

    alice.destroy().await;
}
