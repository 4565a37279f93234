//! Room handle: fluent builder plus the session API surface.

use crate::config::RoomConfig;
use crate::engine::Engine;
use parking_lot::Mutex;
use roomlink_core::{
    event_channel, ConnectionState, EventStream, MessageId, PublishConfig, RemoteUserPriority,
    RoomEvent, RoomId, RoomlinkError, StreamKey, SubscribeFallbackOption, SubscribeMode, UserId,
};
use roomlink_messaging::MessagePayload;
use roomlink_session::{SessionHandle, SessionSnapshot};
use std::time::Duration;

/// Fluent builder for a [`Room`]
#[derive(Debug)]
pub struct RoomBuilder {
    engine: Engine,
    room_id: String,
    user_id: String,
    config: RoomConfig,
}

impl RoomBuilder {
    pub(crate) fn new(engine: Engine, room_id: String) -> Self {
        Self {
            engine,
            room_id,
            user_id: String::new(),
            config: RoomConfig::default(),
        }
    }

    /// Local user ID (required)
    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Join visibly (default) or invisibly
    pub fn visible(mut self, visible: bool) -> Self {
        self.config.visible = visible;
        self
    }

    /// Automatic (default) or manual subscription
    pub fn subscribe_mode(mut self, mode: SubscribeMode) -> Self {
        self.config.subscribe_mode = mode;
        self
    }

    /// Subscriber-side simulcast fallback eligibility
    pub fn subscribe_fallback(mut self, option: SubscribeFallbackOption) -> Self {
        self.config.subscribe_fallback = option;
        self
    }

    /// Minimum interval between simulcast tier changes of one stream
    pub fn fallback_cooldown(mut self, cooldown: Duration) -> Self {
        self.config.fallback_cooldown = cooldown;
        self
    }

    /// How long an unresolved subscribe request waits for the publish
    /// announcement
    pub fn subscribe_window(mut self, window: Duration) -> Self {
        self.config.subscribe_window = window;
        self
    }

    /// Replace the whole room config at once
    pub fn config(mut self, config: RoomConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the identifiers and spawn the session driver.
    ///
    /// The session starts idle; call [`Room::join`] to enter the room.
    pub fn build(self) -> Result<Room, RoomlinkError> {
        let room_id = RoomId::new(&self.room_id)?;
        let user_id = UserId::new(&self.user_id)?;
        let (sink, stream) = event_channel();
        let handle = self
            .engine
            .create_session(room_id, user_id, self.config.into(), sink)?;
        Ok(Room {
            engine: self.engine,
            handle,
            events: Mutex::new(Some(stream)),
        })
    }
}

/// One room session.
///
/// Calls validate synchronously and return immediately; every
/// authoritative outcome arrives on the room's event stream.
#[derive(Debug)]
pub struct Room {
    engine: Engine,
    handle: SessionHandle,
    events: Mutex<Option<EventStream<RoomEvent>>>,
}

impl Room {
    /// Room this session belongs to
    pub fn room_id(&self) -> &RoomId {
        self.handle.room_id()
    }

    /// Local user
    pub fn user_id(&self) -> &UserId {
        self.handle.user_id()
    }

    /// Take the single-consumer room event stream.
    ///
    /// Fails once the stream has already been handed out.
    pub fn events(&self) -> Result<EventStream<RoomEvent>, RoomlinkError> {
        self.events
            .lock()
            .take()
            .ok_or_else(|| RoomlinkError::EventStreamTaken {
                owner: self.handle.room_id().as_str().to_string(),
            })
    }

    /// Request to join the room; the outcome arrives as a state-changed
    /// event
    pub fn join(&self, token: &str) -> Result<(), RoomlinkError> {
        self.handle.join(token)
    }

    /// Request to leave the room; never blocks
    pub fn leave(&self) -> Result<(), RoomlinkError> {
        self.handle.leave()
    }

    /// Supply a fresh token; triggers a rejoin after a token-expired join
    /// failure
    pub fn update_token(&self, token: &str) -> Result<(), RoomlinkError> {
        self.handle.update_token(token)
    }

    /// Toggle local visibility
    pub fn set_visibility(&self, visible: bool) -> Result<(), RoomlinkError> {
        self.handle.set_visibility(visible)
    }

    /// Publish a local stream
    pub fn publish(&self, key: StreamKey, config: PublishConfig) -> Result<(), RoomlinkError> {
        self.handle.publish(key, config)
    }

    /// Withdraw a local stream
    pub fn unpublish(&self, key: StreamKey) -> Result<(), RoomlinkError> {
        self.handle.unpublish(key)
    }

    /// Set local mute for a key; independent of the publish lifecycle
    pub fn set_local_mute(&self, key: StreamKey, muted: bool) -> Result<(), RoomlinkError> {
        self.handle.set_local_mute(key, muted)
    }

    /// Subscribe to a remote stream
    pub fn subscribe(&self, user_id: &str, key: StreamKey) -> Result<(), RoomlinkError> {
        self.handle.subscribe(UserId::new(user_id)?, key)
    }

    /// Tear down a subscription
    pub fn unsubscribe(&self, user_id: &str, key: StreamKey) -> Result<(), RoomlinkError> {
        self.handle.unsubscribe(UserId::new(user_id)?, key)
    }

    /// Set the bandwidth-pressure priority of one remote user
    pub fn set_remote_priority(
        &self,
        user_id: &str,
        priority: RemoteUserPriority,
    ) -> Result<(), RoomlinkError> {
        self.handle.set_remote_priority(UserId::new(user_id)?, priority)
    }

    /// Feed a downlink bandwidth estimate into the fallback controller
    pub fn report_bandwidth(&self, available_kbps: u32) -> Result<(), RoomlinkError> {
        self.handle.report_bandwidth(available_kbps)
    }

    /// Broadcast a message to every other room member
    pub fn send_room_message(&self, payload: MessagePayload) -> Result<MessageId, RoomlinkError> {
        self.handle.send_room_message(payload)
    }

    /// Send a message to one room member
    pub fn send_user_message(
        &self,
        to: &str,
        payload: MessagePayload,
    ) -> Result<MessageId, RoomlinkError> {
        self.handle.send_user_message(UserId::new(to)?, payload)
    }

    /// Connection state derived from the current phase
    pub fn connection_state(&self) -> ConnectionState {
        self.handle.connection_state()
    }

    /// Point-in-time view of session, publication, and subscription state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.handle.snapshot()
    }

    /// Stop the session driver and release the room slot.
    ///
    /// A joined session leaves the room first. Must not be called from the
    /// event consumer itself.
    pub async fn destroy(&self) {
        self.engine.forget_room(self.handle.room_id());
        self.handle.destroy().await;
    }
}
