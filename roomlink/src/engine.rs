//! Engine facade: room factory and the out-of-room messaging channel.

use crate::config::EngineConfig;
use crate::room::RoomBuilder;
use parking_lot::{Mutex, RwLock};
use roomlink_core::{
    event_channel, EngineEvent, EventSink, EventStream, MessageId, RoomId, RoomlinkError, UserId,
};
use roomlink_messaging::{DeliveryTracker, MessagePayload, MessageSequence};
use roomlink_signaling::{
    DirectNotice, DirectScope, ServerMessage, Switchboard, TokenValidator,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

struct LoginState {
    user_id: UserId,
    confirmed: bool,
}

pub(crate) struct EngineInner {
    config: EngineConfig,
    pub(crate) switchboard: Arc<Switchboard>,
    pub(crate) rooms: Mutex<HashMap<RoomId, roomlink_session::SessionHandle>>,
    events: Mutex<Option<EventStream<EngineEvent>>>,
    sink: EventSink<EngineEvent>,
    login: RwLock<Option<LoginState>>,
    direct_seq: MessageSequence,
    direct_tracker: DeliveryTracker,
    forward: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

/// Entry point: builds rooms against a shared switchboard and carries the
/// out-of-room messaging channel.
///
/// Cheap to clone; all clones share the same engine state.
#[derive(Clone)]
pub struct Engine {
    pub(crate) inner: Arc<EngineInner>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("app_id", &self.inner.config.app_id)
            .field("open_rooms", &self.inner.rooms.lock().len())
            .finish()
    }
}

impl Engine {
    /// Create an engine with the default token validator
    pub fn new(config: EngineConfig) -> Self {
        Self::with_switchboard(config, Arc::new(Switchboard::new()))
    }

    /// Create an engine with a custom token validator
    pub fn with_validator(config: EngineConfig, validator: TokenValidator) -> Self {
        Self::with_switchboard(config, Arc::new(Switchboard::with_validator(validator)))
    }

    /// Create an engine on an existing switchboard.
    ///
    /// Engines sharing one switchboard behave like separate clients of the
    /// same server, which is how multi-user scenarios are simulated in one
    /// process.
    pub fn with_switchboard(config: EngineConfig, switchboard: Arc<Switchboard>) -> Self {
        let (sink, stream) = event_channel();
        info!(app_id = %config.app_id, "engine created");
        Self {
            inner: Arc::new(EngineInner {
                config,
                switchboard,
                rooms: Mutex::new(HashMap::new()),
                events: Mutex::new(Some(stream)),
                sink,
                login: RwLock::new(None),
                direct_seq: MessageSequence::new(),
                direct_tracker: DeliveryTracker::new(),
                forward: Mutex::new(None),
            }),
        }
    }

    /// Start building a room session for `room_id`
    pub fn room(&self, room_id: impl Into<String>) -> RoomBuilder {
        RoomBuilder::new(self.clone(), room_id.into())
    }

    /// Take the single-consumer engine event stream.
    ///
    /// Fails once the stream has already been handed out.
    pub fn events(&self) -> Result<EventStream<EngineEvent>, RoomlinkError> {
        self.inner
            .events
            .lock()
            .take()
            .ok_or(RoomlinkError::EventStreamTaken {
                owner: "engine".to_string(),
            })
    }

    /// Log a user in for out-of-room messaging.
    ///
    /// Returns immediately; the authoritative outcome arrives as a
    /// login-result event. A second login replaces the first.
    pub fn login(&self, user_id: &str, token: &str) -> Result<(), RoomlinkError> {
        let user_id = UserId::new(user_id)?;
        self.logout();

        let (tx, rx) = mpsc::unbounded_channel();
        *self.inner.login.write() = Some(LoginState {
            user_id: user_id.clone(),
            confirmed: false,
        });
        self.inner.switchboard.login(&user_id, token, tx);
        let forwarder = Arc::clone(&self.inner);
        let handle = tokio::spawn(forward_direct_notices(forwarder, rx));
        if let Some(old) = self.inner.forward.lock().replace(handle) {
            old.abort();
        }
        Ok(())
    }

    /// Drop the out-of-room connection; a no-op when not logged in
    pub fn logout(&self) {
        let state = self.inner.login.write().take();
        if let Some(state) = state {
            self.inner.switchboard.logout(&state.user_id);
        }
    }

    /// Send an out-of-room message to another logged-in user.
    ///
    /// Requires a confirmed login; the returned ID is matched by exactly
    /// one delivery-result event.
    pub fn send_user_message(
        &self,
        to: &str,
        payload: MessagePayload,
    ) -> Result<MessageId, RoomlinkError> {
        let to = UserId::new(to)?;
        let from = self.require_login("send_user_message")?;
        payload.validate()?;
        let msg_id = self.inner.direct_seq.next_id();
        self.inner.direct_tracker.register(msg_id);
        self.inner.switchboard.direct_message(&from, &to, msg_id, payload);
        Ok(msg_id)
    }

    /// Send an out-of-room message to the attached application server
    pub fn send_server_message(&self, payload: MessagePayload) -> Result<MessageId, RoomlinkError> {
        let from = self.require_login("send_server_message")?;
        payload.validate()?;
        let msg_id = self.inner.direct_seq.next_id();
        self.inner.direct_tracker.register(msg_id);
        self.inner.switchboard.server_message(&from, msg_id, payload);
        Ok(msg_id)
    }

    /// Attach the application-server inbox; server-scoped messages arrive
    /// on the returned receiver
    pub fn attach_server(&self) -> mpsc::UnboundedReceiver<ServerMessage> {
        self.inner.switchboard.attach_server()
    }

    /// Tear down every open room, log out, and stop background tasks.
    ///
    /// Must not be called from an event consumer.
    pub async fn destroy(&self) {
        let handles: Vec<_> = self.inner.rooms.lock().drain().collect();
        for (room_id, handle) in handles {
            debug!(%room_id, "destroying room session");
            handle.destroy().await;
        }
        self.logout();
        let forward = self.inner.forward.lock().take();
        if let Some(forward) = forward {
            let _ = forward.await;
        }
        info!(app_id = %self.inner.config.app_id, "engine destroyed");
    }

    pub(crate) fn create_session(
        &self,
        room_id: RoomId,
        user_id: UserId,
        config: roomlink_session::SessionConfig,
        sink: EventSink<roomlink_core::RoomEvent>,
    ) -> Result<roomlink_session::SessionHandle, RoomlinkError> {
        let mut rooms = self.inner.rooms.lock();
        if rooms.len() >= self.inner.config.max_rooms {
            return Err(RoomlinkError::RoomLimit {
                limit: self.inner.config.max_rooms,
            });
        }
        if rooms.contains_key(&room_id) {
            return Err(RoomlinkError::AlreadyJoined {
                room_id: room_id.as_str().to_string(),
            });
        }
        let handle = roomlink_session::SessionHandle::spawn(
            room_id.clone(),
            user_id,
            config,
            Arc::clone(&self.inner.switchboard),
            sink,
        );
        rooms.insert(room_id, handle.clone());
        Ok(handle)
    }

    pub(crate) fn forget_room(&self, room_id: &RoomId) {
        self.inner.rooms.lock().remove(room_id);
    }

    fn require_login(&self, operation: &str) -> Result<UserId, RoomlinkError> {
        match self.inner.login.read().as_ref() {
            Some(state) if state.confirmed => Ok(state.user_id.clone()),
            _ => Err(RoomlinkError::NotLoggedIn {
                operation: operation.to_string(),
            }),
        }
    }
}

async fn forward_direct_notices(
    inner: Arc<EngineInner>,
    mut rx: mpsc::UnboundedReceiver<DirectNotice>,
) {
    while let Some(notice) = rx.recv().await {
        match notice {
            DirectNotice::LoginResult { user_id, code } => {
                {
                    let mut login = inner.login.write();
                    if let Some(state) = login.as_mut() {
                        if state.user_id == user_id {
                            if code == 0 {
                                state.confirmed = true;
                            } else {
                                *login = None;
                            }
                        }
                    }
                }
                let _ = inner.sink.emit(EngineEvent::LoginResult { user_id, code });
            }
            DirectNotice::Message { from, payload } => {
                let event = match payload {
                    MessagePayload::Text(message) => {
                        EngineEvent::UserMessageReceived { from, message }
                    }
                    MessagePayload::Binary(message) => {
                        EngineEvent::UserBinaryMessageReceived { from, message }
                    }
                };
                let _ = inner.sink.emit(event);
            }
            DirectNotice::MessageResult {
                msg_id,
                scope,
                error,
            } => {
                if inner.direct_tracker.resolve(msg_id) {
                    let event = match scope {
                        DirectScope::Peer => EngineEvent::UserMessageSendResult { msg_id, error },
                        DirectScope::Server => {
                            EngineEvent::ServerMessageSendResult { msg_id, error }
                        }
                    };
                    let _ = inner.sink.emit(event);
                }
            }
        }
    }
}
