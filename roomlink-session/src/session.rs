//! Room session handle and its driver task.
//!
//! Every API call validates synchronously under the shared lock, then hands
//! the operation to a single driver task that also consumes switchboard
//! notices. Because one task serializes both sources, every state mutation
//! and every emitted event observes a single consistent order; the
//! authoritative outcome of join and leave always arrives as an event, never
//! as the return value.

use crate::fallback::FallbackController;
use crate::participant::ParticipantRegistry;
use crate::publication::{PublicationTable, PublishAction};
use crate::subscription::{SubscribeAction, SubscriptionTable};
use parking_lot::{Mutex, RwLock};
use roomlink_core::{
    codes, ConnectionState, EventSink, JoinKind, MediaType, MessageId, PublishConfig,
    PublishFallbackOption, PublishState, RemoteUserPriority, RoomEvent, RoomFault, RoomId,
    RoomStateInfo, RoomStats, RoomWarning, RoomlinkError, SimulcastProfile, StreamKey,
    StreamRemoveReason, SubscribeConfig, SubscribeFallbackOption, SubscribeMode, SubscribeOutcome,
    SubscriptionState, UserId, UserLeaveReason,
};
use roomlink_messaging::{DeliveryTracker, MessagePayload, MessageSequence};
use roomlink_signaling::{
    MemberSnapshot, MessageScope, Notice, Registration, Switchboard, TokenCheck,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Per-session options fixed when the session is created
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Whether the local user is visible to other members
    pub visible: bool,
    /// Automatic or manual subscription, fixed for the whole session
    pub subscribe_mode: SubscribeMode,
    /// Subscriber-side fallback eligibility
    pub subscribe_fallback: SubscribeFallbackOption,
    /// Minimum interval between tier changes of one stream
    pub fallback_cooldown: Duration,
    /// How long an unresolved subscribe request waits for the publish
    /// announcement
    pub subscribe_window: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            visible: true,
            subscribe_mode: SubscribeMode::Automatic,
            subscribe_fallback: SubscribeFallbackOption::Disabled,
            fallback_cooldown: Duration::from_secs(3),
            subscribe_window: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Joining,
    Joined,
    Leaving,
}

#[derive(Debug)]
struct Shared {
    phase: Phase,
    visible: bool,
    has_joined_before: bool,
    token_expired_pending: bool,
    join_started: Option<Instant>,
    joined_at: Option<Instant>,
    messages_sent: u64,
    messages_received: u64,
    peak_remote_users: usize,
}

impl Shared {
    fn connection_state(&self) -> ConnectionState {
        match self.phase {
            Phase::Idle | Phase::Leaving => ConnectionState::Disconnected,
            Phase::Joining => {
                if self.has_joined_before {
                    ConnectionState::Reconnecting
                } else {
                    ConnectionState::Connecting
                }
            }
            Phase::Joined => ConnectionState::Connected,
        }
    }
}

#[derive(Debug)]
enum Command {
    Join { token: String },
    Leave,
    UpdateToken { token: String },
    SetVisibility { visible: bool },
    Publish { key: StreamKey, config: PublishConfig },
    Unpublish { key: StreamKey },
    MuteLocal { key: StreamKey, muted: bool },
    Subscribe { user_id: UserId, key: StreamKey },
    Unsubscribe { user_id: UserId, key: StreamKey },
    SetRemotePriority { user_id: UserId, priority: RemoteUserPriority },
    BandwidthSample { available_kbps: u32 },
    SendRoomMessage { msg_id: MessageId, payload: MessagePayload },
    SendUserMessage { msg_id: MessageId, to: UserId, payload: MessagePayload },
    Shutdown,
}

/// Point-in-time view of a session's state
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Connection state derived from the join/leave phase
    pub connection_state: ConnectionState,
    /// Local visibility
    pub visible: bool,
    /// Local publish slots with a non-default state
    pub published: Vec<(StreamKey, PublishState)>,
    /// Locally muted keys, published or not
    pub muted: Vec<StreamKey>,
    /// Active and pending subscriptions
    pub subscriptions: Vec<(UserId, StreamKey, SubscriptionState, SubscribeConfig)>,
    /// Visible remote users
    pub remote_users: Vec<UserId>,
}

struct SessionInner {
    room_id: RoomId,
    user_id: UserId,
    session_uid: Uuid,
    switchboard: Arc<Switchboard>,
    shared: RwLock<Shared>,
    publication: RwLock<PublicationTable>,
    subscriptions: RwLock<SubscriptionTable>,
    registry: RwLock<ParticipantRegistry>,
    fallback: Mutex<FallbackController>,
    cmd_tx: mpsc::UnboundedSender<Command>,
    room_seq: MessageSequence,
    tracker: DeliveryTracker,
    events: EventSink<RoomEvent>,
    driver: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

/// Cloneable handle to one room session
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("room_id", &self.inner.room_id)
            .field("user_id", &self.inner.user_id)
            .finish()
    }
}

impl SessionHandle {
    /// Create the session state and spawn its driver task
    pub fn spawn(
        room_id: RoomId,
        user_id: UserId,
        config: SessionConfig,
        switchboard: Arc<Switchboard>,
        events: EventSink<RoomEvent>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let fallback_enabled = matches!(
            config.subscribe_fallback,
            SubscribeFallbackOption::AllowResolutionFallback
        );
        let inner = Arc::new(SessionInner {
            room_id,
            user_id,
            session_uid: Uuid::new_v4(),
            switchboard,
            shared: RwLock::new(Shared {
                phase: Phase::Idle,
                visible: config.visible,
                has_joined_before: false,
                token_expired_pending: false,
                join_started: None,
                joined_at: None,
                messages_sent: 0,
                messages_received: 0,
                peak_remote_users: 0,
            }),
            publication: RwLock::new(PublicationTable::new()),
            subscriptions: RwLock::new(SubscriptionTable::new(
                config.subscribe_mode,
                config.subscribe_window,
            )),
            registry: RwLock::new(ParticipantRegistry::new()),
            fallback: Mutex::new(FallbackController::new(
                fallback_enabled,
                config.fallback_cooldown,
            )),
            cmd_tx,
            room_seq: MessageSequence::new(),
            tracker: DeliveryTracker::new(),
            events,
            driver: Mutex::new(None),
        });
        let driver = Driver {
            inner: Arc::clone(&inner),
            notice_tx,
        };
        let handle = tokio::spawn(driver.run(cmd_rx, notice_rx));
        *inner.driver.lock() = Some(handle);
        SessionHandle { inner }
    }

    /// Room this session belongs to
    pub fn room_id(&self) -> &RoomId {
        &self.inner.room_id
    }

    /// Local user
    pub fn user_id(&self) -> &UserId {
        &self.inner.user_id
    }

    /// Connection state derived from the current phase
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.shared.read().connection_state()
    }

    /// Request to join the room.
    ///
    /// Returns immediately; the authoritative outcome arrives as a
    /// state-changed event. A join while not idle is rejected
    /// synchronously.
    pub fn join(&self, token: &str) -> Result<(), RoomlinkError> {
        {
            let mut shared = self.inner.shared.write();
            match shared.phase {
                Phase::Idle => {
                    shared.phase = Phase::Joining;
                    shared.join_started = Some(Instant::now());
                }
                _ => {
                    return Err(RoomlinkError::AlreadyJoined {
                        room_id: self.inner.room_id.as_str().to_string(),
                    })
                }
            }
        }
        if let Err(err) = self.send_command(Command::Join {
            token: token.to_string(),
        }) {
            let mut shared = self.inner.shared.write();
            shared.phase = Phase::Idle;
            shared.join_started = None;
            return Err(err);
        }
        Ok(())
    }

    /// Request to leave the room.
    ///
    /// Never blocks; teardown completes asynchronously and is reported by
    /// the left-room event. Leaving an idle session is a no-op.
    pub fn leave(&self) -> Result<(), RoomlinkError> {
        {
            let mut shared = self.inner.shared.write();
            match shared.phase {
                Phase::Idle | Phase::Leaving => return Ok(()),
                Phase::Joining | Phase::Joined => shared.phase = Phase::Leaving,
            }
        }
        self.send_command(Command::Leave)
    }

    /// Supply a fresh token.
    ///
    /// If the previous join failed with an expired token, a valid update
    /// triggers an automatic rejoin; otherwise the token is refreshed
    /// silently. A token failing validation produces a warning event.
    pub fn update_token(&self, token: &str) -> Result<(), RoomlinkError> {
        self.send_command(Command::UpdateToken {
            token: token.to_string(),
        })
    }

    /// Toggle local visibility; effective immediately when joined,
    /// otherwise applied at the next join
    pub fn set_visibility(&self, visible: bool) -> Result<(), RoomlinkError> {
        self.send_command(Command::SetVisibility { visible })
    }

    /// Publish a local stream; requires a joined session
    pub fn publish(&self, key: StreamKey, config: PublishConfig) -> Result<(), RoomlinkError> {
        self.require_joined("publish")?;
        self.send_command(Command::Publish { key, config })
    }

    /// Withdraw a local stream; requires a joined session
    pub fn unpublish(&self, key: StreamKey) -> Result<(), RoomlinkError> {
        self.require_joined("unpublish")?;
        self.send_command(Command::Unpublish { key })
    }

    /// Set local mute for a key.
    ///
    /// Valid in any phase; mute state is independent of the publish
    /// lifecycle and survives room exit.
    pub fn set_local_mute(&self, key: StreamKey, muted: bool) -> Result<(), RoomlinkError> {
        self.send_command(Command::MuteLocal { key, muted })
    }

    /// Subscribe to a remote stream; requires a joined session
    pub fn subscribe(&self, user_id: UserId, key: StreamKey) -> Result<(), RoomlinkError> {
        self.require_joined("subscribe")?;
        self.send_command(Command::Subscribe { user_id, key })
    }

    /// Tear down a subscription; requires a joined session
    pub fn unsubscribe(&self, user_id: UserId, key: StreamKey) -> Result<(), RoomlinkError> {
        self.require_joined("unsubscribe")?;
        self.send_command(Command::Unsubscribe { user_id, key })
    }

    /// Set the bandwidth-pressure priority of one remote user
    pub fn set_remote_priority(
        &self,
        user_id: UserId,
        priority: RemoteUserPriority,
    ) -> Result<(), RoomlinkError> {
        self.send_command(Command::SetRemotePriority { user_id, priority })
    }

    /// Feed a downlink bandwidth estimate into the fallback controller
    pub fn report_bandwidth(&self, available_kbps: u32) -> Result<(), RoomlinkError> {
        self.send_command(Command::BandwidthSample { available_kbps })
    }

    /// Broadcast a message to every other room member.
    ///
    /// The payload is validated against the channel cap before an ID is
    /// assigned; the returned ID is matched by exactly one delivery result
    /// event.
    pub fn send_room_message(&self, payload: MessagePayload) -> Result<MessageId, RoomlinkError> {
        self.require_joined("send_room_message")?;
        payload.validate()?;
        let msg_id = self.inner.room_seq.next_id();
        self.inner.tracker.register(msg_id);
        self.inner.shared.write().messages_sent += 1;
        self.send_command(Command::SendRoomMessage { msg_id, payload })?;
        Ok(msg_id)
    }

    /// Send a message to one room member
    pub fn send_user_message(
        &self,
        to: UserId,
        payload: MessagePayload,
    ) -> Result<MessageId, RoomlinkError> {
        self.require_joined("send_user_message")?;
        payload.validate()?;
        let msg_id = self.inner.room_seq.next_id();
        self.inner.tracker.register(msg_id);
        self.inner.shared.write().messages_sent += 1;
        self.send_command(Command::SendUserMessage {
            msg_id,
            to,
            payload,
        })?;
        Ok(msg_id)
    }

    /// Point-in-time view of session, publication, and subscription state
    pub fn snapshot(&self) -> SessionSnapshot {
        let shared = self.inner.shared.read();
        let publication = self.inner.publication.read();
        let published = publication
            .active_keys()
            .into_iter()
            .map(|key| (key, publication.state(key)))
            .collect();
        SessionSnapshot {
            connection_state: shared.connection_state(),
            visible: shared.visible,
            published,
            muted: publication.muted_keys(),
            subscriptions: self.inner.subscriptions.read().snapshot(),
            remote_users: self.inner.registry.read().user_ids(),
        }
    }

    /// Stop the driver task and wait for it to finish.
    ///
    /// A joined session leaves the room first. Must not be called from the
    /// event consumer itself.
    pub async fn destroy(&self) {
        let _ = self.inner.cmd_tx.send(Command::Shutdown);
        let handle = self.inner.driver.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    fn require_joined(&self, operation: &str) -> Result<(), RoomlinkError> {
        if self.inner.shared.read().phase == Phase::Joined {
            Ok(())
        } else {
            Err(RoomlinkError::NotInRoom {
                operation: operation.to_string(),
            })
        }
    }

    fn send_command(&self, command: Command) -> Result<(), RoomlinkError> {
        self.inner
            .cmd_tx
            .send(command)
            .map_err(|_| RoomlinkError::EngineGone {
                reason: "session driver stopped".to_string(),
            })
    }
}

struct Driver {
    inner: Arc<SessionInner>,
    notice_tx: mpsc::UnboundedSender<Notice>,
}

impl Driver {
    async fn run(
        self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut notice_rx: mpsc::UnboundedReceiver<Notice>,
    ) {
        debug!(room = %self.inner.room_id, user = %self.inner.user_id, "session driver started");
        loop {
            let deadline = self.inner.subscriptions.read().next_deadline();
            tokio::select! {
                command = cmd_rx.recv() => {
                    match command {
                        None | Some(Command::Shutdown) => {
                            self.shutdown();
                            break;
                        }
                        Some(command) => self.handle_command(command),
                    }
                }
                Some(notice) = notice_rx.recv() => self.handle_notice(notice),
                _ = Self::sleep_until(deadline) => self.expire_subscriptions(),
            }
        }
    }

    async fn sleep_until(deadline: Option<Instant>) {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }

    fn emit(&self, event: RoomEvent) {
        if !self.inner.events.emit(event) {
            debug!("room event dropped, consumer gone");
        }
    }

    fn handle_command(&self, command: Command) {
        match command {
            Command::Join { token } => {
                let visible = self.inner.shared.read().visible;
                self.inner.switchboard.join(
                    &self.inner.room_id,
                    &self.inner.user_id,
                    &token,
                    visible,
                    self.registration(),
                );
            }
            Command::Leave => {
                self.inner.switchboard.leave(
                    &self.inner.room_id,
                    &self.inner.user_id,
                    self.inner.session_uid,
                    &self.notice_tx,
                );
            }
            Command::UpdateToken { token } => self.on_update_token(&token),
            Command::SetVisibility { visible } => self.on_set_visibility(visible),
            Command::Publish { key, config } => self.on_publish(key, config),
            Command::Unpublish { key } => self.on_unpublish(key),
            Command::MuteLocal { key, muted } => self.on_mute_local(key, muted),
            Command::Subscribe { user_id, key } => self.on_subscribe(&user_id, key),
            Command::Unsubscribe { user_id, key } => self.on_unsubscribe(&user_id, key),
            Command::SetRemotePriority { user_id, priority } => {
                self.inner
                    .fallback
                    .lock()
                    .set_priority(user_id.clone(), priority);
                self.inner.subscriptions.write().set_priority(&user_id, priority);
            }
            Command::BandwidthSample { available_kbps } => {
                let decisions = self
                    .inner
                    .fallback
                    .lock()
                    .on_bandwidth_sample(available_kbps, Instant::now());
                for decision in decisions {
                    self.emit(RoomEvent::SimulcastFallback {
                        user_id: decision.user_id,
                        key: decision.key,
                        tier: decision.tier,
                        direction: decision.direction,
                    });
                }
            }
            Command::SendRoomMessage { msg_id, payload } => {
                self.inner.switchboard.room_broadcast(
                    &self.inner.room_id,
                    &self.inner.user_id,
                    self.inner.session_uid,
                    msg_id,
                    payload,
                    &self.notice_tx,
                );
            }
            Command::SendUserMessage { msg_id, to, payload } => {
                self.inner.switchboard.room_unicast(
                    &self.inner.room_id,
                    &self.inner.user_id,
                    self.inner.session_uid,
                    &to,
                    msg_id,
                    payload,
                    &self.notice_tx,
                );
            }
            Command::Shutdown => {}
        }
    }

    fn registration(&self) -> Registration {
        Registration {
            session_uid: self.inner.session_uid,
            notices: self.notice_tx.clone(),
        }
    }

    fn on_update_token(&self, token: &str) {
        let check = self.inner.switchboard.check_token(token);
        if !check.is_valid() {
            warn!(room = %self.inner.room_id, "token update rejected by validation");
            self.emit(RoomEvent::Warning {
                warning: RoomWarning::TokenUpdateRejected,
            });
            return;
        }
        let rejoin = {
            let mut shared = self.inner.shared.write();
            let pending = shared.token_expired_pending && shared.phase == Phase::Idle;
            shared.token_expired_pending = false;
            if pending {
                shared.phase = Phase::Joining;
                shared.join_started = Some(Instant::now());
            }
            pending
        };
        if rejoin {
            info!(room = %self.inner.room_id, "token refreshed, rejoining");
            let visible = self.inner.shared.read().visible;
            self.inner.switchboard.join(
                &self.inner.room_id,
                &self.inner.user_id,
                token,
                visible,
                self.registration(),
            );
        }
    }

    fn on_set_visibility(&self, visible: bool) {
        let phase = {
            let mut shared = self.inner.shared.write();
            shared.visible = visible;
            shared.phase
        };
        if phase == Phase::Joined {
            self.inner.switchboard.set_visibility(
                &self.inner.room_id,
                &self.inner.user_id,
                self.inner.session_uid,
                visible,
            );
        }
    }

    fn on_publish(&self, key: StreamKey, config: PublishConfig) {
        let (phase, visible) = {
            let shared = self.inner.shared.read();
            (shared.phase, shared.visible)
        };
        if phase != Phase::Joined {
            self.emit(RoomEvent::Warning {
                warning: RoomWarning::OperationWhileNotInRoom {
                    operation: "publish".to_string(),
                },
            });
            return;
        }
        if !visible {
            warn!(%key, "publish ignored while invisible");
            self.emit(RoomEvent::Warning {
                warning: RoomWarning::PublishWhileInvisible { key },
            });
            return;
        }
        let action = self
            .inner
            .publication
            .write()
            .begin_publish(key, config.clone());
        if action == PublishAction::Submit {
            self.emit(RoomEvent::LocalPublishChanged {
                key,
                state: PublishState::Publishing,
            });
            self.inner.switchboard.publish(
                &self.inner.room_id,
                &self.inner.user_id,
                self.inner.session_uid,
                key,
                config.simulcast,
                config.fallback,
                &self.notice_tx,
            );
        }
    }

    fn on_unpublish(&self, key: StreamKey) {
        if self.inner.shared.read().phase != Phase::Joined {
            self.emit(RoomEvent::Warning {
                warning: RoomWarning::OperationWhileNotInRoom {
                    operation: "unpublish".to_string(),
                },
            });
            return;
        }
        let action = self.inner.publication.write().begin_unpublish(key);
        if action == PublishAction::Submit {
            self.emit(RoomEvent::LocalPublishChanged {
                key,
                state: PublishState::Unpublishing,
            });
            self.inner.switchboard.unpublish(
                &self.inner.room_id,
                &self.inner.user_id,
                self.inner.session_uid,
                key,
                &self.notice_tx,
            );
        }
    }

    fn on_mute_local(&self, key: StreamKey, muted: bool) {
        if self.inner.publication.write().set_muted(key, muted) {
            self.inner.switchboard.set_mute(
                &self.inner.room_id,
                &self.inner.user_id,
                self.inner.session_uid,
                key,
                muted,
            );
        }
    }

    fn on_subscribe(&self, user_id: &UserId, key: StreamKey) {
        if self.inner.shared.read().phase != Phase::Joined {
            self.emit(RoomEvent::Warning {
                warning: RoomWarning::OperationWhileNotInRoom {
                    operation: "subscribe".to_string(),
                },
            });
            return;
        }
        let (retired, announced) = {
            let registry = self.inner.registry.read();
            (
                registry.is_retired(user_id, key),
                registry.has_stream(user_id, key),
            )
        };
        if retired {
            warn!(user = %user_id, %key, "subscribe targeted a withdrawn stream");
            self.emit(RoomEvent::Warning {
                warning: RoomWarning::SubscribeUnknownStream {
                    user_id: user_id.clone(),
                    key,
                },
            });
            return;
        }
        let priority = self.inner.fallback.lock().priority(user_id);
        let action = self
            .inner
            .subscriptions
            .write()
            .request(user_id, key, priority, announced);
        match action {
            SubscribeAction::Resolve => self.resolve_subscription(user_id, key),
            SubscribeAction::Defer => {
                debug!(user = %user_id, %key, "subscription deferred until the stream appears")
            }
            SubscribeAction::NoOp => {}
        }
    }

    fn on_unsubscribe(&self, user_id: &UserId, key: StreamKey) {
        let priority = self.inner.fallback.lock().priority(user_id);
        if self.inner.subscriptions.write().remove(user_id, key) {
            self.inner.fallback.lock().untrack(user_id, key);
            self.emit(RoomEvent::StreamSubscribed {
                user_id: user_id.clone(),
                key,
                outcome: SubscribeOutcome::Unsubscribed,
                config: SubscribeConfig { tier: 0, priority },
            });
        }
    }

    fn resolve_subscription(&self, user_id: &UserId, key: StreamKey) {
        let stream = self.inner.registry.read().stream(user_id, key).cloned();
        let Some(stream) = stream else { return };
        let Some(config) = self.inner.subscriptions.write().resolve(user_id, key, 0) else {
            return;
        };
        let publisher_allows = stream.fallback == PublishFallbackOption::AllowVideoFallback
            && key.media == MediaType::Video;
        self.inner.fallback.lock().track(
            user_id.clone(),
            key,
            stream.simulcast,
            publisher_allows,
        );
        self.emit(RoomEvent::StreamSubscribed {
            user_id: user_id.clone(),
            key,
            outcome: SubscribeOutcome::Subscribed,
            config,
        });
    }

    fn auto_subscribe(&self, user_id: &UserId, key: StreamKey) {
        let priority = self.inner.fallback.lock().priority(user_id);
        let action = self
            .inner
            .subscriptions
            .write()
            .request(user_id, key, priority, true);
        if action == SubscribeAction::Resolve {
            self.resolve_subscription(user_id, key);
        }
    }

    fn expire_subscriptions(&self) {
        let lapsed = self.inner.subscriptions.write().expire(Instant::now());
        for (user_id, key) in lapsed {
            warn!(user = %user_id, %key, "subscription window lapsed before the stream appeared");
            self.emit(RoomEvent::StreamSubscribed {
                user_id,
                key,
                outcome: SubscribeOutcome::NotFound,
                config: SubscribeConfig::default(),
            });
        }
    }

    fn handle_notice(&self, notice: Notice) {
        match notice {
            Notice::JoinAccepted { members } => self.on_join_accepted(members),
            Notice::JoinRejected { check } => self.on_join_rejected(check),
            Notice::Evicted => self.on_evicted(),
            Notice::LeaveAck => self.on_leave_ack(),
            Notice::UserJoined { user_id } => {
                let count = {
                    let mut registry = self.inner.registry.write();
                    registry.add_user(user_id.clone());
                    registry.user_count()
                };
                self.note_peak(count);
                self.emit(RoomEvent::UserJoined { user_id });
            }
            Notice::UserLeft { user_id, reason } => self.on_user_left(user_id, reason),
            Notice::StreamPublished {
                user_id,
                key,
                simulcast,
                fallback,
            } => self.on_stream_published(user_id, key, simulcast, fallback),
            Notice::StreamUnpublished {
                user_id,
                key,
                reason,
            } => self.on_stream_unpublished(user_id, key, reason),
            Notice::StreamMuted {
                user_id,
                key,
                muted,
            } => {
                if self
                    .inner
                    .registry
                    .write()
                    .set_stream_muted(&user_id, key, muted)
                {
                    self.emit(RoomEvent::UserMuteStream {
                        user_id,
                        key,
                        muted,
                    });
                }
            }
            Notice::PublishAck { key } => match self.inner.publication.write().confirm_publish(key)
            {
                Ok(()) => self.emit(RoomEvent::LocalPublishChanged {
                    key,
                    state: PublishState::Published,
                }),
                Err(err) => debug!(%key, %err, "dropping stale publish confirmation"),
            },
            Notice::UnpublishAck { key } => {
                self.inner.publication.write().confirm_unpublish(key);
                self.emit(RoomEvent::LocalPublishChanged {
                    key,
                    state: PublishState::Unpublished,
                });
            }
            Notice::RoomMessage { from, payload } => {
                self.inner.shared.write().messages_received += 1;
                match payload {
                    MessagePayload::Text(message) => {
                        self.emit(RoomEvent::RoomMessageReceived { from, message })
                    }
                    MessagePayload::Binary(message) => {
                        self.emit(RoomEvent::RoomBinaryMessageReceived { from, message })
                    }
                }
            }
            Notice::UserMessage { from, payload } => {
                self.inner.shared.write().messages_received += 1;
                match payload {
                    MessagePayload::Text(message) => {
                        self.emit(RoomEvent::UserMessageReceived { from, message })
                    }
                    MessagePayload::Binary(message) => {
                        self.emit(RoomEvent::UserBinaryMessageReceived { from, message })
                    }
                }
            }
            Notice::MessageResult {
                msg_id,
                scope,
                error,
            } => {
                if self.inner.tracker.resolve(msg_id) {
                    match scope {
                        MessageScope::Room => {
                            self.emit(RoomEvent::RoomMessageSendResult { msg_id, error })
                        }
                        MessageScope::User => {
                            self.emit(RoomEvent::UserMessageSendResult { msg_id, error })
                        }
                    }
                }
            }
        }
    }

    fn on_join_accepted(&self, members: Vec<MemberSnapshot>) {
        let (join_kind, elapsed_ms) = {
            let mut shared = self.inner.shared.write();
            if shared.phase != Phase::Joining {
                // Left or evicted while the confirmation was in flight.
                return;
            }
            shared.phase = Phase::Joined;
            shared.joined_at = Some(Instant::now());
            shared.messages_sent = 0;
            shared.messages_received = 0;
            shared.peak_remote_users = 0;
            let kind = if shared.has_joined_before {
                JoinKind::Rejoin
            } else {
                JoinKind::First
            };
            shared.has_joined_before = true;
            let elapsed = shared
                .join_started
                .take()
                .map(|started| started.elapsed().as_millis() as u64)
                .unwrap_or(0);
            (kind, elapsed)
        };
        info!(room = %self.inner.room_id, user = %self.inner.user_id, ?join_kind, "joined room");
        let extra_info = RoomStateInfo {
            join_kind,
            elapsed_ms,
        }
        .to_extra_info();
        self.emit(RoomEvent::StateChanged {
            room_id: self.inner.room_id.clone(),
            user_id: self.inner.user_id.clone(),
            state: ConnectionState::Connected,
            code: codes::OK,
            extra_info,
        });

        let auto = self.inner.subscriptions.read().mode() == SubscribeMode::Automatic;
        for member in members {
            self.inner.registry.write().add_user(member.user_id.clone());
            self.emit(RoomEvent::UserJoined {
                user_id: member.user_id.clone(),
            });
            for stream in member.published {
                self.inner.registry.write().add_stream(
                    &member.user_id,
                    stream.key,
                    stream.simulcast,
                    stream.fallback,
                );
                self.emit(RoomEvent::UserPublishStream {
                    user_id: member.user_id.clone(),
                    key: stream.key,
                });
                if stream.muted {
                    self.inner.registry.write().set_stream_muted(
                        &member.user_id,
                        stream.key,
                        true,
                    );
                    self.emit(RoomEvent::UserMuteStream {
                        user_id: member.user_id.clone(),
                        key: stream.key,
                        muted: true,
                    });
                }
                if auto {
                    self.auto_subscribe(&member.user_id, stream.key);
                }
            }
        }
        let count = self.inner.registry.read().user_count();
        self.note_peak(count);
    }

    fn on_join_rejected(&self, check: TokenCheck) {
        {
            let mut shared = self.inner.shared.write();
            if shared.phase != Phase::Joining {
                return;
            }
            shared.phase = Phase::Idle;
            shared.join_started = None;
            if check == TokenCheck::Expired {
                shared.token_expired_pending = true;
            }
        }
        warn!(room = %self.inner.room_id, code = check.join_code(), "join rejected");
        self.emit(RoomEvent::StateChanged {
            room_id: self.inner.room_id.clone(),
            user_id: self.inner.user_id.clone(),
            state: ConnectionState::Failed,
            code: check.join_code(),
            extra_info: String::new(),
        });
        if check == TokenCheck::Expired {
            self.emit(RoomEvent::Error {
                fault: RoomFault::TokenExpired,
            });
        }
    }

    fn on_evicted(&self) {
        {
            let mut shared = self.inner.shared.write();
            if !matches!(shared.phase, Phase::Joining | Phase::Joined) {
                // A concurrent leave wins; LeaveAck finishes the teardown.
                return;
            }
            shared.phase = Phase::Idle;
            shared.join_started = None;
            shared.joined_at = None;
        }
        self.clear_room_state();
        warn!(room = %self.inner.room_id, user = %self.inner.user_id, "evicted by duplicate login");
        self.emit(RoomEvent::StateChanged {
            room_id: self.inner.room_id.clone(),
            user_id: self.inner.user_id.clone(),
            state: ConnectionState::Disconnected,
            code: codes::DUPLICATE_LOGIN,
            extra_info: String::new(),
        });
        self.emit(RoomEvent::Error {
            fault: RoomFault::DuplicateLogin {
                user_id: self.inner.user_id.clone(),
            },
        });
    }

    fn on_leave_ack(&self) {
        let stats = {
            let mut shared = self.inner.shared.write();
            if shared.phase != Phase::Leaving {
                return;
            }
            shared.phase = Phase::Idle;
            shared.join_started = None;
            let duration_ms = shared
                .joined_at
                .take()
                .map(|joined| joined.elapsed().as_millis() as u64)
                .unwrap_or(0);
            RoomStats {
                duration_ms,
                messages_sent: shared.messages_sent,
                messages_received: shared.messages_received,
                peak_remote_users: shared.peak_remote_users,
            }
        };
        self.clear_room_state();
        info!(room = %self.inner.room_id, user = %self.inner.user_id, "left room");
        self.emit(RoomEvent::StateChanged {
            room_id: self.inner.room_id.clone(),
            user_id: self.inner.user_id.clone(),
            state: ConnectionState::Disconnected,
            code: codes::OK,
            extra_info: String::new(),
        });
        self.emit(RoomEvent::LeftRoom { stats });
    }

    fn on_user_left(&self, user_id: UserId, reason: UserLeaveReason) {
        // Stream removals normally precede the departure; sweep leftovers.
        let leftover = self.inner.registry.write().remove_user(&user_id);
        for key in leftover {
            self.emit(RoomEvent::UserUnpublishStream {
                user_id: user_id.clone(),
                key,
                reason: StreamRemoveReason::PublisherLeft,
            });
            if self.inner.subscriptions.write().remove(&user_id, key) {
                self.emit(RoomEvent::StreamSubscribed {
                    user_id: user_id.clone(),
                    key,
                    outcome: SubscribeOutcome::Unsubscribed,
                    config: SubscribeConfig::default(),
                });
            }
        }
        self.inner.fallback.lock().forget_user(&user_id);
        self.emit(RoomEvent::UserLeft { user_id, reason });
    }

    fn on_stream_published(
        &self,
        user_id: UserId,
        key: StreamKey,
        simulcast: Vec<SimulcastProfile>,
        fallback: PublishFallbackOption,
    ) {
        {
            let mut registry = self.inner.registry.write();
            registry.add_user(user_id.clone());
            registry.add_stream(&user_id, key, simulcast, fallback);
        }
        self.emit(RoomEvent::UserPublishStream {
            user_id: user_id.clone(),
            key,
        });
        if self.inner.subscriptions.read().mode() == SubscribeMode::Automatic {
            self.auto_subscribe(&user_id, key);
        } else if self.inner.subscriptions.read().is_pending(&user_id, key) {
            // A deferred manual subscribe was waiting on this announcement.
            self.resolve_subscription(&user_id, key);
        }
    }

    fn on_stream_unpublished(&self, user_id: UserId, key: StreamKey, reason: StreamRemoveReason) {
        let explicit = reason == StreamRemoveReason::ExplicitUnpublish;
        if !self.inner.registry.write().remove_stream(&user_id, key, explicit) {
            return;
        }
        self.emit(RoomEvent::UserUnpublishStream {
            user_id: user_id.clone(),
            key,
            reason,
        });
        if self.inner.subscriptions.write().remove(&user_id, key) {
            let priority = self.inner.fallback.lock().priority(&user_id);
            self.inner.fallback.lock().untrack(&user_id, key);
            self.emit(RoomEvent::StreamSubscribed {
                user_id,
                key,
                outcome: SubscribeOutcome::Unsubscribed,
                config: SubscribeConfig { tier: 0, priority },
            });
        }
    }

    fn note_peak(&self, count: usize) {
        let mut shared = self.inner.shared.write();
        if count > shared.peak_remote_users {
            shared.peak_remote_users = count;
        }
    }

    fn clear_room_state(&self) {
        self.inner.publication.write().reset_publishes();
        self.inner.subscriptions.write().clear();
        self.inner.registry.write().clear();
        self.inner.fallback.lock().clear();
    }

    fn shutdown(&self) {
        let phase = self.inner.shared.read().phase;
        if phase != Phase::Idle {
            self.inner.switchboard.leave(
                &self.inner.room_id,
                &self.inner.user_id,
                self.inner.session_uid,
                &self.notice_tx,
            );
        }
        self.inner.shared.write().phase = Phase::Idle;
        self.clear_room_state();
        debug!(room = %self.inner.room_id, user = %self.inner.user_id, "session driver stopped");
    }
}
