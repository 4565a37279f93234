//! In-process room directory and notice router.
//!
//! The switchboard plays the server role for every session in the process:
//! it admits joins, evicts duplicate logins, tracks who publishes what, and
//! fans notices out to member queues. All mutation happens synchronously
//! under the per-room map entry, so every member observes events for a given
//! room in a single authoritative order.

use crate::protocol::{
    DirectNotice, DirectScope, MemberSnapshot, MessageScope, Notice, PublishedStream,
    ServerMessage,
};
use crate::token::{accept_non_empty, TokenValidator};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use roomlink_core::{
    MessageDeliveryError, MessageId, PublishFallbackOption, RoomId, SimulcastProfile, StreamKey,
    StreamRemoveReason, UserId, UserLeaveReason,
};
use roomlink_messaging::MessagePayload;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Handle a session presents when joining a room.
///
/// The `session_uid` distinguishes two sessions of the same user so that a
/// stale session evicted by a duplicate login cannot mutate room state
/// afterwards.
#[derive(Debug, Clone)]
pub struct Registration {
    /// Unique per session object, not per user
    pub session_uid: Uuid,
    /// Queue the switchboard pushes notices into
    pub notices: mpsc::UnboundedSender<Notice>,
}

#[derive(Debug)]
struct Member {
    session_uid: Uuid,
    notices: mpsc::UnboundedSender<Notice>,
    visible: bool,
    published: HashMap<StreamKey, StreamOffer>,
    muted: HashSet<StreamKey>,
}

#[derive(Debug, Clone)]
struct StreamOffer {
    simulcast: Vec<SimulcastProfile>,
    fallback: PublishFallbackOption,
}

impl Member {
    fn snapshot(&self, user_id: &UserId) -> MemberSnapshot {
        let mut published: Vec<PublishedStream> = self
            .published
            .iter()
            .map(|(key, offer)| PublishedStream {
                key: *key,
                simulcast: offer.simulcast.clone(),
                fallback: offer.fallback,
                muted: self.muted.contains(key),
            })
            .collect();
        published.sort_by_key(|stream| (stream.key.kind as u8, stream.key.media as u8));
        MemberSnapshot {
            user_id: user_id.clone(),
            published,
        }
    }
}

#[derive(Debug)]
struct RoomEntry {
    created_at: DateTime<Utc>,
    members: HashMap<UserId, Member>,
}

#[derive(Debug)]
struct DirectMember {
    notices: mpsc::UnboundedSender<DirectNotice>,
}

/// In-process signaling hub shared by every session of one engine
pub struct Switchboard {
    rooms: DashMap<RoomId, RoomEntry>,
    direct: DashMap<UserId, DirectMember>,
    server_inbox: RwLock<Option<mpsc::UnboundedSender<ServerMessage>>>,
    validator: TokenValidator,
}

impl std::fmt::Debug for Switchboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Switchboard")
            .field("rooms", &self.rooms.len())
            .field("direct", &self.direct.len())
            .finish()
    }
}

impl Default for Switchboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Switchboard {
    /// Create a switchboard that accepts any non-empty token
    pub fn new() -> Self {
        Self::with_validator(accept_non_empty())
    }

    /// Create a switchboard with a custom token validator
    pub fn with_validator(validator: TokenValidator) -> Self {
        Self {
            rooms: DashMap::new(),
            direct: DashMap::new(),
            server_inbox: RwLock::new(None),
            validator,
        }
    }

    /// Run the injected validator against a token
    pub fn check_token(&self, token: &str) -> crate::token::TokenCheck {
        (self.validator)(token)
    }

    /// Admit a session into a room.
    ///
    /// A second join under the same user ID evicts the earlier session
    /// before the new one is admitted. The outcome is always delivered
    /// through the registration's notice queue, never returned.
    pub fn join(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        token: &str,
        visible: bool,
        registration: Registration,
    ) {
        let check = (self.validator)(token);
        if !check.is_valid() {
            debug!(%room_id, %user_id, ?check, "join rejected by token check");
            let _ = registration.notices.send(Notice::JoinRejected { check });
            return;
        }

        let mut entry = self.rooms.entry(room_id.clone()).or_insert_with(|| {
            info!(%room_id, "room created");
            RoomEntry {
                created_at: Utc::now(),
                members: HashMap::new(),
            }
        });
        let room = entry.value_mut();

        if let Some(old) = room.members.remove(user_id) {
            warn!(%room_id, %user_id, "duplicate login, evicting earlier session");
            Self::broadcast_departure(room, user_id, &old, UserLeaveReason::Evicted);
            let _ = old.notices.send(Notice::Evicted);
        }

        let members: Vec<MemberSnapshot> = room
            .members
            .iter()
            .filter(|(_, member)| member.visible)
            .map(|(uid, member)| member.snapshot(uid))
            .collect();

        room.members.insert(
            user_id.clone(),
            Member {
                session_uid: registration.session_uid,
                notices: registration.notices.clone(),
                visible,
                published: HashMap::new(),
                muted: HashSet::new(),
            },
        );
        if visible {
            Self::fan_out(
                room,
                user_id,
                Notice::UserJoined {
                    user_id: user_id.clone(),
                },
            );
        }
        info!(%room_id, %user_id, visible, age = ?(Utc::now() - room.created_at), "member joined");
        let _ = registration.notices.send(Notice::JoinAccepted { members });
    }

    /// Remove a session from a room.
    ///
    /// Always acknowledges on `reply`, even when the session is no longer a
    /// member (it may have been evicted between its leave call and this
    /// point), so client teardown can complete unconditionally.
    pub fn leave(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        session_uid: Uuid,
        reply: &mpsc::UnboundedSender<Notice>,
    ) {
        if let Some(mut entry) = self.rooms.get_mut(room_id) {
            let room = entry.value_mut();
            let is_current = room
                .members
                .get(user_id)
                .is_some_and(|member| member.session_uid == session_uid);
            if is_current {
                if let Some(member) = room.members.remove(user_id) {
                    Self::broadcast_departure(room, user_id, &member, UserLeaveReason::Quit);
                    info!(%room_id, %user_id, "member left");
                }
            }
        }
        self.rooms
            .remove_if(room_id, |_, entry| entry.members.is_empty());
        let _ = reply.send(Notice::LeaveAck);
    }

    /// Flip a member between visible and invisible.
    ///
    /// Going invisible revokes publish permission: every stream the member
    /// publishes is force-unpublished first, then the member disappears from
    /// others' view.
    pub fn set_visibility(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        session_uid: Uuid,
        visible: bool,
    ) {
        let Some(mut entry) = self.rooms.get_mut(room_id) else {
            return;
        };
        let room = entry.value_mut();
        let Some(member) = room.members.get(user_id) else {
            return;
        };
        if member.session_uid != session_uid || member.visible == visible {
            return;
        }

        if visible {
            if let Some(member) = room.members.get_mut(user_id) {
                member.visible = true;
            }
            Self::fan_out(
                room,
                user_id,
                Notice::UserJoined {
                    user_id: user_id.clone(),
                },
            );
        } else {
            let (keys, own_queue) = match room.members.get_mut(user_id) {
                Some(member) => {
                    member.visible = false;
                    let keys: Vec<StreamKey> = member.published.keys().copied().collect();
                    member.published.clear();
                    (keys, member.notices.clone())
                }
                None => return,
            };
            for key in keys {
                Self::fan_out(
                    room,
                    user_id,
                    Notice::StreamUnpublished {
                        user_id: user_id.clone(),
                        key,
                        reason: StreamRemoveReason::PublisherInvisible,
                    },
                );
                let _ = own_queue.send(Notice::UnpublishAck { key });
            }
            Self::fan_out(
                room,
                user_id,
                Notice::UserLeft {
                    user_id: user_id.clone(),
                    reason: UserLeaveReason::BecameInvisible,
                },
            );
        }
        debug!(%room_id, %user_id, visible, "visibility changed");
    }

    /// Record a publish and announce it to the room.
    ///
    /// If the publisher had previously muted this key, the mute state is
    /// re-announced right after the publish so late state converges.
    pub fn publish(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        session_uid: Uuid,
        key: StreamKey,
        simulcast: Vec<SimulcastProfile>,
        fallback: PublishFallbackOption,
        reply: &mpsc::UnboundedSender<Notice>,
    ) {
        let Some(mut entry) = self.rooms.get_mut(room_id) else {
            return;
        };
        let room = entry.value_mut();
        let muted = match room.members.get_mut(user_id) {
            Some(member) if member.session_uid == session_uid => {
                member.published.insert(
                    key,
                    StreamOffer {
                        simulcast: simulcast.clone(),
                        fallback,
                    },
                );
                member.muted.contains(&key)
            }
            _ => return,
        };
        Self::fan_out(
            room,
            user_id,
            Notice::StreamPublished {
                user_id: user_id.clone(),
                key,
                simulcast,
                fallback,
            },
        );
        if muted {
            Self::fan_out(
                room,
                user_id,
                Notice::StreamMuted {
                    user_id: user_id.clone(),
                    key,
                    muted: true,
                },
            );
        }
        debug!(%room_id, %user_id, %key, "stream published");
        let _ = reply.send(Notice::PublishAck { key });
    }

    /// Withdraw a published stream and announce the removal
    pub fn unpublish(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        session_uid: Uuid,
        key: StreamKey,
        reply: &mpsc::UnboundedSender<Notice>,
    ) {
        let Some(mut entry) = self.rooms.get_mut(room_id) else {
            return;
        };
        let room = entry.value_mut();
        let was_published = match room.members.get_mut(user_id) {
            Some(member) if member.session_uid == session_uid => {
                member.published.remove(&key).is_some()
            }
            _ => return,
        };
        if was_published {
            Self::fan_out(
                room,
                user_id,
                Notice::StreamUnpublished {
                    user_id: user_id.clone(),
                    key,
                    reason: StreamRemoveReason::ExplicitUnpublish,
                },
            );
            debug!(%room_id, %user_id, %key, "stream unpublished");
        }
        let _ = reply.send(Notice::UnpublishAck { key });
    }

    /// Record mute state for a key; relayed only while the key is published
    pub fn set_mute(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        session_uid: Uuid,
        key: StreamKey,
        muted: bool,
    ) {
        let Some(mut entry) = self.rooms.get_mut(room_id) else {
            return;
        };
        let room = entry.value_mut();
        let announce = match room.members.get_mut(user_id) {
            Some(member) if member.session_uid == session_uid => {
                if muted {
                    member.muted.insert(key);
                } else {
                    member.muted.remove(&key);
                }
                member.published.contains_key(&key)
            }
            _ => return,
        };
        if announce {
            Self::fan_out(
                room,
                user_id,
                Notice::StreamMuted {
                    user_id: user_id.clone(),
                    key,
                    muted,
                },
            );
        }
    }

    /// Broadcast a message to every other room member
    pub fn room_broadcast(
        &self,
        room_id: &RoomId,
        from: &UserId,
        session_uid: Uuid,
        msg_id: MessageId,
        payload: MessagePayload,
        reply: &mpsc::UnboundedSender<Notice>,
    ) {
        let result = self.deliver_room(room_id, from, session_uid, None, payload);
        let _ = reply.send(Notice::MessageResult {
            msg_id,
            scope: MessageScope::Room,
            error: result.err(),
        });
    }

    /// Deliver a message to one room member
    pub fn room_unicast(
        &self,
        room_id: &RoomId,
        from: &UserId,
        session_uid: Uuid,
        to: &UserId,
        msg_id: MessageId,
        payload: MessagePayload,
        reply: &mpsc::UnboundedSender<Notice>,
    ) {
        let result = self.deliver_room(room_id, from, session_uid, Some(to), payload);
        let _ = reply.send(Notice::MessageResult {
            msg_id,
            scope: MessageScope::User,
            error: result.err(),
        });
    }

    fn deliver_room(
        &self,
        room_id: &RoomId,
        from: &UserId,
        session_uid: Uuid,
        to: Option<&UserId>,
        payload: MessagePayload,
    ) -> Result<(), MessageDeliveryError> {
        let Some(entry) = self.rooms.get(room_id) else {
            return Err(MessageDeliveryError::ConnectionLost);
        };
        let room = entry.value();
        let sender_is_current = room
            .members
            .get(from)
            .is_some_and(|member| member.session_uid == session_uid);
        if !sender_is_current {
            return Err(MessageDeliveryError::ConnectionLost);
        }
        match to {
            Some(target) => {
                let Some(member) = room.members.get(target) else {
                    return Err(MessageDeliveryError::UnknownTarget);
                };
                let _ = member.notices.send(Notice::UserMessage {
                    from: from.clone(),
                    payload,
                });
                Ok(())
            }
            None => {
                for (uid, member) in &room.members {
                    if uid == from {
                        continue;
                    }
                    let _ = member.notices.send(Notice::RoomMessage {
                        from: from.clone(),
                        payload: payload.clone(),
                    });
                }
                Ok(())
            }
        }
    }

    /// Register an out-of-room connection.
    ///
    /// The login result is pushed onto the new connection's queue. A second
    /// login under the same user ID replaces the earlier connection.
    pub fn login(&self, user_id: &UserId, token: &str, notices: mpsc::UnboundedSender<DirectNotice>) {
        let check = (self.validator)(token);
        let _ = notices.send(DirectNotice::LoginResult {
            user_id: user_id.clone(),
            code: check.login_code(),
        });
        if check.is_valid() {
            info!(%user_id, "user logged in");
            self.direct
                .insert(user_id.clone(), DirectMember { notices });
        }
    }

    /// Drop an out-of-room connection
    pub fn logout(&self, user_id: &UserId) {
        if self.direct.remove(user_id).is_some() {
            info!(%user_id, "user logged out");
        }
    }

    /// Route an out-of-room message between two logged-in users
    pub fn direct_message(
        &self,
        from: &UserId,
        to: &UserId,
        msg_id: MessageId,
        payload: MessagePayload,
    ) {
        let error = match self.direct.get(to) {
            Some(member) => {
                let _ = member.notices.send(DirectNotice::Message {
                    from: from.clone(),
                    payload,
                });
                None
            }
            None => Some(MessageDeliveryError::UnknownTarget),
        };
        self.direct_result(from, msg_id, DirectScope::Peer, error);
    }

    /// Route an out-of-room message to the attached application server
    pub fn server_message(&self, from: &UserId, msg_id: MessageId, payload: MessagePayload) {
        let error = match self.server_inbox.read().as_ref() {
            Some(inbox) => {
                if inbox
                    .send(ServerMessage {
                        from: from.clone(),
                        msg_id,
                        payload,
                    })
                    .is_ok()
                {
                    None
                } else {
                    Some(MessageDeliveryError::ServerUnavailable)
                }
            }
            None => Some(MessageDeliveryError::ServerUnavailable),
        };
        self.direct_result(from, msg_id, DirectScope::Server, error);
    }

    fn direct_result(
        &self,
        user_id: &UserId,
        msg_id: MessageId,
        scope: DirectScope,
        error: Option<MessageDeliveryError>,
    ) {
        if let Some(member) = self.direct.get(user_id) {
            let _ = member.notices.send(DirectNotice::MessageResult {
                msg_id,
                scope,
                error,
            });
        }
    }

    /// Attach the application-server inbox; messages sent to the server
    /// scope arrive on the returned receiver. A second attach replaces the
    /// first.
    pub fn attach_server(&self) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.server_inbox.write() = Some(tx);
        rx
    }

    /// Number of members currently in a room (zero if it does not exist)
    pub fn member_count(&self, room_id: &RoomId) -> usize {
        self.rooms
            .get(room_id)
            .map(|entry| entry.members.len())
            .unwrap_or(0)
    }

    /// Streams removed first, then the presence change, so observers never
    /// see a stream from an absent user.
    fn broadcast_departure(
        room: &mut RoomEntry,
        user_id: &UserId,
        member: &Member,
        reason: UserLeaveReason,
    ) {
        for key in member.published.keys() {
            Self::fan_out(
                room,
                user_id,
                Notice::StreamUnpublished {
                    user_id: user_id.clone(),
                    key: *key,
                    reason: StreamRemoveReason::PublisherLeft,
                },
            );
        }
        if member.visible {
            Self::fan_out(
                room,
                user_id,
                Notice::UserLeft {
                    user_id: user_id.clone(),
                    reason,
                },
            );
        }
    }

    fn fan_out(room: &RoomEntry, except: &UserId, notice: Notice) {
        for (uid, member) in &room.members {
            if uid == except {
                continue;
            }
            let _ = member.notices.send(notice.clone());
        }
    }
}

/// Shared switchboard handle
pub type SharedSwitchboard = Arc<Switchboard>;
