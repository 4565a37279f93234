//! Tagged-union room and engine events.
//!
//! The original binding surface exposed wide delegate protocols with dozens
//! of optional callbacks; here every notification is one variant of
//! [`RoomEvent`] or [`EngineEvent`] delivered through a single serial
//! dispatch queue.

use crate::error::{MessageDeliveryError, RoomFault, RoomWarning};
use crate::ids::{MessageId, RoomId, UserId};
use crate::media::{PublishState, StreamKey, SubscribeConfig};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Connection state of a room session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected to any room
    #[default]
    Disconnected,
    /// First join attempt in flight
    Connecting,
    /// Joined and operational
    Connected,
    /// Re-join attempt in flight after a prior connection
    Reconnecting,
    /// Last join attempt failed
    Failed,
}

/// Whether a connected state was entered for the first time or re-entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    /// First successful join of this session
    First,
    /// Re-entry after a previous successful join
    Rejoin,
}

/// Structured payload of the `extra_info` field of a state-changed event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomStateInfo {
    /// First join or rejoin
    pub join_kind: JoinKind,
    /// Milliseconds between the join call and the confirmation
    pub elapsed_ms: u64,
}

impl RoomStateInfo {
    /// Serialize to the JSON string carried in the notification
    pub fn to_extra_info(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse back from an `extra_info` string
    pub fn from_extra_info(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

/// Session statistics reported when the room is left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoomStats {
    /// Time spent joined, in milliseconds
    pub duration_ms: u64,
    /// Messages submitted on the in-room channel
    pub messages_sent: u64,
    /// In-room messages received
    pub messages_received: u64,
    /// Largest number of simultaneously observed remote users
    pub peak_remote_users: usize,
}

/// Why a remote user disappeared from the local view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserLeaveReason {
    /// The user left the room
    Quit,
    /// The user toggled to invisible; room membership did not change
    BecameInvisible,
    /// The user was evicted by a duplicate login
    Evicted,
}

/// Why a remote stream stopped being available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamRemoveReason {
    /// The publisher called unpublish
    ExplicitUnpublish,
    /// The publisher left the room (or was evicted)
    PublisherLeft,
    /// The publisher became invisible and lost publish permission
    PublisherInvisible,
}

/// Terminal outcome reported in a stream-subscribed notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscribeOutcome {
    /// Subscription is active
    Subscribed,
    /// Subscription was torn down (explicitly or by remote unpublish)
    Unsubscribed,
    /// The requested stream never appeared within the resolution window
    NotFound,
}

/// Direction of a simulcast tier change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackDirection {
    /// Tier lowered because bandwidth degraded
    Downgrade,
    /// Tier restored after bandwidth recovered
    Restore,
}

/// Room events delivered serially on the session's event stream
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// Authoritative confirmation of a connection state transition
    StateChanged {
        /// Room the session belongs to
        room_id: RoomId,
        /// Local user
        user_id: UserId,
        /// New connection state
        state: ConnectionState,
        /// Numeric status; 0 means success
        code: i32,
        /// JSON document with join kind and elapsed milliseconds (empty on
        /// failures)
        extra_info: String,
    },
    /// Teardown completed after a leave call
    LeftRoom {
        /// Session statistics
        stats: RoomStats,
    },
    /// A visible remote user appeared
    UserJoined {
        /// The user that appeared
        user_id: UserId,
    },
    /// A remote user disappeared
    UserLeft {
        /// The user that disappeared
        user_id: UserId,
        /// Why the user disappeared
        reason: UserLeaveReason,
    },
    /// A remote user published a stream
    UserPublishStream {
        /// Publishing user
        user_id: UserId,
        /// Published stream
        key: StreamKey,
    },
    /// A remote stream stopped being available
    UserUnpublishStream {
        /// Publishing user
        user_id: UserId,
        /// Removed stream
        key: StreamKey,
        /// Why the stream was removed
        reason: StreamRemoveReason,
    },
    /// A remote user toggled transmission on an already-published stream
    UserMuteStream {
        /// Publishing user
        user_id: UserId,
        /// Affected stream
        key: StreamKey,
        /// Whether transmission is now suppressed
        muted: bool,
    },
    /// Local publish state machine transition
    LocalPublishChanged {
        /// Affected stream
        key: StreamKey,
        /// New publish state
        state: PublishState,
    },
    /// Terminal result of a subscription transition
    StreamSubscribed {
        /// Remote publisher
        user_id: UserId,
        /// Subscribed stream
        key: StreamKey,
        /// Terminal outcome
        outcome: SubscribeOutcome,
        /// Effective negotiated configuration
        config: SubscribeConfig,
    },
    /// A subscribed stream changed simulcast tier under bandwidth pressure
    SimulcastFallback {
        /// Remote publisher
        user_id: UserId,
        /// Affected stream
        key: StreamKey,
        /// New tier index (0 = highest)
        tier: usize,
        /// Downgrade or restore
        direction: FallbackDirection,
    },
    /// Broadcast text message received from a room member
    RoomMessageReceived {
        /// Sending user
        from: UserId,
        /// Message body
        message: String,
    },
    /// Broadcast binary message received from a room member
    RoomBinaryMessageReceived {
        /// Sending user
        from: UserId,
        /// Message body
        message: Bytes,
    },
    /// Unicast text message received from a room member
    UserMessageReceived {
        /// Sending user
        from: UserId,
        /// Message body
        message: String,
    },
    /// Unicast binary message received from a room member
    UserBinaryMessageReceived {
        /// Sending user
        from: UserId,
        /// Message body
        message: Bytes,
    },
    /// Delivery result for a broadcast message, at most one per message ID
    RoomMessageSendResult {
        /// ID returned by the send call
        msg_id: MessageId,
        /// `None` on success
        error: Option<MessageDeliveryError>,
    },
    /// Delivery result for a unicast message, at most one per message ID
    UserMessageSendResult {
        /// ID returned by the send call
        msg_id: MessageId,
        /// `None` on success
        error: Option<MessageDeliveryError>,
    },
    /// Transient condition; no caller action required
    Warning {
        /// The warning
        warning: RoomWarning,
    },
    /// Non-recoverable condition; caller action required
    Error {
        /// The fault
        fault: RoomFault,
    },
}

impl RoomEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            RoomEvent::StateChanged { .. } => "state_changed",
            RoomEvent::LeftRoom { .. } => "left_room",
            RoomEvent::UserJoined { .. } => "user_joined",
            RoomEvent::UserLeft { .. } => "user_left",
            RoomEvent::UserPublishStream { .. } => "user_publish_stream",
            RoomEvent::UserUnpublishStream { .. } => "user_unpublish_stream",
            RoomEvent::UserMuteStream { .. } => "user_mute_stream",
            RoomEvent::LocalPublishChanged { .. } => "local_publish_changed",
            RoomEvent::StreamSubscribed { .. } => "stream_subscribed",
            RoomEvent::SimulcastFallback { .. } => "simulcast_fallback",
            RoomEvent::RoomMessageReceived { .. } => "room_message_received",
            RoomEvent::RoomBinaryMessageReceived { .. } => "room_binary_message_received",
            RoomEvent::UserMessageReceived { .. } => "user_message_received",
            RoomEvent::UserBinaryMessageReceived { .. } => "user_binary_message_received",
            RoomEvent::RoomMessageSendResult { .. } => "room_message_send_result",
            RoomEvent::UserMessageSendResult { .. } => "user_message_send_result",
            RoomEvent::Warning { .. } => "warning",
            RoomEvent::Error { .. } => "error",
        }
    }

    /// Check if this is a presence event (users appearing or disappearing)
    pub fn is_presence_event(&self) -> bool {
        matches!(
            self,
            RoomEvent::UserJoined { .. } | RoomEvent::UserLeft { .. }
        )
    }

    /// Check if this is a stream lifecycle event
    pub fn is_stream_event(&self) -> bool {
        matches!(
            self,
            RoomEvent::UserPublishStream { .. }
                | RoomEvent::UserUnpublishStream { .. }
                | RoomEvent::UserMuteStream { .. }
                | RoomEvent::LocalPublishChanged { .. }
                | RoomEvent::StreamSubscribed { .. }
                | RoomEvent::SimulcastFallback { .. }
        )
    }

    /// Check if this is a messaging event
    pub fn is_message_event(&self) -> bool {
        matches!(
            self,
            RoomEvent::RoomMessageReceived { .. }
                | RoomEvent::RoomBinaryMessageReceived { .. }
                | RoomEvent::UserMessageReceived { .. }
                | RoomEvent::UserBinaryMessageReceived { .. }
                | RoomEvent::RoomMessageSendResult { .. }
                | RoomEvent::UserMessageSendResult { .. }
        )
    }

    /// Check if this is a connection event
    pub fn is_connection_event(&self) -> bool {
        matches!(
            self,
            RoomEvent::StateChanged { .. } | RoomEvent::LeftRoom { .. }
        )
    }

    /// Check if this is an error or warning event
    pub fn is_fault_event(&self) -> bool {
        matches!(self, RoomEvent::Warning { .. } | RoomEvent::Error { .. })
    }
}

/// Engine-level events for the out-of-room messaging channel
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Result of a login call; 0 means logged in
    LoginResult {
        /// User the login was issued for
        user_id: UserId,
        /// Numeric status; 0 means success
        code: i32,
    },
    /// Out-of-room text message received
    UserMessageReceived {
        /// Sending user
        from: UserId,
        /// Message body
        message: String,
    },
    /// Out-of-room binary message received
    UserBinaryMessageReceived {
        /// Sending user
        from: UserId,
        /// Message body
        message: Bytes,
    },
    /// Delivery result for an out-of-room peer message
    UserMessageSendResult {
        /// ID returned by the send call
        msg_id: MessageId,
        /// `None` on success
        error: Option<MessageDeliveryError>,
    },
    /// Delivery result for a message to the application server
    ServerMessageSendResult {
        /// ID returned by the send call
        msg_id: MessageId,
        /// `None` on success
        error: Option<MessageDeliveryError>,
    },
}

impl EngineEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            EngineEvent::LoginResult { .. } => "login_result",
            EngineEvent::UserMessageReceived { .. } => "user_message_received",
            EngineEvent::UserBinaryMessageReceived { .. } => "user_binary_message_received",
            EngineEvent::UserMessageSendResult { .. } => "user_message_send_result",
            EngineEvent::ServerMessageSendResult { .. } => "server_message_send_result",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extra_info_roundtrip() {
        let info = RoomStateInfo {
            join_kind: JoinKind::Rejoin,
            elapsed_ms: 42,
        };
        let raw = info.to_extra_info();
        assert!(raw.contains("rejoin"));
        let parsed = RoomStateInfo::from_extra_info(&raw).unwrap();
        assert_eq!(parsed, info);
    }

    #[test]
    fn test_event_classification() {
        let joined = RoomEvent::UserJoined {
            user_id: UserId::new("alice").unwrap(),
        };
        assert!(joined.is_presence_event());
        assert!(!joined.is_stream_event());
        assert_eq!(joined.event_type(), "user_joined");

        let published = RoomEvent::UserPublishStream {
            user_id: UserId::new("alice").unwrap(),
            key: StreamKey::main(crate::media::MediaType::Audio),
        };
        assert!(published.is_stream_event());
        assert!(!published.is_presence_event());

        let result = RoomEvent::RoomMessageSendResult {
            msg_id: 1,
            error: None,
        };
        assert!(result.is_message_event());
        assert!(!result.is_connection_event());

        let fault = RoomEvent::Error {
            fault: RoomFault::TokenExpired,
        };
        assert!(fault.is_fault_event());
    }
}
