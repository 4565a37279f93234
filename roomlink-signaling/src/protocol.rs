//! Notices exchanged between the switchboard and client sessions.
//!
//! Each session hands the switchboard one unbounded sender at join time;
//! everything the session learns afterwards arrives as a [`Notice`] on that
//! queue, in the order the switchboard observed it. The out-of-room channel
//! uses the separate [`DirectNotice`] stream.

use crate::token::TokenCheck;
use roomlink_core::{
    MessageDeliveryError, MessageId, PublishFallbackOption, SimulcastProfile, StreamKey,
    StreamRemoveReason, UserId, UserLeaveReason,
};
use roomlink_messaging::MessagePayload;

/// Which in-room messaging operation a delivery result belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageScope {
    /// Broadcast to the whole room
    Room,
    /// Unicast to one member
    User,
}

/// A stream a member currently publishes, as seen in a join snapshot
#[derive(Debug, Clone)]
pub struct PublishedStream {
    /// Stream key
    pub key: StreamKey,
    /// Simulcast ladder declared at publish time (may be empty)
    pub simulcast: Vec<SimulcastProfile>,
    /// Publisher-side fallback eligibility
    pub fallback: PublishFallbackOption,
    /// Whether transmission is currently suppressed
    pub muted: bool,
}

/// Visible member state handed to a joiner so late joins converge without
/// extra calls
#[derive(Debug, Clone)]
pub struct MemberSnapshot {
    /// Member's user ID
    pub user_id: UserId,
    /// Streams the member currently publishes
    pub published: Vec<PublishedStream>,
}

/// Notification pushed from the switchboard to one session's notice queue
#[derive(Debug, Clone)]
pub enum Notice {
    /// Join admitted; carries the current visible membership
    JoinAccepted {
        /// Visible members already in the room, with their streams
        members: Vec<MemberSnapshot>,
    },
    /// Join refused by token validation
    JoinRejected {
        /// Why the token was refused
        check: TokenCheck,
    },
    /// This session's user joined again elsewhere; fatal, non-retriable
    Evicted,
    /// Leave processed; teardown may complete client-side
    LeaveAck,
    /// A visible user appeared in the room
    UserJoined {
        /// The user that appeared
        user_id: UserId,
    },
    /// A user disappeared from the room view
    UserLeft {
        /// The user that disappeared
        user_id: UserId,
        /// Why
        reason: UserLeaveReason,
    },
    /// A remote member published a stream
    StreamPublished {
        /// Publisher
        user_id: UserId,
        /// Stream key
        key: StreamKey,
        /// Simulcast ladder declared by the publisher
        simulcast: Vec<SimulcastProfile>,
        /// Publisher-side fallback eligibility
        fallback: PublishFallbackOption,
    },
    /// A remote stream went away
    StreamUnpublished {
        /// Publisher
        user_id: UserId,
        /// Stream key
        key: StreamKey,
        /// Why
        reason: StreamRemoveReason,
    },
    /// A remote member toggled mute on a published stream
    StreamMuted {
        /// Publisher
        user_id: UserId,
        /// Stream key
        key: StreamKey,
        /// New mute state
        muted: bool,
    },
    /// Local publish admitted by the switchboard
    PublishAck {
        /// Stream key
        key: StreamKey,
    },
    /// Local unpublish processed (also sent when publish permission is
    /// revoked by a visibility change)
    UnpublishAck {
        /// Stream key
        key: StreamKey,
    },
    /// Broadcast message from a room member
    RoomMessage {
        /// Sender
        from: UserId,
        /// Body
        payload: MessagePayload,
    },
    /// Unicast message from a room member
    UserMessage {
        /// Sender
        from: UserId,
        /// Body
        payload: MessagePayload,
    },
    /// Delivery result for a previously submitted message
    MessageResult {
        /// ID assigned at send time
        msg_id: MessageId,
        /// Broadcast or unicast
        scope: MessageScope,
        /// `None` on success
        error: Option<MessageDeliveryError>,
    },
}

/// Which out-of-room operation a delivery result belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectScope {
    /// Peer-to-peer message
    Peer,
    /// Message to the application server
    Server,
}

/// Notification pushed to a logged-in out-of-room connection
#[derive(Debug, Clone)]
pub enum DirectNotice {
    /// Result of the login call; 0 means logged in
    LoginResult {
        /// User the login was issued for
        user_id: UserId,
        /// Numeric status
        code: i32,
    },
    /// Out-of-room message from a peer
    Message {
        /// Sender
        from: UserId,
        /// Body
        payload: MessagePayload,
    },
    /// Delivery result for a previously submitted out-of-room message
    MessageResult {
        /// ID assigned at send time
        msg_id: MessageId,
        /// Peer or server scope
        scope: DirectScope,
        /// `None` on success
        error: Option<MessageDeliveryError>,
    },
}

/// Message routed to the attached application server
#[derive(Debug, Clone)]
pub struct ServerMessage {
    /// Sending user
    pub from: UserId,
    /// Sender-side message ID
    pub msg_id: MessageId,
    /// Body
    pub payload: MessagePayload,
}
