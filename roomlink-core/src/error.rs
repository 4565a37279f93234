//! Error taxonomy for roomlink
//!
//! Synchronous rejections are `RoomlinkError` values returned at the call
//! site, each carrying a small-integer return code. Asynchronous conditions
//! travel through the event channel instead: transient ones as
//! [`RoomWarning`], non-recoverable ones as [`RoomFault`], and per-operation
//! failures as [`MessageDeliveryError`] keyed by the message ID issued at
//! call time.

use crate::media::StreamKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Symbolic names for the small-integer codes surfaced by synchronous calls
/// and state-changed notifications
pub mod codes {
    /// Call accepted / operation succeeded
    pub const OK: i32 = 0;
    /// Malformed room or user identifier
    pub const MALFORMED_ID: i32 = -1;
    /// Join attempted while a join is pending or active
    pub const ALREADY_JOINED: i32 = -2;
    /// Engine handle destroyed or driver gone
    pub const ENGINE_GONE: i32 = -3;
    /// Operation requires a joined room
    pub const NOT_IN_ROOM: i32 = -4;
    /// Message payload exceeds the channel size cap
    pub const MESSAGE_TOO_LARGE: i32 = -5;
    /// Out-of-room operation requires a completed login
    pub const NOT_LOGGED_IN: i32 = -6;
    /// Operation invalid in the current state
    pub const INVALID_STATE: i32 = -7;
    /// The single-consumer event stream was already handed out
    pub const EVENT_STREAM_TAKEN: i32 = -8;
    /// Engine room limit reached
    pub const ROOM_LIMIT: i32 = -9;

    /// Join rejected asynchronously: token failed validation
    pub const JOIN_TOKEN_INVALID: i32 = -1000;
    /// Join rejected asynchronously: token expired
    pub const JOIN_TOKEN_EXPIRED: i32 = -1001;
    /// Fatal eviction: the same user joined the same room again elsewhere
    pub const DUPLICATE_LOGIN: i32 = -1004;

    /// Login rejected: token failed validation
    pub const LOGIN_TOKEN_INVALID: i32 = -2000;
    /// Login rejected: token expired
    pub const LOGIN_TOKEN_EXPIRED: i32 = -2001;
}

/// Main error type for roomlink operations
#[derive(Error, Debug)]
pub enum RoomlinkError {
    /// Identifier failed charset or length validation
    #[error("Malformed {kind} {value:?}: {reason}")]
    MalformedId {
        /// Which identifier kind was malformed (`room_id`, `user_id`)
        kind: String,
        /// The rejected value
        value: String,
        /// Why validation failed
        reason: String,
    },

    /// Join issued while the session is not idle
    #[error("Already joined room {room_id}")]
    AlreadyJoined {
        /// Room the session is already joined to (or joining)
        room_id: String,
    },

    /// The engine or session driver has been destroyed
    #[error("Engine gone: {reason}")]
    EngineGone {
        /// What was observed to be gone
        reason: String,
    },

    /// Operation requires the session to be joined
    #[error("Not in room: {operation} requires a joined session")]
    NotInRoom {
        /// Operation that was rejected
        operation: String,
    },

    /// Message payload exceeds the per-channel size cap
    #[error("Message too large: {size} byte {kind} payload exceeds {limit} byte cap")]
    MessageTooLarge {
        /// Payload kind (`text`, `binary`)
        kind: String,
        /// Actual payload size in bytes
        size: usize,
        /// Enforced cap in bytes
        limit: usize,
    },

    /// Out-of-room operation attempted without a completed login
    #[error("Not logged in: {operation} requires login")]
    NotLoggedIn {
        /// Operation that was rejected
        operation: String,
    },

    /// Operation invalid in the current state
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// The single-consumer event stream was already taken
    #[error("Event stream already taken for {owner}")]
    EventStreamTaken {
        /// Component whose stream was requested twice
        owner: String,
    },

    /// Engine-level room limit reached
    #[error("Room limit reached: {limit} rooms already open")]
    RoomLimit {
        /// Maximum number of concurrently open rooms
        limit: usize,
    },
}

impl RoomlinkError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            RoomlinkError::MalformedId { .. } => "MALFORMED_ID",
            RoomlinkError::AlreadyJoined { .. } => "ALREADY_JOINED",
            RoomlinkError::EngineGone { .. } => "ENGINE_GONE",
            RoomlinkError::NotInRoom { .. } => "NOT_IN_ROOM",
            RoomlinkError::MessageTooLarge { .. } => "MESSAGE_TOO_LARGE",
            RoomlinkError::NotLoggedIn { .. } => "NOT_LOGGED_IN",
            RoomlinkError::InvalidState { .. } => "INVALID_STATE",
            RoomlinkError::EventStreamTaken { .. } => "EVENT_STREAM_TAKEN",
            RoomlinkError::RoomLimit { .. } => "ROOM_LIMIT",
        }
    }

    /// Small-integer return code matching the call-level contract
    pub fn return_code(&self) -> i32 {
        match self {
            RoomlinkError::MalformedId { .. } => codes::MALFORMED_ID,
            RoomlinkError::AlreadyJoined { .. } => codes::ALREADY_JOINED,
            RoomlinkError::EngineGone { .. } => codes::ENGINE_GONE,
            RoomlinkError::NotInRoom { .. } => codes::NOT_IN_ROOM,
            RoomlinkError::MessageTooLarge { .. } => codes::MESSAGE_TOO_LARGE,
            RoomlinkError::NotLoggedIn { .. } => codes::NOT_LOGGED_IN,
            RoomlinkError::InvalidState { .. } => codes::INVALID_STATE,
            RoomlinkError::EventStreamTaken { .. } => codes::EVENT_STREAM_TAKEN,
            RoomlinkError::RoomLimit { .. } => codes::ROOM_LIMIT,
        }
    }
}

/// Transient, auto-recoverable conditions reported asynchronously.
///
/// The caller need not react to a warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomWarning {
    /// Publish attempted while the local user is invisible; no data admitted
    PublishWhileInvisible {
        /// Stream the publish targeted
        key: StreamKey,
    },
    /// Subscribe targeted a stream that was explicitly unpublished; no
    /// subscription was created
    SubscribeUnknownStream {
        /// Publisher the subscribe targeted
        user_id: crate::ids::UserId,
        /// Stream the subscribe targeted
        key: StreamKey,
    },
    /// Token update was rejected by validation and cleared nothing
    TokenUpdateRejected,
    /// Operation ignored because the session is not joined
    OperationWhileNotInRoom {
        /// Operation that was ignored
        operation: String,
    },
}

impl RoomWarning {
    /// Stable warning code for programmatic handling
    pub fn warning_code(&self) -> &'static str {
        match self {
            RoomWarning::PublishWhileInvisible { .. } => "PUBLISH_WHILE_INVISIBLE",
            RoomWarning::SubscribeUnknownStream { .. } => "SUBSCRIBE_UNKNOWN_STREAM",
            RoomWarning::TokenUpdateRejected => "TOKEN_UPDATE_REJECTED",
            RoomWarning::OperationWhileNotInRoom { .. } => "OPERATION_WHILE_NOT_IN_ROOM",
        }
    }
}

/// Non-recoverable room conditions reported asynchronously.
///
/// The caller must react: rejoin, reauthenticate, or abandon the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomFault {
    /// A second join with the same user ID evicted this session.
    ///
    /// Fatal and non-retriable; the session has been forced to idle.
    DuplicateLogin {
        /// User whose identity was taken over
        user_id: crate::ids::UserId,
    },
    /// The join token expired; update the token to trigger rejoin
    TokenExpired,
}

impl RoomFault {
    /// Whether the fault terminates the session without a recovery path
    pub fn is_fatal(&self) -> bool {
        matches!(self, RoomFault::DuplicateLogin { .. })
    }

    /// Status code embedded in the matching notification
    pub fn status_code(&self) -> i32 {
        match self {
            RoomFault::DuplicateLogin { .. } => codes::DUPLICATE_LOGIN,
            RoomFault::TokenExpired => codes::JOIN_TOKEN_EXPIRED,
        }
    }
}

/// Per-message failure reported through the matching delivery-result event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageDeliveryError {
    /// Target user is not present in the room (or not logged in)
    UnknownTarget,
    /// No application server is attached to receive P2Server messages
    ServerUnavailable,
    /// The sending session lost its connection before the message was routed
    ConnectionLost,
}

impl MessageDeliveryError {
    /// Stable error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            MessageDeliveryError::UnknownTarget => "UNKNOWN_TARGET",
            MessageDeliveryError::ServerUnavailable => "SERVER_UNAVAILABLE",
            MessageDeliveryError::ConnectionLost => "CONNECTION_LOST",
        }
    }
}
