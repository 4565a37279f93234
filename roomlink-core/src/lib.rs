//! # roomlink core
//!
//! Shared vocabulary for the roomlink session layer: validated identifiers,
//! the media stream model, the error taxonomy, tagged-union events, and the
//! single-consumer dispatch queue every other crate delivers through.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod dispatch;
pub mod error;
pub mod event;
pub mod ids;
pub mod media;

// Re-export main types
pub use dispatch::{event_channel, EventHandler, EventSink, EventStream};
pub use error::{codes, MessageDeliveryError, RoomFault, RoomWarning, RoomlinkError};
pub use event::{
    ConnectionState, EngineEvent, FallbackDirection, JoinKind, RoomEvent, RoomStateInfo,
    RoomStats, StreamRemoveReason, SubscribeOutcome, UserLeaveReason,
};
pub use ids::{MessageId, RoomId, UserId, MAX_ID_BYTES};
pub use media::{
    MediaType, PublishConfig, PublishFallbackOption, PublishState, RemoteUserPriority,
    SimulcastProfile, StreamKey, StreamKind, SubscribeConfig, SubscribeFallbackOption,
    SubscribeMode, SubscriptionState,
};
