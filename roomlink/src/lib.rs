//! # roomlink
//!
//! Room/session state machines for real-time communication apps: join and
//! leave with asynchronous authoritative confirmation, stream publication
//! with an independent mute axis, automatic or manual subscription with a
//! bounded resolution window, bandwidth-driven simulcast fallback, and two
//! capped messaging channels (in-room and out-of-room). Everything runs
//! against an in-process switchboard, so multiple sessions in one process
//! interact exactly like peers on a signaling server.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use roomlink::{Engine, EngineConfig, MediaType, PublishConfig, RoomEvent, StreamKey};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::new(EngineConfig::new("demo-app"));
//!
//!     let room = engine.room("standup").user("alice").build()?;
//!     let mut events = room.events()?;
//!
//!     room.join("access-token")?;
//!     while let Some(event) = events.next().await {
//!         match event {
//!             RoomEvent::StateChanged { state, code, .. } => {
//!                 println!("connection: {state:?} (code {code})");
//!                 room.publish(StreamKey::main(MediaType::Video), PublishConfig::simulcast_video())?;
//!             }
//!             RoomEvent::UserJoined { user_id } => println!("{user_id} joined"),
//!             RoomEvent::LeftRoom { stats } => {
//!                 println!("left after {} ms", stats.duration_ms);
//!                 break;
//!             }
//!             _ => {}
//!         }
//!     }
//!
//!     engine.destroy().await;
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod room;

// Facade surface
pub use config::{EngineConfig, RoomConfig};
pub use engine::Engine;
pub use room::{Room, RoomBuilder};

// Core vocabulary
pub use roomlink_core::{
    codes, event_channel, ConnectionState, EngineEvent, EventHandler, EventSink, EventStream,
    FallbackDirection, JoinKind, MediaType, MessageDeliveryError, MessageId, PublishConfig,
    PublishFallbackOption, PublishState, RemoteUserPriority, RoomEvent, RoomFault, RoomId,
    RoomStateInfo, RoomStats, RoomWarning, RoomlinkError, SimulcastProfile, StreamKey, StreamKind,
    StreamRemoveReason, SubscribeConfig, SubscribeFallbackOption, SubscribeMode, SubscribeOutcome,
    SubscriptionState, UserId, UserLeaveReason, MAX_ID_BYTES,
};

// Messaging and session surfaces
pub use roomlink_messaging::{
    MessagePayload, MAX_BINARY_MESSAGE_BYTES, MAX_TEXT_MESSAGE_BYTES,
};
pub use roomlink_session::SessionSnapshot;
pub use roomlink_signaling::{accept_non_empty, ServerMessage, Switchboard, TokenCheck, TokenValidator};
