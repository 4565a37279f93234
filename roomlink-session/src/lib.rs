//! # roomlink session
//!
//! Client-side room state machines: the join/leave lifecycle, local
//! publication slots with the orthogonal mute axis, remote participant
//! tracking, subscription resolution with a bounded deferral window, and
//! bandwidth-driven simulcast fallback. One driver task per session
//! serializes API commands and switchboard notices into a single event
//! order.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod fallback;
pub mod participant;
pub mod publication;
pub mod session;
pub mod subscription;

// Re-export main types
pub use fallback::{FallbackController, FallbackDecision};
pub use participant::{ParticipantRegistry, RemoteStream};
pub use publication::{PublicationTable, PublishAction};
pub use session::{SessionConfig, SessionHandle, SessionSnapshot};
pub use subscription::{SubscribeAction, SubscriptionTable};
