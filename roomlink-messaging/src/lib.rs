//! # roomlink messaging
//!
//! Payload model and delivery tracking for the two messaging channels:
//! in-room (broadcast and unicast, valid only while joined) and out-of-room
//! (peer and application-server, valid only while logged in). Size caps are
//! enforced before a message ID is assigned; IDs increase monotonically
//! from 1 per channel; each ID sees at most one delivery result.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod payload;
pub mod sequence;
pub mod tracker;

// Re-export main types
pub use payload::{MessagePayload, MAX_BINARY_MESSAGE_BYTES, MAX_TEXT_MESSAGE_BYTES};
pub use sequence::MessageSequence;
pub use tracker::DeliveryTracker;
