//! # roomlink signaling
//!
//! The in-process switchboard that stands in for the signaling server: a
//! room directory with duplicate-login eviction, presence and stream
//! announcements, and routing for the in-room and out-of-room messaging
//! channels. Sessions talk to it through plain method calls and listen on
//! unbounded notice queues; per-room ordering is authoritative because all
//! mutation happens under the room entry.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod protocol;
pub mod switchboard;
pub mod token;

// Re-export main types
pub use protocol::{
    DirectNotice, DirectScope, MemberSnapshot, MessageScope, Notice, PublishedStream,
    ServerMessage,
};
pub use switchboard::{Registration, SharedSwitchboard, Switchboard};
pub use token::{accept_non_empty, TokenCheck, TokenValidator};
