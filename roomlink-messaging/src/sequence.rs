//! Per-channel message ID sequencing

use roomlink_core::MessageId;
use std::sync::atomic::{AtomicI64, Ordering};

/// Monotonically increasing message ID source, starting at 1.
///
/// Each channel (in-room, out-of-room) owns its own sequence; within the
/// out-of-room channel, peer and server messages share a single sequence.
/// IDs are never reused within a connection's lifetime.
#[derive(Debug)]
pub struct MessageSequence {
    next: AtomicI64,
}

impl MessageSequence {
    /// Create a sequence positioned at 1
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(1),
        }
    }

    /// Take the next ID
    pub fn next_id(&self) -> MessageId {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// Number of IDs issued so far
    pub fn issued(&self) -> u64 {
        (self.next.load(Ordering::SeqCst) - 1) as u64
    }
}

impl Default for MessageSequence {
    fn default() -> Self {
        Self::new()
    }
}
