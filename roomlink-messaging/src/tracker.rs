//! At-most-once delivery-result accounting

use parking_lot::Mutex;
use roomlink_core::MessageId;
use std::collections::HashSet;
use tracing::warn;

/// Tracks outstanding message IDs so each delivery result is surfaced at
/// most once.
///
/// `register` is called when the send call assigns an ID; `resolve` is
/// called when the matching result arrives and returns false for unknown or
/// already-resolved IDs, which the dispatcher drops.
#[derive(Debug, Default)]
pub struct DeliveryTracker {
    outstanding: Mutex<HashSet<MessageId>>,
}

impl DeliveryTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly issued message ID; returns false on a duplicate
    pub fn register(&self, msg_id: MessageId) -> bool {
        self.outstanding.lock().insert(msg_id)
    }

    /// Consume the result slot for a message ID.
    ///
    /// Returns true exactly once per registered ID.
    pub fn resolve(&self, msg_id: MessageId) -> bool {
        let known = self.outstanding.lock().remove(&msg_id);
        if !known {
            warn!(msg_id, "dropping delivery result for unknown message id");
        }
        known
    }

    /// Number of sends still awaiting a result
    pub fn outstanding(&self) -> usize {
        self.outstanding.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_is_at_most_once() {
        let tracker = DeliveryTracker::new();
        assert!(tracker.register(1));
        assert!(tracker.register(2));
        assert_eq!(tracker.outstanding(), 2);

        assert!(tracker.resolve(1));
        assert!(!tracker.resolve(1));
        assert_eq!(tracker.outstanding(), 1);
    }

    #[test]
    fn test_unknown_id_is_dropped() {
        let tracker = DeliveryTracker::new();
        assert!(!tracker.resolve(99));
    }

    #[test]
    fn test_duplicate_register_rejected() {
        let tracker = DeliveryTracker::new();
        assert!(tracker.register(7));
        assert!(!tracker.register(7));
    }
}
