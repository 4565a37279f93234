//! Local publication state, one slot per stream key.
//!
//! Publish state and mute state are independent axes: muting never touches
//! the publish lifecycle, and publish/unpublish never touches mute. A key
//! muted while unpublished stays muted across any number of later
//! publish/unpublish cycles until the application unmutes it.

use roomlink_core::{PublishConfig, PublishState, RoomlinkError, StreamKey};
use std::collections::{HashMap, HashSet};

/// What a publish or unpublish call should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishAction {
    /// Forward the request to the switchboard
    Submit,
    /// Request is already satisfied or in flight; do nothing
    NoOp,
}

/// Per-key publish lifecycle plus the orthogonal mute set
#[derive(Debug, Default)]
pub struct PublicationTable {
    states: HashMap<StreamKey, PublishState>,
    configs: HashMap<StreamKey, PublishConfig>,
    muted: HashSet<StreamKey>,
}

impl PublicationTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lifecycle state for a key
    pub fn state(&self, key: StreamKey) -> PublishState {
        self.states.get(&key).copied().unwrap_or_default()
    }

    /// Config supplied with the most recent publish call for a key
    pub fn config(&self, key: StreamKey) -> Option<&PublishConfig> {
        self.configs.get(&key)
    }

    /// Whether transmission on a key is currently suppressed
    pub fn is_muted(&self, key: StreamKey) -> bool {
        self.muted.contains(&key)
    }

    /// Begin publishing a key.
    ///
    /// Idempotent: a key already publishing or published is a no-op, never
    /// an error.
    pub fn begin_publish(&mut self, key: StreamKey, config: PublishConfig) -> PublishAction {
        match self.state(key) {
            PublishState::Publishing | PublishState::Published => PublishAction::NoOp,
            PublishState::Unpublished | PublishState::Unpublishing => {
                self.states.insert(key, PublishState::Publishing);
                self.configs.insert(key, config);
                PublishAction::Submit
            }
        }
    }

    /// Begin withdrawing a key
    pub fn begin_unpublish(&mut self, key: StreamKey) -> PublishAction {
        match self.state(key) {
            PublishState::Unpublished | PublishState::Unpublishing => PublishAction::NoOp,
            PublishState::Publishing | PublishState::Published => {
                self.states.insert(key, PublishState::Unpublishing);
                PublishAction::Submit
            }
        }
    }

    /// Confirmation that the switchboard admitted the publish
    pub fn confirm_publish(&mut self, key: StreamKey) -> Result<(), RoomlinkError> {
        match self.state(key) {
            PublishState::Publishing => {
                self.states.insert(key, PublishState::Published);
                Ok(())
            }
            actual => Err(RoomlinkError::InvalidState {
                expected: "publishing".to_string(),
                actual: format!("{actual:?}"),
            }),
        }
    }

    /// Confirmation that the switchboard processed the unpublish.
    ///
    /// Also arrives when publish permission is revoked by a visibility
    /// change, so any non-terminal state collapses to unpublished.
    pub fn confirm_unpublish(&mut self, key: StreamKey) {
        self.states.insert(key, PublishState::Unpublished);
        self.configs.remove(&key);
    }

    /// Set mute for a key; returns true when the value changed
    pub fn set_muted(&mut self, key: StreamKey, muted: bool) -> bool {
        if muted {
            self.muted.insert(key)
        } else {
            self.muted.remove(&key)
        }
    }

    /// Keys currently published or awaiting confirmation
    pub fn active_keys(&self) -> Vec<StreamKey> {
        self.states
            .iter()
            .filter(|(_, state)| {
                matches!(state, PublishState::Publishing | PublishState::Published)
            })
            .map(|(key, _)| *key)
            .collect()
    }

    /// Keys in the mute set, published or not
    pub fn muted_keys(&self) -> Vec<StreamKey> {
        self.muted.iter().copied().collect()
    }

    /// Collapse every publish slot to unpublished. Mute state survives.
    pub fn reset_publishes(&mut self) {
        self.states.clear();
        self.configs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomlink_core::MediaType;

    #[test]
    fn test_publish_lifecycle() {
        let mut table = PublicationTable::new();
        let key = StreamKey::main(MediaType::Video);
        assert_eq!(table.state(key), PublishState::Unpublished);

        assert_eq!(
            table.begin_publish(key, PublishConfig::default()),
            PublishAction::Submit
        );
        assert_eq!(table.state(key), PublishState::Publishing);
        // Duplicate request while in flight is absorbed.
        assert_eq!(
            table.begin_publish(key, PublishConfig::default()),
            PublishAction::NoOp
        );

        table.confirm_publish(key).unwrap();
        assert_eq!(table.state(key), PublishState::Published);

        assert_eq!(table.begin_unpublish(key), PublishAction::Submit);
        table.confirm_unpublish(key);
        assert_eq!(table.state(key), PublishState::Unpublished);
    }

    #[test]
    fn test_unpublish_when_not_published_is_noop() {
        let mut table = PublicationTable::new();
        let key = StreamKey::main(MediaType::Audio);
        assert_eq!(table.begin_unpublish(key), PublishAction::NoOp);
    }

    #[test]
    fn test_mute_survives_publish_cycles() {
        let mut table = PublicationTable::new();
        let key = StreamKey::main(MediaType::Audio);

        // Mute before any publish.
        assert!(table.set_muted(key, true));
        assert!(table.is_muted(key));

        table.begin_publish(key, PublishConfig::default());
        table.confirm_publish(key).unwrap();
        assert!(table.is_muted(key), "publish must not reset mute");

        table.begin_unpublish(key);
        table.confirm_unpublish(key);
        assert!(table.is_muted(key), "unpublish must not reset mute");

        table.reset_publishes();
        assert!(table.is_muted(key), "room exit must not reset mute");

        assert!(table.set_muted(key, false));
        assert!(!table.set_muted(key, false));
    }

    #[test]
    fn test_confirm_publish_out_of_order_is_rejected() {
        let mut table = PublicationTable::new();
        let key = StreamKey::screen(MediaType::Video);
        assert!(table.confirm_publish(key).is_err());
    }
}
