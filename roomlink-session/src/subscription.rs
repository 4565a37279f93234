//! Remote subscription state, keyed by (user, stream).
//!
//! A subscribe request naming a stream that has not been announced yet is
//! held in the subscribing state for a bounded window; the publish
//! announcement arriving inside the window resolves it, the window lapsing
//! resolves it as not-found. The automatic/manual mode is fixed for the
//! whole session at join time.

use roomlink_core::{
    RemoteUserPriority, StreamKey, SubscribeConfig, SubscribeMode, SubscriptionState, UserId,
};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// What a subscribe request should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeAction {
    /// Stream is announced; resolve the subscription now
    Resolve,
    /// Stream not announced yet; held until the window lapses
    Defer,
    /// Already subscribing or subscribed
    NoOp,
}

#[derive(Debug, Clone)]
struct Entry {
    state: SubscriptionState,
    config: SubscribeConfig,
    deadline: Option<Instant>,
}

/// Per-session subscription bookkeeping
#[derive(Debug)]
pub struct SubscriptionTable {
    mode: SubscribeMode,
    window: Duration,
    entries: HashMap<(UserId, StreamKey), Entry>,
}

impl SubscriptionTable {
    /// New table for a session joined in `mode`, deferring unresolved
    /// requests for at most `window`
    pub fn new(mode: SubscribeMode, window: Duration) -> Self {
        Self {
            mode,
            window,
            entries: HashMap::new(),
        }
    }

    /// Subscribe mode fixed at join time
    pub fn mode(&self) -> SubscribeMode {
        self.mode
    }

    /// Current state for a (user, stream) pair
    pub fn state(&self, user_id: &UserId, key: StreamKey) -> SubscriptionState {
        self.entries
            .get(&(user_id.clone(), key))
            .map(|entry| entry.state)
            .unwrap_or_default()
    }

    /// Record a subscribe request.
    ///
    /// `announced` says whether the registry currently knows the stream.
    pub fn request(
        &mut self,
        user_id: &UserId,
        key: StreamKey,
        priority: RemoteUserPriority,
        announced: bool,
    ) -> SubscribeAction {
        let slot = (user_id.clone(), key);
        if let Some(entry) = self.entries.get(&slot) {
            if matches!(
                entry.state,
                SubscriptionState::Subscribing | SubscriptionState::Subscribed
            ) {
                return SubscribeAction::NoOp;
            }
        }
        let (deadline, action) = if announced {
            (None, SubscribeAction::Resolve)
        } else {
            (Some(Instant::now() + self.window), SubscribeAction::Defer)
        };
        self.entries.insert(
            slot,
            Entry {
                state: SubscriptionState::Subscribing,
                config: SubscribeConfig { tier: 0, priority },
                deadline,
            },
        );
        action
    }

    /// Mark a pending subscription active and return its effective config
    pub fn resolve(
        &mut self,
        user_id: &UserId,
        key: StreamKey,
        tier: usize,
    ) -> Option<SubscribeConfig> {
        let entry = self.entries.get_mut(&(user_id.clone(), key))?;
        if entry.state != SubscriptionState::Subscribing {
            return None;
        }
        entry.state = SubscriptionState::Subscribed;
        entry.deadline = None;
        entry.config.tier = tier;
        Some(entry.config)
    }

    /// Whether a deferred request is waiting on this stream's announcement
    pub fn is_pending(&self, user_id: &UserId, key: StreamKey) -> bool {
        self.entries
            .get(&(user_id.clone(), key))
            .is_some_and(|entry| entry.state == SubscriptionState::Subscribing)
    }

    /// Drop a subscription; returns true when one existed
    pub fn remove(&mut self, user_id: &UserId, key: StreamKey) -> bool {
        self.entries.remove(&(user_id.clone(), key)).is_some()
    }

    /// Remove every (user, stream) entry whose deferral window has lapsed
    pub fn expire(&mut self, now: Instant) -> Vec<(UserId, StreamKey)> {
        let lapsed: Vec<(UserId, StreamKey)> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.deadline.is_some_and(|deadline| deadline <= now))
            .map(|(slot, _)| slot.clone())
            .collect();
        for slot in &lapsed {
            self.entries.remove(slot);
        }
        lapsed
    }

    /// Earliest pending deferral deadline, if any
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries
            .values()
            .filter_map(|entry| entry.deadline)
            .min()
    }

    /// Update the stored priority for one remote user's subscriptions
    pub fn set_priority(&mut self, user_id: &UserId, priority: RemoteUserPriority) {
        for ((uid, _), entry) in self.entries.iter_mut() {
            if uid == user_id {
                entry.config.priority = priority;
            }
        }
    }

    /// Active and pending subscriptions with their configs
    pub fn snapshot(&self) -> Vec<(UserId, StreamKey, SubscriptionState, SubscribeConfig)> {
        self.entries
            .iter()
            .map(|((uid, key), entry)| (uid.clone(), *key, entry.state, entry.config))
            .collect()
    }

    /// Forget everything; used on room exit
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
