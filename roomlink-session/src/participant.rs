//! Remote participant registry: who is visible and what they publish.
//!
//! The registry mirrors what the switchboard has announced to this session.
//! It also remembers explicitly withdrawn streams so that a subscribe
//! request naming a stream the publisher just unpublished degrades to a
//! warning instead of waiting out the full resolution window.

use roomlink_core::{PublishFallbackOption, SimulcastProfile, StreamKey, UserId};
use std::collections::{HashMap, HashSet};

/// What the registry knows about one remote stream
#[derive(Debug, Clone)]
pub struct RemoteStream {
    /// Simulcast ladder the publisher declared (may be empty)
    pub simulcast: Vec<SimulcastProfile>,
    /// Publisher-side fallback eligibility
    pub fallback: PublishFallbackOption,
    /// Whether the publisher currently suppresses transmission
    pub muted: bool,
}

#[derive(Debug, Default)]
struct RemoteUser {
    streams: HashMap<StreamKey, RemoteStream>,
}

/// Session-local view of remote room membership
#[derive(Debug, Default)]
pub struct ParticipantRegistry {
    users: HashMap<UserId, RemoteUser>,
    retired: HashSet<(UserId, StreamKey)>,
}

impl ParticipantRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a visible user appearing
    pub fn add_user(&mut self, user_id: UserId) {
        self.users.entry(user_id).or_default();
    }

    /// Record a user disappearing; returns the keys they still published
    pub fn remove_user(&mut self, user_id: &UserId) -> Vec<StreamKey> {
        match self.users.remove(user_id) {
            Some(user) => user.streams.keys().copied().collect(),
            None => Vec::new(),
        }
    }

    /// Record a remote publish; clears any retirement for the key
    pub fn add_stream(
        &mut self,
        user_id: &UserId,
        key: StreamKey,
        simulcast: Vec<SimulcastProfile>,
        fallback: PublishFallbackOption,
    ) {
        self.retired.remove(&(user_id.clone(), key));
        self.users.entry(user_id.clone()).or_default().streams.insert(
            key,
            RemoteStream {
                simulcast,
                fallback,
                muted: false,
            },
        );
    }

    /// Record a remote stream going away.
    ///
    /// `explicit` marks an application-initiated unpublish; those keys are
    /// retired so later subscribe requests for them fail fast.
    pub fn remove_stream(&mut self, user_id: &UserId, key: StreamKey, explicit: bool) -> bool {
        if explicit {
            self.retired.insert((user_id.clone(), key));
        }
        self.users
            .get_mut(user_id)
            .map(|user| user.streams.remove(&key).is_some())
            .unwrap_or(false)
    }

    /// Record a remote mute toggle
    pub fn set_stream_muted(&mut self, user_id: &UserId, key: StreamKey, muted: bool) -> bool {
        match self
            .users
            .get_mut(user_id)
            .and_then(|user| user.streams.get_mut(&key))
        {
            Some(stream) => {
                stream.muted = muted;
                true
            }
            None => false,
        }
    }

    /// Whether the stream is currently announced
    pub fn has_stream(&self, user_id: &UserId, key: StreamKey) -> bool {
        self.users
            .get(user_id)
            .is_some_and(|user| user.streams.contains_key(&key))
    }

    /// Announced stream detail
    pub fn stream(&self, user_id: &UserId, key: StreamKey) -> Option<&RemoteStream> {
        self.users.get(user_id).and_then(|user| user.streams.get(&key))
    }

    /// Whether the publisher explicitly withdrew this key and has not
    /// republished it since
    pub fn is_retired(&self, user_id: &UserId, key: StreamKey) -> bool {
        self.retired.contains(&(user_id.clone(), key))
    }

    /// Visible remote users
    pub fn user_ids(&self) -> Vec<UserId> {
        self.users.keys().cloned().collect()
    }

    /// Number of visible remote users
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Forget everything; used on room exit
    pub fn clear(&mut self) {
        self.users.clear();
        self.retired.clear();
    }
}
