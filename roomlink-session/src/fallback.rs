//! Bandwidth-driven simulcast tier selection.
//!
//! Only video streams whose publisher allowed fallback and whose subscriber
//! opted in are tracked. Under pressure the controller steps the
//! lowest-priority remote down one tier at a time; when bandwidth recovers
//! it restores the highest-priority degraded remote first. A per-stream
//! cooldown keeps a noisy bandwidth estimate from flapping tiers.

use roomlink_core::{
    FallbackDirection, RemoteUserPriority, SimulcastProfile, StreamKey, UserId,
};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// One tier change the session should apply and report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackDecision {
    /// Remote publisher
    pub user_id: UserId,
    /// Affected stream
    pub key: StreamKey,
    /// New tier index (0 = highest)
    pub tier: usize,
    /// Downgrade or restore
    pub direction: FallbackDirection,
}

#[derive(Debug)]
struct Tracked {
    ladder: Vec<SimulcastProfile>,
    tier: usize,
    last_change: Option<Instant>,
}

impl Tracked {
    fn bitrate_at(&self, tier: usize) -> u32 {
        self.ladder
            .get(tier)
            .map(|profile| profile.max_bitrate_kbps)
            .unwrap_or(0)
    }

    fn in_cooldown(&self, now: Instant, cooldown: Duration) -> bool {
        self.last_change
            .is_some_and(|changed| now.duration_since(changed) < cooldown)
    }
}

/// Tier selection for all tracked subscriptions of one session
#[derive(Debug)]
pub struct FallbackController {
    enabled: bool,
    cooldown: Duration,
    priorities: HashMap<UserId, RemoteUserPriority>,
    streams: HashMap<(UserId, StreamKey), Tracked>,
}

impl FallbackController {
    /// New controller; `enabled` reflects the session's subscribe-side
    /// fallback option
    pub fn new(enabled: bool, cooldown: Duration) -> Self {
        Self {
            enabled,
            cooldown,
            priorities: HashMap::new(),
            streams: HashMap::new(),
        }
    }

    /// Record the priority applied to one remote user's streams
    pub fn set_priority(&mut self, user_id: UserId, priority: RemoteUserPriority) {
        self.priorities.insert(user_id, priority);
    }

    /// Start managing a subscribed stream.
    ///
    /// Ignored unless fallback is enabled on both sides and the ladder has
    /// more than one video tier to move between. Remote publishers declare
    /// the ladder in any order; tiers are normalized so index 0 is always
    /// the highest bitrate.
    pub fn track(
        &mut self,
        user_id: UserId,
        key: StreamKey,
        mut ladder: Vec<SimulcastProfile>,
        publisher_allows: bool,
    ) {
        if !self.enabled || !publisher_allows || ladder.len() < 2 {
            return;
        }
        ladder.sort_by(|a, b| b.max_bitrate_kbps.cmp(&a.max_bitrate_kbps));
        self.streams.insert(
            (user_id, key),
            Tracked {
                ladder,
                tier: 0,
                last_change: None,
            },
        );
    }

    /// Stop managing a stream
    pub fn untrack(&mut self, user_id: &UserId, key: StreamKey) {
        self.streams.remove(&(user_id.clone(), key));
    }

    /// Stop managing every stream of a departed user
    pub fn forget_user(&mut self, user_id: &UserId) {
        self.streams.retain(|(uid, _), _| uid != user_id);
        self.priorities.remove(user_id);
    }

    /// Currently selected tier for a tracked stream
    pub fn current_tier(&self, user_id: &UserId, key: StreamKey) -> Option<usize> {
        self.streams
            .get(&(user_id.clone(), key))
            .map(|tracked| tracked.tier)
    }

    /// Priority currently applied to a remote user
    pub fn priority(&self, user_id: &UserId) -> RemoteUserPriority {
        self.priority_of(user_id)
    }

    /// Drop all tracked streams and priorities; used on room exit
    pub fn clear(&mut self) {
        self.streams.clear();
        self.priorities.clear();
    }

    fn priority_of(&self, user_id: &UserId) -> RemoteUserPriority {
        self.priorities.get(user_id).copied().unwrap_or_default()
    }

    fn demand_kbps(&self) -> u32 {
        self.streams
            .values()
            .map(|tracked| tracked.bitrate_at(tracked.tier))
            .sum()
    }

    /// Feed a bandwidth estimate and collect the tier changes to apply.
    ///
    /// Each stream moves at most one tier per sample.
    pub fn on_bandwidth_sample(&mut self, available_kbps: u32, now: Instant) -> Vec<FallbackDecision> {
        if !self.enabled || self.streams.is_empty() {
            return Vec::new();
        }
        let mut decisions = Vec::new();
        let mut demand = self.demand_kbps();

        // Shed load lowest-priority first.
        while demand > available_kbps {
            let candidate = self
                .streams
                .iter()
                .filter(|(_, tracked)| {
                    tracked.tier + 1 < tracked.ladder.len()
                        && !tracked.in_cooldown(now, self.cooldown)
                })
                .filter(|((uid, key), _)| {
                    !decisions
                        .iter()
                        .any(|d: &FallbackDecision| &d.user_id == uid && d.key == *key)
                })
                .min_by_key(|((uid, _), tracked)| {
                    (self.priority_of(uid), u32::MAX - tracked.bitrate_at(tracked.tier))
                })
                .map(|(slot, _)| slot.clone());
            let Some((uid, key)) = candidate else { break };
            if let Some(tracked) = self.streams.get_mut(&(uid.clone(), key)) {
                let saved = tracked
                    .bitrate_at(tracked.tier)
                    .saturating_sub(tracked.bitrate_at(tracked.tier + 1));
                tracked.tier += 1;
                tracked.last_change = Some(now);
                let tier = tracked.tier;
                demand = demand.saturating_sub(saved);
                debug!(user = %uid, %key, tier, "downgrading simulcast tier");
                decisions.push(FallbackDecision {
                    user_id: uid,
                    key,
                    tier,
                    direction: FallbackDirection::Downgrade,
                });
            }
        }
        if !decisions.is_empty() {
            return decisions;
        }

        // Headroom: restore highest-priority degraded stream, one step per
        // sample, only when the higher tier still fits.
        let candidate = self
            .streams
            .iter()
            .filter(|(_, tracked)| tracked.tier > 0 && !tracked.in_cooldown(now, self.cooldown))
            .filter(|(_, tracked)| {
                let gain = tracked
                    .bitrate_at(tracked.tier - 1)
                    .saturating_sub(tracked.bitrate_at(tracked.tier));
                demand + gain <= available_kbps
            })
            .max_by_key(|((uid, _), _)| self.priority_of(uid))
            .map(|(slot, _)| slot.clone());
        if let Some((uid, key)) = candidate {
            if let Some(tracked) = self.streams.get_mut(&(uid.clone(), key)) {
                tracked.tier -= 1;
                tracked.last_change = Some(now);
                debug!(user = %uid, %key, tier = tracked.tier, "restoring simulcast tier");
                decisions.push(FallbackDecision {
                    user_id: uid.clone(),
                    key,
                    tier: tracked.tier,
                    direction: FallbackDirection::Restore,
                });
            }
        }
        decisions
    }
}
