//! Engine and room configuration.

use roomlink_core::{SubscribeFallbackOption, SubscribeMode};
use roomlink_session::SessionConfig;
use std::time::Duration;

/// Engine-level configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Application identifier, attached to log output
    pub app_id: String,
    /// Maximum number of concurrently open rooms
    pub max_rooms: usize,
}

impl EngineConfig {
    /// Config for the given application ID with default limits
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            ..Self::default()
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            max_rooms: 10,
        }
    }
}

/// Per-room options, fixed when the room is built
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Whether the local user is visible to other members
    pub visible: bool,
    /// Automatic or manual subscription, fixed for the whole session
    pub subscribe_mode: SubscribeMode,
    /// Subscriber-side simulcast fallback eligibility
    pub subscribe_fallback: SubscribeFallbackOption,
    /// Minimum interval between simulcast tier changes of one stream
    pub fallback_cooldown: Duration,
    /// How long an unresolved subscribe request waits for the publish
    /// announcement
    pub subscribe_window: Duration,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            visible: true,
            subscribe_mode: SubscribeMode::Automatic,
            subscribe_fallback: SubscribeFallbackOption::Disabled,
            fallback_cooldown: Duration::from_secs(3),
            subscribe_window: Duration::from_secs(10),
        }
    }
}

impl From<RoomConfig> for SessionConfig {
    fn from(config: RoomConfig) -> Self {
        SessionConfig {
            visible: config.visible,
            subscribe_mode: config.subscribe_mode,
            subscribe_fallback: config.subscribe_fallback,
            fallback_cooldown: config.fallback_cooldown,
            subscribe_window: config.subscribe_window,
        }
    }
}
