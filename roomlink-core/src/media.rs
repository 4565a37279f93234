//! Media stream model: stream kinds, simulcast tiers, and negotiation options

use serde::{Deserialize, Serialize};
use std::fmt;

/// Origin of a published stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    /// Primary camera/microphone-sourced stream
    Main,
    /// Screen-share stream
    Screen,
}

/// Media carried by a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    /// Audio samples
    Audio,
    /// Video frames
    Video,
}

/// A publishable unit: one stream kind carrying one media type.
///
/// Each key is independently publishable, mutable, and subscribable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamKey {
    /// Stream origin
    pub kind: StreamKind,
    /// Media type
    pub media: MediaType,
}

impl StreamKey {
    /// Mainstream key for the given media type
    pub fn main(media: MediaType) -> Self {
        Self {
            kind: StreamKind::Main,
            media,
        }
    }

    /// Screen-share key for the given media type
    pub fn screen(media: MediaType) -> Self {
        Self {
            kind: StreamKind::Screen,
            media,
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            StreamKind::Main => "main",
            StreamKind::Screen => "screen",
        };
        let media = match self.media {
            MediaType::Audio => "audio",
            MediaType::Video => "video",
        };
        write!(f, "{}/{}", kind, media)
    }
}

/// One simulcast resolution/bitrate tier offered by a publisher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulcastProfile {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Maximum encoded bitrate in kbps
    pub max_bitrate_kbps: u32,
}

impl SimulcastProfile {
    /// 720p tier
    pub fn high() -> Self {
        Self {
            width: 1280,
            height: 720,
            max_bitrate_kbps: 1800,
        }
    }

    /// 360p tier
    pub fn medium() -> Self {
        Self {
            width: 640,
            height: 360,
            max_bitrate_kbps: 600,
        }
    }

    /// 180p tier
    pub fn low() -> Self {
        Self {
            width: 320,
            height: 180,
            max_bitrate_kbps: 200,
        }
    }

    /// Default three-tier ladder, highest first
    pub fn default_ladder() -> Vec<Self> {
        vec![Self::high(), Self::medium(), Self::low()]
    }
}

/// Publisher-side declaration of fallback eligibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PublishFallbackOption {
    /// Never let subscribers fall back on this stream
    #[default]
    Disabled,
    /// Allow subscribers to drop to lower video tiers under constrained
    /// bandwidth
    AllowVideoFallback,
}

/// Subscriber-side declaration mirroring [`PublishFallbackOption`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SubscribeFallbackOption {
    /// Never fall back on subscribed streams
    #[default]
    Disabled,
    /// Allow the engine to select lower resolution tiers under constrained
    /// bandwidth
    AllowResolutionFallback,
}

/// Relative protection of a remote user's streams under bandwidth pressure.
///
/// Lower-priority remotes are degraded first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum RemoteUserPriority {
    /// Degrade first
    Low,
    /// Default protection
    #[default]
    Medium,
    /// Degrade last
    High,
}

/// How remote publications are subscribed, fixed for the whole session at
/// join time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SubscribeMode {
    /// Subscribe to every remote publication as it is observed
    #[default]
    Automatic,
    /// The application must explicitly subscribe to every remote stream
    Manual,
}

/// Options attached to a local publish call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Simulcast ladder offered to subscribers, highest tier first.
    ///
    /// Empty for audio or single-rendition video.
    pub simulcast: Vec<SimulcastProfile>,
    /// Fallback eligibility declared by the publisher
    pub fallback: PublishFallbackOption,
}

impl PublishConfig {
    /// Simulcast video publication with the default ladder and fallback
    /// allowed
    pub fn simulcast_video() -> Self {
        Self {
            simulcast: SimulcastProfile::default_ladder(),
            fallback: PublishFallbackOption::AllowVideoFallback,
        }
    }
}

/// Effective negotiated parameters of a subscription, reported in the
/// stream-subscribed notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubscribeConfig {
    /// Selected simulcast tier index (0 = highest)
    pub tier: usize,
    /// Priority applied to this remote user at subscribe time
    pub priority: RemoteUserPriority,
}

/// Local publish lifecycle per [`StreamKey`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PublishState {
    /// No subscription slot exists
    #[default]
    Unpublished,
    /// Publish requested, confirmation pending
    Publishing,
    /// Stream admitted and visible to remote peers
    Published,
    /// Teardown requested, confirmation pending
    Unpublishing,
}

/// Remote subscription lifecycle per (user, [`StreamKey`])
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SubscriptionState {
    /// No subscription exists
    #[default]
    NotSubscribed,
    /// Subscription requested; resolution pending (possibly awaiting the
    /// remote's publish announcement)
    Subscribing,
    /// Subscription active
    Subscribed,
    /// Teardown requested
    Unsubscribing,
}
