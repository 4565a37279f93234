//! Room and user identifiers with validated construction

use crate::error::RoomlinkError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum identifier length in bytes
pub const MAX_ID_BYTES: usize = 128;

/// Delivery-tracking identifier for sent messages.
///
/// Assigned per channel, monotonically increasing from 1. Negative values
/// never occur on successfully submitted messages.
pub type MessageId = i64;

fn validate(kind: &'static str, raw: &str) -> Result<(), RoomlinkError> {
    if raw.is_empty() || raw.len() > MAX_ID_BYTES {
        return Err(RoomlinkError::MalformedId {
            kind: kind.to_string(),
            value: raw.to_string(),
            reason: format!("length must be 1..={} bytes, got {}", MAX_ID_BYTES, raw.len()),
        });
    }
    if let Some(bad) = raw
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '@' | '-')))
    {
        return Err(RoomlinkError::MalformedId {
            kind: kind.to_string(),
            value: raw.to_string(),
            reason: format!("character {:?} outside [A-Za-z0-9_@-]", bad),
        });
    }
    Ok(())
}

/// Identifier of a room, unique per application credential
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Validate and construct a room identifier
    pub fn new(raw: impl Into<String>) -> Result<Self, RoomlinkError> {
        let raw = raw.into();
        validate("room_id", &raw)?;
        Ok(Self(raw))
    }

    /// Identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a participant, unique within (credential, room)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Validate and construct a user identifier
    pub fn new(raw: impl Into<String>) -> Result<Self, RoomlinkError> {
        let raw = raw.into();
        validate("user_id", &raw)?;
        Ok(Self(raw))
    }

    /// Identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
