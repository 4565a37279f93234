//! Message payloads and pre-send size enforcement

use bytes::Bytes;
use roomlink_core::RoomlinkError;

/// Size cap for text messages, enforced before an ID is assigned
pub const MAX_TEXT_MESSAGE_BYTES: usize = 62 * 1024;

/// Size cap for binary messages, enforced before an ID is assigned
pub const MAX_BINARY_MESSAGE_BYTES: usize = 46 * 1024;

/// Body of an in-room or out-of-room message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePayload {
    /// UTF-8 text body
    Text(String),
    /// Opaque binary body
    Binary(Bytes),
}

impl MessagePayload {
    /// Text payload from anything string-like
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text(body.into())
    }

    /// Binary payload
    pub fn binary(body: impl Into<Bytes>) -> Self {
        Self::Binary(body.into())
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        match self {
            MessagePayload::Text(s) => s.len(),
            MessagePayload::Binary(b) => b.len(),
        }
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Payload kind as a string (`text`, `binary`)
    pub fn kind(&self) -> &'static str {
        match self {
            MessagePayload::Text(_) => "text",
            MessagePayload::Binary(_) => "binary",
        }
    }

    /// Size cap applying to this payload kind
    pub fn size_limit(&self) -> usize {
        match self {
            MessagePayload::Text(_) => MAX_TEXT_MESSAGE_BYTES,
            MessagePayload::Binary(_) => MAX_BINARY_MESSAGE_BYTES,
        }
    }

    /// Enforce the per-kind size cap.
    ///
    /// Called before a message ID is assigned; an oversize payload fails the
    /// send synchronously and consumes no ID.
    pub fn validate(&self) -> Result<(), RoomlinkError> {
        let size = self.len();
        let limit = self.size_limit();
        if size > limit {
            return Err(RoomlinkError::MessageTooLarge {
                kind: self.kind().to_string(),
                size,
                limit,
            });
        }
        Ok(())
    }
}
