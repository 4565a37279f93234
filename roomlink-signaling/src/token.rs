//! Pluggable access-token validation.
//!
//! Tokens are opaque strings checked at the server boundary; the switchboard
//! never fails a join synchronously on a bad token, it reports the check
//! result through the asynchronous join outcome instead.

use roomlink_core::codes;
use std::sync::Arc;

/// Result of validating an access token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCheck {
    /// Token accepted
    Valid,
    /// Token was once valid but has expired; a token update can recover
    Expired,
    /// Token rejected outright
    Invalid,
}

impl TokenCheck {
    /// Whether the token was accepted
    pub fn is_valid(&self) -> bool {
        matches!(self, TokenCheck::Valid)
    }

    /// Status code carried in a room state-changed notification
    pub fn join_code(&self) -> i32 {
        match self {
            TokenCheck::Valid => codes::OK,
            TokenCheck::Expired => codes::JOIN_TOKEN_EXPIRED,
            TokenCheck::Invalid => codes::JOIN_TOKEN_INVALID,
        }
    }

    /// Status code carried in a login result notification
    pub fn login_code(&self) -> i32 {
        match self {
            TokenCheck::Valid => codes::OK,
            TokenCheck::Expired => codes::LOGIN_TOKEN_EXPIRED,
            TokenCheck::Invalid => codes::LOGIN_TOKEN_INVALID,
        }
    }
}

/// Server-side token check, injected into the switchboard
pub type TokenValidator = Arc<dyn Fn(&str) -> TokenCheck + Send + Sync>;

/// Default validator: any non-empty token is accepted
pub fn accept_non_empty() -> TokenValidator {
    Arc::new(|token: &str| {
        if token.is_empty() {
            TokenCheck::Invalid
        } else {
            TokenCheck::Valid
        }
    })
}
