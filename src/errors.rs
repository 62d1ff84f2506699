//! Crate-wide error type.
//!
//! Mirrors the error-category split used across the grounding crate's own
//! API layers (`ApiError`, `DialogError`): a handful of named variants
//! instead of one opaque string, each carrying the context a caller needs.

use crate::session::SessionStatus;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors surfaced by session operations.
///
/// `InvalidState` and `InvalidArgument` are returned synchronously to the
/// caller of a public operation (§7: "user-induced invalid-state or
/// invalid-argument ... surfaced synchronously ... no session side
/// effect"). The remaining variants describe failures that occur during
/// asynchronous processing and are funneled into a termination cause
/// instead of being returned anywhere.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("operation not allowed in state {current:?}")]
    InvalidState { current: SessionStatus },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("protocol violation: {message}")]
    Protocol { message: String },

    #[error("media negotiation failed: {message}")]
    Media { message: String },

    #[error("timed out waiting for {what}")]
    Timeout { what: String },

    #[error("dialog error: {message}")]
    Dialog { message: String },

    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl SessionError {
    pub fn invalid_state(current: SessionStatus) -> Self {
        SessionError::InvalidState { current }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        SessionError::InvalidArgument { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        SessionError::Internal { message: message.into() }
    }
}
