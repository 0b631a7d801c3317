//! Error types
//!
//! A single error enum covers the controller, the stores and the gateway.
//! Routine lookup misses are reported as [`Error::NotFound`] rather than
//! panicking or returning an empty value.

use thiserror::Error;

use crate::model::{PostId, SubscriptionId};
use crate::stream::StreamState;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// What a lookup failed to find
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFound {
    /// No event with this name
    Event(String),
    /// No post with this local id
    Post(PostId),
    /// No subscription with this id
    Track(SubscriptionId),
}

impl std::fmt::Display for NotFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotFound::Event(name) => write!(f, "event '{}'", name),
            NotFound::Post(id) => write!(f, "post {}", id),
            NotFound::Track(id) => write!(f, "track {}", id),
        }
    }
}

/// Error type for wall operations
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Operation is not allowed in the controller's current state
    #[error("cannot {operation} while stream is {state}")]
    InvalidState {
        operation: &'static str,
        state: StreamState,
    },

    /// Lookup miss on an event, post or track
    #[error("not found: {0}")]
    NotFound(NotFound),

    /// Connection refused, auth failure or malformed payload
    #[error("external stream error: {0}")]
    ExternalStream(String),

    /// Persistence failure
    #[error("store error: {0}")]
    Store(String),

    /// Keyword rejected before reaching the track store
    #[error("invalid track keyword: {0:?}")]
    InvalidTrack(String),
}

impl Error {
    pub(crate) fn invalid_state(operation: &'static str, state: StreamState) -> Self {
        Error::InvalidState { operation, state }
    }

    /// Whether this is a lookup miss
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<NotFound> for Error {
    fn from(value: NotFound) -> Self {
        Error::NotFound(value)
    }
}
