//! Tracked keyword subscriptions

use serde::{Deserialize, Serialize};

/// Identity of a subscription in the track store
pub type SubscriptionId = i64;

/// Kind of subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionKind {
    /// Keyword tracked by the filtered stream
    Track,
}

impl std::fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionKind::Track => write!(f, "Track"),
        }
    }
}

/// A tracked keyword
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    /// Keyword text handed to the stream filter
    pub value: String,
    pub kind: SubscriptionKind,
}

impl Subscription {
    /// Create a track subscription
    pub fn track(id: SubscriptionId, value: impl Into<String>) -> Self {
        Self {
            id,
            value: value.into(),
            kind: SubscriptionKind::Track,
        }
    }
}
