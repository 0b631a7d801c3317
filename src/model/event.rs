//! Named walls (events)

use serde::{Deserialize, Serialize};

/// Local identity of an event
pub type EventId = i64;

/// A named wall/channel that posts are attached to
///
/// Created administratively and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    /// Unique name used for lookups
    pub name: String,
}

impl Event {
    pub fn new(id: EventId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}
