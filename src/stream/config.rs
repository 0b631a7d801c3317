//! Stream controller configuration

use std::time::Duration;

/// Stream controller configuration options
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Event that inbound posts are attached to
    pub event_name: String,

    /// Accounts always followed in addition to tracked keywords
    ///
    /// With no tracks and no default follows the controller follows nothing.
    pub default_follow: Vec<String>,

    /// Maximum time to wait for the ingest task to finish on stop
    pub stop_timeout: Duration,

    /// Capacity of the controller event broadcast channel
    pub event_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            event_name: "default".to_string(),
            default_follow: Vec::new(),
            stop_timeout: Duration::from_secs(5),
            event_capacity: 1024,
        }
    }
}

impl ControllerConfig {
    /// Create a config for the given event
    pub fn for_event(event_name: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
            ..Default::default()
        }
    }

    /// Add an account to the default follow-list
    pub fn follow(mut self, account: impl Into<String>) -> Self {
        self.default_follow.push(account.into());
        self
    }

    /// Set the stop timeout
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Set the event channel capacity
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}
