//! Stream controller state machine
//!
//! ```text
//!  Unconfigured ──configure──► Configured ──start──► Running
//!                                  ▲                  │   ▲
//!                                  │        stop/drop │   │ start
//!                                  │                  ▼   │
//!                                  └───configure─── Stopped
//! ```
//!
//! `Restarting` is transient: it is reported by `status()` while a
//! stop/configure/start sequence holds the controller.

use serde::{Deserialize, Serialize};

/// Lifecycle state of the stream controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    /// No filter has been built yet
    Unconfigured,
    /// Filter built, no connection open
    Configured,
    /// Connection requested or open
    Running,
    /// Connection closed, by request or because it dropped
    Stopped,
    /// A restart is in progress
    Restarting,
}

impl StreamState {
    /// Whether `start()` is allowed from this state
    pub fn can_start(self) -> bool {
        matches!(self, StreamState::Configured | StreamState::Stopped)
    }
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StreamState::Unconfigured => "unconfigured",
            StreamState::Configured => "configured",
            StreamState::Running => "running",
            StreamState::Stopped => "stopped",
            StreamState::Restarting => "restarting",
        };
        f.write_str(s)
    }
}

/// State of the external connection as reported by the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Open request issued, not yet confirmed
    Connecting,
    /// Source confirmed the connection
    Running,
    /// Connection closed or dropped
    Stopped,
}
