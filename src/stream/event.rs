//! Events published by the stream controller

use super::state::StreamState;
use crate::model::Post;

/// Notification from the stream controller
///
/// Delivered on a broadcast channel; the gateway relays them to viewers.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Lifecycle transition
    StateChanged { from: StreamState, to: StreamState },

    /// A post was received and stored
    NewPost(Post),

    /// The connection dropped without a stop request
    ConnectionLost,

    /// Opening the connection failed; the controller is stopped
    StartFailed(String),
}
