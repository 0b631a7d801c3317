//! Viewer wire messages
//!
//! Both directions are JSON objects tagged by `type`, with the payload under
//! `data`.

use serde::{Deserialize, Serialize};

use crate::model::{Post, PostId, Subscription, SubscriptionId};
use crate::stream::StreamState;

/// Event pushed to viewers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum WallEvent {
    /// A post was received and stored
    NewPost { post: Post },

    /// The full current track list
    Tracks { tracks: Vec<Subscription> },

    /// A post's sticky flag changed
    StickyChanged { post_id: PostId, sticky: bool },

    /// Stream controller status
    StreamStatus { state: StreamState },

    /// Feed requested by this session
    Feed { event: String, posts: Vec<Post> },
}

impl WallEvent {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            WallEvent::NewPost { .. } => "new_post",
            WallEvent::Tracks { .. } => "tracks",
            WallEvent::StickyChanged { .. } => "sticky_changed",
            WallEvent::StreamStatus { .. } => "stream_status",
            WallEvent::Feed { .. } => "feed",
        }
    }

    /// Encode as a JSON text frame
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Command sent by a viewer
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ViewerCommand {
    /// Track a new keyword
    AddTrack { keyword: String },

    /// Stop tracking a keyword
    RemoveTrack { id: SubscriptionId },

    /// Pin or unpin a post
    ToggleSticky { id: PostId },

    /// Restart the stream with the current tracks
    RequestRestart,

    /// Re-broadcast the track list
    RequestTracks,

    /// Send this session the feed of an event
    RequestFeed {
        event: String,
        #[serde(default)]
        limit: Option<usize>,
    },

    /// Send this session the stream status
    RequestStatus,
}

impl ViewerCommand {
    /// Decode a JSON text frame
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
