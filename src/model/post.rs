//! Posts and their media attachments

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Local identity of a stored post
pub type PostId = i64;

/// A media attachment owned by a post
///
/// Removed together with its post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaUrl {
    pub id: i64,
    pub url: String,
    /// Owning post
    #[serde(skip_serializing)]
    #[serde(default)]
    pub post_id: PostId,
}

/// A post that has been accepted into the post store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Local identity
    pub id: PostId,

    /// Source platform's id, unique across the store
    pub external_id: String,

    pub body: String,

    pub author_handle: String,

    pub author_name: String,

    pub author_avatar_url: String,

    /// Creation time on the source platform; used for ordering
    pub date: DateTime<Utc>,

    /// Pinned to the top of the feed
    pub sticky: bool,

    /// Name of the owning event
    pub event: String,

    /// Attachments in source order
    pub media: Vec<MediaUrl>,
}

/// A post that has not been stored yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub external_id: String,
    pub body: String,
    pub author_handle: String,
    pub author_name: String,
    pub author_avatar_url: String,
    pub date: DateTime<Utc>,
    pub event: String,
    pub media_urls: Vec<String>,
}

impl NewPost {
    /// Create a text-only post for an event
    ///
    /// Author fields default to the handle; use the builder methods to fill
    /// in the rest.
    pub fn new(
        external_id: impl Into<String>,
        author_handle: impl Into<String>,
        body: impl Into<String>,
        date: DateTime<Utc>,
        event: impl Into<String>,
    ) -> Self {
        let author_handle = author_handle.into();
        Self {
            external_id: external_id.into(),
            body: body.into(),
            author_name: author_handle.clone(),
            author_handle,
            author_avatar_url: String::new(),
            date,
            event: event.into(),
            media_urls: Vec::new(),
        }
    }

    /// Set the author's display name
    pub fn author_name(mut self, name: impl Into<String>) -> Self {
        self.author_name = name.into();
        self
    }

    /// Set the author's avatar URL
    pub fn avatar(mut self, url: impl Into<String>) -> Self {
        self.author_avatar_url = url.into();
        self
    }

    /// Append a media attachment
    pub fn media(mut self, url: impl Into<String>) -> Self {
        self.media_urls.push(url.into());
        self
    }
}
