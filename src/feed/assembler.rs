//! Sticky-first feed assembler

use std::sync::Arc;

use crate::error::{NotFound, Result};
use crate::model::Post;
use crate::store::PostStore;

/// Assembles display feeds from the post store
///
/// Holds no state of its own; every call reads the store as it is at call
/// time.
#[derive(Clone)]
pub struct FeedAssembler {
    posts: Arc<dyn PostStore>,
}

impl FeedAssembler {
    pub fn new(posts: Arc<dyn PostStore>) -> Self {
        Self { posts }
    }

    /// Get the feed for an event
    ///
    /// Returns every sticky post of the event (oldest first, never capped by
    /// `limit`), followed by up to `limit - sticky` of the most recent
    /// non-sticky posts, oldest of that batch first. When the sticky posts
    /// alone reach `limit` nothing else is appended.
    ///
    /// Fails with `NotFound` for an unknown event; an event without posts
    /// yields an empty feed.
    pub async fn get_latest(&self, limit: usize, event_name: &str) -> Result<Vec<Post>> {
        let event = self
            .posts
            .find_event(event_name)
            .await?
            .ok_or_else(|| NotFound::Event(event_name.to_string()))?;

        let mut feed = self.posts.sticky_posts(&event.name).await?;
        let pinned = feed.len();

        let fill = limit.saturating_sub(pinned);
        if fill > 0 {
            let mut recent = self.posts.latest_non_sticky(&event.name, fill).await?;
            recent.reverse();
            feed.extend(recent);
        }

        tracing::debug!(
            event = %event.name,
            limit = limit,
            pinned = pinned,
            total = feed.len(),
            "Feed assembled"
        );

        Ok(feed)
    }
}
