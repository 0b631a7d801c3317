//! Track and post storage
//!
//! The wall only needs a small, closed set of typed queries from its
//! persistence layer. They are expressed as two object-safe traits so the
//! controller, the feed assembler and the gateway can share one store behind
//! an `Arc<dyn ...>`.
//!
//! Every mutation must be atomic: a failed write leaves the store as it was.
//! [`MemoryStore`] is the bundled implementation of both traits.

pub mod memory;
pub mod retention;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{Event, NewPost, Post, PostId, Subscription, SubscriptionId};

pub use memory::MemoryStore;
pub use retention::{spawn_retention_task, RetentionConfig};

/// Durable set of tracked keywords
#[async_trait]
pub trait TrackStore: Send + Sync {
    /// All subscriptions, ordered by id
    async fn all_tracks(&self) -> Result<Vec<Subscription>>;

    /// Look up a subscription by id
    async fn get_track(&self, id: SubscriptionId) -> Result<Option<Subscription>>;

    /// Store a new track keyword
    async fn add_track(&self, value: &str) -> Result<Subscription>;

    /// Remove a subscription, returning it if it existed
    async fn remove_track(&self, id: SubscriptionId) -> Result<Option<Subscription>>;
}

/// Durable set of posts, their media and the events they belong to
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Look up an event by its unique name
    async fn find_event(&self, name: &str) -> Result<Option<Event>>;

    /// Create an event, or return the existing one with that name
    async fn add_event(&self, name: &str) -> Result<Event>;

    /// Look up a post by local id
    async fn get_post(&self, id: PostId) -> Result<Option<Post>>;

    /// All posts with their media, ascending by date
    async fn all_posts(&self) -> Result<Vec<Post>>;

    /// Sticky posts of an event, ascending by date
    async fn sticky_posts(&self, event: &str) -> Result<Vec<Post>>;

    /// The `limit` most recent non-sticky posts of an event, descending by date
    async fn latest_non_sticky(&self, event: &str, limit: usize) -> Result<Vec<Post>>;

    /// The post with the greatest date
    async fn last_post(&self) -> Result<Option<Post>>;

    /// Store a post and its media
    ///
    /// Returns `None` if a post with the same external id is already stored.
    /// Fails with `NotFound` if the post's event does not exist.
    async fn add_post(&self, post: NewPost) -> Result<Option<Post>>;

    /// Remove a post and its media, returning it if it existed
    async fn remove_post(&self, id: PostId) -> Result<Option<Post>>;

    /// Flip a post's sticky flag, returning the updated post
    async fn toggle_sticky(&self, id: PostId) -> Result<Option<Post>>;

    /// Remove non-sticky posts dated before `cutoff`; returns how many
    ///
    /// Evicted external ids are still remembered: the same post delivered
    /// again by the source is reported as a duplicate, not stored anew.
    /// `remove_post` forgets the id.
    async fn evict_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}
