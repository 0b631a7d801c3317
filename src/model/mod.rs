//! Wall data model
//!
//! Events own posts, posts own their media, and the track store owns
//! subscriptions. All types serialize to JSON for the viewer push channel.

pub mod event;
pub mod post;
pub mod subscription;

pub use event::{Event, EventId};
pub use post::{MediaUrl, NewPost, Post, PostId};
pub use subscription::{Subscription, SubscriptionId, SubscriptionKind};
