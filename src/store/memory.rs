//! In-memory store
//!
//! Implements both [`TrackStore`] and [`PostStore`] over plain collections
//! behind a single `RwLock`. Each mutation takes the write lock once, so it is
//! applied completely or not at all.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{PostStore, TrackStore};
use crate::error::{NotFound, Result};
use crate::model::{Event, MediaUrl, NewPost, Post, PostId, Subscription, SubscriptionId};

#[derive(Default)]
struct Tables {
    events: HashMap<String, Event>,
    posts: BTreeMap<PostId, Post>,
    external_ids: HashSet<String>,
    tracks: BTreeMap<SubscriptionId, Subscription>,
    next_event_id: i64,
    next_post_id: i64,
    next_media_id: i64,
    next_track_id: i64,
}

impl Tables {
    fn next(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }

    /// Posts of an event matching `sticky`, ascending by (date, id)
    fn event_posts(&self, event: &str, sticky: bool) -> Vec<&Post> {
        let mut posts: Vec<&Post> = self
            .posts
            .values()
            .filter(|p| p.sticky == sticky && p.event == event)
            .collect();
        posts.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
        posts
    }
}

/// Store holding everything in process memory
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    /// Create a store with the given events already present
    pub async fn with_events(names: &[&str]) -> Self {
        let store = Self::new();
        {
            let mut tables = store.tables.write().await;
            for name in names {
                let id = Tables::next(&mut tables.next_event_id);
                tables
                    .events
                    .insert((*name).to_string(), Event::new(id, *name));
            }
        }
        store
    }

    /// Number of stored posts
    pub async fn post_count(&self) -> usize {
        self.tables.read().await.posts.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackStore for MemoryStore {
    async fn all_tracks(&self) -> Result<Vec<Subscription>> {
        Ok(self.tables.read().await.tracks.values().cloned().collect())
    }

    async fn get_track(&self, id: SubscriptionId) -> Result<Option<Subscription>> {
        Ok(self.tables.read().await.tracks.get(&id).cloned())
    }

    async fn add_track(&self, value: &str) -> Result<Subscription> {
        let mut tables = self.tables.write().await;
        let id = Tables::next(&mut tables.next_track_id);
        let subscription = Subscription::track(id, value);
        tables.tracks.insert(id, subscription.clone());
        Ok(subscription)
    }

    async fn remove_track(&self, id: SubscriptionId) -> Result<Option<Subscription>> {
        Ok(self.tables.write().await.tracks.remove(&id))
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn find_event(&self, name: &str) -> Result<Option<Event>> {
        Ok(self.tables.read().await.events.get(name).cloned())
    }

    async fn add_event(&self, name: &str) -> Result<Event> {
        let mut tables = self.tables.write().await;
        if let Some(event) = tables.events.get(name) {
            return Ok(event.clone());
        }
        let id = Tables::next(&mut tables.next_event_id);
        let event = Event::new(id, name);
        tables.events.insert(name.to_string(), event.clone());
        Ok(event)
    }

    async fn get_post(&self, id: PostId) -> Result<Option<Post>> {
        Ok(self.tables.read().await.posts.get(&id).cloned())
    }

    async fn all_posts(&self) -> Result<Vec<Post>> {
        let tables = self.tables.read().await;
        let mut posts: Vec<Post> = tables.posts.values().cloned().collect();
        posts.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
        Ok(posts)
    }

    async fn sticky_posts(&self, event: &str) -> Result<Vec<Post>> {
        let tables = self.tables.read().await;
        Ok(tables.event_posts(event, true).into_iter().cloned().collect())
    }

    async fn latest_non_sticky(&self, event: &str, limit: usize) -> Result<Vec<Post>> {
        let tables = self.tables.read().await;
        Ok(tables
            .event_posts(event, false)
            .into_iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn last_post(&self) -> Result<Option<Post>> {
        let tables = self.tables.read().await;
        Ok(tables
            .posts
            .values()
            .max_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)))
            .cloned())
    }

    async fn add_post(&self, post: NewPost) -> Result<Option<Post>> {
        let mut tables = self.tables.write().await;

        if !tables.events.contains_key(&post.event) {
            return Err(NotFound::Event(post.event).into());
        }
        if tables.external_ids.contains(&post.external_id) {
            return Ok(None);
        }

        let id = Tables::next(&mut tables.next_post_id);
        let mut media = Vec::with_capacity(post.media_urls.len());
        for url in post.media_urls {
            let media_id = Tables::next(&mut tables.next_media_id);
            media.push(MediaUrl {
                id: media_id,
                url,
                post_id: id,
            });
        }

        let stored = Post {
            id,
            external_id: post.external_id,
            body: post.body,
            author_handle: post.author_handle,
            author_name: post.author_name,
            author_avatar_url: post.author_avatar_url,
            date: post.date,
            sticky: false,
            event: post.event,
            media,
        };

        tables.external_ids.insert(stored.external_id.clone());
        tables.posts.insert(id, stored.clone());
        Ok(Some(stored))
    }

    async fn remove_post(&self, id: PostId) -> Result<Option<Post>> {
        let mut tables = self.tables.write().await;
        let removed = tables.posts.remove(&id);
        if let Some(ref post) = removed {
            tables.external_ids.remove(&post.external_id);
        }
        Ok(removed)
    }

    async fn toggle_sticky(&self, id: PostId) -> Result<Option<Post>> {
        let mut tables = self.tables.write().await;
        Ok(tables.posts.get_mut(&id).map(|post| {
            post.sticky = !post.sticky;
            post.clone()
        }))
    }

    async fn evict_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut tables = self.tables.write().await;

        let expired: Vec<PostId> = tables
            .posts
            .values()
            .filter(|p| !p.sticky && p.date < cutoff)
            .map(|p| p.id)
            .collect();

        // External ids stay behind so a redelivered post is still a duplicate
        for id in &expired {
            tables.posts.remove(id);
        }

        Ok(expired.len())
    }
}
