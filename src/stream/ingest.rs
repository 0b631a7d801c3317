//! Inbound post path
//!
//! Every raw payload from the source goes through [`Ingestor::on_post`]:
//! parse, attach to the configured event, store, notify. Failures are logged
//! and counted here and never leave this module.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use super::event::StreamEvent;
use super::payload::parse_post;
use super::state::ConnectionState;
use crate::model::Post;
use crate::stats::IngestStats;
use crate::store::PostStore;

/// Why an ingest loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IngestExit {
    /// The controller asked it to stop
    Stopped,
    /// The source closed or reported the connection stopped
    ConnectionLost,
}

/// Maps raw payloads to stored posts
pub(crate) struct Ingestor {
    event_name: String,
    posts: Arc<dyn PostStore>,
    events: broadcast::Sender<StreamEvent>,
    stats: Arc<IngestStats>,
}

impl Ingestor {
    pub(crate) fn new(
        event_name: String,
        posts: Arc<dyn PostStore>,
        events: broadcast::Sender<StreamEvent>,
        stats: Arc<IngestStats>,
    ) -> Self {
        Self {
            event_name,
            posts,
            events,
            stats,
        }
    }

    /// Handle one raw payload
    ///
    /// Returns the stored post, or `None` if the payload was dropped.
    pub(crate) async fn on_post(&self, raw: &[u8]) -> Option<Post> {
        self.stats.on_received();

        let new_post = match parse_post(raw, &self.event_name) {
            Ok(post) => post,
            Err(e) => {
                self.stats.on_malformed();
                tracing::warn!(error = %e, len = raw.len(), "Dropping malformed post");
                return None;
            }
        };

        let external_id = new_post.external_id.clone();
        match self.posts.add_post(new_post).await {
            Ok(Some(post)) => {
                self.stats.on_stored();
                tracing::debug!(
                    post_id = post.id,
                    external_id = %post.external_id,
                    author = %post.author_handle,
                    "Post stored"
                );
                // No receivers is fine: nobody is watching yet
                let _ = self.events.send(StreamEvent::NewPost(post.clone()));
                Some(post)
            }
            Ok(None) => {
                self.stats.on_duplicate();
                tracing::debug!(external_id = %external_id, "Duplicate post ignored");
                None
            }
            Err(e) => {
                self.stats.on_store_failure();
                tracing::warn!(
                    external_id = %external_id,
                    event = %self.event_name,
                    error = %e,
                    "Failed to store post"
                );
                None
            }
        }
    }
}

/// Drain a subscription until stopped or the connection ends
///
/// The stop signal is polled first, so once it fires no further payload
/// from this subscription is processed.
pub(crate) async fn run(
    ingestor: Arc<Ingestor>,
    mut posts: mpsc::Receiver<Bytes>,
    mut state: watch::Receiver<ConnectionState>,
    mut stop: oneshot::Receiver<()>,
) -> IngestExit {
    if *state.borrow_and_update() == ConnectionState::Stopped {
        return IngestExit::ConnectionLost;
    }

    loop {
        tokio::select! {
            biased;

            _ = &mut stop => return IngestExit::Stopped,

            changed = state.changed() => {
                if changed.is_err() || *state.borrow_and_update() == ConnectionState::Stopped {
                    return IngestExit::ConnectionLost;
                }
            }

            raw = posts.recv() => match raw {
                Some(raw) => {
                    ingestor.on_post(&raw).await;
                }
                None => return IngestExit::ConnectionLost,
            },
        }
    }
}
