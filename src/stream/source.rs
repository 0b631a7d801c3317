//! External stream source capability
//!
//! The controller only needs three things from the social network client:
//! open a filtered subscription, receive raw posts from it, and close it.
//! Transport and authentication stay behind [`StreamSource`].

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, watch};

use super::state::ConnectionState;
use crate::error::Result;

/// Filter applied to the external stream
///
/// Matches a post if it contains any tracked keyword or comes from any
/// followed account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamFilter {
    /// Tracked keywords
    pub tracks: Vec<String>,
    /// Followed account ids/handles
    pub follow: Vec<String>,
}

impl StreamFilter {
    /// Whether the filter matches nothing at all
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty() && self.follow.is_empty()
    }
}

impl std::fmt::Display for StreamFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "track=[{}] follow=[{}]",
            self.tracks.join(","),
            self.follow.join(",")
        )
    }
}

/// Handle to an open subscription
///
/// Raw payloads arrive on `posts`; the source reports its connection state
/// on `state`. Dropping the handle or calling [`SourceHandle::stop`] tells the
/// source to close.
pub struct SourceHandle {
    posts: mpsc::Receiver<Bytes>,
    state: watch::Receiver<ConnectionState>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl SourceHandle {
    /// Build a handle from the source's channel ends
    ///
    /// The source must close the connection when `shutdown` fires or its
    /// sender is dropped, and publish `ConnectionState::Stopped` afterwards.
    pub fn new(
        posts: mpsc::Receiver<Bytes>,
        state: watch::Receiver<ConnectionState>,
        shutdown: oneshot::Sender<()>,
    ) -> Self {
        Self {
            posts,
            state,
            shutdown: Some(shutdown),
        }
    }

    /// Connection state as last reported by the source
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch channel for connection state changes
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Receive the next raw post; `None` once the source closed
    pub async fn next_post(&mut self) -> Option<Bytes> {
        self.posts.recv().await
    }

    /// Ask the source to close the connection
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }

    pub(crate) fn split(
        self,
    ) -> (
        mpsc::Receiver<Bytes>,
        watch::Receiver<ConnectionState>,
        Option<oneshot::Sender<()>>,
    ) {
        (self.posts, self.state, self.shutdown)
    }
}

/// A filtered post stream that can be subscribed to
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Open a subscription for `filter`
    ///
    /// Should return as soon as the open request is issued; confirmation is
    /// reported through the handle's connection state. Fails with
    /// `ExternalStream` if the request is refused outright.
    async fn subscribe(&self, filter: &StreamFilter) -> Result<SourceHandle>;
}
