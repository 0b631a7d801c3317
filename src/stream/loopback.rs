//! In-process stream source
//!
//! [`LoopbackSource`] implements [`StreamSource`] without any network: the
//! embedding application pushes raw payloads into the current subscription.
//! Used for replaying captured streams, for demos and for tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, watch};

use super::source::{SourceHandle, StreamFilter, StreamSource};
use super::state::ConnectionState;
use crate::error::{Error, Result};

/// Capacity of the per-subscription payload channel
const POST_CHANNEL_CAPACITY: usize = 256;

struct Link {
    id: u64,
    filter: StreamFilter,
    posts: mpsc::Sender<Bytes>,
    state: watch::Sender<ConnectionState>,
}

#[derive(Default)]
struct Inner {
    link: Option<Link>,
    history: Vec<StreamFilter>,
    refuse_next: Option<String>,
    next_id: u64,
}

/// Stream source fed by the application
///
/// Cloning shares the same source, so one clone can be handed to the
/// controller while another pushes payloads.
#[derive(Clone, Default)]
pub struct LoopbackSource {
    inner: Arc<Mutex<Inner>>,
}

impl LoopbackSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock only means a pusher panicked; the data is still usable
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Push a raw payload into the open subscription
    ///
    /// Returns `false` if no subscription is open.
    pub async fn push(&self, payload: impl Into<Bytes>) -> bool {
        let tx = match self.lock().link.as_ref() {
            Some(link) => link.posts.clone(),
            None => return false,
        };
        tx.send(payload.into()).await.is_ok()
    }

    /// Push a JSON payload into the open subscription
    pub async fn push_json(&self, value: &serde_json::Value) -> bool {
        self.push(value.to_string()).await
    }

    /// Simulate the remote end dropping the connection
    pub fn drop_connection(&self) {
        if let Some(link) = self.lock().link.take() {
            tracing::info!(link = link.id, "Loopback connection dropped");
            let _ = link.state.send(ConnectionState::Stopped);
        }
    }

    /// Make the next `subscribe` fail with `reason`
    pub fn refuse_next(&self, reason: impl Into<String>) {
        self.lock().refuse_next = Some(reason.into());
    }

    /// Whether a subscription is currently open
    pub fn is_connected(&self) -> bool {
        self.lock().link.is_some()
    }

    /// Filter of the open subscription
    pub fn active_filter(&self) -> Option<StreamFilter> {
        self.lock().link.as_ref().map(|l| l.filter.clone())
    }

    /// Every filter ever subscribed with, oldest first
    pub fn history(&self) -> Vec<StreamFilter> {
        self.lock().history.clone()
    }
}

#[async_trait]
impl StreamSource for LoopbackSource {
    async fn subscribe(&self, filter: &StreamFilter) -> Result<SourceHandle> {
        let (posts_tx, posts_rx) = mpsc::channel(POST_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let id = {
            let mut inner = self.lock();
            if let Some(reason) = inner.refuse_next.take() {
                return Err(Error::ExternalStream(reason));
            }
            inner.next_id += 1;
            let id = inner.next_id;
            inner.history.push(filter.clone());
            inner.link = Some(Link {
                id,
                filter: filter.clone(),
                posts: posts_tx,
                state: state_tx.clone(),
            });
            id
        };

        tracing::debug!(link = id, filter = %filter, "Loopback subscription opened");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            // A drop_connection() may already have won the race
            state_tx.send_if_modified(|state| {
                if *state == ConnectionState::Connecting {
                    *state = ConnectionState::Running;
                    true
                } else {
                    false
                }
            });

            // Fires on stop() or when the handle is dropped
            let _ = shutdown_rx.await;

            let mut guard = inner.lock().unwrap_or_else(|e| e.into_inner());
            if guard.link.as_ref().map(|l| l.id) == Some(id) {
                guard.link = None;
            }
            drop(guard);

            let _ = state_tx.send(ConnectionState::Stopped);
            tracing::debug!(link = id, "Loopback subscription closed");
        });

        Ok(SourceHandle::new(posts_rx, state_rx, shutdown_tx))
    }
}
