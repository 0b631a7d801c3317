//! Viewer session registry
//!
//! Tracks connected viewers and fans events out to them. Every session has a
//! bounded queue; delivery uses `try_send`, so a stalled viewer only loses its
//! own events and never slows the sender down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tokio::sync::{mpsc, RwLock};

use super::message::WallEvent;

/// Opaque session handle
pub type SessionId = u64;

struct SessionEntry {
    tx: mpsc::Sender<WallEvent>,
    joined_at: Instant,
}

/// A joined viewer: its id and the receiving end of its queue
pub struct ViewerSession {
    pub id: SessionId,
    pub events: mpsc::Receiver<WallEvent>,
}

impl ViewerSession {
    /// Receive the next event; `None` after the session was removed
    pub async fn recv(&mut self) -> Option<WallEvent> {
        self.events.recv().await
    }

    /// Take every event already queued, without waiting
    pub fn drain(&mut self) -> Vec<WallEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Outcome of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Sessions that received the event
    pub delivered: u64,
    /// Sessions skipped because their queue was full
    pub skipped_full: u64,
    /// Sessions removed because their receiver was dropped
    pub pruned: u64,
}

/// Summary of a connected session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: SessionId,
    pub connected_for: std::time::Duration,
    pub queued: usize,
}

/// Registry of connected viewer sessions
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
    next_id: AtomicU64,
    buffer: usize,
    max_sessions: usize,
}

impl SessionRegistry {
    /// Create a registry whose sessions queue up to `buffer` events
    pub fn new(buffer: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
            max_sessions: 0,
        }
    }

    /// Limit the number of concurrent sessions (0 = unlimited)
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Register a new session
    ///
    /// Returns `None` if the session limit is reached.
    pub async fn join(&self) -> Option<ViewerSession> {
        let mut sessions = self.sessions.write().await;
        if self.max_sessions > 0 && sessions.len() >= self.max_sessions {
            tracing::warn!(
                max_sessions = self.max_sessions,
                "Viewer rejected: limit reached"
            );
            return None;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);
        sessions.insert(
            id,
            SessionEntry {
                tx,
                joined_at: Instant::now(),
            },
        );

        tracing::info!(session_id = id, sessions = sessions.len(), "Viewer joined");
        Some(ViewerSession { id, events: rx })
    }

    /// Remove a session; returns whether it was registered
    pub async fn leave(&self, id: SessionId) -> bool {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(&id).is_some();
        if removed {
            tracing::info!(session_id = id, sessions = sessions.len(), "Viewer left");
        }
        removed
    }

    /// Number of registered sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session is registered
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Whether a session is registered
    pub async fn contains(&self, id: SessionId) -> bool {
        self.sessions.read().await.contains_key(&id)
    }

    /// Snapshot of all sessions
    pub async fn sessions(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.read().await;
        let mut infos: Vec<SessionInfo> = sessions
            .iter()
            .map(|(id, entry)| SessionInfo {
                id: *id,
                connected_for: entry.joined_at.elapsed(),
                queued: self.buffer - entry.tx.capacity(),
            })
            .collect();
        infos.sort_by_key(|s| s.id);
        infos
    }

    /// Send an event to one session
    ///
    /// Returns `false` if the session is gone or its queue is full.
    pub async fn send_to(&self, id: SessionId, event: WallEvent) -> bool {
        let closed = {
            let sessions = self.sessions.read().await;
            match sessions.get(&id) {
                Some(entry) => match entry.tx.try_send(event) {
                    Ok(()) => return true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::debug!(session_id = id, "Session queue full, event skipped");
                        return false;
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => true,
                },
                None => return false,
            }
        };

        if closed {
            self.prune(&[id]).await;
        }
        false
    }

    /// Send an event to every session
    ///
    /// Never waits on a viewer. Sessions whose receiver was dropped are
    /// removed afterwards.
    pub async fn broadcast(&self, event: &WallEvent) -> Delivery {
        let mut delivery = Delivery::default();
        let mut closed = Vec::new();

        {
            let sessions = self.sessions.read().await;
            for (id, entry) in sessions.iter() {
                match entry.tx.try_send(event.clone()) {
                    Ok(()) => delivery.delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        delivery.skipped_full += 1;
                        tracing::debug!(
                            session_id = *id,
                            event = event.kind(),
                            "Session queue full, event skipped"
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }

        if !closed.is_empty() {
            delivery.pruned = self.prune(&closed).await as u64;
        }

        tracing::trace!(
            event = event.kind(),
            delivered = delivery.delivered,
            skipped = delivery.skipped_full,
            pruned = delivery.pruned,
            "Broadcast"
        );
        delivery
    }

    async fn prune(&self, ids: &[SessionId]) -> usize {
        let mut sessions = self.sessions.write().await;
        let mut removed = 0;
        for id in ids {
            if sessions.remove(id).is_some() {
                removed += 1;
                tracing::debug!(session_id = *id, "Pruned disconnected session");
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamState;

    fn status() -> WallEvent {
        WallEvent::StreamStatus {
            state: StreamState::Running,
        }
    }

    #[tokio::test]
    async fn test_join_leave() {
        let registry = SessionRegistry::new(8);

        let a = registry.join().await.unwrap();
        let b = registry.join().await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(registry.len().await, 2);

        assert!(registry.leave(a.id).await);
        assert!(!registry.leave(a.id).await);
        assert!(!registry.contains(a.id).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all() {
        let registry = SessionRegistry::new(8);
        let mut sessions = vec![
            registry.join().await.unwrap(),
            registry.join().await.unwrap(),
            registry.join().await.unwrap(),
        ];

        let delivery = registry.broadcast(&status()).await;
        assert_eq!(delivery.delivered, 3);

        for session in sessions.iter_mut() {
            assert_eq!(session.drain(), vec![status()]);
        }
    }

    #[tokio::test]
    async fn test_full_queue_is_skipped() {
        let registry = SessionRegistry::new(1);
        let mut slow = registry.join().await.unwrap();
        let mut fast = registry.join().await.unwrap();

        registry.broadcast(&status()).await;
        fast.drain();

        let delivery = registry.broadcast(&status()).await;
        assert_eq!(delivery.delivered, 1);
        assert_eq!(delivery.skipped_full, 1);

        // The slow session keeps its place and only lost the second event
        assert!(registry.contains(slow.id).await);
        assert_eq!(slow.drain().len(), 1);
        assert_eq!(fast.drain().len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_pruned() {
        let registry = SessionRegistry::new(8);
        let gone = registry.join().await.unwrap();
        let _kept = registry.join().await.unwrap();
        let gone_id = gone.id;
        drop(gone);

        let delivery = registry.broadcast(&status()).await;
        assert_eq!(delivery.delivered, 1);
        assert_eq!(delivery.pruned, 1);
        assert!(!registry.contains(gone_id).await);
    }

    #[tokio::test]
    async fn test_send_to_single_session() {
        let registry = SessionRegistry::new(8);
        let mut a = registry.join().await.unwrap();
        let mut b = registry.join().await.unwrap();

        assert!(registry.send_to(a.id, status()).await);
        assert!(!registry.send_to(999, status()).await);

        assert_eq!(a.drain().len(), 1);
        assert!(b.drain().is_empty());
    }

    #[tokio::test]
    async fn test_sessions_snapshot() {
        let registry = SessionRegistry::new(4);
        let a = registry.join().await.unwrap();
        registry.broadcast(&status()).await;

        let infos = registry.sessions().await;
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].id, a.id);
        assert_eq!(infos[0].queued, 1);
    }

    #[tokio::test]
    async fn test_session_limit() {
        let registry = SessionRegistry::new(4).with_max_sessions(2);
        let a = registry.join().await.unwrap();
        let _b = registry.join().await.unwrap();
        assert!(registry.join().await.is_none());

        registry.leave(a.id).await;
        assert!(registry.join().await.is_some());
    }
}
