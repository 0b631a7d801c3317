//! Broadcast gateway
//!
//! Entry point for viewer commands and the single place that pushes state to
//! viewers. After every mutation the resulting canonical state is broadcast to
//! all sessions, not only to the one that asked: the wall is a shared display
//! and every screen shows the same thing.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;

use super::config::GatewayConfig;
use super::message::{ViewerCommand, WallEvent};
use super::registry::{Delivery, SessionId, SessionRegistry, ViewerSession};
use crate::error::{Error, NotFound, Result};
use crate::feed::FeedAssembler;
use crate::model::{Post, PostId, Subscription};
use crate::stats::GatewayStats;
use crate::store::PostStore;
use crate::stream::{StreamController, StreamEvent, StreamState};

/// Fans wall state out to connected viewers and executes their commands
pub struct BroadcastGateway {
    config: GatewayConfig,
    controller: Arc<StreamController>,
    posts: Arc<dyn PostStore>,
    feed: FeedAssembler,
    registry: SessionRegistry,
    stats: GatewayStats,
    /// Held across a mutation and the broadcast of its result, so viewers
    /// receive state updates in the order the mutations were applied
    commands: Mutex<()>,
}

impl BroadcastGateway {
    pub fn new(
        config: GatewayConfig,
        controller: Arc<StreamController>,
        posts: Arc<dyn PostStore>,
    ) -> Self {
        Self {
            registry: SessionRegistry::new(config.session_buffer)
                .with_max_sessions(config.max_sessions),
            feed: FeedAssembler::new(Arc::clone(&posts)),
            config,
            controller,
            posts,
            stats: GatewayStats::new(),
            commands: Mutex::new(()),
        }
    }

    /// Get the gateway configuration
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Get the session registry
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Fan-out counters
    pub fn stats(&self) -> &GatewayStats {
        &self.stats
    }

    /// Register a viewer
    ///
    /// Returns `None` if `max_sessions` is reached. A new session receives
    /// only events fired after it joined; it pulls the current tracks and
    /// feed with `RequestTracks` / `RequestFeed`.
    pub async fn join(&self) -> Option<ViewerSession> {
        self.registry.join().await
    }

    /// Unregister a viewer
    pub async fn leave(&self, id: SessionId) {
        self.registry.leave(id).await;
    }

    /// Number of connected viewers
    pub async fn session_count(&self) -> usize {
        self.registry.len().await
    }

    /// Execute a viewer command
    ///
    /// Failures are returned to the caller only; nothing is broadcast for a
    /// command that changed nothing.
    pub async fn handle_command(&self, session: SessionId, command: ViewerCommand) -> Result<()> {
        tracing::debug!(session_id = session, command = ?command, "Viewer command");

        let result = match command {
            ViewerCommand::AddTrack { keyword } => {
                let _guard = self.commands.lock().await;
                let result = self.controller.add_track(&keyword).await.map(|_| ());
                self.after_track_change(result).await
            }
            ViewerCommand::RemoveTrack { id } => {
                let _guard = self.commands.lock().await;
                let result = self.controller.remove_track(id).await.map(|_| ());
                self.after_track_change(result).await
            }
            ViewerCommand::ToggleSticky { id } => self.toggle_sticky(id).await.map(|_| ()),
            ViewerCommand::RequestRestart => {
                let _guard = self.commands.lock().await;
                let result = self.controller.restart().await;
                // Start failures reach viewers through the relay
                if !matches!(result, Err(Error::ExternalStream(_))) {
                    self.broadcast_status(self.controller.status()).await;
                }
                result
            }
            ViewerCommand::RequestTracks => {
                let _guard = self.commands.lock().await;
                self.publish_tracks().await
            }
            ViewerCommand::RequestFeed { event, limit } => {
                let limit = limit.unwrap_or(self.config.default_feed_limit);
                match self.feed.get_latest(limit, &event).await {
                    Ok(posts) => {
                        self.registry
                            .send_to(session, WallEvent::Feed { event, posts })
                            .await;
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
            ViewerCommand::RequestStatus => {
                let state = self.controller.status();
                self.registry
                    .send_to(session, WallEvent::StreamStatus { state })
                    .await;
                Ok(())
            }
        };

        self.stats.on_command(result.is_ok());
        if let Err(ref e) = result {
            tracing::warn!(session_id = session, error = %e, "Viewer command failed");
        }
        result
    }

    /// Flip a post's sticky flag and announce it
    pub async fn toggle_sticky(&self, id: PostId) -> Result<Post> {
        let _guard = self.commands.lock().await;
        let post = self
            .posts
            .toggle_sticky(id)
            .await?
            .ok_or(NotFound::Post(id))?;

        tracing::info!(post_id = id, sticky = post.sticky, "Sticky toggled");
        self.broadcast_sticky_changed(post.id, post.sticky).await;
        Ok(post)
    }

    /// Push a new post to every viewer
    pub async fn broadcast_new_post(&self, post: Post) -> Delivery {
        self.broadcast(WallEvent::NewPost { post }).await
    }

    /// Push the track list to every viewer
    pub async fn broadcast_tracks(&self, tracks: Vec<Subscription>) -> Delivery {
        self.broadcast(WallEvent::Tracks { tracks }).await
    }

    /// Push a sticky change to every viewer
    pub async fn broadcast_sticky_changed(&self, post_id: PostId, sticky: bool) -> Delivery {
        self.broadcast(WallEvent::StickyChanged { post_id, sticky })
            .await
    }

    /// Push the stream status to every viewer
    pub async fn broadcast_status(&self, state: StreamState) -> Delivery {
        self.broadcast(WallEvent::StreamStatus { state }).await
    }

    /// Spawn the task relaying controller events to viewers
    ///
    /// New posts go out as `NewPost`; a dropped or refused connection goes
    /// out as `StreamStatus`. Abort the returned handle to stop it.
    pub fn spawn_relay(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let gateway = Arc::clone(self);
        let mut events = self.controller.subscribe_events();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(StreamEvent::NewPost(post)) => {
                        gateway.broadcast_new_post(post).await;
                    }
                    Ok(StreamEvent::ConnectionLost) => {
                        gateway.broadcast_status(StreamState::Stopped).await;
                    }
                    Ok(StreamEvent::StartFailed(reason)) => {
                        tracing::warn!(reason = %reason, "Stream down");
                        gateway.broadcast_status(StreamState::Stopped).await;
                    }
                    Ok(StreamEvent::StateChanged { .. }) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped = skipped, "Relay lagged behind controller events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("Relay task finished");
        })
    }

    async fn after_track_change(&self, result: Result<()>) -> Result<()> {
        // The track store changed even if the restart could not connect
        if matches!(result, Ok(()) | Err(Error::ExternalStream(_))) {
            self.publish_tracks().await?;
        }
        result
    }

    async fn publish_tracks(&self) -> Result<()> {
        let tracks = self.controller.tracks().await?;
        self.broadcast_tracks(tracks).await;
        Ok(())
    }

    async fn broadcast(&self, event: WallEvent) -> Delivery {
        let delivery = self.registry.broadcast(&event).await;
        self.stats
            .on_broadcast(delivery.delivered, delivery.skipped_full, delivery.pruned);
        delivery
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::model::NewPost;
    use crate::store::{MemoryStore, TrackStore};
    use crate::stream::{ControllerConfig, LoopbackSource};

    struct Fixture {
        gateway: Arc<BroadcastGateway>,
        controller: Arc<StreamController>,
        source: LoopbackSource,
        store: Arc<MemoryStore>,
    }

    async fn fixture(config: GatewayConfig) -> Fixture {
        let store = Arc::new(MemoryStore::with_events(&["devconf"]).await);
        let source = LoopbackSource::new();
        let controller = Arc::new(StreamController::new(
            ControllerConfig::for_event("devconf"),
            Arc::new(source.clone()),
            store.clone(),
            store.clone(),
        ));
        let gateway = Arc::new(BroadcastGateway::new(
            config,
            Arc::clone(&controller),
            store.clone(),
        ));
        Fixture {
            gateway,
            controller,
            source,
            store,
        }
    }

    fn tracks_events(events: &[WallEvent]) -> Vec<&Vec<Subscription>> {
        events
            .iter()
            .filter_map(|e| match e {
                WallEvent::Tracks { tracks } => Some(tracks),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_add_track_fans_out_to_connected_sessions() {
        let f = fixture(GatewayConfig::default()).await;
        let mut a = f.gateway.join().await.unwrap();
        let mut b = f.gateway.join().await.unwrap();
        let mut c = f.gateway.join().await.unwrap();
        let mut gone = f.gateway.join().await.unwrap();
        f.gateway.leave(gone.id).await;

        f.gateway
            .handle_command(a.id, ViewerCommand::AddTrack { keyword: "rust".into() })
            .await
            .unwrap();

        for session in [&mut a, &mut b, &mut c] {
            let events = session.drain();
            let tracks = tracks_events(&events);
            assert_eq!(tracks.len(), 1);
            assert_eq!(tracks[0][0].value, "rust");
        }
        assert!(gone.drain().is_empty());
        assert_eq!(f.controller.status(), StreamState::Running);
    }

    #[tokio::test]
    async fn test_remove_track_broadcasts_updated_list() {
        let f = fixture(GatewayConfig::default()).await;
        let sub = f.controller.add_track("rust").await.unwrap();
        let mut viewer = f.gateway.join().await.unwrap();

        f.gateway
            .handle_command(viewer.id, ViewerCommand::RemoveTrack { id: sub.id })
            .await
            .unwrap();

        let events = viewer.drain();
        let tracks = tracks_events(&events);
        assert_eq!(tracks.len(), 1);
        assert!(tracks[0].is_empty());
    }

    #[tokio::test]
    async fn test_failed_command_broadcasts_nothing() {
        let f = fixture(GatewayConfig::default()).await;
        let mut viewer = f.gateway.join().await.unwrap();

        let result = f
            .gateway
            .handle_command(viewer.id, ViewerCommand::RemoveTrack { id: 77 })
            .await;
        assert!(matches!(result, Err(Error::NotFound(NotFound::Track(77)))));

        let result = f
            .gateway
            .handle_command(viewer.id, ViewerCommand::ToggleSticky { id: 5 })
            .await;
        assert!(matches!(result, Err(Error::NotFound(NotFound::Post(5)))));

        assert!(viewer.drain().is_empty());
        assert_eq!(f.gateway.stats().snapshot().failed_commands, 2);
    }

    #[tokio::test]
    async fn test_toggle_sticky_twice_restores() {
        let f = fixture(GatewayConfig::default()).await;
        let post = f
            .store
            .add_post(NewPost::new("1", "ferris", "pin me", Utc::now(), "devconf"))
            .await
            .unwrap()
            .unwrap();
        let mut a = f.gateway.join().await.unwrap();
        let mut b = f.gateway.join().await.unwrap();

        f.gateway
            .handle_command(a.id, ViewerCommand::ToggleSticky { id: post.id })
            .await
            .unwrap();
        assert!(f.store.get_post(post.id).await.unwrap().unwrap().sticky);

        f.gateway
            .handle_command(b.id, ViewerCommand::ToggleSticky { id: post.id })
            .await
            .unwrap();
        assert!(!f.store.get_post(post.id).await.unwrap().unwrap().sticky);

        let expected = vec![
            WallEvent::StickyChanged {
                post_id: post.id,
                sticky: true,
            },
            WallEvent::StickyChanged {
                post_id: post.id,
                sticky: false,
            },
        ];
        assert_eq!(a.drain(), expected);
        assert_eq!(b.drain(), expected);
    }

    #[tokio::test]
    async fn test_pull_commands_answer_only_caller() {
        let f = fixture(GatewayConfig::default().default_feed_limit(5)).await;
        for i in 0..8 {
            let post = NewPost::new(
                i.to_string(),
                "ferris",
                "post",
                Utc::now() + chrono::Duration::seconds(i),
                "devconf",
            );
            f.store.add_post(post).await.unwrap();
        }
        let mut caller = f.gateway.join().await.unwrap();
        let mut other = f.gateway.join().await.unwrap();

        f.gateway
            .handle_command(
                caller.id,
                ViewerCommand::RequestFeed {
                    event: "devconf".into(),
                    limit: None,
                },
            )
            .await
            .unwrap();
        f.gateway
            .handle_command(caller.id, ViewerCommand::RequestStatus)
            .await
            .unwrap();

        let events = caller.drain();
        assert_eq!(events.len(), 2);
        match &events[0] {
            WallEvent::Feed { event, posts } => {
                assert_eq!(event, "devconf");
                assert_eq!(posts.len(), 5);
                assert_eq!(posts[0].external_id, "3");
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(
            events[1],
            WallEvent::StreamStatus {
                state: StreamState::Unconfigured
            }
        );
        assert!(other.drain().is_empty());

        let result = f
            .gateway
            .handle_command(
                caller.id,
                ViewerCommand::RequestFeed {
                    event: "nope".into(),
                    limit: Some(3),
                },
            )
            .await;
        assert!(matches!(result, Err(Error::NotFound(NotFound::Event(_)))));
    }

    #[tokio::test]
    async fn test_request_tracks_and_restart_broadcast_to_all() {
        let f = fixture(GatewayConfig::default()).await;
        f.store.add_track("rust").await.unwrap();
        let mut a = f.gateway.join().await.unwrap();
        let mut b = f.gateway.join().await.unwrap();

        f.gateway
            .handle_command(a.id, ViewerCommand::RequestTracks)
            .await
            .unwrap();
        f.gateway
            .handle_command(a.id, ViewerCommand::RequestRestart)
            .await
            .unwrap();

        for session in [&mut a, &mut b] {
            let events = session.drain();
            assert_eq!(events.len(), 2);
            assert_eq!(tracks_events(&events).len(), 1);
            assert_eq!(
                events[1],
                WallEvent::StreamStatus {
                    state: StreamState::Running
                }
            );
        }
        assert!(f.source.is_connected());
    }

    #[tokio::test]
    async fn test_relay_pushes_new_posts() {
        let f = fixture(GatewayConfig::default()).await;
        let _relay = f.gateway.spawn_relay();
        let mut viewer = f.gateway.join().await.unwrap();
        f.controller.add_track("rust").await.unwrap();

        let payload = json!({
            "id_str": "42",
            "text": "live from the wall",
            "created_at": "2017-03-01T12:00:00Z",
            "user": { "screen_name": "ferris" }
        });
        assert!(f.source.push_json(&payload).await);

        let event = tokio::time::timeout(Duration::from_secs(2), viewer.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            WallEvent::NewPost { post } => assert_eq!(post.external_id, "42"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_relay_reports_stream_down() {
        let f = fixture(GatewayConfig::default()).await;
        let _relay = f.gateway.spawn_relay();
        f.controller.add_track("rust").await.unwrap();
        let mut viewer = f.gateway.join().await.unwrap();

        f.source.drop_connection();

        let event = tokio::time::timeout(Duration::from_secs(2), viewer.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            WallEvent::StreamStatus {
                state: StreamState::Stopped
            }
        );
    }

    #[tokio::test]
    async fn test_slow_viewer_does_not_block_broadcast() {
        let f = fixture(GatewayConfig::default().session_buffer(2)).await;
        let mut slow = f.gateway.join().await.unwrap();
        let mut fast = f.gateway.join().await.unwrap();

        for _ in 0..10 {
            f.gateway.broadcast_status(StreamState::Running).await;
            fast.drain();
        }

        assert_eq!(slow.drain().len(), 2);
        let snap = f.gateway.stats().snapshot();
        assert_eq!(snap.broadcasts, 10);
        assert_eq!(snap.skipped_full, 8);
    }

    #[tokio::test]
    async fn test_max_sessions() {
        let f = fixture(GatewayConfig::default().max_sessions(1)).await;

        let first = f.gateway.join().await;
        assert!(first.is_some());
        assert!(f.gateway.join().await.is_none());

        f.gateway.leave(first.unwrap().id).await;
        assert_eq!(f.gateway.session_count().await, 0);
        assert!(f.gateway.join().await.is_some());
    }

    async fn next_event(session: &mut ViewerSession) -> WallEvent {
        tokio::time::timeout(Duration::from_secs(2), session.recv())
            .await
            .expect("no event within timeout")
            .expect("session closed")
    }

    #[tokio::test]
    async fn test_add_track_with_refused_restart() {
        let f = fixture(GatewayConfig::default()).await;
        let _relay = f.gateway.spawn_relay();
        let mut a = f.gateway.join().await.unwrap();
        let mut b = f.gateway.join().await.unwrap();

        f.source.refuse_next("401 Unauthorized");
        let result = f
            .gateway
            .handle_command(a.id, ViewerCommand::AddTrack { keyword: "rust".into() })
            .await;
        assert!(matches!(result, Err(Error::ExternalStream(_))));

        // The track is stored even though the stream could not reconnect
        for session in [&mut a, &mut b] {
            let mut events = vec![next_event(session).await, next_event(session).await];
            tokio::time::sleep(Duration::from_millis(50)).await;
            events.extend(session.drain());

            assert_eq!(events.len(), 2);
            let tracks = tracks_events(&events);
            assert_eq!(tracks.len(), 1);
            assert_eq!(tracks[0][0].value, "rust");
            assert!(events.contains(&WallEvent::StreamStatus {
                state: StreamState::Stopped
            }));
        }
        assert_eq!(f.controller.status(), StreamState::Stopped);
        assert_eq!(f.controller.tracks().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_refused_restart_reports_stopped_once() {
        let f = fixture(GatewayConfig::default()).await;
        f.controller.add_track("rust").await.unwrap();
        let _relay = f.gateway.spawn_relay();
        let mut a = f.gateway.join().await.unwrap();
        let mut b = f.gateway.join().await.unwrap();

        f.source.refuse_next("503 Service Unavailable");
        let result = f
            .gateway
            .handle_command(a.id, ViewerCommand::RequestRestart)
            .await;
        assert!(matches!(result, Err(Error::ExternalStream(_))));

        for session in [&mut a, &mut b] {
            assert_eq!(
                next_event(session).await,
                WallEvent::StreamStatus {
                    state: StreamState::Stopped
                }
            );
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(session.drain().is_empty());
        }
        assert_eq!(f.controller.status(), StreamState::Stopped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_toggles_broadcast_in_order() {
        let f = fixture(GatewayConfig::default()).await;
        let post = f
            .store
            .add_post(NewPost::new("1", "ferris", "pin me", Utc::now(), "devconf"))
            .await
            .unwrap()
            .unwrap();
        let mut viewer = f.gateway.join().await.unwrap();
        let (session, post_id) = (viewer.id, post.id);

        let toggles: Vec<_> = (0..9)
            .map(|_| {
                let gateway = Arc::clone(&f.gateway);
                tokio::spawn(async move {
                    gateway
                        .handle_command(session, ViewerCommand::ToggleSticky { id: post_id })
                        .await
                })
            })
            .collect();
        for toggle in toggles {
            toggle.await.unwrap().unwrap();
        }

        // Each broadcast reflects the mutation right before it
        let flags: Vec<bool> = viewer
            .drain()
            .into_iter()
            .map(|e| match e {
                WallEvent::StickyChanged { sticky, .. } => sticky,
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        let expected: Vec<bool> = (0..9).map(|i| i % 2 == 0).collect();
        assert_eq!(flags, expected);

        let stored = f.store.get_post(post.id).await.unwrap().unwrap();
        assert_eq!(stored.sticky, *flags.last().unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_track_changes_broadcast_in_order() {
        let f = fixture(GatewayConfig::default()).await;
        let mut viewer = f.gateway.join().await.unwrap();
        let session = viewer.id;

        let adds: Vec<_> = (0..6)
            .map(|i| {
                let gateway = Arc::clone(&f.gateway);
                tokio::spawn(async move {
                    let keyword = format!("topic{}", i);
                    gateway
                        .handle_command(session, ViewerCommand::AddTrack { keyword })
                        .await
                })
            })
            .collect();
        for add in adds {
            add.await.unwrap().unwrap();
        }

        let events = viewer.drain();
        let sizes: Vec<usize> = tracks_events(&events).iter().map(|t| t.len()).collect();
        assert_eq!(sizes, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_joins_respect_limit() {
        let f = fixture(GatewayConfig::default().max_sessions(3)).await;

        let joins: Vec<_> = (0..20)
            .map(|_| {
                let gateway = Arc::clone(&f.gateway);
                tokio::spawn(async move { gateway.join().await })
            })
            .collect();

        let mut sessions = Vec::new();
        for join in joins {
            if let Some(session) = join.await.unwrap() {
                sessions.push(session);
            }
        }

        assert_eq!(sessions.len(), 3);
        assert_eq!(f.gateway.session_count().await, 3);
    }
}
