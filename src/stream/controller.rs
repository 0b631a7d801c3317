//! Stream controller
//!
//! Owns the single connection to the external filtered stream. All lifecycle
//! operations (`configure`, `start`, `stop`, `restart`) and track mutations
//! run under one async mutex, so concurrent callers never interleave their
//! sub-steps; a second `restart()` queues behind the one in progress.
//!
//! ```text
//!   add_track / remove_track / restart
//!          │
//!          ▼            lifecycle mutex held throughout
//!   TrackStore write ──► stop ──► configure ──► start
//!                        │        (read tracks)  (subscribe)
//!                        └─ joins ingest task
//!
//!   StreamSource ──raw payloads──► ingest task ──► PostStore ──► StreamEvent::NewPost
//! ```
//!
//! The current state is published on a `watch` channel so `status()` never
//! waits for the mutex. Connection drops are detected by the ingest task and
//! reported without any caller involvement.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{broadcast, oneshot, watch, Mutex};
use tokio::task::JoinHandle;

use super::config::ControllerConfig;
use super::event::StreamEvent;
use super::ingest::{self, IngestExit, Ingestor};
use super::source::{StreamFilter, StreamSource};
use super::state::{ConnectionState, StreamState};
use crate::error::{Error, NotFound, Result};
use crate::model::{Post, Subscription, SubscriptionId};
use crate::stats::IngestStats;
use crate::store::{PostStore, TrackStore};

/// State shared between the controller and its ingest task
struct Shared {
    state: watch::Sender<StreamState>,
    restarting: AtomicBool,
    /// Bumped whenever a connection is torn down; stale loss reports compare against it
    generation: AtomicU64,
    connection: StdMutex<Option<watch::Receiver<ConnectionState>>>,
    events: broadcast::Sender<StreamEvent>,
    stats: Arc<IngestStats>,
}

impl Shared {
    fn set_state(&self, to: StreamState) {
        let from = self.state.send_replace(to);
        if from != to {
            tracing::info!(from = %from, to = %to, "Stream state changed");
            let _ = self.events.send(StreamEvent::StateChanged { from, to });
        }
    }

    fn current(&self) -> StreamState {
        *self.state.borrow()
    }

    fn set_connection(&self, rx: Option<watch::Receiver<ConnectionState>>) {
        *self.connection.lock().unwrap_or_else(|e| e.into_inner()) = rx;
    }

    fn connection_state(&self) -> Option<ConnectionState> {
        self.connection
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|rx| *rx.borrow())
    }

    /// Called from the ingest task when its connection ends on its own
    fn connection_lost(&self, generation: u64) {
        let mut reported = false;
        self.state.send_if_modified(|state| {
            if *state == StreamState::Running
                && self.generation.load(Ordering::SeqCst) == generation
            {
                *state = StreamState::Stopped;
                reported = true;
                true
            } else {
                false
            }
        });

        if reported {
            self.stats.on_connection_drop();
            tracing::warn!(generation = generation, "Stream connection lost");
            let _ = self.events.send(StreamEvent::StateChanged {
                from: StreamState::Running,
                to: StreamState::Stopped,
            });
            let _ = self.events.send(StreamEvent::ConnectionLost);
        }
    }
}

/// A live subscription and the task draining it
struct Connection {
    stop_task: oneshot::Sender<()>,
    close_source: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Connection {
    /// Stop the ingest task, then close the source
    ///
    /// The task gets `timeout` to finish the payload it is handling before it
    /// is aborted.
    async fn close(mut self, timeout: Duration) {
        let _ = self.stop_task.send(());

        if tokio::time::timeout(timeout, &mut self.task).await.is_err() {
            tracing::warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Ingest task did not stop in time, aborting"
            );
            self.task.abort();
        }

        if let Some(tx) = self.close_source.take() {
            let _ = tx.send(());
        }
    }
}

/// Serialized lifecycle data, only touched with the mutex held
#[derive(Default)]
struct Lifecycle {
    filter: Option<StreamFilter>,
    connection: Option<Connection>,
}

/// Controller for the single external stream connection
///
/// Construct one per deployment and share it behind an `Arc`.
pub struct StreamController {
    config: ControllerConfig,
    source: Arc<dyn StreamSource>,
    tracks: Arc<dyn TrackStore>,
    ingestor: Arc<Ingestor>,
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
}

impl StreamController {
    /// Create a controller in the `Unconfigured` state
    pub fn new(
        config: ControllerConfig,
        source: Arc<dyn StreamSource>,
        tracks: Arc<dyn TrackStore>,
        posts: Arc<dyn PostStore>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity);
        let (state, _) = watch::channel(StreamState::Unconfigured);
        let stats = Arc::new(IngestStats::new());

        let ingestor = Arc::new(Ingestor::new(
            config.event_name.clone(),
            posts,
            events.clone(),
            Arc::clone(&stats),
        ));

        Self {
            config,
            source,
            tracks,
            ingestor,
            shared: Arc::new(Shared {
                state,
                restarting: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                connection: StdMutex::new(None),
                events,
                stats,
            }),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    /// Get the controller configuration
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Subscribe to controller events
    pub fn subscribe_events(&self) -> broadcast::Receiver<StreamEvent> {
        self.shared.events.subscribe()
    }

    /// Ingestion counters
    pub fn stats(&self) -> &IngestStats {
        &self.shared.stats
    }

    /// Current state
    ///
    /// Reports `Restarting` while a restart holds the controller, and
    /// `Stopped` if the connection reports itself closed even before the
    /// ingest task has noticed.
    pub fn status(&self) -> StreamState {
        if self.shared.restarting.load(Ordering::SeqCst) {
            return StreamState::Restarting;
        }

        let state = self.shared.current();
        if state == StreamState::Running
            && self.shared.connection_state() == Some(ConnectionState::Stopped)
        {
            return StreamState::Stopped;
        }
        state
    }

    /// Connection state reported by the source, if a connection is open
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.shared.connection_state()
    }

    /// Filter built by the last `configure`
    pub async fn filter(&self) -> Option<StreamFilter> {
        self.lifecycle.lock().await.filter.clone()
    }

    /// Build the filter from the current track store contents
    ///
    /// Valid from any state. A live connection is stopped first.
    pub async fn configure(&self) -> Result<()> {
        let mut lc = self.lifecycle.lock().await;
        self.configure_locked(&mut lc).await
    }

    /// Open the external connection with the current filter
    ///
    /// Returns once the subscribe request has been issued.
    pub async fn start(&self) -> Result<()> {
        let mut lc = self.lifecycle.lock().await;
        self.start_locked(&mut lc).await
    }

    /// Close the external connection
    ///
    /// A no-op from any state other than `Running`.
    pub async fn stop(&self) -> Result<()> {
        let mut lc = self.lifecycle.lock().await;
        self.stop_locked(&mut lc).await;
        Ok(())
    }

    /// Stop, reconfigure and start as one operation
    pub async fn restart(&self) -> Result<()> {
        let mut lc = self.lifecycle.lock().await;
        self.restart_locked(&mut lc).await
    }

    /// Tracked keywords, ordered by id
    ///
    /// Waits for any in-flight track mutation and its restart.
    pub async fn tracks(&self) -> Result<Vec<Subscription>> {
        let _lc = self.lifecycle.lock().await;
        self.tracks.all_tracks().await
    }

    /// Track a keyword and restart the stream to apply it
    ///
    /// Tracking a keyword that is already tracked (ignoring ASCII case)
    /// returns the existing subscription without restarting.
    pub async fn add_track(&self, keyword: &str) -> Result<Subscription> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(Error::InvalidTrack(keyword.to_string()));
        }

        let mut lc = self.lifecycle.lock().await;

        let existing = self
            .tracks
            .all_tracks()
            .await?
            .into_iter()
            .find(|t| t.value.eq_ignore_ascii_case(keyword));
        if let Some(subscription) = existing {
            tracing::debug!(track = %keyword, id = subscription.id, "Keyword already tracked");
            return Ok(subscription);
        }

        let subscription = self.tracks.add_track(keyword).await?;
        tracing::info!(track = %subscription.value, id = subscription.id, "Track added");

        self.restart_locked(&mut lc).await?;
        Ok(subscription)
    }

    /// Stop tracking a keyword and restart the stream to apply it
    pub async fn remove_track(&self, id: SubscriptionId) -> Result<Subscription> {
        let mut lc = self.lifecycle.lock().await;

        let subscription = self
            .tracks
            .remove_track(id)
            .await?
            .ok_or(NotFound::Track(id))?;
        tracing::info!(track = %subscription.value, id = id, "Track removed");

        self.restart_locked(&mut lc).await?;
        Ok(subscription)
    }

    /// Feed one raw payload through the inbound path
    ///
    /// This is what the ingest task calls for every payload of the live
    /// connection; it is public for manual insertion and replays.
    pub async fn on_post(&self, raw: &[u8]) -> Option<Post> {
        self.ingestor.on_post(raw).await
    }

    async fn configure_locked(&self, lc: &mut Lifecycle) -> Result<()> {
        if lc.connection.is_some() || self.shared.current() == StreamState::Running {
            self.stop_locked(lc).await;
        }

        let tracks = self.tracks.all_tracks().await?;
        let filter = StreamFilter {
            tracks: tracks.into_iter().map(|t| t.value).collect(),
            follow: self.config.default_follow.clone(),
        };

        tracing::debug!(filter = %filter, "Stream configured");
        lc.filter = Some(filter);
        self.shared.set_state(StreamState::Configured);
        Ok(())
    }

    async fn start_locked(&self, lc: &mut Lifecycle) -> Result<()> {
        let state = self.shared.current();
        if !state.can_start() {
            return Err(Error::invalid_state("start", state));
        }
        let filter = lc
            .filter
            .clone()
            .ok_or_else(|| Error::invalid_state("start", state))?;

        // Leftover from a connection that dropped on its own
        self.teardown(lc).await;

        if filter.is_empty() {
            tracing::info!("Filter is empty, following nothing");
            self.shared.set_state(StreamState::Running);
            return Ok(());
        }

        let handle = match self.source.subscribe(&filter).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(error = %e, filter = %filter, "Failed to open stream");
                self.shared.set_state(StreamState::Stopped);
                let _ = self.shared.events.send(StreamEvent::StartFailed(e.to_string()));
                return Err(e);
            }
        };

        let generation = self.shared.generation.load(Ordering::SeqCst);
        let (posts, conn_state, close_source) = handle.split();
        let (stop_task, stop_rx) = oneshot::channel();

        self.shared.set_connection(Some(conn_state.clone()));

        let ingestor = Arc::clone(&self.ingestor);
        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            let exit = ingest::run(ingestor, posts, conn_state, stop_rx).await;
            if exit == IngestExit::ConnectionLost {
                shared.connection_lost(generation);
            }
            tracing::debug!(generation = generation, exit = ?exit, "Ingest task finished");
        });

        lc.connection = Some(Connection {
            stop_task,
            close_source,
            task,
        });

        tracing::info!(filter = %filter, "Stream start requested");
        self.shared.set_state(StreamState::Running);
        Ok(())
    }

    async fn teardown(&self, lc: &mut Lifecycle) {
        if let Some(conn) = lc.connection.take() {
            // Anything the old task reports from here on is stale
            self.shared.generation.fetch_add(1, Ordering::SeqCst);
            self.shared.set_connection(None);
            conn.close(self.config.stop_timeout).await;
        }
    }

    async fn stop_locked(&self, lc: &mut Lifecycle) {
        self.teardown(lc).await;

        if self.shared.current() == StreamState::Running {
            self.shared.set_state(StreamState::Stopped);
        }
    }

    async fn restart_locked(&self, lc: &mut Lifecycle) -> Result<()> {
        self.shared.restarting.store(true, Ordering::SeqCst);

        self.stop_locked(lc).await;
        let result = match self.configure_locked(lc).await {
            Ok(()) => self.start_locked(lc).await,
            Err(e) => Err(e),
        };

        self.shared.restarting.store(false, Ordering::SeqCst);

        match &result {
            Ok(()) => {
                self.shared.stats.on_restart();
                tracing::info!("Stream restarted");
            }
            Err(e) => tracing::warn!(error = %e, "Stream restart failed"),
        }
        result
    }
}
