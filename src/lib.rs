//! tweetwall: live filtered post stream for display walls
//!
//! Keeps one filtered connection to an external post stream, stores every
//! matching post under the current event, and pushes new posts, track changes
//! and pin changes to every connected viewer.
//!
//! # Architecture
//!
//! ```text
//!   TrackStore ──► StreamController ──subscribe──► dyn StreamSource
//!                        │    ▲                          │ raw payloads
//!                        │    └────── ingest task ◄──────┘
//!                        │                 │
//!                        │                 ▼
//!                        │            PostStore ◄── FeedAssembler
//!                        │ StreamEvent     ▲               │
//!                        ▼                 │               │
//!                  BroadcastGateway ───────┴───────────────┘
//!                        │
//!                        ▼
//!                 viewer sessions
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tweetwall::{
//!     BroadcastGateway, ControllerConfig, GatewayConfig, LoopbackSource, MemoryStore,
//!     StreamController,
//! };
//!
//! # async fn run() -> tweetwall::Result<()> {
//! let store = Arc::new(MemoryStore::with_events(&["devconf"]).await);
//! let source = LoopbackSource::new();
//! let controller = Arc::new(StreamController::new(
//!     ControllerConfig::for_event("devconf"),
//!     Arc::new(source.clone()),
//!     store.clone(),
//!     store.clone(),
//! ));
//! let gateway = Arc::new(BroadcastGateway::new(
//!     GatewayConfig::default(),
//!     Arc::clone(&controller),
//!     store.clone(),
//! ));
//! let _relay = gateway.spawn_relay();
//!
//! controller.add_track("rustlang").await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod feed;
pub mod gateway;
pub mod model;
pub mod stats;
pub mod store;
pub mod stream;

pub use error::{Error, NotFound, Result};
pub use feed::FeedAssembler;
pub use gateway::{BroadcastGateway, GatewayConfig, ViewerCommand, ViewerSession, WallEvent};
pub use model::{Event, NewPost, Post, PostId, Subscription, SubscriptionId};
pub use store::{MemoryStore, PostStore, RetentionConfig, TrackStore};
pub use stream::{
    ControllerConfig, LoopbackSource, StreamController, StreamEvent, StreamSource, StreamState,
};
