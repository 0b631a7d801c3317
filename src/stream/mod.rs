//! Filtered stream ingestion
//!
//! The [`StreamController`] owns the one connection to the external post
//! source. It builds the filter from the track store, opens a subscription
//! through a [`StreamSource`], and drains it on a background task that parses,
//! stores and announces every post.
//!
//! # Architecture
//!
//! ```text
//!                     Arc<StreamController>
//!               ┌───────────────────────────────┐
//!               │ lifecycle: Mutex<Lifecycle>   │
//!               │ state: watch::Sender          │
//!               │ events: broadcast::Sender ────┼──► gateway relay
//!               └──────────────┬────────────────┘
//!                              │ subscribe(filter)
//!                              ▼
//!                        dyn StreamSource
//!                              │ SourceHandle { posts, state, shutdown }
//!                              ▼
//!                         ingest task ──► PostStore
//! ```
//!
//! Changing the track set always restarts the subscription: the source only
//! applies a filter when the connection is negotiated.

pub mod config;
pub mod controller;
pub mod event;
mod ingest;
pub mod loopback;
pub mod payload;
pub mod source;
pub mod state;

pub use config::ControllerConfig;
pub use controller::StreamController;
pub use event::StreamEvent;
pub use loopback::LoopbackSource;
pub use payload::{parse_post, PayloadError};
pub use source::{SourceHandle, StreamFilter, StreamSource};
pub use state::{ConnectionState, StreamState};
