//! Viewer fan-out
//!
//! The gateway keeps the registry of connected display clients, executes
//! their commands against the stream controller and the post store, and
//! pushes the resulting state to all of them.
//!
//! # Delivery
//!
//! ```text
//!   viewer command ──► BroadcastGateway ──► StreamController / PostStore
//!                            │
//!                            └──► SessionRegistry::broadcast ──try_send──► every session queue
//!
//!   StreamController events ──► relay task ──► SessionRegistry::broadcast
//! ```
//!
//! Delivery is at-most-once to sessions connected at the time of the event.
//! There is no replay: a new session pulls tracks and feed itself.

pub mod broadcast;
pub mod config;
pub mod message;
pub mod registry;

pub use broadcast::BroadcastGateway;
pub use config::GatewayConfig;
pub use message::{ViewerCommand, WallEvent};
pub use registry::{Delivery, SessionId, SessionInfo, SessionRegistry, ViewerSession};
