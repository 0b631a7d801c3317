//! Statistics for ingestion and viewer fan-out

pub mod metrics;

pub use metrics::{GatewaySnapshot, GatewayStats, IngestSnapshot, IngestStats};
