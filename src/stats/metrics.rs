//! Counters for ingestion and fan-out
//!
//! Counters are plain atomics so the ingest path and the broadcast path can
//! bump them without locking. `snapshot()` returns a consistent-enough copy for
//! status pages and logs.

use std::sync::atomic::{AtomicU64, Ordering};

/// Ingestion counters kept by the stream controller
#[derive(Debug, Default)]
pub struct IngestStats {
    received: AtomicU64,
    stored: AtomicU64,
    duplicates: AtomicU64,
    malformed: AtomicU64,
    store_failures: AtomicU64,
    restarts: AtomicU64,
    connection_drops: AtomicU64,
}

/// Point-in-time copy of [`IngestStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSnapshot {
    /// Raw payloads received from the source
    pub received: u64,
    /// Posts written to the post store
    pub stored: u64,
    /// Payloads whose external id was already stored
    pub duplicates: u64,
    /// Payloads dropped as malformed
    pub malformed: u64,
    /// Payloads dropped because the store write failed
    pub store_failures: u64,
    /// Completed restart cycles
    pub restarts: u64,
    /// Connections that dropped without a stop request
    pub connection_drops: u64,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_stored(&self) {
        self.stored.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_store_failure(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_restart(&self) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_connection_drop(&self) {
        self.connection_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IngestSnapshot {
        IngestSnapshot {
            received: self.received.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
            connection_drops: self.connection_drops.load(Ordering::Relaxed),
        }
    }
}

/// Fan-out counters kept by the broadcast gateway
#[derive(Debug, Default)]
pub struct GatewayStats {
    broadcasts: AtomicU64,
    delivered: AtomicU64,
    skipped_full: AtomicU64,
    pruned: AtomicU64,
    commands: AtomicU64,
    failed_commands: AtomicU64,
}

/// Point-in-time copy of [`GatewayStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewaySnapshot {
    /// Events fanned out to the registry
    pub broadcasts: u64,
    /// Individual session deliveries
    pub delivered: u64,
    /// Deliveries skipped because a session queue was full
    pub skipped_full: u64,
    /// Sessions removed because their receiver was gone
    pub pruned: u64,
    /// Viewer commands handled
    pub commands: u64,
    /// Viewer commands that returned an error
    pub failed_commands: u64,
}

impl GatewayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on_broadcast(&self, delivered: u64, skipped_full: u64, pruned: u64) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.delivered.fetch_add(delivered, Ordering::Relaxed);
        self.skipped_full.fetch_add(skipped_full, Ordering::Relaxed);
        self.pruned.fetch_add(pruned, Ordering::Relaxed);
    }

    pub(crate) fn on_command(&self, ok: bool) {
        self.commands.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.failed_commands.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> GatewaySnapshot {
        GatewaySnapshot {
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            skipped_full: self.skipped_full.load(Ordering::Relaxed),
            pruned: self.pruned.load(Ordering::Relaxed),
            commands: self.commands.load(Ordering::Relaxed),
            failed_commands: self.failed_commands.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_stats_new() {
        let stats = IngestStats::new();
        assert_eq!(stats.snapshot(), IngestSnapshot::default());
    }

    #[test]
    fn test_ingest_counters() {
        let stats = IngestStats::new();
        stats.on_received();
        stats.on_received();
        stats.on_received();
        stats.on_stored();
        stats.on_duplicate();
        stats.on_malformed();
        stats.on_restart();

        let snap = stats.snapshot();
        assert_eq!(snap.received, 3);
        assert_eq!(snap.stored, 1);
        assert_eq!(snap.duplicates, 1);
        assert_eq!(snap.malformed, 1);
        assert_eq!(snap.restarts, 1);
        assert_eq!(snap.connection_drops, 0);
    }

    #[test]
    fn test_gateway_counters() {
        let stats = GatewayStats::new();
        stats.on_broadcast(3, 1, 1);
        stats.on_broadcast(2, 0, 0);
        stats.on_command(true);
        stats.on_command(false);

        let snap = stats.snapshot();
        assert_eq!(snap.broadcasts, 2);
        assert_eq!(snap.delivered, 5);
        assert_eq!(snap.skipped_full, 1);
        assert_eq!(snap.pruned, 1);
        assert_eq!(snap.commands, 2);
        assert_eq!(snap.failed_commands, 1);
    }
}
