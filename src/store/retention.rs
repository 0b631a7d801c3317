//! Age-based post eviction
//!
//! Optional background sweep that removes non-sticky posts older than a
//! configured age. Sticky posts are never evicted.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::PostStore;

/// Lower bound for the sweep interval; `tokio::time::interval` rejects zero
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Retention policy for stored posts
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// Posts older than this are evicted
    pub max_age: Duration,

    /// How often the sweep runs
    pub sweep_interval: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(7 * 24 * 60 * 60),
            sweep_interval: Duration::from_secs(10 * 60),
        }
    }
}

impl RetentionConfig {
    /// Set the maximum post age
    pub fn max_age(mut self, age: Duration) -> Self {
        self.max_age = age;
        self
    }

    /// Set the sweep interval (at least one millisecond)
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval.max(MIN_SWEEP_INTERVAL);
        self
    }
}

/// Run one eviction sweep, returning the number of evicted posts
pub async fn sweep(store: &dyn PostStore, config: &RetentionConfig) -> usize {
    let max_age = match chrono::Duration::from_std(config.max_age) {
        Ok(age) => age,
        Err(e) => {
            tracing::warn!(error = %e, "Retention max_age out of range, skipping sweep");
            return 0;
        }
    };
    let cutoff = match Utc::now().checked_sub_signed(max_age) {
        Some(cutoff) => cutoff,
        None => {
            tracing::warn!(
                max_age = ?config.max_age,
                "Retention cutoff out of range, skipping sweep"
            );
            return 0;
        }
    };

    match store.evict_before(cutoff).await {
        Ok(0) => 0,
        Ok(evicted) => {
            tracing::info!(evicted = evicted, cutoff = %cutoff, "Evicted expired posts");
            evicted
        }
        Err(e) => {
            tracing::warn!(error = %e, "Retention sweep failed");
            0
        }
    }
}

/// Spawn the background retention task
///
/// Returns a handle that can be used to abort the task.
pub fn spawn_retention_task(
    store: Arc<dyn PostStore>,
    config: RetentionConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        // Struct literals bypass the builder clamp
        let period = config.sweep_interval.max(MIN_SWEEP_INTERVAL);
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            sweep(store.as_ref(), &config).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewPost;
    use crate::store::MemoryStore;

    #[test]
    fn test_builder() {
        let config = RetentionConfig::default()
            .max_age(Duration::from_secs(60))
            .sweep_interval(Duration::from_secs(5));

        assert_eq!(config.max_age, Duration::from_secs(60));
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_sweep_evicts_old_posts() {
        let store = MemoryStore::with_events(&["devconf"]).await;
        let old = Utc::now() - chrono::Duration::hours(2);
        store
            .add_post(NewPost::new("1", "alice", "old", old, "devconf"))
            .await
            .unwrap();
        store
            .add_post(NewPost::new("2", "alice", "fresh", Utc::now(), "devconf"))
            .await
            .unwrap();

        let config = RetentionConfig::default().max_age(Duration::from_secs(60 * 60));
        assert_eq!(sweep(&store, &config).await, 1);
        assert_eq!(store.post_count().await, 1);
    }

    #[tokio::test]
    async fn test_spawned_task_sweeps() {
        let store = Arc::new(MemoryStore::with_events(&["devconf"]).await);
        let old = Utc::now() - chrono::Duration::hours(2);
        store
            .add_post(NewPost::new("1", "alice", "old", old, "devconf"))
            .await
            .unwrap();

        let config = RetentionConfig::default()
            .max_age(Duration::from_secs(60))
            .sweep_interval(Duration::from_millis(10));
        let handle = spawn_retention_task(store.clone(), config);

        // First tick fires immediately
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert_eq!(store.post_count().await, 0);
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = RetentionConfig::default().sweep_interval(Duration::ZERO);
        assert_eq!(config.sweep_interval, MIN_SWEEP_INTERVAL);
    }

    #[tokio::test]
    async fn test_zero_interval_task_keeps_running() {
        let store = Arc::new(MemoryStore::with_events(&["devconf"]).await);
        let config = RetentionConfig {
            sweep_interval: Duration::ZERO,
            ..RetentionConfig::default()
        };
        let handle = spawn_retention_task(store, config);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        handle.abort();
    }

    #[tokio::test]
    async fn test_huge_max_age_skips_sweep() {
        let store = MemoryStore::with_events(&["devconf"]).await;
        let old = Utc::now() - chrono::Duration::hours(2);
        store
            .add_post(NewPost::new("1", "alice", "old", old, "devconf"))
            .await
            .unwrap();

        // In range for chrono::Duration, but not as an offset from now
        let config =
            RetentionConfig::default().max_age(Duration::from_secs(1_000_000_000_000_000));
        assert_eq!(sweep(&store, &config).await, 0);

        let config = RetentionConfig::default().max_age(Duration::MAX);
        assert_eq!(sweep(&store, &config).await, 0);

        assert_eq!(store.post_count().await, 1);
    }
}
