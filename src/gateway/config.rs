//! Gateway configuration

/// Broadcast gateway configuration options
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Per-session queue capacity; events beyond it are skipped for that session
    pub session_buffer: usize,

    /// Feed limit used when a viewer does not ask for one
    pub default_feed_limit: usize,

    /// Maximum concurrent sessions (0 = unlimited)
    pub max_sessions: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            session_buffer: 64,
            default_feed_limit: 20,
            max_sessions: 0, // Unlimited
        }
    }
}

impl GatewayConfig {
    /// Set the per-session queue capacity
    pub fn session_buffer(mut self, capacity: usize) -> Self {
        self.session_buffer = capacity.max(1);
        self
    }

    /// Set the default feed limit
    pub fn default_feed_limit(mut self, limit: usize) -> Self {
        self.default_feed_limit = limit;
        self
    }

    /// Set maximum sessions
    pub fn max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }
}
