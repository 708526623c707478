//! Server configuration.

use std::time::Duration;

/// Configuration for the reference server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum number of steps accepted in one push.
    pub max_push_steps: usize,
    /// Sessions idle for longer are left out of collaborator lists.
    pub session_expiry: Duration,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new() -> Self {
        Self {
            max_push_steps: 1000,
            session_expiry: Duration::from_secs(300),
        }
    }

    /// Sets the maximum push size.
    pub fn with_max_push_steps(mut self, max: usize) -> Self {
        self.max_push_steps = max;
        self
    }

    /// Sets the session expiry.
    pub fn with_session_expiry(mut self, expiry: Duration) -> Self {
        self.session_expiry = expiry;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
