//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use rand::seq::SliceRandom;
use std::time::Duration;

/// Configuration for a sync session.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Server base URL (e.g., "https://cloud.example.com").
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Polling intervals and fetch retry budget.
    pub polling: PollingConfig,
    /// Careful retry ladder for failed pushes.
    pub retry: RetryConfig,
    /// Upper bound on waiting for the final save in `close()`.
    pub close_timeout: Duration,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
            polling: PollingConfig::default(),
            retry: RetryConfig::default(),
            close_timeout: Duration::from_secs(2),
        }
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the polling configuration.
    pub fn with_polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the close timeout.
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Checks the interval ordering and retry bounds.
    pub fn validate(&self) -> SyncResult<()> {
        self.polling.validate()?;
        self.retry.validate()
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("")
    }
}

/// Polling intervals.
///
/// `fetch_interval <= fetch_interval_single_editor <= fetch_interval_max`
/// must hold.
#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Interval while steps keep arriving.
    pub fetch_interval: Duration,
    /// Interval when no more than one collaborator is active.
    pub fetch_interval_single_editor: Duration,
    /// Ceiling for the backoff between empty fetches.
    pub fetch_interval_max: Duration,
    /// Network failures tolerated before `CONNECTION_FAILED` is reported.
    pub max_fetch_retries: u32,
    /// A collaborator not seen for this long counts as disconnected.
    pub collaborator_disconnect_time: Duration,
    /// Delay before retrying a push that found a request in flight.
    pub push_defer_delay: Duration,
}

impl PollingConfig {
    /// Sets the three polling intervals.
    pub fn with_intervals(mut self, fast: Duration, single_editor: Duration, max: Duration) -> Self {
        self.fetch_interval = fast;
        self.fetch_interval_single_editor = single_editor;
        self.fetch_interval_max = max;
        self
    }

    /// Sets the fetch retry budget.
    pub fn with_max_fetch_retries(mut self, retries: u32) -> Self {
        self.max_fetch_retries = retries;
        self
    }

    /// Sets the collaborator disconnect time.
    pub fn with_collaborator_disconnect_time(mut self, time: Duration) -> Self {
        self.collaborator_disconnect_time = time;
        self
    }

    fn validate(&self) -> SyncResult<()> {
        if self.fetch_interval.is_zero() {
            return Err(SyncError::InvalidConfig(
                "fetch interval must be positive".into(),
            ));
        }
        if self.fetch_interval > self.fetch_interval_single_editor
            || self.fetch_interval_single_editor > self.fetch_interval_max
        {
            return Err(SyncError::InvalidConfig(format!(
                "intervals must be ordered: {:?} <= {:?} <= {:?}",
                self.fetch_interval, self.fetch_interval_single_editor, self.fetch_interval_max
            )));
        }
        Ok(())
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            fetch_interval: Duration::from_millis(300),
            fetch_interval_single_editor: Duration::from_millis(5000),
            fetch_interval_max: Duration::from_millis(5000),
            max_fetch_retries: 5,
            collaborator_disconnect_time: Duration::from_secs(20),
            push_defer_delay: Duration::from_millis(100),
        }
    }
}

/// Careful retry ladder for pushes.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Floor of the ladder.
    pub min_delay: Duration,
    /// Ceiling of the ladder.
    pub max_delay: Duration,
    /// Crossing this delay warns the user that changes are pending.
    pub warning_delay: Duration,
}

impl RetryConfig {
    /// Sets the floor.
    pub fn with_min_delay(mut self, delay: Duration) -> Self {
        self.min_delay = delay;
        self
    }

    /// Sets the ceiling.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the warning threshold.
    pub fn with_warning_delay(mut self, delay: Duration) -> Self {
        self.warning_delay = delay;
        self
    }

    /// Returns the delay following `current`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        if current.is_zero() {
            return self.min_delay;
        }
        current.saturating_mul(2).min(self.max_delay)
    }

    /// Returns true if moving from `previous` to `next` crosses the warning threshold.
    pub fn crosses_warning(&self, previous: Duration, next: Duration) -> bool {
        next > self.warning_delay && previous < self.warning_delay
    }

    fn validate(&self) -> SyncResult<()> {
        if self.min_delay.is_zero() || self.min_delay > self.max_delay {
            return Err(SyncError::InvalidConfig(format!(
                "retry delays must satisfy 0 < {:?} <= {:?}",
                self.min_delay, self.max_delay
            )));
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            warning_delay: Duration::from_secs(5),
        }
    }
}

/// Per-session options passed to the server.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Share token for public (link) access.
    pub share_token: Option<String>,
    /// File path, relative to the share for public access.
    pub file_path: Option<String>,
    /// Name shown for anonymous editors.
    pub guest_name: Option<String>,
    /// Discard the server's step history on open.
    pub force_recreate: bool,
}

impl SessionOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the share token.
    pub fn with_share_token(mut self, token: impl Into<String>) -> Self {
        self.share_token = Some(token.into());
        self
    }

    /// Sets the file path.
    pub fn with_file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Sets the guest name.
    pub fn with_guest_name(mut self, name: impl Into<String>) -> Self {
        self.guest_name = Some(name.into());
        self
    }

    /// Picks a random guest name if none is set.
    pub fn with_random_guest_name(mut self) -> Self {
        if self.guest_name.is_none() {
            self.guest_name = Some(random_guest_name().to_string());
        }
        self
    }

    /// Returns true if the session is opened through a share link.
    pub fn is_public(&self) -> bool {
        self.share_token.is_some()
    }
}

const GUEST_NAMES: &[&str] = &[
    "Artichoke", "Arugula", "Asparagus", "Avocado", "Bamboo Shoot", "Bean Sprout", "Beet",
    "Bell Pepper", "Bok Choy", "Broccoli", "Brussels Sprout", "Cabbage", "Caper", "Carrot",
    "Cassava", "Cauliflower", "Celery", "Chayote", "Corn", "Cucumber", "Daikon Radish",
    "Edamame", "Eggplant", "Endive", "Fennel", "Fiddlehead", "Galangal", "Garlic", "Ginger",
    "Green Bean", "Kale", "Kohlrabi", "Leek", "Lemongrass", "Lettuce", "Lotus Root",
    "Mushroom", "Napa Cabbage", "Okra", "Olive", "Onion", "Parsley", "Parsnip", "Pepper",
    "Plantain", "Potato", "Pumpkin", "Radicchio", "Radish", "Rutabaga", "Shallot", "Spinach",
    "Squash", "Sweet Potato", "Swiss Chard", "Taro", "Tomatillo", "Tomato", "Turnip",
    "Water Chestnut", "Watercress", "Yam", "Zucchini",
];

/// Returns a random guest name.
pub fn random_guest_name() -> &'static str {
    GUEST_NAMES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("Guest")
}
