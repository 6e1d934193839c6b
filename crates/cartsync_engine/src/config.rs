//! Configuration for the cart engine.

use rand::Rng;
use std::time::Duration;

/// Default blob key for a persisted cart.
pub const DEFAULT_BLOB_KEY: &str = "cart";

/// Default lifetime of a persisted cart: seven days.
pub const DEFAULT_BLOB_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Configuration for the sync channel and cart persistence.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Coordinator WebSocket URL.
    pub server_url: String,
    /// Retry configuration for connection attempts.
    pub retry: RetryConfig,
    /// Time allowed for open, welcome and join to complete.
    pub join_timeout: Duration,
    /// Capacity of the outbox between the store and the channel.
    pub outbox_capacity: usize,
    /// Blob key the cart is persisted under.
    pub blob_key: String,
    /// Lifetime of a persisted cart.
    pub blob_ttl: Duration,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            retry: RetryConfig::default(),
            join_timeout: Duration::from_secs(10),
            outbox_capacity: 256,
            blob_key: DEFAULT_BLOB_KEY.to_string(),
            blob_ttl: DEFAULT_BLOB_TTL,
        }
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the handshake timeout.
    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Sets the outbox capacity (at least 1).
    pub fn with_outbox_capacity(mut self, capacity: usize) -> Self {
        self.outbox_capacity = capacity.max(1);
        self
    }

    /// Sets the blob key.
    pub fn with_blob_key(mut self, key: impl Into<String>) -> Self {
        self.blob_key = key.into();
        self
    }

    /// Sets the persisted cart lifetime.
    pub fn with_blob_ttl(mut self, ttl: Duration) -> Self {
        self.blob_ttl = ttl;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("ws://127.0.0.1:9470")
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Disables jitter, making delays deterministic.
    pub fn without_jitter(mut self) -> Self {
        self.add_jitter = false;
        self
    }

    /// Calculates the delay before a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let base_delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter && delay_secs > 0.0 {
            // Up to 25% on top
            let jitter = delay_secs * 0.25 * rand::thread_rng().gen_range(0.0..1.0);
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("ws://sync.example.com")
            .with_join_timeout(Duration::from_secs(3))
            .with_outbox_capacity(0)
            .with_blob_key("cart_7")
            .with_blob_ttl(Duration::from_secs(60));

        assert_eq!(config.server_url, "ws://sync.example.com");
        assert_eq!(config.join_timeout, Duration::from_secs(3));
        assert_eq!(config.outbox_capacity, 1);
        assert_eq!(config.blob_key, "cart_7");
        assert_eq!(config.blob_ttl, Duration::from_secs(60));
    }

    #[test]
    fn default_ttl_is_a_week() {
        assert_eq!(SyncConfig::default().blob_ttl, Duration::from_secs(604_800));
    }

    #[test]
    fn retry_config_no_retry() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.delay_for_attempt(3), Duration::ZERO);
    }

    #[test]
    fn retry_config_needs_one_attempt() {
        assert_eq!(RetryConfig::new(0).max_attempts, 1);
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);

        let delay1 = config.delay_for_attempt(1);
        assert!(delay1 >= Duration::from_millis(100));
        assert!(delay1 <= Duration::from_millis(125));

        let delay2 = config.delay_for_attempt(2);
        assert!(delay2 >= Duration::from_millis(200));
        assert!(delay2 <= Duration::from_millis(250));
    }

    #[test]
    fn retry_delay_without_jitter_is_exact() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .without_jitter();

        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0);

        let delay = config.delay_for_attempt(5);
        assert!(delay >= Duration::from_secs(5));
        assert!(delay <= Duration::from_millis(6250));
    }
}
