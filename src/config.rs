use std::time::Duration;

/// Default lifetime of a lock before it must be renewed.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
/// Period of the renewal worker while a lock is held.
pub const LOCK_RENEWAL_INTERVAL: Duration = Duration::from_secs(2);
/// Fixed delay between lock acquisition attempts.
pub const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(100);
/// Number of acquisition attempts before giving up.
pub const MAX_LOCK_RETRIES: u32 = 3;
/// Number of versions retained in history.
pub const MAX_HISTORY_SIZE: usize = 10;

/// Version registry configuration
///
/// Defaults reproduce the registry constants; tests shrink them.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// How long a lock stays valid without renewal
    pub lock_timeout: Duration,

    /// How often a held lock is extended by `lock_timeout`
    pub lock_renewal_interval: Duration,

    /// Delay between acquisition attempts
    pub lock_retry_interval: Duration,

    /// Acquisition attempts before `PolicyError::Lock`
    pub max_lock_retries: u32,

    /// Retained versions (in memory and in the durable store)
    pub max_history_size: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self {
            lock_timeout: LOCK_TIMEOUT,
            lock_renewal_interval: LOCK_RENEWAL_INTERVAL,
            lock_retry_interval: LOCK_RETRY_INTERVAL,
            max_lock_retries: MAX_LOCK_RETRIES,
            max_history_size: MAX_HISTORY_SIZE,
        }
    }

    /// Set lock timeout
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Set renewal interval
    pub fn lock_renewal_interval(mut self, interval: Duration) -> Self {
        self.lock_renewal_interval = interval;
        self
    }

    /// Set retry interval
    pub fn lock_retry_interval(mut self, interval: Duration) -> Self {
        self.lock_retry_interval = interval;
        self
    }

    /// Set maximum acquisition attempts
    pub fn max_lock_retries(mut self, retries: u32) -> Self {
        self.max_lock_retries = retries;
        self
    }

    /// Set history capacity
    pub fn max_history_size(mut self, size: usize) -> Self {
        self.max_history_size = size;
        self
    }

    /// Upper bound on the time `lock()` may wait before failing.
    pub fn max_lock_wait(&self) -> Duration {
        self.lock_retry_interval * self.max_lock_retries
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_lock_retries == 0 {
            return Err("max_lock_retries must be > 0".to_string());
        }

        if self.max_history_size == 0 {
            return Err("max_history_size must be > 0".to_string());
        }

        if self.lock_timeout.is_zero() {
            return Err("lock_timeout must be > 0".to_string());
        }

        if self.lock_renewal_interval.is_zero() {
            return Err("lock_renewal_interval must be > 0".to_string());
        }

        if self.lock_renewal_interval >= self.lock_timeout {
            return Err("lock_renewal_interval must be shorter than lock_timeout".to_string());
        }

        Ok(())
    }
}
