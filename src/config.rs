//! Runtime configuration.
//!
//! # Environment
//! - `TREELOCK_ACQUIRE_TIMEOUT_MS`: bound on each latch wait, in
//!   milliseconds. Unset, empty or `0` means wait indefinitely.

use std::env;
use std::time::Duration;

use thiserror::Error;

/// Environment variable holding the latch acquisition timeout.
pub const ACQUIRE_TIMEOUT_ENV: &str = "TREELOCK_ACQUIRE_TIMEOUT_MS";

/// Lock-tree configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Config {
    /// Upper bound on each latch wait. [`None`] blocks until acquired.
    ///
    /// When a wait times out the operation fails with
    /// [`LockTreeError::Contended`](crate::LockTreeError::Contended) and
    /// mutates nothing.
    pub acquire_timeout: Option<Duration>,
}

/// The configuration environment could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value for {var}: `{value}` (expected milliseconds)")]
pub struct ConfigError {
    /// Offending variable.
    pub var: &'static str,
    /// Its raw value.
    pub value: String,
}

impl Config {
    /// Blocking acquisition, no timeout.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            acquire_timeout: None,
        }
    }

    /// Bound every latch wait by `timeout`.
    #[must_use]
    pub const fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Read the configuration from the process environment.
    ///
    /// # Errors
    /// [`ConfigError`] if a variable is set to something unparsable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Read the configuration through `lookup` instead of the environment.
    ///
    /// # Errors
    /// [`ConfigError`] if a variable is set to something unparsable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();

        if let Some(raw) = lookup(ACQUIRE_TIMEOUT_ENV) {
            let trimmed: &str = raw.trim();
            if !trimmed.is_empty() {
                let millis: u64 = trimmed.parse().map_err(|_| ConfigError {
                    var: ACQUIRE_TIMEOUT_ENV,
                    value: raw.clone(),
                })?;
                if millis > 0 {
                    config.acquire_timeout = Some(Duration::from_millis(millis));
                }
            }
        }

        Ok(config)
    }
}
