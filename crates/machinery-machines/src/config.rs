//! Reconciliation settings
//!
//! Defaults match the machine controller manager's expectations; the poll
//! cadence and the wait deadline can be overridden from the environment.

use std::time::Duration;

use machinery_common::Error;

/// Environment variable overriding [`ReconcileConfig::poll_interval`] (seconds)
pub const POLL_INTERVAL_ENV: &str = "MACHINERY_POLL_INTERVAL_SECS";

/// Environment variable overriding [`ReconcileConfig::timeout`] (seconds)
pub const WAIT_TIMEOUT_ENV: &str = "MACHINERY_WAIT_TIMEOUT_SECS";

/// Trait for reading environment configuration
///
/// Keeps `from_env` testable without touching process-global state.
#[cfg_attr(test, mockall::automock)]
pub trait EnvSource: Send + Sync {
    /// Value of an environment variable, if set
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads from the process environment
#[derive(Clone, Copy, Debug, Default)]
pub struct OsEnv;

impl EnvSource for OsEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Settings shared by deploy and teardown
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Delay between polls while waiting for availability or deletion
    pub poll_interval: Duration,
    /// Deadline for each bounded wait
    pub timeout: Duration,
    /// `minReadySeconds` of every machine deployment
    pub min_ready_seconds: u32,
    /// Rolling update surge
    pub max_surge: u32,
    /// Rolling update unavailability
    pub max_unavailable: u32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(30 * 60),
            min_ready_seconds: 500,
            max_surge: 1,
            max_unavailable: 1,
        }
    }
}

impl ReconcileConfig {
    /// Defaults with the poll interval and timeout taken from `env` when set
    pub fn from_env(env: &dyn EnvSource) -> Result<Self, Error> {
        let mut config = Self::default();
        if let Some(interval) = read_secs(env, POLL_INTERVAL_ENV)? {
            config.poll_interval = interval;
        }
        if let Some(timeout) = read_secs(env, WAIT_TIMEOUT_ENV)? {
            config.timeout = timeout;
        }
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make every wait fail or spin
    pub fn validate(&self) -> Result<(), Error> {
        if self.poll_interval.is_zero() {
            return Err(Error::validation_for_field(
                POLL_INTERVAL_ENV,
                "poll interval must be greater than zero",
            ));
        }
        if self.poll_interval > self.timeout {
            return Err(Error::validation_for_field(
                WAIT_TIMEOUT_ENV,
                format!(
                    "timeout {:?} is shorter than poll interval {:?}",
                    self.timeout, self.poll_interval
                ),
            ));
        }
        Ok(())
    }
}

fn read_secs(env: &dyn EnvSource, key: &str) -> Result<Option<Duration>, Error> {
    let Some(raw) = env.var(key) else {
        return Ok(None);
    };
    let secs: u64 = raw.trim().parse().map_err(|_| {
        Error::validation_for_field(key, format!("expected whole seconds, got '{}'", raw))
    })?;
    Ok(Some(Duration::from_secs(secs)))
}
