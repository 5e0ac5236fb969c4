//! Configuration for the health monitor.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::probe::ProbeError;

/// Default probe interval (ms).
pub const DEFAULT_INTERVAL_MS: u64 = 30_000;

/// Default consecutive failures before a region is declared down.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 2;

/// Default per-probe timeout (ms).
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;

/// Configuration for the health monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Probe interval in milliseconds.
    pub interval_ms: u64,
    /// Consecutive failed probes before a region is declared down.
    pub failure_threshold: u32,
    /// Timeout for a single probe in milliseconds. Distinct from the
    /// interval; a hung probe never delays the next tick beyond one period.
    pub probe_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
        }
    }
}

impl MonitorConfig {
    /// Creates a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the probe interval.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval_ms = interval.as_millis() as u64;
        self
    }

    /// Sets the failure threshold.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the per-probe timeout.
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Returns the interval as a `Duration`.
    pub fn interval_duration(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Returns the probe timeout as a `Duration`.
    pub fn probe_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Validates the configuration. Invalid values are fatal at startup.
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::InvalidConfig` naming the offending field.
    pub fn validate(&self) -> Result<(), ProbeError> {
        if self.interval_ms == 0 {
            return Err(ProbeError::InvalidConfig("interval_ms must be positive".to_string()));
        }
        if self.failure_threshold == 0 {
            return Err(ProbeError::InvalidConfig(
                "failure_threshold must be positive".to_string(),
            ));
        }
        if self.probe_timeout_ms == 0 {
            return Err(ProbeError::InvalidConfig(
                "probe_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
