// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (c) 2025 The Duplex Authors

//! Configuration for the replication engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ReplicationError, Result};

/// Default size of each shard's propagation queue.
pub const DEFAULT_QUEUE_SIZE: usize = 10_000;

/// Default number of key-hashed shard workers per direction.
pub const DEFAULT_SHARDS: usize = 8;

/// Default retries per event after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default initial backoff between retries (ms).
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 100;

/// Default upper bound on backoff (ms).
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 10_000;

/// Default timeout for a single propagation attempt (ms).
pub const DEFAULT_ATTEMPT_TIMEOUT_MS: u64 = 5_000;

/// Default consecutive failed attempts before the lag alarm fires.
pub const DEFAULT_ALARM_AFTER_ATTEMPTS: u32 = 6;

/// Configuration for the replication engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Size of each shard's propagation queue.
    pub queue_size: usize,

    /// Number of key-hashed shard workers per destination.
    ///
    /// Events for the same key always land on the same shard, which
    /// processes sequentially: per-key FIFO, cross-key concurrency.
    pub shards: usize,

    /// Retries per event after the initial attempt.
    pub max_retries: u32,

    /// Initial backoff between retries in milliseconds.
    pub initial_backoff_ms: u64,

    /// Upper bound on backoff in milliseconds.
    pub max_backoff_ms: u64,

    /// Timeout for a single propagation attempt in milliseconds. Distinct
    /// from the overall retry budget.
    pub attempt_timeout_ms: u64,

    /// Consecutive failed attempts on one event before the alarm fires.
    pub alarm_after_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_size: DEFAULT_QUEUE_SIZE,
            shards: DEFAULT_SHARDS,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            attempt_timeout_ms: DEFAULT_ATTEMPT_TIMEOUT_MS,
            alarm_after_attempts: DEFAULT_ALARM_AFTER_ATTEMPTS,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the queue size.
    pub fn queue_size(mut self, size: usize) -> Self {
        self.queue_size = size;
        self
    }

    /// Sets the shard count.
    pub fn shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    /// Sets the retry count.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the initial backoff.
    pub fn initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff_ms = backoff.as_millis() as u64;
        self
    }

    /// Sets the maximum backoff.
    pub fn max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff_ms = backoff.as_millis() as u64;
        self
    }

    /// Sets the per-attempt timeout.
    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the alarm threshold.
    pub fn alarm_after_attempts(mut self, attempts: u32) -> Self {
        self.alarm_after_attempts = attempts;
        self
    }

    /// Returns the per-attempt timeout as a `Duration`.
    pub fn attempt_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Exponential backoff for the given retry number, capped at the
    /// configured maximum.
    pub fn backoff_for_retry(&self, retry: u32) -> Duration {
        let exp = self
            .initial_backoff_ms
            .saturating_mul(1u64.checked_shl(retry).unwrap_or(u64::MAX));
        Duration::from_millis(exp.min(self.max_backoff_ms))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ReplicationError::Malformed` naming the offending field.
    /// Invalid configuration is fatal at startup.
    pub fn validate(&self) -> Result<()> {
        if self.queue_size == 0 {
            return Err(invalid("queue_size must be positive"));
        }
        if self.shards == 0 {
            return Err(invalid("shards must be positive"));
        }
        if self.attempt_timeout_ms == 0 {
            return Err(invalid("attempt_timeout_ms must be positive"));
        }
        if self.alarm_after_attempts == 0 {
            return Err(invalid("alarm_after_attempts must be positive"));
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> ReplicationError {
    ReplicationError::Malformed { key: "<config>".to_string(), reason: reason.to_string() }
}
