//! Hybrid Logical Clock (HLC) timestamps for last-writer-wins ordering.
//!
//! Replication conflicts are resolved by comparing the origin timestamp of
//! each write. A plain wall clock cannot order events across two regions with
//! independent clocks, so timestamps combine physical time with a logical
//! counter (Kulkarni et al.).
//!
//! The timestamp packs into a single `u64`:
//! - bits 16-63 (48 bits): physical time, milliseconds since Unix epoch
//! - bits 0-15 (16 bits): logical counter
//!
//! Raw `u64` comparison therefore orders timestamps correctly: physical time
//! first, then logical counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum clock skew tolerated when accepting a remote timestamp (500ms).
pub const MAX_CLOCK_SKEW_MS: u64 = 500;

/// Mask for the logical counter component (lower 16 bits).
const LOGICAL_MASK: u64 = 0x0000_0000_0000_FFFF;

/// Number of bits for the logical counter component.
const LOGICAL_BITS: u32 = 16;

/// Error type for clock operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClockError {
    /// Remote timestamp is too far ahead of the local wall clock.
    #[error("clock skew violation: remote timestamp is {skew_ms}ms ahead of local time (max allowed: {max_skew_ms}ms)")]
    SkewViolation {
        /// Observed skew in milliseconds.
        skew_ms: u64,
        /// Maximum allowed skew in milliseconds.
        max_skew_ms: u64,
    },
}

/// A hybrid logical clock timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct HlcTimestamp(u64);

impl HlcTimestamp {
    /// Creates a timestamp from physical milliseconds and a logical counter.
    #[must_use]
    pub const fn from_parts(physical_ms: u64, logical: u16) -> Self {
        Self((physical_ms << LOGICAL_BITS) | (logical as u64))
    }

    /// Creates a timestamp from a raw packed value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw packed value.
    #[must_use]
    pub const fn as_raw(&self) -> u64 {
        self.0
    }

    /// Physical time component in milliseconds since Unix epoch.
    #[must_use]
    pub const fn physical_time(&self) -> u64 {
        self.0 >> LOGICAL_BITS
    }

    /// Logical counter component.
    #[must_use]
    pub const fn logical(&self) -> u16 {
        (self.0 & LOGICAL_MASK) as u16
    }

    /// The zero (epoch) timestamp.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// True if this is the zero/unset timestamp.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for HlcTimestamp {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for HlcTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.physical_time(), self.logical())
    }
}

impl From<u64> for HlcTimestamp {
    fn from(raw: u64) -> Self {
        Self::from_raw(raw)
    }
}

impl From<HlcTimestamp> for u64 {
    fn from(ts: HlcTimestamp) -> Self {
        ts.as_raw()
    }
}

/// A hybrid logical clock generating monotonically increasing timestamps.
///
/// Thread-safe and lock-free; concurrent callers never observe duplicate or
/// decreasing timestamps.
#[derive(Debug, Default)]
pub struct HlcClock {
    /// The last timestamp handed out, packed as u64.
    last: AtomicU64,
}

impl HlcClock {
    /// Creates a new clock.
    #[must_use]
    pub fn new() -> Self {
        Self { last: AtomicU64::new(0) }
    }

    /// Generates a timestamp for a local event.
    ///
    /// Guaranteed greater than every timestamp previously returned by this
    /// clock.
    pub fn now(&self) -> HlcTimestamp {
        let wall = wall_clock_ms();

        loop {
            let last = self.last.load(Ordering::Acquire);
            let last_ts = HlcTimestamp::from_raw(last);

            let new_ts = if wall > last_ts.physical_time() {
                HlcTimestamp::from_parts(wall, 0)
            } else {
                Self::bump_logical(last_ts)
            };

            if self
                .last
                .compare_exchange(last, new_ts.as_raw(), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return new_ts;
            }
        }
    }

    /// Merges a remote timestamp into the clock and returns a timestamp
    /// greater than both the local clock and the remote value.
    ///
    /// Call this when applying a replicated write so that a subsequent local
    /// write to the same key is ordered after it.
    pub fn update(&self, remote: HlcTimestamp) -> HlcTimestamp {
        let wall = wall_clock_ms();

        loop {
            let last = self.last.load(Ordering::Acquire);
            let last_ts = HlcTimestamp::from_raw(last);
            let max_seen = last_ts.max(remote);

            let new_ts = if wall > max_seen.physical_time() {
                HlcTimestamp::from_parts(wall, 0)
            } else {
                Self::bump_logical(max_seen)
            };

            if self
                .last
                .compare_exchange(last, new_ts.as_raw(), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return new_ts;
            }
        }
    }

    /// Validates that a remote timestamp is within the skew tolerance.
    ///
    /// # Errors
    ///
    /// Returns `ClockError::SkewViolation` if the remote physical time is more
    /// than [`MAX_CLOCK_SKEW_MS`] ahead of the local wall clock.
    pub fn validate(&self, remote: HlcTimestamp) -> Result<(), ClockError> {
        let wall = wall_clock_ms();
        let remote_physical = remote.physical_time();

        if remote_physical > wall + MAX_CLOCK_SKEW_MS {
            return Err(ClockError::SkewViolation {
                skew_ms: remote_physical - wall,
                max_skew_ms: MAX_CLOCK_SKEW_MS,
            });
        }
        Ok(())
    }

    /// Returns the last timestamp without advancing the clock.
    #[must_use]
    pub fn current(&self) -> HlcTimestamp {
        HlcTimestamp::from_raw(self.last.load(Ordering::Acquire))
    }

    /// Increments the logical counter, rolling into the next millisecond on
    /// overflow (more than 65535 events in one millisecond).
    fn bump_logical(ts: HlcTimestamp) -> HlcTimestamp {
        match ts.logical().checked_add(1) {
            Some(logical) => HlcTimestamp::from_parts(ts.physical_time(), logical),
            None => HlcTimestamp::from_parts(ts.physical_time() + 1, 0),
        }
    }
}

/// Current wall clock time in milliseconds since Unix epoch.
fn wall_clock_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system time before Unix epoch").as_millis()
        as u64
}
