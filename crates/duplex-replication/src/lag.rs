// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (c) 2025 The Duplex Authors

//! Replication lag monitoring.
//!
//! Lag is the elapsed time since the destination last acknowledged an event.
//! A destination that has stopped acknowledging shows unbounded growing lag
//! and a rising failure streak, both exported as gauges.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use duplex_core::{HlcTimestamp, RegionId};
use metrics::gauge;

/// Tracks replication lag per destination region.
pub struct LagTracker {
    destinations: DashMap<RegionId, DestinationLag>,
}

/// Lag bookkeeping for a single destination.
struct DestinationLag {
    /// HLC of the last acknowledged event.
    last_hlc: AtomicU64,
    /// Monotonic time of the last acknowledgment.
    last_success: parking_lot::RwLock<Option<Instant>>,
    /// Wall-clock time of the last acknowledgment, for reporting.
    last_success_time: parking_lot::RwLock<Option<DateTime<Utc>>>,
    /// Consecutive failed attempts.
    failure_streak: AtomicU64,
    /// Total acknowledged events.
    success_count: AtomicU64,
    /// Events queued but not yet settled.
    pending: AtomicU64,
}

impl DestinationLag {
    fn new() -> Self {
        Self {
            last_hlc: AtomicU64::new(0),
            last_success: parking_lot::RwLock::new(None),
            last_success_time: parking_lot::RwLock::new(None),
            failure_streak: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            pending: AtomicU64::new(0),
        }
    }
}

impl LagTracker {
    /// Creates a new lag tracker.
    pub fn new() -> Self {
        Self { destinations: DashMap::new() }
    }

    /// Starts tracking a destination.
    pub fn add_destination(&self, region: RegionId) {
        self.destinations.insert(region, DestinationLag::new());
    }

    /// Records that an event was queued toward a destination.
    pub fn record_queued(&self, region: &RegionId) {
        if let Some(lag) = self.destinations.get(region) {
            let pending = lag.pending.fetch_add(1, Ordering::SeqCst) + 1;
            gauge!("duplex_replication_pending", "destination" => region.to_string())
                .set(pending as f64);
        }
    }

    /// Records a successful propagation.
    pub fn record_success(&self, region: &RegionId, hlc: HlcTimestamp) {
        if let Some(lag) = self.destinations.get(region) {
            lag.last_hlc.store(hlc.as_raw(), Ordering::SeqCst);
            *lag.last_success.write() = Some(Instant::now());
            *lag.last_success_time.write() = Some(Utc::now());
            lag.failure_streak.store(0, Ordering::SeqCst);
            lag.success_count.fetch_add(1, Ordering::SeqCst);
            let pending = lag.pending.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);

            gauge!("duplex_replication_failure_streak", "destination" => region.to_string())
                .set(0.0);
            gauge!("duplex_replication_pending", "destination" => region.to_string())
                .set(pending as f64);
        }
    }

    /// Records a failed propagation attempt.
    pub fn record_failure(&self, region: &RegionId) {
        if let Some(lag) = self.destinations.get(region) {
            let streak = lag.failure_streak.fetch_add(1, Ordering::SeqCst) + 1;
            gauge!("duplex_replication_failure_streak", "destination" => region.to_string())
                .set(streak as f64);
        }
    }

    /// Records that an event settled as failed (retries exhausted).
    pub fn record_abandoned(&self, region: &RegionId) {
        if let Some(lag) = self.destinations.get(region) {
            let pending = lag.pending.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
            gauge!("duplex_replication_pending", "destination" => region.to_string())
                .set(pending as f64);
        }
    }

    /// Elapsed milliseconds since the destination last acknowledged.
    ///
    /// `None` before the first acknowledgment.
    pub fn lag_ms(&self, region: &RegionId) -> Option<u64> {
        self.destinations.get(region).and_then(|lag| {
            lag.last_success.read().map(|instant| instant.elapsed().as_millis() as u64)
        })
    }

    /// HLC of the last acknowledged event.
    pub fn last_hlc(&self, region: &RegionId) -> Option<HlcTimestamp> {
        self.destinations
            .get(region)
            .map(|lag| HlcTimestamp::from_raw(lag.last_hlc.load(Ordering::SeqCst)))
    }

    /// Consecutive failed attempts.
    pub fn failure_streak(&self, region: &RegionId) -> Option<u64> {
        self.destinations.get(region).map(|lag| lag.failure_streak.load(Ordering::SeqCst))
    }

    /// Events queued but not yet settled.
    pub fn pending(&self, region: &RegionId) -> Option<u64> {
        self.destinations.get(region).map(|lag| lag.pending.load(Ordering::SeqCst))
    }

    /// Snapshot of every tracked destination.
    pub fn snapshot(&self) -> Vec<DirectionLag> {
        self.destinations
            .iter()
            .map(|entry| {
                let lag = entry.value();
                DirectionLag {
                    destination: entry.key().clone(),
                    lag_ms: lag
                        .last_success
                        .read()
                        .map(|instant| instant.elapsed().as_millis() as u64),
                    last_hlc: HlcTimestamp::from_raw(lag.last_hlc.load(Ordering::SeqCst)),
                    failure_streak: lag.failure_streak.load(Ordering::SeqCst),
                    success_count: lag.success_count.load(Ordering::SeqCst),
                    pending: lag.pending.load(Ordering::SeqCst),
                    last_success_time: *lag.last_success_time.read(),
                }
            })
            .collect()
    }

    /// Publishes lag gauges for every destination.
    pub fn update_metrics(&self) {
        for entry in self.destinations.iter() {
            let region = entry.key();
            let lag = entry.value();
            if let Some(ms) =
                lag.last_success.read().map(|instant| instant.elapsed().as_millis() as u64)
            {
                gauge!("duplex_replication_lag_ms", "destination" => region.to_string())
                    .set(ms as f64);
            }
        }
    }
}

impl Default for LagTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Lag summary for one destination.
#[derive(Debug, Clone)]
pub struct DirectionLag {
    /// Destination region.
    pub destination: RegionId,
    /// Elapsed ms since the last acknowledgment (`None` before the first).
    pub lag_ms: Option<u64>,
    /// HLC of the last acknowledged event.
    pub last_hlc: HlcTimestamp,
    /// Consecutive failed attempts.
    pub failure_streak: u64,
    /// Total acknowledged events.
    pub success_count: u64,
    /// Events queued but not yet settled.
    pub pending: u64,
    /// Wall-clock time of the last acknowledgment.
    pub last_success_time: Option<DateTime<Utc>>,
}

impl DirectionLag {
    /// True if the destination acknowledged within the threshold.
    pub fn is_healthy(&self, threshold_ms: u64) -> bool {
        self.lag_ms.map(|lag| lag <= threshold_ms).unwrap_or(false)
    }
}
