// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (c) 2025 The Duplex Authors

//! The DNS failover controller.

use std::sync::Arc;

use dashmap::DashMap;
use duplex_core::RegionId;
use duplex_health::{HealthEvent, HealthMonitor, HealthStatus};
use metrics::counter;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::record::{FailoverRecordSet, RecordPriority};

/// A resolution answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// The answered target.
    pub target: String,
    /// Which record produced the answer.
    pub priority: RecordPriority,
    /// Record TTL in seconds.
    pub ttl_secs: u32,
}

/// Controller owning the failover record pair for one query name.
///
/// The controller performs no polling of its own: it is fed health
/// observations through [`on_health_change`](Self::on_health_change)
/// (typically bridged from a [`HealthMonitor`]) and consults the last
/// observation at resolution time. With no observation yet, or with the
/// health subsystem gone quiet, resolution conservatively fails open to the
/// primary answer rather than refusing to resolve.
pub struct DnsFailoverController {
    records: FailoverRecordSet,
    observed: DashMap<RegionId, HealthStatus>,
}

impl DnsFailoverController {
    /// Creates a controller owning the given record set.
    pub fn new(records: FailoverRecordSet) -> Self {
        Self { records, observed: DashMap::new() }
    }

    /// Feeds a health observation for a region.
    pub fn on_health_change(&self, region: &RegionId, status: HealthStatus) {
        let previous = self.observed.insert(region.clone(), status);
        if previous != Some(status) {
            info!(region = %region, status = %status, "Health observation changed");
            counter!("duplex_dns_health_changes_total", "region" => region.to_string())
                .increment(1);
        }
    }

    /// Resolves the query name.
    ///
    /// Returns the primary answer unless the primary record evaluates target
    /// health and its bound region was last observed down. Read-only and
    /// side-effect free apart from metrics.
    pub fn resolve(&self) -> Answer {
        let primary = self.records.primary();

        let primary_healthy = if !primary.evaluate_target_health {
            true
        } else {
            match &primary.health_check {
                // Fail open: unknown health resolves to the default answer.
                None => true,
                Some(region) => self
                    .observed
                    .get(region)
                    .map(|status| status.is_up())
                    .unwrap_or(true),
            }
        };

        if primary_healthy {
            Answer {
                target: primary.target.clone(),
                priority: RecordPriority::Primary,
                ttl_secs: self.records.ttl_secs,
            }
        } else {
            debug!(name = %self.records.name, "Answering with secondary record");
            counter!("duplex_dns_secondary_answers_total").increment(1);
            Answer {
                target: self.records.secondary().target.clone(),
                priority: RecordPriority::Secondary,
                ttl_secs: self.records.ttl_secs,
            }
        }
    }

    /// The query name this controller answers for.
    pub fn name(&self) -> &str {
        &self.records.name
    }

    /// The last observed status for a region, if any.
    pub fn observed(&self, region: &RegionId) -> Option<HealthStatus> {
        self.observed.get(region).map(|status| *status)
    }
}

/// Bridges a [`HealthMonitor`] subscription into the controller.
///
/// The returned task ends when the monitor (and with it the event channel)
/// is dropped. Missed events are tolerated: the next observation overwrites
/// the stale one.
pub fn spawn_health_bridge(
    controller: Arc<DnsFailoverController>,
    monitor: &HealthMonitor,
) -> JoinHandle<()> {
    let mut events = monitor.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(HealthEvent::RegionUp { region }) => {
                    controller.on_health_change(&region, HealthStatus::Up);
                }
                Ok(HealthEvent::RegionDown { region, .. }) => {
                    controller.on_health_change(&region, HealthStatus::Down);
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed = missed, "Health bridge lagged; resyncing on next event");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Health event channel closed, stopping bridge");
                    break;
                }
            }
        }
    })
}
