//! Region health monitoring for the duplex control plane.
//!
//! One lightweight periodic task per region probes the region's liveness
//! endpoint and folds raw probe results into a debounced up/down state:
//!
//! - `Up -> Down` only after `failure_threshold` consecutive failed probes
//! - `Down -> Up` after a single successful probe
//!
//! Slow to declare failure, quick to restore. State changes are published on
//! a broadcast channel (consumed by the DNS failover controller) and the
//! latest state per region is snapshot-readable without blocking the probe
//! tasks.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod monitor;
mod probe;
mod state;

pub use config::{
    MonitorConfig, DEFAULT_FAILURE_THRESHOLD, DEFAULT_INTERVAL_MS, DEFAULT_PROBE_TIMEOUT_MS,
};
pub use monitor::{HealthEvent, HealthMonitor};
pub use probe::{HttpProber, ProbeError, Prober};
pub use state::{HealthState, HealthStatus};
