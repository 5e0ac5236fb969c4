// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (c) 2025 The Duplex Authors

//! DNS-level failover between the two duplex regions.
//!
//! The controller owns exactly two failover records sharing one query name:
//! a PRIMARY and a SECONDARY. Both records always exist; which one is the
//! effective answer is decided at resolution time from the primary region's
//! last observed health, never stored as controller state. Resolution is
//! read-only and safe for unbounded concurrent evaluation.
//!
//! This layer is coarser and stickier than the edge failover group: the
//! debounced health state changes at probe cadence, while the edge group
//! reacts per request. Together they bound how long a regional outage stays
//! client-visible.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod controller;
mod record;

pub use controller::{spawn_health_bridge, Answer, DnsFailoverController};
pub use record::{DnsError, FailoverRecord, FailoverRecordSet, RecordPriority};
