// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (c) 2025 The Duplex Authors

//! Bidirectional cross-region replication for the duplex control plane.
//!
//! Each region runs one [`ReplicationEngine`] that consumes the region's
//! committed object-change events and propagates them to the peer region:
//!
//! ```text
//! Client Write (region A)
//!      │
//!      ▼
//! ┌──────────┐  ChangeEvent   ┌────────────────────┐
//! │ Store A  │───────────────▶│ ReplicationEngine A │
//! └──────────┘                └─────────┬──────────┘
//!                        is_replica?────┤ yes → Ack::Skipped
//!                                       │ no
//!                                       ▼
//!                              shard queue (per-key FIFO)
//!                                       │ retry + backoff
//!                                       ▼
//!                              ┌──────────────┐
//!                              │ Store B      │ copy tagged is_replica=true
//!                              └──────────────┘
//! ```
//!
//! Loop prevention is a tagged-message discipline, not a graph property:
//! every propagated copy carries `is_replica = true`, and an engine never
//! re-emits an event it received as a replica. With exactly two mirrored
//! rules this guarantees each object version crosses each direction at most
//! once.
//!
//! Propagation is asynchronous and never blocks the originating write.
//! Transient destination errors are retried with exponential backoff under a
//! per-attempt timeout; exhaustion raises an operator-visible
//! [`ReplicationAlarm`] instead of silently dropping the event.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod event;
mod lag;
mod rule;

pub use config::{
    EngineConfig, DEFAULT_ALARM_AFTER_ATTEMPTS, DEFAULT_ATTEMPT_TIMEOUT_MS,
    DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_MAX_BACKOFF_MS, DEFAULT_MAX_RETRIES, DEFAULT_QUEUE_SIZE,
    DEFAULT_SHARDS,
};
pub use engine::{PeerWriter, ReplicationAlarm, ReplicationEngine, StorePeer};
pub use error::{ReplicationError, Result};
pub use event::{Ack, ChangeEvent, ReplicationState, ReplicationStatus};
pub use lag::{DirectionLag, LagTracker};
pub use rule::{ReplicationRule, RulePair, RuleStatus};
