// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (c) 2025 The Duplex Authors

//! Error types for replication operations.

use thiserror::Error;

/// Result type for replication operations.
pub type Result<T> = std::result::Result<T, ReplicationError>;

/// Errors that can occur during replication.
#[derive(Debug, Error, Clone)]
pub enum ReplicationError {
    /// The peer region's store is unreachable or pushing back. Retried.
    #[error("peer {region} unavailable: {reason}")]
    PeerUnavailable {
        /// The unreachable destination region.
        region: String,
        /// The reason for failure.
        reason: String,
    },

    /// A single propagation attempt exceeded its timeout. Retried.
    #[error("propagation to {region} timed out after {timeout_ms}ms")]
    Timeout {
        /// The destination region.
        region: String,
        /// The per-attempt timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The destination rejected the object as malformed. Not retried;
    /// surfaced as an alarm.
    #[error("malformed object {key}: {reason}")]
    Malformed {
        /// The offending key.
        key: String,
        /// Why the object was rejected.
        reason: String,
    },

    /// The propagation queue for the destination is full. The caller sees
    /// the backpressure instead of the event being dropped.
    #[error("replication queue full: {pending} events pending")]
    QueueFull {
        /// Number of events pending in the queue.
        pending: usize,
    },

    /// The event originated in a region the rule pair does not cover.
    #[error("no replication route from region {region}")]
    NoRoute {
        /// The uncovered origin region.
        region: String,
    },

    /// The engine has been shut down.
    #[error("replication engine closed")]
    Closed,
}

impl ReplicationError {
    /// True if retrying the operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::PeerUnavailable { .. } | Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ReplicationError::PeerUnavailable {
            region: "us-west-2".into(),
            reason: "connection refused".into()
        }
        .is_transient());
        assert!(
            ReplicationError::Timeout { region: "us-west-2".into(), timeout_ms: 5000 }
                .is_transient()
        );
        assert!(!ReplicationError::Malformed { key: "k".into(), reason: "bad".into() }
            .is_transient());
        assert!(!ReplicationError::QueueFull { pending: 10_000 }.is_transient());
        assert!(!ReplicationError::Closed.is_transient());
    }

    #[test]
    fn test_display() {
        let err = ReplicationError::Timeout { region: "us-west-2".into(), timeout_ms: 5000 };
        assert_eq!(err.to_string(), "propagation to us-west-2 timed out after 5000ms");

        let err = ReplicationError::QueueFull { pending: 42 };
        assert_eq!(err.to_string(), "replication queue full: 42 events pending");
    }
}
