// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (c) 2025 The Duplex Authors

//! Change events consumed by the replication engine and the acknowledgments
//! it returns.

use chrono::{DateTime, Utc};
use duplex_core::{HlcTimestamp, RegionId};
use duplex_store::{ObjectMeta, StoredObject, VersionId};
use serde::{Deserialize, Serialize};

/// A committed object change in one region.
///
/// Emitted once per committed write or delete, after local durability. The
/// metadata carries provenance: `is_replica` distinguishes
/// replication-delivered versions from direct client writes.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    /// An object version was written.
    ObjectWritten {
        /// The stored version, payload included.
        object: StoredObject,
    },
    /// A tombstone version was written.
    ObjectDeleted {
        /// The tombstone metadata.
        meta: ObjectMeta,
    },
}

impl ChangeEvent {
    /// Event for a committed write.
    pub fn object_written(object: StoredObject) -> Self {
        Self::ObjectWritten { object }
    }

    /// Event for a committed delete.
    pub fn object_deleted(meta: ObjectMeta) -> Self {
        Self::ObjectDeleted { meta }
    }

    /// The version metadata of the changed object.
    pub fn meta(&self) -> &ObjectMeta {
        match self {
            Self::ObjectWritten { object } => &object.meta,
            Self::ObjectDeleted { meta } => meta,
        }
    }

    /// The object key.
    pub fn key(&self) -> &str {
        &self.meta().key
    }

    /// The version id.
    pub fn version_id(&self) -> &VersionId {
        &self.meta().version_id
    }

    /// The origin timestamp.
    pub fn hlc(&self) -> HlcTimestamp {
        self.meta().hlc
    }

    /// The region the originating client write happened in.
    pub fn origin_region(&self) -> &RegionId {
        &self.meta().origin_region
    }

    /// True if this version arrived via replication.
    pub fn is_replica(&self) -> bool {
        self.meta().is_replica
    }

    /// True if this is a delete event.
    pub fn is_delete(&self) -> bool {
        matches!(self, Self::ObjectDeleted { .. })
    }
}

/// Acknowledgment returned by `ReplicationEngine::propagate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    /// The event was queued for propagation to the peer.
    Queued {
        /// The destination region.
        destination: RegionId,
    },
    /// The event was a replica delivery; loop prevention dropped it.
    Skipped,
    /// The rule pair does not cover this event (disabled rule, prefix
    /// mismatch, or delete-marker replication off).
    Filtered,
}

impl Ack {
    /// True if the event was queued for propagation.
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }
}

/// Replication state of a tracked event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplicationState {
    /// Queued but not yet acknowledged by the peer.
    Pending,
    /// Applied by the peer.
    Complete,
    /// Retries exhausted or permanently rejected; an alarm was raised.
    Failed,
}

impl ReplicationState {
    /// True if the event reached the peer.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// True if the event has not settled yet.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Tracked status of one propagated event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationStatus {
    /// Object key.
    pub key: String,
    /// Version id being propagated.
    pub version_id: VersionId,
    /// Destination region.
    pub destination: RegionId,
    /// Current state.
    pub state: ReplicationState,
    /// Attempts made so far.
    pub attempts: u32,
    /// Last error observed, if any.
    pub last_error: Option<String>,
    /// When the event was queued.
    pub queued_at: DateTime<Utc>,
    /// When the event settled (completed or failed).
    pub settled_at: Option<DateTime<Utc>>,
}

impl ReplicationStatus {
    /// A freshly queued status.
    pub fn queued(key: impl Into<String>, version_id: VersionId, destination: RegionId) -> Self {
        Self {
            key: key.into(),
            version_id,
            destination,
            state: ReplicationState::Pending,
            attempts: 0,
            last_error: None,
            queued_at: Utc::now(),
            settled_at: None,
        }
    }
}
