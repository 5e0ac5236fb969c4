//! Object and version metadata.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use duplex_core::{HlcTimestamp, RegionId, StorageClass};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an object version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionId(pub String);

impl VersionId {
    /// Generate a fresh version id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the version id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VersionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for VersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata carried by every stored object version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Object key.
    pub key: String,
    /// Version id of this object version.
    pub version_id: VersionId,
    /// Region where the originating client write happened.
    pub origin_region: RegionId,
    /// True if this version arrived via replication rather than a direct
    /// client write. Replicated versions are never re-propagated.
    pub is_replica: bool,
    /// True if this version is a delete marker.
    pub is_tombstone: bool,
    /// Origin timestamp used for last-writer-wins ordering.
    pub hlc: HlcTimestamp,
    /// Storage class this version was stored with.
    pub storage_class: StorageClass,
    /// Wall-clock time the version was committed locally.
    pub stored_at: DateTime<Utc>,
}

impl ObjectMeta {
    /// Metadata for a direct client write.
    pub fn client_write(key: impl Into<String>, origin_region: RegionId, hlc: HlcTimestamp) -> Self {
        Self {
            key: key.into(),
            version_id: VersionId::generate(),
            origin_region,
            is_replica: false,
            is_tombstone: false,
            hlc,
            storage_class: StorageClass::Standard,
            stored_at: Utc::now(),
        }
    }

    /// Derives the metadata stored on the peer for a replicated copy of this
    /// version: same key, version and origin timestamp, tagged as a replica,
    /// restamped with the destination's storage class.
    pub fn as_replica(&self, storage_class: StorageClass) -> Self {
        Self {
            is_replica: true,
            storage_class,
            stored_at: Utc::now(),
            ..self.clone()
        }
    }

    /// Mark this version as a tombstone.
    pub fn into_tombstone(mut self) -> Self {
        self.is_tombstone = true;
        self
    }

    /// Set the storage class.
    pub fn with_storage_class(mut self, storage_class: StorageClass) -> Self {
        self.storage_class = storage_class;
        self
    }
}

/// A stored object version: payload plus metadata.
///
/// Tombstones carry an empty payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredObject {
    /// Version metadata.
    pub meta: ObjectMeta,
    /// Object payload.
    pub payload: Bytes,
}

impl StoredObject {
    /// Create a stored object from metadata and payload.
    pub fn new(meta: ObjectMeta, payload: Bytes) -> Self {
        Self { meta, payload }
    }

    /// True if this version is a delete marker.
    pub fn is_tombstone(&self) -> bool {
        self.meta.is_tombstone
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_id_generation_unique() {
        assert_ne!(VersionId::generate(), VersionId::generate());
    }

    #[test]
    fn test_client_write_meta() {
        let meta =
            ObjectMeta::client_write("index.html", RegionId::new("us-east-1"), HlcTimestamp::from_parts(100, 0));
        assert_eq!(meta.key, "index.html");
        assert!(!meta.is_replica);
        assert!(!meta.is_tombstone);
        assert_eq!(meta.origin_region.as_str(), "us-east-1");
    }

    #[test]
    fn test_as_replica_preserves_version_and_hlc() {
        let meta =
            ObjectMeta::client_write("index.html", RegionId::new("us-east-1"), HlcTimestamp::from_parts(100, 7));
        let replica = meta.as_replica(duplex_core::StorageClass::StandardIa);

        assert!(replica.is_replica);
        assert_eq!(replica.version_id, meta.version_id);
        assert_eq!(replica.hlc, meta.hlc);
        assert_eq!(replica.origin_region, meta.origin_region);
        assert_eq!(replica.storage_class, duplex_core::StorageClass::StandardIa);
    }

    #[test]
    fn test_tombstone_replica_stays_tombstone() {
        let meta = ObjectMeta::client_write("gone", RegionId::new("us-east-1"), HlcTimestamp::from_parts(5, 0))
            .into_tombstone();
        let replica = meta.as_replica(duplex_core::StorageClass::Standard);
        assert!(replica.is_tombstone);
        assert!(replica.is_replica);
    }

    #[test]
    fn test_meta_serde_roundtrip() {
        let meta =
            ObjectMeta::client_write("k", RegionId::new("us-east-1"), HlcTimestamp::from_parts(1, 1));
        let json = serde_json::to_string(&meta).unwrap();
        let parsed: ObjectMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.version_id, meta.version_id);
        assert_eq!(parsed.hlc, meta.hlc);
    }
}
