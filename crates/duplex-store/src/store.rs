//! The object store adapter trait.

use async_trait::async_trait;
use bytes::Bytes;
use duplex_core::{HlcTimestamp, StorageClass};

use crate::error::Result;
use crate::object::{ObjectMeta, StoredObject, VersionId};

/// Options applied to a direct client write.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// Storage class override for this write.
    pub storage_class: Option<StorageClass>,
}

impl PutOptions {
    /// Options with a storage class override.
    pub fn with_storage_class(storage_class: StorageClass) -> Self {
        Self { storage_class: Some(storage_class) }
    }
}

/// Adapter to a versioned key/object store in one region.
///
/// Strongly consistent within its region; cross-region consistency is the
/// replication engine's job. Implementations must be cheap to clone behind an
/// `Arc` and safe for concurrent use.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Writes a new version for `key` and returns its metadata.
    ///
    /// This is the client-write path: the stored version is tagged
    /// `is_replica = false` and stamped with the supplied origin timestamp.
    async fn put(
        &self,
        key: &str,
        payload: Bytes,
        hlc: HlcTimestamp,
        opts: PutOptions,
    ) -> Result<ObjectMeta>;

    /// Writes a tombstone version for `key` and returns its metadata.
    async fn delete(&self, key: &str, hlc: HlcTimestamp) -> Result<ObjectMeta>;

    /// Returns the latest live version of `key`.
    ///
    /// A key whose latest version is a tombstone reports `NotFound`.
    async fn get(&self, key: &str) -> Result<StoredObject>;

    /// Returns the latest version of `key` including tombstones.
    async fn head(&self, key: &str) -> Result<ObjectMeta>;

    /// Lists the latest version metadata of every key, tombstones included.
    async fn list(&self) -> Result<Vec<ObjectMeta>>;

    /// Applies a replication-delivered version.
    ///
    /// The version must already be tagged `is_replica = true`. Returns the
    /// stored metadata, or the retained local metadata when the incoming
    /// version loses last-writer-wins against what is already stored.
    async fn apply_replica(&self, object: StoredObject) -> Result<ObjectMeta>;

    /// Returns a specific version of `key`, if it is still retained.
    async fn get_version(&self, key: &str, version_id: &VersionId) -> Result<StoredObject>;
}
