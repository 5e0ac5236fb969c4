//! In-memory versioned object store.

use bytes::Bytes;
use dashmap::DashMap;
use duplex_core::{HlcTimestamp, Region, RegionId, StorageClass};

use async_trait::async_trait;

use crate::error::{Result, StoreError};
use crate::object::{ObjectMeta, StoredObject, VersionId};
use crate::store::{ObjectStore, PutOptions};

/// In-memory implementation of [`ObjectStore`].
///
/// Keeps the full version chain per key, newest last. Used by tests and
/// single-process deployments; semantics match what the replication engine
/// expects from a real regional store (per-key strong consistency, LWW guard
/// on replica application).
pub struct MemoryStore {
    region_id: RegionId,
    default_storage_class: StorageClass,
    objects: DashMap<String, Vec<StoredObject>>,
}

impl MemoryStore {
    /// Create a store for the given region.
    pub fn new(region: &Region) -> Self {
        Self {
            region_id: region.id.clone(),
            default_storage_class: region.storage_class,
            objects: DashMap::new(),
        }
    }

    /// The region this store belongs to.
    pub fn region_id(&self) -> &RegionId {
        &self.region_id
    }

    /// Number of keys with at least one version.
    pub fn key_count(&self) -> usize {
        self.objects.len()
    }

    /// Number of retained versions for a key.
    pub fn version_count(&self, key: &str) -> usize {
        self.objects.get(key).map(|chain| chain.len()).unwrap_or(0)
    }

    /// True if `incoming` wins last-writer-wins against `stored`.
    ///
    /// Higher origin timestamp wins; ties break on the origin region id so
    /// both regions converge on the same winner without coordination.
    fn replica_wins(stored: &ObjectMeta, incoming: &ObjectMeta) -> bool {
        (incoming.hlc, incoming.origin_region.as_str())
            > (stored.hlc, stored.origin_region.as_str())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(
        &self,
        key: &str,
        payload: Bytes,
        hlc: HlcTimestamp,
        opts: PutOptions,
    ) -> Result<ObjectMeta> {
        if key.is_empty() {
            return Err(StoreError::InvalidObject {
                key: key.to_string(),
                reason: "empty key".to_string(),
            });
        }

        let meta = ObjectMeta::client_write(key, self.region_id.clone(), hlc)
            .with_storage_class(opts.storage_class.unwrap_or(self.default_storage_class));

        self.objects
            .entry(key.to_string())
            .or_default()
            .push(StoredObject::new(meta.clone(), payload));
        Ok(meta)
    }

    async fn delete(&self, key: &str, hlc: HlcTimestamp) -> Result<ObjectMeta> {
        let meta = ObjectMeta::client_write(key, self.region_id.clone(), hlc)
            .with_storage_class(self.default_storage_class)
            .into_tombstone();

        self.objects
            .entry(key.to_string())
            .or_default()
            .push(StoredObject::new(meta.clone(), Bytes::new()));
        Ok(meta)
    }

    async fn get(&self, key: &str) -> Result<StoredObject> {
        let chain = self
            .objects
            .get(key)
            .ok_or_else(|| StoreError::NotFound { key: key.to_string() })?;
        match chain.last() {
            Some(latest) if !latest.is_tombstone() => Ok(latest.clone()),
            _ => Err(StoreError::NotFound { key: key.to_string() }),
        }
    }

    async fn head(&self, key: &str) -> Result<ObjectMeta> {
        let chain = self
            .objects
            .get(key)
            .ok_or_else(|| StoreError::NotFound { key: key.to_string() })?;
        chain
            .last()
            .map(|obj| obj.meta.clone())
            .ok_or_else(|| StoreError::NotFound { key: key.to_string() })
    }

    async fn list(&self) -> Result<Vec<ObjectMeta>> {
        Ok(self
            .objects
            .iter()
            .filter_map(|chain| chain.value().last().map(|obj| obj.meta.clone()))
            .collect())
    }

    async fn apply_replica(&self, object: StoredObject) -> Result<ObjectMeta> {
        if !object.meta.is_replica {
            return Err(StoreError::InvalidObject {
                key: object.meta.key.clone(),
                reason: "apply_replica requires an is_replica version".to_string(),
            });
        }

        let key = object.meta.key.clone();
        let mut chain = self.objects.entry(key).or_default();

        if let Some(stored) = chain.last() {
            if !Self::replica_wins(&stored.meta, &object.meta) {
                // Stale replica: the local version is newer, keep it.
                return Ok(stored.meta.clone());
            }
        }

        let meta = object.meta.clone();
        chain.push(object);
        Ok(meta)
    }

    async fn get_version(&self, key: &str, version_id: &VersionId) -> Result<StoredObject> {
        let chain = self
            .objects
            .get(key)
            .ok_or_else(|| StoreError::NotFound { key: key.to_string() })?;
        chain
            .iter()
            .rev()
            .find(|obj| &obj.meta.version_id == version_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { key: key.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use duplex_core::RegionRole;

    use super::*;

    fn store() -> MemoryStore {
        MemoryStore::new(&Region::new("us-east-1", RegionRole::Primary, "http://east"))
    }

    fn replica_store() -> MemoryStore {
        MemoryStore::new(
            &Region::new("us-west-2", RegionRole::Secondary, "http://west")
                .with_storage_class(StorageClass::StandardIa),
        )
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = store();
        let meta = store
            .put("index.html", Bytes::from("<html>"), HlcTimestamp::from_parts(100, 0), PutOptions::default())
            .await
            .unwrap();

        let obj = store.get("index.html").await.unwrap();
        assert_eq!(obj.meta.version_id, meta.version_id);
        assert_eq!(obj.payload, Bytes::from("<html>"));
        assert!(!obj.meta.is_replica);
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let store = store();
        assert!(matches!(store.get("nope").await, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let store = store();
        let result =
            store.put("", Bytes::new(), HlcTimestamp::from_parts(1, 0), PutOptions::default()).await;
        assert!(matches!(result, Err(StoreError::InvalidObject { .. })));
    }

    #[tokio::test]
    async fn test_delete_hides_key_but_head_sees_tombstone() {
        let store = store();
        store
            .put("k", Bytes::from("v"), HlcTimestamp::from_parts(1, 0), PutOptions::default())
            .await
            .unwrap();
        let tombstone = store.delete("k", HlcTimestamp::from_parts(2, 0)).await.unwrap();
        assert!(tombstone.is_tombstone);

        assert!(matches!(store.get("k").await, Err(StoreError::NotFound { .. })));
        assert!(store.head("k").await.unwrap().is_tombstone);
        assert_eq!(store.version_count("k"), 2);
    }

    #[tokio::test]
    async fn test_apply_replica_preserves_version_id() {
        let east = store();
        let west = replica_store();

        let meta = east
            .put("site.css", Bytes::from("body{}"), HlcTimestamp::from_parts(10, 0), PutOptions::default())
            .await
            .unwrap();

        let copy = StoredObject::new(meta.as_replica(StorageClass::StandardIa), Bytes::from("body{}"));
        let applied = west.apply_replica(copy).await.unwrap();

        assert_eq!(applied.version_id, meta.version_id);
        assert!(applied.is_replica);
        assert_eq!(applied.storage_class, StorageClass::StandardIa);

        let obj = west.get("site.css").await.unwrap();
        assert_eq!(obj.meta.version_id, meta.version_id);
    }

    #[tokio::test]
    async fn test_apply_replica_rejects_untagged_version() {
        let west = replica_store();
        let meta = ObjectMeta::client_write("k", RegionId::new("us-east-1"), HlcTimestamp::from_parts(1, 0));
        let result = west.apply_replica(StoredObject::new(meta, Bytes::new())).await;
        assert!(matches!(result, Err(StoreError::InvalidObject { .. })));
    }

    #[tokio::test]
    async fn test_stale_replica_loses_lww() {
        let west = replica_store();

        // Local write at t=20
        west.put("k", Bytes::from("newer"), HlcTimestamp::from_parts(20, 0), PutOptions::default())
            .await
            .unwrap();

        // Replica of an older write from the peer at t=10
        let old_meta =
            ObjectMeta::client_write("k", RegionId::new("us-east-1"), HlcTimestamp::from_parts(10, 0))
                .as_replica(StorageClass::StandardIa);
        let retained = west
            .apply_replica(StoredObject::new(old_meta, Bytes::from("older")))
            .await
            .unwrap();

        // The local version is retained
        assert!(!retained.is_replica);
        let obj = west.get("k").await.unwrap();
        assert_eq!(obj.payload, Bytes::from("newer"));
        assert_eq!(west.version_count("k"), 1);
    }

    #[tokio::test]
    async fn test_equal_hlc_breaks_tie_on_region_id() {
        let west = replica_store();
        let ts = HlcTimestamp::from_parts(30, 0);

        west.put("k", Bytes::from("west"), ts, PutOptions::default()).await.unwrap();

        // Same HLC from us-east-1: "us-east-1" < "us-west-2", so west wins
        let east_meta = ObjectMeta::client_write("k", RegionId::new("us-east-1"), ts)
            .as_replica(StorageClass::Standard);
        west.apply_replica(StoredObject::new(east_meta, Bytes::from("east"))).await.unwrap();

        assert_eq!(west.get("k").await.unwrap().payload, Bytes::from("west"));
    }

    #[tokio::test]
    async fn test_replica_tombstone_replaces_live_replica() {
        let east = store();
        let west = replica_store();

        let put_meta = east
            .put("index.html", Bytes::from("v1"), HlcTimestamp::from_parts(10, 0), PutOptions::default())
            .await
            .unwrap();
        west.apply_replica(StoredObject::new(
            put_meta.as_replica(StorageClass::StandardIa),
            Bytes::from("v1"),
        ))
        .await
        .unwrap();

        let del_meta = east.delete("index.html", HlcTimestamp::from_parts(11, 0)).await.unwrap();
        west.apply_replica(StoredObject::new(
            del_meta.as_replica(StorageClass::StandardIa),
            Bytes::new(),
        ))
        .await
        .unwrap();

        assert!(matches!(west.get("index.html").await, Err(StoreError::NotFound { .. })));
        assert!(west.head("index.html").await.unwrap().is_tombstone);
    }

    #[tokio::test]
    async fn test_get_version_walks_chain() {
        let store = store();
        let v1 = store
            .put("k", Bytes::from("one"), HlcTimestamp::from_parts(1, 0), PutOptions::default())
            .await
            .unwrap();
        let v2 = store
            .put("k", Bytes::from("two"), HlcTimestamp::from_parts(2, 0), PutOptions::default())
            .await
            .unwrap();

        assert_eq!(store.get_version("k", &v1.version_id).await.unwrap().payload, Bytes::from("one"));
        assert_eq!(store.get_version("k", &v2.version_id).await.unwrap().payload, Bytes::from("two"));
        assert!(store.get_version("k", &VersionId::from("missing")).await.is_err());
    }

    #[tokio::test]
    async fn test_list_reports_latest_versions() {
        let store = store();
        store
            .put("a", Bytes::from("1"), HlcTimestamp::from_parts(1, 0), PutOptions::default())
            .await
            .unwrap();
        store
            .put("b", Bytes::from("2"), HlcTimestamp::from_parts(2, 0), PutOptions::default())
            .await
            .unwrap();
        store.delete("b", HlcTimestamp::from_parts(3, 0)).await.unwrap();

        let listing = store.list().await.unwrap();
        assert_eq!(listing.len(), 2);
        let b = listing.iter().find(|m| m.key == "b").unwrap();
        assert!(b.is_tombstone);
    }
}
