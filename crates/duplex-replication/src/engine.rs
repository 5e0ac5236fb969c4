// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (c) 2025 The Duplex Authors

//! The replication engine: loop prevention, sharded propagation, retry.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use duplex_core::{RegionId, StorageClass};
use duplex_store::{ObjectStore, StoreError, StoredObject, VersionId};
use metrics::counter;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::{ReplicationError, Result};
use crate::event::{Ack, ChangeEvent, ReplicationState, ReplicationStatus};
use crate::lag::LagTracker;
use crate::rule::{ReplicationRule, RulePair};

/// A writer for delivering replica copies to the peer region.
#[async_trait]
pub trait PeerWriter: Send + Sync {
    /// The destination region.
    fn region_id(&self) -> &RegionId;

    /// Applies a replica-tagged object version on the peer.
    async fn apply(&self, object: StoredObject) -> Result<()>;
}

/// [`PeerWriter`] backed by the peer region's [`ObjectStore`].
pub struct StorePeer {
    region_id: RegionId,
    store: Arc<dyn ObjectStore>,
}

impl StorePeer {
    /// Create a peer writer for the given region and store.
    pub fn new(region_id: RegionId, store: Arc<dyn ObjectStore>) -> Self {
        Self { region_id, store }
    }
}

#[async_trait]
impl PeerWriter for StorePeer {
    fn region_id(&self) -> &RegionId {
        &self.region_id
    }

    async fn apply(&self, object: StoredObject) -> Result<()> {
        self.store.apply_replica(object).await.map(|_| ()).map_err(|e| match e {
            StoreError::Unavailable { reason } => ReplicationError::PeerUnavailable {
                region: self.region_id.to_string(),
                reason,
            },
            StoreError::InvalidObject { key, reason } => {
                ReplicationError::Malformed { key, reason }
            }
            StoreError::NotFound { key } => ReplicationError::Malformed {
                key,
                reason: "destination reported missing key".to_string(),
            },
        })
    }
}

/// Operator-visible alarm raised when an event cannot be propagated.
#[derive(Debug, Clone)]
pub struct ReplicationAlarm {
    /// Destination region.
    pub destination: RegionId,
    /// Object key.
    pub key: String,
    /// Version id that failed to propagate.
    pub version_id: VersionId,
    /// Attempts made when the alarm fired.
    pub attempts: u32,
    /// The last error observed.
    pub error: String,
    /// Whether the engine has given up on this event.
    pub abandoned: bool,
}

/// Event queued toward the peer, already tagged as a replica.
struct QueuedEvent {
    object: StoredObject,
}

/// The per-region replication engine.
///
/// One engine runs in each region, consuming that region's committed change
/// events and propagating genuine client writes to the peer. See the crate
/// docs for the loop-prevention discipline.
pub struct ReplicationEngine {
    config: EngineConfig,
    rule: ReplicationRule,
    local_region: RegionId,
    dest_region: RegionId,
    dest_storage_class: StorageClass,
    shard_txs: Vec<mpsc::Sender<QueuedEvent>>,
    lag: Arc<LagTracker>,
    status: Arc<DashMap<VersionId, ReplicationStatus>>,
    alarm_tx: broadcast::Sender<ReplicationAlarm>,
}

impl ReplicationEngine {
    /// Creates an engine for `local_region` propagating to `peer`.
    ///
    /// Validates the configuration and that the rule pair covers the local
    /// region with `peer` as its destination. Shard workers are spawned
    /// immediately.
    ///
    /// # Errors
    ///
    /// Fails fast on invalid configuration or a rule/peer mismatch.
    pub fn new(
        config: EngineConfig,
        rules: RulePair,
        local_region: RegionId,
        peer: Arc<dyn PeerWriter>,
        dest_storage_class: StorageClass,
    ) -> Result<Self> {
        config.validate()?;

        let rule = rules
            .rule_from(&local_region)
            .ok_or_else(|| ReplicationError::NoRoute { region: local_region.to_string() })?
            .clone();
        let dest_region = rule.dest_region.clone();
        if &dest_region != peer.region_id() {
            return Err(ReplicationError::NoRoute { region: peer.region_id().to_string() });
        }

        let lag = Arc::new(LagTracker::new());
        lag.add_destination(dest_region.clone());

        let status: Arc<DashMap<VersionId, ReplicationStatus>> = Arc::new(DashMap::new());
        let (alarm_tx, _) = broadcast::channel(1024);

        let mut shard_txs = Vec::with_capacity(config.shards);
        for shard in 0..config.shards {
            let (tx, rx) = mpsc::channel::<QueuedEvent>(config.queue_size);
            shard_txs.push(tx);

            let peer = Arc::clone(&peer);
            let config = config.clone();
            let lag = Arc::clone(&lag);
            let status = Arc::clone(&status);
            let alarm_tx = alarm_tx.clone();
            tokio::spawn(async move {
                Self::shard_worker(shard, peer, rx, config, lag, status, alarm_tx).await;
            });
        }

        info!(
            local = %local_region,
            destination = %dest_region,
            shards = config.shards,
            "Replication engine started"
        );

        Ok(Self {
            config,
            rule,
            local_region,
            dest_region,
            dest_storage_class,
            shard_txs,
            lag,
            status,
            alarm_tx,
        })
    }

    /// Handles one committed change event.
    ///
    /// Loop prevention comes first: a replica-delivered event is acknowledged
    /// as [`Ack::Skipped`] without touching the queues. Rule filtering comes
    /// second. A genuine, matching client write is queued to its key's shard
    /// and acknowledged immediately; propagation happens in the background.
    ///
    /// # Errors
    ///
    /// `QueueFull` when the key's shard queue is saturated, `NoRoute` for
    /// events from a region outside the pair, `Closed` after shutdown.
    pub fn propagate(&self, event: ChangeEvent) -> Result<Ack> {
        if event.is_replica() {
            debug!(key = %event.key(), "Skipping replica-delivered event");
            counter!("duplex_replication_skipped_total").increment(1);
            return Ok(Ack::Skipped);
        }

        if event.origin_region() != &self.local_region {
            return Err(ReplicationError::NoRoute {
                region: event.origin_region().to_string(),
            });
        }

        if !self.rule.matches(&event) {
            debug!(key = %event.key(), "Event filtered by replication rule");
            counter!("duplex_replication_filtered_total").increment(1);
            return Ok(Ack::Filtered);
        }

        if self.shard_txs.is_empty() {
            return Err(ReplicationError::Closed);
        }

        let object = self.replica_object(&event);
        let shard = self.shard_for(event.key());
        let queued = QueuedEvent { object };

        self.status.insert(
            event.version_id().clone(),
            ReplicationStatus::queued(event.key(), event.version_id().clone(), self.dest_region.clone()),
        );

        match self.shard_txs[shard].try_send(queued) {
            Ok(()) => {
                self.lag.record_queued(&self.dest_region);
                debug!(
                    key = %event.key(),
                    version_id = %event.version_id(),
                    shard = shard,
                    "Queued event for propagation"
                );
                Ok(Ack::Queued { destination: self.dest_region.clone() })
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.status.remove(event.version_id());
                error!(key = %event.key(), shard = shard, "Replication queue full");
                Err(ReplicationError::QueueFull { pending: self.config.queue_size })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.status.remove(event.version_id());
                Err(ReplicationError::Closed)
            }
        }
    }

    /// Subscribes to replication alarms.
    pub fn subscribe_alarms(&self) -> broadcast::Receiver<ReplicationAlarm> {
        self.alarm_tx.subscribe()
    }

    /// The tracked status of a propagated version, if known.
    pub fn status(&self, version_id: &VersionId) -> Option<ReplicationStatus> {
        self.status.get(version_id).map(|entry| entry.clone())
    }

    /// The lag tracker for this engine's direction.
    pub fn lag_tracker(&self) -> &LagTracker {
        &self.lag
    }

    /// Shared handle to the lag tracker, for periodic metric refresh tasks.
    pub fn lag_handle(&self) -> Arc<LagTracker> {
        Arc::clone(&self.lag)
    }

    /// The destination region this engine propagates to.
    pub fn destination(&self) -> &RegionId {
        &self.dest_region
    }

    /// Stops accepting new events and lets workers drain their queues.
    pub fn shutdown(&mut self) {
        self.shard_txs.clear();
        info!(local = %self.local_region, "Replication engine shutting down");
    }

    /// Builds the replica copy stored on the peer: same key, version and
    /// origin timestamp, tagged `is_replica`, restamped with the
    /// destination's storage class.
    fn replica_object(&self, event: &ChangeEvent) -> StoredObject {
        match event {
            ChangeEvent::ObjectWritten { object } => StoredObject::new(
                object.meta.as_replica(self.dest_storage_class),
                object.payload.clone(),
            ),
            ChangeEvent::ObjectDeleted { meta } => {
                StoredObject::new(meta.as_replica(self.dest_storage_class), Bytes::new())
            }
        }
    }

    /// Shard index for a key. Same key, same shard: per-key FIFO.
    fn shard_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shard_txs.len()
    }

    /// Background worker owning one shard queue. Processes events strictly
    /// in queue order, so two versions of the same key can never reorder.
    async fn shard_worker(
        shard: usize,
        peer: Arc<dyn PeerWriter>,
        mut rx: mpsc::Receiver<QueuedEvent>,
        config: EngineConfig,
        lag: Arc<LagTracker>,
        status: Arc<DashMap<VersionId, ReplicationStatus>>,
        alarm_tx: broadcast::Sender<ReplicationAlarm>,
    ) {
        debug!(shard = shard, destination = %peer.region_id(), "Replication shard worker started");

        while let Some(queued) = rx.recv().await {
            Self::send_with_retry(&peer, queued.object, &config, &lag, &status, &alarm_tx).await;
        }

        debug!(shard = shard, "Replication shard worker stopped");
    }

    /// Delivers one object with bounded retries and exponential backoff.
    /// Every attempt runs under its own timeout. Exhaustion or a permanent
    /// rejection raises an alarm; nothing is dropped silently.
    async fn send_with_retry(
        peer: &Arc<dyn PeerWriter>,
        object: StoredObject,
        config: &EngineConfig,
        lag: &LagTracker,
        status: &DashMap<VersionId, ReplicationStatus>,
        alarm_tx: &broadcast::Sender<ReplicationAlarm>,
    ) {
        let destination = peer.region_id().clone();
        let key = object.meta.key.clone();
        let version_id = object.meta.version_id.clone();
        let hlc = object.meta.hlc;

        let mut attempts: u32 = 0;
        let mut alarmed = false;

        loop {
            attempts += 1;

            let outcome =
                tokio::time::timeout(config.attempt_timeout_duration(), peer.apply(object.clone()))
                    .await
                    .unwrap_or(Err(ReplicationError::Timeout {
                        region: destination.to_string(),
                        timeout_ms: config.attempt_timeout_ms,
                    }));

            match outcome {
                Ok(()) => {
                    lag.record_success(&destination, hlc);
                    if let Some(mut entry) = status.get_mut(&version_id) {
                        entry.state = ReplicationState::Complete;
                        entry.attempts = attempts;
                        entry.settled_at = Some(Utc::now());
                    }
                    counter!("duplex_replication_propagated_total", "destination" => destination.to_string())
                        .increment(1);
                    debug!(key = %key, version_id = %version_id, attempts = attempts, "Propagated event");
                    return;
                }
                Err(e) if !e.is_transient() => {
                    error!(key = %key, version_id = %version_id, error = %e, "Permanent replication failure");
                    Self::settle_failed(
                        &destination, &key, &version_id, attempts, &e, lag, status, alarm_tx,
                    );
                    return;
                }
                Err(e) => {
                    lag.record_failure(&destination);
                    if let Some(mut entry) = status.get_mut(&version_id) {
                        entry.attempts = attempts;
                        entry.last_error = Some(e.to_string());
                    }

                    if !alarmed && attempts >= config.alarm_after_attempts {
                        alarmed = true;
                        Self::raise_alarm(
                            &destination, &key, &version_id, attempts, &e, false, alarm_tx,
                        );
                    }

                    if attempts > config.max_retries {
                        error!(
                            key = %key,
                            version_id = %version_id,
                            attempts = attempts,
                            error = %e,
                            "Retries exhausted"
                        );
                        Self::settle_failed(
                            &destination, &key, &version_id, attempts, &e, lag, status, alarm_tx,
                        );
                        return;
                    }

                    let backoff = config.backoff_for_retry(attempts - 1);
                    warn!(
                        key = %key,
                        version_id = %version_id,
                        attempts = attempts,
                        backoff_ms = backoff.as_millis(),
                        error = %e,
                        "Propagation failed, retrying after backoff"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn settle_failed(
        destination: &RegionId,
        key: &str,
        version_id: &VersionId,
        attempts: u32,
        error: &ReplicationError,
        lag: &LagTracker,
        status: &DashMap<VersionId, ReplicationStatus>,
        alarm_tx: &broadcast::Sender<ReplicationAlarm>,
    ) {
        lag.record_abandoned(destination);
        if let Some(mut entry) = status.get_mut(version_id) {
            entry.state = ReplicationState::Failed;
            entry.attempts = attempts;
            entry.last_error = Some(error.to_string());
            entry.settled_at = Some(Utc::now());
        }
        counter!("duplex_replication_failed_total", "destination" => destination.to_string())
            .increment(1);
        Self::raise_alarm(destination, key, version_id, attempts, error, true, alarm_tx);
    }

    fn raise_alarm(
        destination: &RegionId,
        key: &str,
        version_id: &VersionId,
        attempts: u32,
        error: &ReplicationError,
        abandoned: bool,
        alarm_tx: &broadcast::Sender<ReplicationAlarm>,
    ) {
        counter!("duplex_replication_alarms_total", "destination" => destination.to_string())
            .increment(1);
        let _ = alarm_tx.send(ReplicationAlarm {
            destination: destination.clone(),
            key: key.to_string(),
            version_id: version_id.clone(),
            attempts,
            error: error.to_string(),
            abandoned,
        });
    }
}
