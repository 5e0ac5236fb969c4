//! The health monitor: independent per-region probe loops.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use duplex_core::{Region, RegionId};
use metrics::{counter, gauge};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::probe::{ProbeError, Prober};
use crate::state::{HealthState, HealthStatus};

/// State-change events published by the monitor.
#[derive(Debug, Clone)]
pub enum HealthEvent {
    /// A region recovered (or was observed up for the first time after
    /// being down).
    RegionUp {
        /// The region.
        region: RegionId,
    },
    /// A region crossed the failure threshold and is now down.
    RegionDown {
        /// The region.
        region: RegionId,
        /// Consecutive failures at the moment of the transition.
        consecutive_failures: u32,
    },
}

impl HealthEvent {
    /// The region this event concerns.
    pub fn region(&self) -> &RegionId {
        match self {
            Self::RegionUp { region } | Self::RegionDown { region, .. } => region,
        }
    }
}

/// Health monitor running one probe loop per watched region.
///
/// Probe loops are fully independent: a stalled probe in one region cannot
/// delay the other region's schedule. Each region's state is written only by
/// its own loop and read by any number of concurrent resolvers through
/// [`HealthMonitor::health`].
pub struct HealthMonitor {
    config: MonitorConfig,
    prober: Arc<dyn Prober>,
    states: Arc<DashMap<RegionId, HealthState>>,
    event_tx: broadcast::Sender<HealthEvent>,
    shutdown_txs: HashMap<RegionId, mpsc::Sender<()>>,
}

impl HealthMonitor {
    /// Creates a monitor.
    ///
    /// # Errors
    ///
    /// Fails fast on invalid configuration.
    pub fn new(config: MonitorConfig, prober: Arc<dyn Prober>) -> Result<Self, ProbeError> {
        config.validate()?;
        let (event_tx, _) = broadcast::channel(256);
        Ok(Self {
            config,
            prober,
            states: Arc::new(DashMap::new()),
            event_tx,
            shutdown_txs: HashMap::new(),
        })
    }

    /// Subscribes to health state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<HealthEvent> {
        self.event_tx.subscribe()
    }

    /// Starts watching a region. Idempotent per region id.
    pub fn watch(&mut self, region: Region) {
        if self.shutdown_txs.contains_key(&region.id) {
            warn!(region = %region.id, "Region already watched");
            return;
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_txs.insert(region.id.clone(), shutdown_tx);
        self.states.insert(region.id.clone(), HealthState::new());
        gauge!("duplex_health_up", "region" => region.id.to_string()).set(1.0);

        let config = self.config.clone();
        let prober = Arc::clone(&self.prober);
        let states = Arc::clone(&self.states);
        let event_tx = self.event_tx.clone();

        info!(
            region = %region.id,
            interval_ms = config.interval_ms,
            failure_threshold = config.failure_threshold,
            "Watching region"
        );

        tokio::spawn(async move {
            Self::probe_loop(region, config, prober, states, event_tx, shutdown_rx).await;
        });
    }

    /// Stops watching a region.
    ///
    /// New probes stop immediately; an in-flight probe is dropped at the
    /// loop's next poll point, so nothing can update state after this call
    /// settles. The last known state remains readable.
    pub async fn stop(&mut self, region: &RegionId) {
        if let Some(tx) = self.shutdown_txs.remove(region) {
            let _ = tx.send(()).await;
            info!(region = %region, "Stopped watching region");
        }
    }

    /// Stops all probe loops.
    pub async fn stop_all(&mut self) {
        let regions: Vec<RegionId> = self.shutdown_txs.keys().cloned().collect();
        for region in regions {
            self.stop(&region).await;
        }
    }

    /// Snapshot of a region's health state.
    pub fn health(&self, region: &RegionId) -> Option<HealthState> {
        self.states.get(region).map(|state| state.clone())
    }

    /// Convenience: the region's current status, if watched.
    pub fn status(&self, region: &RegionId) -> Option<HealthStatus> {
        self.states.get(region).map(|state| state.status)
    }

    /// The probe loop for one region. Sole writer of that region's state.
    async fn probe_loop(
        region: Region,
        config: MonitorConfig,
        prober: Arc<dyn Prober>,
        states: Arc<DashMap<RegionId, HealthState>>,
        event_tx: broadcast::Sender<HealthEvent>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        let mut interval = tokio::time::interval(config.interval_duration());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let outcome = tokio::time::timeout(
                        config.probe_timeout_duration(),
                        prober.probe(&region),
                    )
                    .await
                    .unwrap_or(Err(ProbeError::Timeout {
                        timeout_ms: config.probe_timeout_ms,
                    }));

                    Self::apply_probe_result(&region.id, outcome, &config, &states, &event_tx);
                }
                _ = shutdown_rx.recv() => {
                    debug!(region = %region.id, "Probe loop shutting down");
                    break;
                }
            }
        }
    }

    /// Folds one probe result into the region's debounced state and emits
    /// an event when the status transitions.
    fn apply_probe_result(
        region: &RegionId,
        outcome: Result<(), ProbeError>,
        config: &MonitorConfig,
        states: &DashMap<RegionId, HealthState>,
        event_tx: &broadcast::Sender<HealthEvent>,
    ) {
        let Some(mut state) = states.get_mut(region) else {
            return;
        };

        match outcome {
            Ok(()) => {
                counter!("duplex_health_probe_success_total", "region" => region.to_string())
                    .increment(1);
                if state.record_success() {
                    gauge!("duplex_health_up", "region" => region.to_string()).set(1.0);
                    info!(region = %region, "Region recovered");
                    let _ = event_tx.send(HealthEvent::RegionUp { region: region.clone() });
                }
            }
            Err(e) => {
                counter!("duplex_health_probe_failure_total", "region" => region.to_string())
                    .increment(1);
                debug!(region = %region, error = %e, "Probe failed");
                if state.record_failure(config.failure_threshold) {
                    gauge!("duplex_health_up", "region" => region.to_string()).set(0.0);
                    error!(
                        region = %region,
                        consecutive_failures = state.consecutive_failures,
                        "Region declared down"
                    );
                    let _ = event_tx.send(HealthEvent::RegionDown {
                        region: region.clone(),
                        consecutive_failures: state.consecutive_failures,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use duplex_core::RegionRole;
    use parking_lot::Mutex;

    use super::*;

    /// Prober that replays a script of results, then repeats the last one.
    struct ScriptedProber {
        script: Mutex<Vec<Result<(), ProbeError>>>,
        probes: AtomicUsize,
    }

    impl ScriptedProber {
        fn new(script: Vec<Result<(), ProbeError>>) -> Self {
            let mut script = script;
            script.reverse();
            Self { script: Mutex::new(script), probes: AtomicUsize::new(0) }
        }

        fn probe_count(&self) -> usize {
            self.probes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Prober for ScriptedProber {
        async fn probe(&self, _region: &Region) -> Result<(), ProbeError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock();
            if script.len() > 1 {
                script.pop().unwrap()
            } else {
                script.first().cloned().unwrap_or(Ok(()))
            }
        }
    }

    fn failure() -> Result<(), ProbeError> {
        Err(ProbeError::Connection { reason: "refused".to_string() })
    }

    fn fast_config(threshold: u32) -> MonitorConfig {
        MonitorConfig::new()
            .interval(Duration::from_millis(10))
            .failure_threshold(threshold)
            .probe_timeout(Duration::from_millis(100))
    }

    fn east() -> Region {
        Region::new("us-east-1", RegionRole::Primary, "http://east")
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached within 1s");
    }

    #[tokio::test]
    async fn test_down_after_threshold_then_recovery() {
        let prober = Arc::new(ScriptedProber::new(vec![failure(), failure(), Ok(())]));
        let mut monitor = HealthMonitor::new(fast_config(2), prober).unwrap();
        let mut events = monitor.subscribe();

        monitor.watch(east());
        let east_id = RegionId::new("us-east-1");

        // Two consecutive failures -> down
        let event = events.recv().await.unwrap();
        match event {
            HealthEvent::RegionDown { region, consecutive_failures } => {
                assert_eq!(region, east_id);
                assert_eq!(consecutive_failures, 2);
            }
            other => panic!("expected RegionDown, got {other:?}"),
        }

        // One success -> up
        let event = events.recv().await.unwrap();
        assert!(matches!(event, HealthEvent::RegionUp { .. }));
        assert_eq!(monitor.status(&east_id), Some(HealthStatus::Up));

        monitor.stop_all().await;
    }

    #[tokio::test]
    async fn test_single_failure_does_not_transition() {
        let prober = Arc::new(ScriptedProber::new(vec![failure(), Ok(())]));
        let mut monitor = HealthMonitor::new(fast_config(2), prober.clone()).unwrap();
        monitor.watch(east());

        let east_id = RegionId::new("us-east-1");
        wait_until(|| prober.probe_count() >= 3).await;

        // One failure followed by successes: never down
        let state = monitor.health(&east_id).unwrap();
        assert!(state.is_up());
        assert_eq!(state.consecutive_failures, 0);

        monitor.stop_all().await;
    }

    #[tokio::test]
    async fn test_flapping_produces_one_transition_per_window() {
        // threshold 2, script: fail, fail (down), fail, fail, fail
        let prober = Arc::new(ScriptedProber::new(vec![failure(); 5]));
        let mut monitor = HealthMonitor::new(fast_config(2), prober.clone()).unwrap();
        let mut events = monitor.subscribe();
        monitor.watch(east());

        let event = events.recv().await.unwrap();
        assert!(matches!(event, HealthEvent::RegionDown { .. }));

        // No further events while the region stays down
        wait_until(|| prober.probe_count() >= 5).await;
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));

        monitor.stop_all().await;
    }

    #[tokio::test]
    async fn test_stop_halts_probes() {
        let prober = Arc::new(ScriptedProber::new(vec![Ok(())]));
        let mut monitor = HealthMonitor::new(fast_config(2), prober.clone()).unwrap();
        monitor.watch(east());

        let east_id = RegionId::new("us-east-1");
        wait_until(|| prober.probe_count() >= 2).await;
        monitor.stop(&east_id).await;

        let count_at_stop = prober.probe_count();
        tokio::time::sleep(Duration::from_millis(60)).await;
        // At most one in-flight probe may still have landed
        assert!(prober.probe_count() <= count_at_stop + 1);

        // Last known state stays readable
        assert_eq!(monitor.status(&east_id), Some(HealthStatus::Up));
    }

    #[tokio::test]
    async fn test_hung_probe_counts_as_timeout_failure() {
        struct HangingProber;

        #[async_trait]
        impl Prober for HangingProber {
            async fn probe(&self, _region: &Region) -> Result<(), ProbeError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }

        let config = MonitorConfig::new()
            .interval(Duration::from_millis(10))
            .failure_threshold(1)
            .probe_timeout(Duration::from_millis(20));
        let mut monitor = HealthMonitor::new(config, Arc::new(HangingProber)).unwrap();
        let mut events = monitor.subscribe();
        monitor.watch(east());

        let event = events.recv().await.unwrap();
        assert!(matches!(event, HealthEvent::RegionDown { .. }));
        monitor.stop_all().await;
    }

    #[tokio::test]
    async fn test_independent_regions() {
        // East fails forever, west succeeds forever; each loop is its own task
        struct PerRegionProber;

        #[async_trait]
        impl Prober for PerRegionProber {
            async fn probe(&self, region: &Region) -> Result<(), ProbeError> {
                if region.id.as_str() == "us-east-1" {
                    Err(ProbeError::Connection { reason: "outage".to_string() })
                } else {
                    Ok(())
                }
            }
        }

        let mut monitor = HealthMonitor::new(fast_config(1), Arc::new(PerRegionProber)).unwrap();
        monitor.watch(east());
        monitor.watch(Region::new("us-west-2", RegionRole::Secondary, "http://west"));

        let east_id = RegionId::new("us-east-1");
        let west_id = RegionId::new("us-west-2");

        wait_until(|| monitor.status(&east_id) == Some(HealthStatus::Down)).await;
        assert_eq!(monitor.status(&west_id), Some(HealthStatus::Up));

        monitor.stop_all().await;
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let prober = Arc::new(ScriptedProber::new(vec![Ok(())]));
        let config = MonitorConfig::new().failure_threshold(0);
        assert!(HealthMonitor::new(config, prober).is_err());
    }

    #[tokio::test]
    async fn test_unwatched_region_has_no_state() {
        let prober = Arc::new(ScriptedProber::new(vec![Ok(())]));
        let monitor = HealthMonitor::new(fast_config(1), prober).unwrap();
        assert!(monitor.health(&RegionId::new("nowhere")).is_none());
    }
}
