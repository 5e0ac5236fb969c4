//! Duplex: two-region active-active storage and delivery failover control plane.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use duplex_core::{Config, HlcClock, LogFormat, Region, RegionPair};
use duplex_dns::{spawn_health_bridge, DnsFailoverController, FailoverRecord, FailoverRecordSet};
use duplex_edge::{EdgeRouter, HttpOrigin, OriginGroup};
use duplex_health::{HealthMonitor, HttpProber, MonitorConfig};
use duplex_replication::{EngineConfig, ReplicationEngine, RulePair, StorePeer};
use duplex_store::{MemoryStore, ObjectStore, PutOptions};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod cli;

use cli::{Cli, Commands};

/// Key of the liveness object each region serves to its health check.
const LIVENESS_KEY: &str = ".duplex/liveness";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => run_server(args).await,
        Commands::CheckConfig(args) => check_config(&args.config),
        Commands::Version => {
            println!("duplex {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn check_config(path: &Path) -> Result<()> {
    let config = Config::from_file(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    config.validate().context("Configuration is invalid")?;
    println!("{} is valid", path.display());
    Ok(())
}

async fn run_server(args: cli::ServeArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => Config::default(),
    };
    config.validate().context("Configuration is invalid")?;

    init_logging(&config)?;

    if config.metrics.enabled {
        let metrics_addr: std::net::SocketAddr =
            format!("{}:{}", config.metrics.bind, config.metrics.port)
                .parse()
                .context("Invalid metrics bind address")?;
        PrometheusBuilder::new()
            .with_http_listener(metrics_addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Metrics endpoint listening on http://{}/metrics", metrics_addr);
    }

    let regions = config.regions.region_pair().context("Invalid region topology")?;
    info!(
        primary = %regions.primary().id,
        secondary = %regions.secondary().id,
        "Starting duplex control plane"
    );

    // Regional stores and the bidirectional replication engines
    let primary_store = Arc::new(MemoryStore::new(regions.primary()));
    let secondary_store = Arc::new(MemoryStore::new(regions.secondary()));

    let rules = RulePair::bidirectional(
        regions.primary().id.clone(),
        regions.secondary().id.clone(),
        config.replication.delete_marker_replication,
        config.replication.prefix.clone(),
    )
    .context("Invalid replication rules")?;

    let engine_config = EngineConfig::new()
        .queue_size(config.replication.queue_size)
        .shards(config.replication.shards)
        .max_retries(config.replication.max_retries)
        .initial_backoff(Duration::from_millis(config.replication.initial_backoff_ms))
        .max_backoff(Duration::from_millis(config.replication.max_backoff_ms))
        .attempt_timeout(Duration::from_millis(config.replication.attempt_timeout_ms))
        .alarm_after_attempts(config.replication.alarm_after_attempts);

    let mut primary_engine = ReplicationEngine::new(
        engine_config.clone(),
        rules.clone(),
        regions.primary().id.clone(),
        Arc::new(StorePeer::new(
            regions.secondary().id.clone(),
            secondary_store.clone() as Arc<dyn ObjectStore>,
        )),
        regions.secondary().storage_class,
    )
    .context("Failed to start primary replication engine")?;

    let mut secondary_engine = ReplicationEngine::new(
        engine_config,
        rules,
        regions.secondary().id.clone(),
        Arc::new(StorePeer::new(
            regions.primary().id.clone(),
            primary_store.clone() as Arc<dyn ObjectStore>,
        )),
        regions.primary().storage_class,
    )
    .context("Failed to start secondary replication engine")?;

    spawn_alarm_logger(&primary_engine);
    spawn_alarm_logger(&secondary_engine);

    // Health monitoring, one independent probe loop per region
    let monitor_config = MonitorConfig::new()
        .interval(Duration::from_millis(config.health.interval_ms))
        .failure_threshold(config.health.failure_threshold)
        .probe_timeout(Duration::from_millis(config.health.probe_timeout_ms));
    let prober = Arc::new(HttpProber::new(config.health.probe_path.clone()));
    let mut monitor = HealthMonitor::new(monitor_config, prober)
        .context("Failed to start health monitor")?;

    // DNS failover bound to the primary region's health
    let records = FailoverRecordSet::new(
        config.dns.record_name.clone(),
        config.dns.ttl_secs,
        FailoverRecord::primary(
            format!("{}-primary", config.dns.record_name),
            regions.primary().endpoint.clone(),
            regions.primary().id.clone(),
        ),
        FailoverRecord::secondary(
            format!("{}-secondary", config.dns.record_name),
            regions.secondary().endpoint.clone(),
        ),
    )
    .context("Invalid DNS record set")?;
    let dns = Arc::new(DnsFailoverController::new(records));
    let _bridge = spawn_health_bridge(dns.clone(), &monitor);
    spawn_resolution_logger(dns.clone());

    monitor.watch(regions.primary().clone());
    monitor.watch(regions.secondary().clone());

    // Edge failover group over the two regional origins
    let origin_timeout = Duration::from_millis(config.edge.origin_timeout_ms);
    let edge = EdgeRouter::new(
        OriginGroup::new(
            regions.primary().id.as_str(),
            regions.secondary().id.as_str(),
            config.edge.failover_status_codes.iter().copied(),
        ),
        Arc::new(
            HttpOrigin::new(
                regions.primary().id.as_str(),
                regions.primary().endpoint.clone(),
                origin_timeout,
            )
            .context("Failed to build primary origin")?,
        ),
        Arc::new(
            HttpOrigin::new(
                regions.secondary().id.as_str(),
                regions.secondary().endpoint.clone(),
                origin_timeout,
            )
            .context("Failed to build secondary origin")?,
        ),
    )
    .context("Failed to build edge failover group")?;
    info!(
        failover_codes = ?edge.group().failover_status_codes,
        "Edge failover group ready"
    );

    // Each region refreshes its own liveness object so health checks read
    // real stored content.
    spawn_liveness_writer(regions.clone(), primary_store.clone(), secondary_store.clone());

    // Periodic lag gauge refresh for both directions
    spawn_lag_metrics(&primary_engine, &secondary_engine);

    info!("Control plane running; press ctrl-c to stop");
    signal::ctrl_c().await.context("Failed to listen for shutdown signal")?;

    info!("Shutting down");
    monitor.stop_all().await;
    primary_engine.shutdown();
    secondary_engine.shutdown();

    Ok(())
}

fn init_logging(config: &Config) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    let fmt_layer = tracing_subscriber::fmt::layer();
    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry().with(filter).with(fmt_layer.json()).init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry().with(filter).with(fmt_layer).init();
        }
    }
    Ok(())
}

/// Logs replication alarms as they fire.
fn spawn_alarm_logger(engine: &ReplicationEngine) {
    let mut alarms = engine.subscribe_alarms();
    tokio::spawn(async move {
        while let Ok(alarm) = alarms.recv().await {
            if alarm.abandoned {
                tracing::error!(
                    destination = %alarm.destination,
                    key = %alarm.key,
                    version_id = %alarm.version_id,
                    attempts = alarm.attempts,
                    error = %alarm.error,
                    "Replication abandoned an event"
                );
            } else {
                warn!(
                    destination = %alarm.destination,
                    key = %alarm.key,
                    attempts = alarm.attempts,
                    error = %alarm.error,
                    "Replication is lagging"
                );
            }
        }
    });
}

/// Periodically rewrites each region's liveness object.
fn spawn_liveness_writer(
    regions: RegionPair,
    primary_store: Arc<MemoryStore>,
    secondary_store: Arc<MemoryStore>,
) {
    let clock = Arc::new(HlcClock::new());
    for (region, store) in [
        (regions.primary().clone(), primary_store),
        (regions.secondary().clone(), secondary_store),
    ] {
        let clock = Arc::clone(&clock);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(10));
            loop {
                interval.tick().await;
                write_liveness(&region, store.as_ref(), &clock).await;
            }
        });
    }
}

async fn write_liveness(region: &Region, store: &MemoryStore, clock: &HlcClock) {
    let payload = Bytes::from(chrono::Utc::now().to_rfc3339());
    match store.put(LIVENESS_KEY, payload, clock.now(), PutOptions::default()).await {
        Ok(meta) => {
            debug!(region = %region.id, version_id = %meta.version_id, "Refreshed liveness object");
        }
        Err(e) => {
            warn!(region = %region.id, error = %e, "Failed to refresh liveness object");
        }
    }
}

/// Logs the effective DNS answer whenever it changes.
fn spawn_resolution_logger(dns: Arc<DnsFailoverController>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        let mut last_target: Option<String> = None;
        loop {
            interval.tick().await;
            let answer = dns.resolve();
            if last_target.as_deref() != Some(answer.target.as_str()) {
                info!(
                    name = %dns.name(),
                    target = %answer.target,
                    priority = ?answer.priority,
                    "DNS answer changed"
                );
                last_target = Some(answer.target);
            }
        }
    });
}

/// Refreshes replication lag gauges for both directions.
fn spawn_lag_metrics(primary_engine: &ReplicationEngine, secondary_engine: &ReplicationEngine) {
    let trackers = [primary_engine.lag_handle(), secondary_engine.lag_handle()];
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            for tracker in &trackers {
                tracker.update_metrics();
            }
        }
    });
}
