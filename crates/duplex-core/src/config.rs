//! Configuration management for the duplex control plane.
//!
//! The whole configuration surface is supplied at startup from a single TOML
//! file and is immutable thereafter. `Config::validate` fails fast on
//! nonsense values (zero intervals, missing regions) so no background task
//! ever starts with undefined behavior.

use serde::{Deserialize, Serialize};

use crate::region::{Region, RegionPair, RegionRole, StorageClass};

/// Main configuration for the duplex control plane.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// The two-region topology.
    pub regions: RegionsConfig,
    /// Replication engine settings.
    pub replication: ReplicationSection,
    /// Health monitor settings.
    pub health: HealthSection,
    /// DNS failover settings.
    pub dns: DnsSection,
    /// Edge failover group settings.
    pub edge: EdgeSection,
    /// Logging configuration.
    pub logging: LoggingConfig,
    /// Metrics configuration.
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(crate::Error::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed.
    pub fn parse(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Validates the whole configuration, failing fast on the first problem.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the offending field.
    pub fn validate(&self) -> crate::Result<()> {
        self.regions.region_pair()?;
        if self.replication.alarm_after_attempts == 0 {
            return Err(crate::Error::Config(
                "replication.alarm_after_attempts must be positive".to_string(),
            ));
        }
        if self.replication.queue_size == 0 {
            return Err(crate::Error::Config("replication.queue_size must be positive".to_string()));
        }
        if self.replication.attempt_timeout_ms == 0 {
            return Err(crate::Error::Config(
                "replication.attempt_timeout_ms must be positive".to_string(),
            ));
        }
        if self.replication.shards == 0 {
            return Err(crate::Error::Config("replication.shards must be positive".to_string()));
        }
        if self.health.interval_ms == 0 {
            return Err(crate::Error::Config("health.interval_ms must be positive".to_string()));
        }
        if self.health.failure_threshold == 0 {
            return Err(crate::Error::Config(
                "health.failure_threshold must be positive".to_string(),
            ));
        }
        if self.health.probe_timeout_ms == 0 {
            return Err(crate::Error::Config(
                "health.probe_timeout_ms must be positive".to_string(),
            ));
        }
        if self.dns.record_name.is_empty() {
            return Err(crate::Error::Config("dns.record_name must not be empty".to_string()));
        }
        if self.edge.failover_status_codes.is_empty() {
            return Err(crate::Error::Config(
                "edge.failover_status_codes must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// The two regions of the topology.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionsConfig {
    /// The preferred (primary) region.
    pub primary: RegionConfig,
    /// The disaster-recovery (secondary) region.
    pub secondary: RegionConfig,
}

impl RegionsConfig {
    /// Builds the validated `RegionPair` from this section.
    pub fn region_pair(&self) -> crate::Result<RegionPair> {
        RegionPair::new(
            self.primary.to_region(RegionRole::Primary),
            self.secondary.to_region(RegionRole::Secondary),
        )
    }
}

impl Default for RegionsConfig {
    fn default() -> Self {
        Self {
            primary: RegionConfig {
                id: "us-east-1".to_string(),
                endpoint: "http://127.0.0.1:9000".to_string(),
                storage_class: StorageClass::Standard,
            },
            secondary: RegionConfig {
                id: "us-west-2".to_string(),
                endpoint: "http://127.0.0.1:9100".to_string(),
                storage_class: StorageClass::StandardIa,
            },
        }
    }
}

/// A single region entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Region identifier (e.g. "us-east-1").
    pub id: String,
    /// Base URL of the region's serving endpoint.
    pub endpoint: String,
    /// Storage class for objects stored in this region.
    #[serde(default)]
    pub storage_class: StorageClass,
}

impl RegionConfig {
    fn to_region(&self, role: RegionRole) -> Region {
        Region::new(self.id.as_str(), role, self.endpoint.as_str())
            .with_storage_class(self.storage_class)
    }
}

/// Replication engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationSection {
    /// Whether delete markers are replicated to the peer region.
    pub delete_marker_replication: bool,
    /// Optional key prefix restricting which objects replicate.
    pub prefix: Option<String>,
    /// Size of the per-shard propagation queue.
    pub queue_size: usize,
    /// Number of key-hashed shard workers per direction.
    pub shards: usize,
    /// Retries per event after the initial attempt.
    pub max_retries: u32,
    /// Initial backoff between retries in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound on backoff in milliseconds.
    pub max_backoff_ms: u64,
    /// Timeout for a single propagation attempt in milliseconds.
    pub attempt_timeout_ms: u64,
    /// Consecutive failed attempts before the lag alarm fires.
    pub alarm_after_attempts: u32,
}

impl Default for ReplicationSection {
    fn default() -> Self {
        Self {
            delete_marker_replication: true,
            prefix: None,
            queue_size: 10_000,
            shards: 8,
            max_retries: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
            attempt_timeout_ms: 5_000,
            alarm_after_attempts: 6,
        }
    }
}

/// Health monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSection {
    /// Probe interval in milliseconds.
    pub interval_ms: u64,
    /// Consecutive failed probes before a region is declared down.
    pub failure_threshold: u32,
    /// Timeout for a single probe in milliseconds.
    pub probe_timeout_ms: u64,
    /// Liveness path probed on each region endpoint.
    pub probe_path: String,
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            failure_threshold: 2,
            probe_timeout_ms: 5_000,
            probe_path: "/livez".to_string(),
        }
    }
}

/// DNS failover settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsSection {
    /// Hosted zone name.
    pub zone: String,
    /// Record name served with failover routing.
    pub record_name: String,
    /// Record TTL in seconds. Short TTLs make failover visible sooner.
    pub ttl_secs: u32,
}

impl Default for DnsSection {
    fn default() -> Self {
        Self {
            zone: "example.com.".to_string(),
            record_name: "www.example.com.".to_string(),
            ttl_secs: 60,
        }
    }
}

/// Edge failover group settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeSection {
    /// Upstream status codes that trigger a retry against the secondary
    /// origin.
    pub failover_status_codes: Vec<u16>,
    /// Timeout for a single origin fetch in milliseconds.
    pub origin_timeout_ms: u64,
}

impl Default for EdgeSection {
    fn default() -> Self {
        Self {
            failover_status_codes: vec![403, 404, 500, 502, 503, 504],
            origin_timeout_ms: 10_000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format.
    #[default]
    Pretty,
    /// JSON format.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
    /// Log output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Pretty }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable metrics collection and the Prometheus endpoint.
    pub enabled: bool,
    /// Bind address for the metrics server.
    pub bind: String,
    /// Port for the metrics endpoint.
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true, bind: "0.0.0.0".to_string(), port: 9901 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());

        let pair = config.regions.region_pair().unwrap();
        assert_eq!(pair.primary().id.as_str(), "us-east-1");
        assert_eq!(pair.secondary().id.as_str(), "us-west-2");
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[regions.primary]
id = "eu-central-1"
endpoint = "https://fra.example.com"

[regions.secondary]
id = "eu-west-1"
endpoint = "https://dub.example.com"
storage_class = "STANDARD_IA"

[health]
interval_ms = 10000
failure_threshold = 3

[edge]
failover_status_codes = [500, 503]

[logging]
level = "debug"
format = "json"
"#;
        let config = Config::parse(toml).unwrap();
        assert_eq!(config.regions.primary.id, "eu-central-1");
        assert_eq!(config.regions.secondary.storage_class, StorageClass::StandardIa);
        assert_eq!(config.health.interval_ms, 10_000);
        assert_eq!(config.health.failure_threshold, 3);
        assert_eq!(config.edge.failover_status_codes, vec![500, 503]);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.health.interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_threshold() {
        let mut config = Config::default();
        config.health.failure_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_status_codes() {
        let mut config = Config::default();
        config.edge.failover_status_codes.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_region_ids() {
        let mut config = Config::default();
        config.regions.secondary.id = config.regions.primary.id.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_rejects_bad_toml() {
        assert!(Config::parse("regions = 5").is_err());
    }
}
