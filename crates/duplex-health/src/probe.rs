//! Liveness probes.

use async_trait::async_trait;
use duplex_core::Region;
use thiserror::Error;

/// Errors from a single probe. Every variant counts as a failed probe; the
/// monitor never propagates these to the request-serving path.
#[derive(Debug, Error, Clone)]
pub enum ProbeError {
    /// The probe did not complete within its timeout.
    #[error("probe timed out after {timeout_ms}ms")]
    Timeout {
        /// The probe timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The endpoint could not be reached.
    #[error("probe connection error: {reason}")]
    Connection {
        /// The underlying error.
        reason: String,
    },

    /// The endpoint answered outside the expected status range.
    #[error("probe returned unexpected status {status}")]
    UnexpectedStatus {
        /// The HTTP status received.
        status: u16,
    },

    /// Invalid monitor configuration. Fatal at startup.
    #[error("invalid health configuration: {0}")]
    InvalidConfig(String),
}

/// A liveness probe against one region's serving endpoint.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probes the region once. `Ok(())` means serviceable.
    async fn probe(&self, region: &Region) -> Result<(), ProbeError>;
}

/// HTTP GET prober.
///
/// Probes `{region.endpoint}{path}` and accepts any 2xx answer, or exactly
/// `expected_status` when one is configured. The health check reads the same
/// stored content clients do (a liveness object served by the region), so a
/// passing probe means the serving path works end to end.
pub struct HttpProber {
    client: reqwest::Client,
    path: String,
    expected_status: Option<u16>,
}

impl HttpProber {
    /// Creates a prober for the given liveness path.
    pub fn new(path: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), path: path.into(), expected_status: None }
    }

    /// Requires an exact status instead of any 2xx.
    pub fn expect_status(mut self, status: u16) -> Self {
        self.expected_status = Some(status);
        self
    }

    fn url_for(&self, region: &Region) -> String {
        format!("{}{}", region.endpoint.trim_end_matches('/'), self.path)
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, region: &Region) -> Result<(), ProbeError> {
        let url = self.url_for(region);

        let response = self.client.get(&url).send().await.map_err(|e| {
            ProbeError::Connection { reason: e.to_string() }
        })?;

        let status = response.status().as_u16();
        let ok = match self.expected_status {
            Some(expected) => status == expected,
            None => response.status().is_success(),
        };

        if ok {
            Ok(())
        } else {
            Err(ProbeError::UnexpectedStatus { status })
        }
    }
}
