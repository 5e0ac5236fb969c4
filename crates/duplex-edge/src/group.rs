//! The origin group and its routing decision.

use std::collections::HashSet;
use std::sync::Arc;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::origin::{EdgeError, Origin, OriginRequest, OriginResponse};

/// Configuration of a two-member origin failover group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginGroup {
    /// Identifier of the primary origin.
    pub primary_origin: String,
    /// Identifier of the secondary origin.
    pub secondary_origin: String,
    /// Upstream status codes that trigger the secondary retry.
    pub failover_status_codes: HashSet<u16>,
}

impl OriginGroup {
    /// Creates a group over the given origin ids and trigger codes.
    pub fn new(
        primary_origin: impl Into<String>,
        secondary_origin: impl Into<String>,
        failover_status_codes: impl IntoIterator<Item = u16>,
    ) -> Self {
        Self {
            primary_origin: primary_origin.into(),
            secondary_origin: secondary_origin.into(),
            failover_status_codes: failover_status_codes.into_iter().collect(),
        }
    }

    /// True if the status code triggers failover.
    pub fn triggers_failover(&self, status: u16) -> bool {
        self.failover_status_codes.contains(&status)
    }
}

/// Request router over an origin group.
///
/// Holds no mutable state: every request re-evaluates both origins' current
/// behavior, and at most one retry is made per request.
pub struct EdgeRouter {
    group: OriginGroup,
    primary: Arc<dyn Origin>,
    secondary: Arc<dyn Origin>,
}

impl EdgeRouter {
    /// Creates a router.
    ///
    /// # Errors
    ///
    /// Returns `EdgeError::InvalidGroup` if the origin ids do not match the
    /// group configuration or the trigger set is empty.
    pub fn new(
        group: OriginGroup,
        primary: Arc<dyn Origin>,
        secondary: Arc<dyn Origin>,
    ) -> Result<Self, EdgeError> {
        if group.failover_status_codes.is_empty() {
            return Err(EdgeError::InvalidGroup(
                "failover status code set must not be empty".to_string(),
            ));
        }
        if primary.id() != group.primary_origin {
            return Err(EdgeError::InvalidGroup(format!(
                "primary origin id mismatch: expected {}, got {}",
                group.primary_origin,
                primary.id()
            )));
        }
        if secondary.id() != group.secondary_origin {
            return Err(EdgeError::InvalidGroup(format!(
                "secondary origin id mismatch: expected {}, got {}",
                group.secondary_origin,
                secondary.id()
            )));
        }
        Ok(Self { group, primary, secondary })
    }

    /// Routes one request.
    ///
    /// Fetches from the primary origin; on a configured failure status (or
    /// an unreachable primary) retries the identical request once against
    /// the secondary and returns that response, whatever its status.
    ///
    /// # Errors
    ///
    /// Only when the secondary is also unreachable — a client sees a
    /// transport failure solely when both origins fail for this request.
    pub async fn route(&self, request: &OriginRequest) -> Result<OriginResponse, EdgeError> {
        counter!("duplex_edge_requests_total").increment(1);

        match self.primary.fetch(request).await {
            Ok(response) if !self.group.triggers_failover(response.status) => {
                debug!(path = %request.path, status = response.status, "Served from primary origin");
                Ok(response)
            }
            Ok(response) => {
                warn!(
                    path = %request.path,
                    status = response.status,
                    "Primary origin returned failover status, retrying against secondary"
                );
                self.retry_secondary(request).await
            }
            Err(e) => {
                warn!(path = %request.path, error = %e, "Primary origin unreachable, retrying against secondary");
                self.retry_secondary(request).await
            }
        }
    }

    async fn retry_secondary(&self, request: &OriginRequest) -> Result<OriginResponse, EdgeError> {
        counter!("duplex_edge_failovers_total").increment(1);
        // Exactly one retry: whatever the secondary says is the answer.
        let response = self.secondary.fetch(request).await?;
        debug!(path = %request.path, status = response.status, "Served from secondary origin");
        Ok(response)
    }

    /// The group configuration.
    pub fn group(&self) -> &OriginGroup {
        &self.group
    }
}
