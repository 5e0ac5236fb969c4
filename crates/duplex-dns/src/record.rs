// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (c) 2025 The Duplex Authors

//! Failover record types.

use duplex_core::RegionId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from record-set construction.
#[derive(Debug, Error, Clone)]
pub enum DnsError {
    /// The record set does not contain exactly one primary and one
    /// secondary record.
    #[error("record set {name} needs one PRIMARY and one SECONDARY record")]
    UnbalancedRecordSet {
        /// The query name.
        name: String,
    },

    /// A record field is invalid.
    #[error("invalid record {set_identifier}: {reason}")]
    InvalidRecord {
        /// The record's set identifier.
        set_identifier: String,
        /// Why it is invalid.
        reason: String,
    },
}

/// Failover priority of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordPriority {
    /// Answered while the bound health check passes.
    Primary,
    /// Answered when the primary's health check fails.
    Secondary,
}

impl RecordPriority {
    /// True for the primary priority.
    pub fn is_primary(&self) -> bool {
        matches!(self, Self::Primary)
    }
}

/// One failover-routed DNS record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverRecord {
    /// Distinguishes the two records sharing a query name.
    pub set_identifier: String,
    /// Failover priority.
    pub priority: RecordPriority,
    /// The answer target (endpoint hostname or alias).
    pub target: String,
    /// The region health check this record is bound to, if any.
    pub health_check: Option<RegionId>,
    /// Whether resolution consults the bound health check.
    pub evaluate_target_health: bool,
}

impl FailoverRecord {
    /// A primary record bound to a region health check.
    pub fn primary(
        set_identifier: impl Into<String>,
        target: impl Into<String>,
        health_check: RegionId,
    ) -> Self {
        Self {
            set_identifier: set_identifier.into(),
            priority: RecordPriority::Primary,
            target: target.into(),
            health_check: Some(health_check),
            evaluate_target_health: true,
        }
    }

    /// A secondary record. No health check: the fallback answer must stay
    /// resolvable even when everything is on fire.
    pub fn secondary(set_identifier: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            set_identifier: set_identifier.into(),
            priority: RecordPriority::Secondary,
            target: target.into(),
            health_check: None,
            evaluate_target_health: false,
        }
    }

    /// Disables health evaluation on this record.
    pub fn without_health_evaluation(mut self) -> Self {
        self.evaluate_target_health = false;
        self
    }
}

/// The pair of failover records sharing one query name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverRecordSet {
    /// The query name both records answer for.
    pub name: String,
    /// Record TTL in seconds.
    pub ttl_secs: u32,
    primary: FailoverRecord,
    secondary: FailoverRecord,
}

impl FailoverRecordSet {
    /// Builds a record set from two records.
    ///
    /// Fails unless the pair holds exactly one primary and one secondary.
    pub fn new(
        name: impl Into<String>,
        ttl_secs: u32,
        a: FailoverRecord,
        b: FailoverRecord,
    ) -> Result<Self, DnsError> {
        let name = name.into();
        if name.is_empty() {
            return Err(DnsError::InvalidRecord {
                set_identifier: a.set_identifier,
                reason: "query name must not be empty".to_string(),
            });
        }
        match (a.priority, b.priority) {
            (RecordPriority::Primary, RecordPriority::Secondary) => {
                Ok(Self { name, ttl_secs, primary: a, secondary: b })
            }
            (RecordPriority::Secondary, RecordPriority::Primary) => {
                Ok(Self { name, ttl_secs, primary: b, secondary: a })
            }
            _ => Err(DnsError::UnbalancedRecordSet { name }),
        }
    }

    /// The primary record.
    pub fn primary(&self) -> &FailoverRecord {
        &self.primary
    }

    /// The secondary record.
    pub fn secondary(&self) -> &FailoverRecord {
        &self.secondary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn primary() -> FailoverRecord {
        FailoverRecord::primary("www-primary", "east.example.com", RegionId::new("us-east-1"))
    }

    fn secondary() -> FailoverRecord {
        FailoverRecord::secondary("www-secondary", "west.example.com")
    }

    #[test]
    fn test_record_set_orders_priorities() {
        let set = FailoverRecordSet::new("www.example.com.", 60, secondary(), primary()).unwrap();
        assert_eq!(set.primary().target, "east.example.com");
        assert_eq!(set.secondary().target, "west.example.com");
        assert_eq!(set.ttl_secs, 60);
    }

    #[test]
    fn test_record_set_rejects_two_primaries() {
        let other = FailoverRecord::primary("dup", "x.example.com", RegionId::new("us-west-2"));
        assert!(matches!(
            FailoverRecordSet::new("www.example.com.", 60, primary(), other),
            Err(DnsError::UnbalancedRecordSet { .. })
        ));
    }

    #[test]
    fn test_record_set_rejects_empty_name() {
        assert!(matches!(
            FailoverRecordSet::new("", 60, primary(), secondary()),
            Err(DnsError::InvalidRecord { .. })
        ));
    }

    #[test]
    fn test_primary_record_defaults() {
        let record = primary();
        assert!(record.priority.is_primary());
        assert!(record.evaluate_target_health);
        assert_eq!(record.health_check, Some(RegionId::new("us-east-1")));
    }

    #[test]
    fn test_secondary_has_no_health_check() {
        let record = secondary();
        assert!(!record.priority.is_primary());
        assert!(!record.evaluate_target_health);
        assert!(record.health_check.is_none());
    }

    #[test]
    fn test_record_serde() {
        let json = serde_json::to_string(&primary()).unwrap();
        let parsed: FailoverRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.target, "east.example.com");
        assert!(parsed.priority.is_primary());
    }
}
