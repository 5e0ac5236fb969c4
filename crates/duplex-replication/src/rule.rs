// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (c) 2025 The Duplex Authors

//! Replication rules and the bidirectional rule pair.

use duplex_core::RegionId;
use serde::{Deserialize, Serialize};

use crate::error::{ReplicationError, Result};
use crate::event::ChangeEvent;

/// Status of a replication rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum RuleStatus {
    /// Rule is enabled.
    #[default]
    Enabled,
    /// Rule is disabled.
    Disabled,
}

impl RuleStatus {
    /// Check if the rule is enabled.
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }
}

/// A one-directional replication rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationRule {
    /// Region whose client writes this rule propagates.
    pub source_region: RegionId,
    /// Region that receives the copies.
    pub dest_region: RegionId,
    /// Rule status.
    #[serde(default)]
    pub status: RuleStatus,
    /// Optional key prefix restricting which objects replicate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Whether delete markers propagate.
    pub delete_marker_replication: bool,
}

impl ReplicationRule {
    /// Create an enabled rule covering all keys.
    pub fn new(source_region: impl Into<RegionId>, dest_region: impl Into<RegionId>) -> Self {
        Self {
            source_region: source_region.into(),
            dest_region: dest_region.into(),
            status: RuleStatus::Enabled,
            prefix: None,
            delete_marker_replication: true,
        }
    }

    /// Restrict the rule to keys with this prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set whether delete markers propagate.
    pub fn delete_marker_replication(mut self, enabled: bool) -> Self {
        self.delete_marker_replication = enabled;
        self
    }

    /// Set the rule status.
    pub fn status(mut self, status: RuleStatus) -> Self {
        self.status = status;
        self
    }

    /// Whether this rule propagates the given event.
    ///
    /// The replica tag is not consulted here; loop prevention happens before
    /// rule matching.
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if !self.status.is_enabled() {
            return false;
        }
        if event.is_delete() && !self.delete_marker_replication {
            return false;
        }
        match &self.prefix {
            Some(prefix) => event.key().starts_with(prefix.as_str()),
            None => true,
        }
    }
}

/// The bidirectional pair of replication rules.
///
/// Exactly two rules exist, one per direction. The pair alone cannot fire
/// both directions on one object version: the copy written by one direction
/// is tagged `is_replica` and the receiving engine drops it before rule
/// matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulePair {
    forward: ReplicationRule,
    reverse: ReplicationRule,
}

impl RulePair {
    /// Create a pair from two rules.
    ///
    /// Fails unless the rules are mirror images of each other over two
    /// distinct regions.
    pub fn new(forward: ReplicationRule, reverse: ReplicationRule) -> Result<Self> {
        if forward.source_region == forward.dest_region {
            return Err(ReplicationError::NoRoute {
                region: forward.source_region.to_string(),
            });
        }
        if forward.source_region != reverse.dest_region
            || forward.dest_region != reverse.source_region
        {
            return Err(ReplicationError::Malformed {
                key: "<rules>".to_string(),
                reason: "rule pair must mirror each other".to_string(),
            });
        }
        Ok(Self { forward, reverse })
    }

    /// Create a symmetric pair between two regions with shared settings.
    pub fn bidirectional(
        a: impl Into<RegionId>,
        b: impl Into<RegionId>,
        delete_marker_replication: bool,
        prefix: Option<String>,
    ) -> Result<Self> {
        let a = a.into();
        let b = b.into();

        let mut forward = ReplicationRule::new(a.clone(), b.clone())
            .delete_marker_replication(delete_marker_replication);
        let mut reverse =
            ReplicationRule::new(b, a).delete_marker_replication(delete_marker_replication);
        if let Some(prefix) = prefix {
            forward = forward.with_prefix(prefix.clone());
            reverse = reverse.with_prefix(prefix);
        }
        Self::new(forward, reverse)
    }

    /// The rule whose source is the given region.
    pub fn rule_from(&self, source: &RegionId) -> Option<&ReplicationRule> {
        if &self.forward.source_region == source {
            Some(&self.forward)
        } else if &self.reverse.source_region == source {
            Some(&self.reverse)
        } else {
            None
        }
    }

    /// Both rules, forward first.
    pub fn rules(&self) -> [&ReplicationRule; 2] {
        [&self.forward, &self.reverse]
    }
}
