//! Region types for the two-region active-active topology.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Unique identifier for a region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionId(pub String);

impl RegionId {
    /// Create a new region ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the region ID as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RegionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RegionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for RegionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Routing role of a region.
///
/// The role is a routing preference for DNS failover, not a write
/// constraint: both regions accept writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionRole {
    /// Preferred region while healthy.
    Primary,
    /// Region that takes over when the primary is down.
    Secondary,
}

impl RegionRole {
    /// Returns true for the primary role.
    pub fn is_primary(&self) -> bool {
        matches!(self, Self::Primary)
    }
}

impl std::fmt::Display for RegionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Secondary => write!(f, "secondary"),
        }
    }
}

/// Storage class applied to objects written in a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageClass {
    /// Default storage class.
    #[default]
    Standard,
    /// Infrequent-access storage, typical for replica destinations.
    StandardIa,
}

impl std::fmt::Display for StorageClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard => write!(f, "STANDARD"),
            Self::StandardIa => write!(f, "STANDARD_IA"),
        }
    }
}

/// A region participating in the topology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    /// Unique identifier for this region.
    pub id: RegionId,
    /// Routing role.
    pub role: RegionRole,
    /// Base URL of the region's serving endpoint.
    pub endpoint: String,
    /// Storage class applied to objects stored in this region.
    #[serde(default)]
    pub storage_class: StorageClass,
}

impl Region {
    /// Create a new region.
    pub fn new(id: impl Into<RegionId>, role: RegionRole, endpoint: impl Into<String>) -> Self {
        Self { id: id.into(), role, endpoint: endpoint.into(), storage_class: StorageClass::Standard }
    }

    /// Set the storage class.
    pub fn with_storage_class(mut self, storage_class: StorageClass) -> Self {
        self.storage_class = storage_class;
        self
    }
}

/// The two-member topology: exactly one primary and one secondary region.
///
/// Constructed once at startup and immutable for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionPair {
    primary: Region,
    secondary: Region,
}

impl RegionPair {
    /// Create a pair from two regions.
    ///
    /// Fails unless the pair contains exactly one primary and one secondary
    /// with distinct ids.
    pub fn new(a: Region, b: Region) -> Result<Self> {
        if a.id == b.id {
            return Err(Error::Config(format!("regions must have distinct ids, got {}", a.id)));
        }
        match (a.role, b.role) {
            (RegionRole::Primary, RegionRole::Secondary) => {
                Ok(Self { primary: a, secondary: b })
            }
            (RegionRole::Secondary, RegionRole::Primary) => {
                Ok(Self { primary: b, secondary: a })
            }
            (role, _) => Err(Error::Config(format!(
                "topology needs one primary and one secondary region, got two {role} regions"
            ))),
        }
    }

    /// The primary region.
    pub fn primary(&self) -> &Region {
        &self.primary
    }

    /// The secondary region.
    pub fn secondary(&self) -> &Region {
        &self.secondary
    }

    /// Look up a region by id.
    pub fn get(&self, id: &RegionId) -> Option<&Region> {
        if &self.primary.id == id {
            Some(&self.primary)
        } else if &self.secondary.id == id {
            Some(&self.secondary)
        } else {
            None
        }
    }

    /// The peer of the given region, if the id belongs to the pair.
    pub fn peer_of(&self, id: &RegionId) -> Option<&Region> {
        if &self.primary.id == id {
            Some(&self.secondary)
        } else if &self.secondary.id == id {
            Some(&self.primary)
        } else {
            None
        }
    }

    /// Iterate over both regions, primary first.
    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        [&self.primary, &self.secondary].into_iter()
    }

    /// True if the id belongs to the pair.
    pub fn contains(&self, id: &RegionId) -> bool {
        self.get(id).is_some()
    }
}
