//! # Distribution Set Model
//!
//! A versioned bundle of software modules, each carrying artifacts with
//! checksums. Sets are mutable while assembled; once marked complete and
//! referenced by a non-cancelled action they are locked, so a device never
//! observes a bundle changing underneath a running update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Checksums for one artifact binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHashes {
    pub md5: String,
    pub sha1: String,
    pub sha256: String,
}

/// One downloadable binary inside a software module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: i64,
    pub filename: String,
    pub size: i64,
    pub hashes: ArtifactHashes,
}

/// A software module: the unit a device installs (os image, app bundle).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftwareModule {
    pub id: i64,
    pub name: String,
    pub version: String,
    /// Module type key, e.g. "os" or "application"
    pub module_type: String,
    pub artifacts: Vec<Artifact>,
}

/// An immutable-once-complete bundle of software modules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionSet {
    pub id: i64,
    pub tenant: String,
    pub name: String,
    pub version: String,
    pub modules: Vec<SoftwareModule>,
    /// Assembly finished; required before the set can be assigned
    pub complete: bool,
    /// Referenced by a non-cancelled action; module mutations are rejected
    pub locked: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New distribution set for creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDistributionSet {
    pub name: String,
    pub version: String,
    pub modules: Vec<SoftwareModule>,
    pub complete: bool,
}

impl DistributionSet {
    /// Whether the set may be assigned to targets.
    pub fn assignable(&self) -> bool {
        self.complete
    }

    /// Total artifact payload size in bytes.
    pub fn total_size(&self) -> i64 {
        self.modules
            .iter()
            .flat_map(|m| m.artifacts.iter())
            .map(|a| a.size)
            .sum()
    }
}
