//! # Target Model
//!
//! A managed device. Targets are created on first device contact
//! (THING_CREATED) or by admin provisioning, mutated by poll events and
//! action completions, and soft-deleted while in-flight actions exist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Update status of a target relative to its assigned distribution set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetUpdateStatus {
    /// Provisioned but never seen on the wire
    Unknown,
    /// Device has contacted the server at least once
    Registered,
    /// An update is assigned and not yet concluded
    Pending,
    /// Installed set matches the assigned set
    InSync,
    /// The last update attempt failed
    Error,
}

impl fmt::Display for TargetUpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Registered => write!(f, "registered"),
            Self::Pending => write!(f, "pending"),
            Self::InSync => write!(f, "in_sync"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl Default for TargetUpdateStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

/// A managed device known to one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: i64,
    pub tenant: String,
    /// Stable external identity, unique per tenant
    pub controller_id: String,
    pub name: String,
    pub update_status: TargetUpdateStatus,
    /// Distribution set most recently assigned for installation
    pub assigned_distribution_set: Option<i64>,
    /// Distribution set confirmed installed by the device
    pub installed_distribution_set: Option<i64>,
    /// Last inbound device contact of any kind
    pub last_poll_at: Option<DateTime<Utc>>,
    /// Latest attribute snapshot reported by the device
    pub attributes: HashMap<String, String>,
    /// Whether a metadata refresh has been requested from the device
    pub attributes_requested: bool,
    /// Soft-delete tombstone; deletion is deferred while actions are in flight
    pub deleted: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New target for creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTarget {
    pub controller_id: String,
    /// Defaults to the controller id
    pub name: Option<String>,
    pub attributes: Option<HashMap<String, String>>,
}

impl NewTarget {
    pub fn new(controller_id: impl Into<String>) -> Self {
        Self {
            controller_id: controller_id.into(),
            name: None,
            attributes: None,
        }
    }
}

/// Mode for applying a device-reported attribute update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributeUpdateMode {
    /// Merge reported keys into the existing snapshot
    Merge,
    /// Replace the whole snapshot
    Replace,
    /// Remove the reported keys
    Remove,
}

impl Default for AttributeUpdateMode {
    fn default() -> Self {
        Self::Merge
    }
}

impl Target {
    /// Apply a reported attribute update in the given mode.
    pub fn apply_attributes(
        &mut self,
        mode: AttributeUpdateMode,
        reported: &HashMap<String, String>,
    ) {
        match mode {
            AttributeUpdateMode::Merge => {
                for (key, value) in reported {
                    self.attributes.insert(key.clone(), value.clone());
                }
            }
            AttributeUpdateMode::Replace => {
                self.attributes = reported.clone();
            }
            AttributeUpdateMode::Remove => {
                for key in reported.keys() {
                    self.attributes.remove(key);
                }
            }
        }
        self.attributes_requested = false;
    }

    /// Whether the device has been seen within `timeout_secs` of `now`.
    pub fn polled_within(&self, now: DateTime<Utc>, timeout_secs: i64) -> bool {
        match self.last_poll_at {
            Some(at) => (now - at).num_seconds() <= timeout_secs,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Target {
        Target {
            id: 1,
            tenant: "default".to_string(),
            controller_id: "device-1".to_string(),
            name: "device-1".to_string(),
            update_status: TargetUpdateStatus::Registered,
            assigned_distribution_set: None,
            installed_distribution_set: None,
            last_poll_at: None,
            attributes: HashMap::from([
                ("os".to_string(), "linux".to_string()),
                ("region".to_string(), "eu".to_string()),
            ]),
            attributes_requested: true,
            deleted: false,
            created_by: "system".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_apply_attributes_merge() {
        let mut t = target();
        t.apply_attributes(
            AttributeUpdateMode::Merge,
            &HashMap::from([("os".to_string(), "linux-rt".to_string())]),
        );
        assert_eq!(t.attributes.get("os").unwrap(), "linux-rt");
        assert_eq!(t.attributes.get("region").unwrap(), "eu");
        assert!(!t.attributes_requested);
    }

    #[test]
    fn test_apply_attributes_replace() {
        let mut t = target();
        t.apply_attributes(
            AttributeUpdateMode::Replace,
            &HashMap::from([("hw".to_string(), "rev2".to_string())]),
        );
        assert_eq!(t.attributes.len(), 1);
        assert_eq!(t.attributes.get("hw").unwrap(), "rev2");
    }

    #[test]
    fn test_apply_attributes_remove() {
        let mut t = target();
        t.apply_attributes(
            AttributeUpdateMode::Remove,
            &HashMap::from([("region".to_string(), String::new())]),
        );
        assert!(!t.attributes.contains_key("region"));
        assert!(t.attributes.contains_key("os"));
    }

    #[test]
    fn test_polled_within() {
        let now = Utc::now();
        let mut t = target();
        assert!(!t.polled_within(now, 300));

        t.last_poll_at = Some(now - chrono::Duration::seconds(60));
        assert!(t.polled_within(now, 300));
        assert!(!t.polled_within(now, 30));
    }
}
