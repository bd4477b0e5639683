//! Typed message bodies for the device federation protocol.
//!
//! Field names are the wire contract; devices in other languages decode
//! the same JSON. Inbound bodies default optional fields so older device
//! firmware stays decodable.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::dmf::envelope::MessageTopic;
use crate::models::{AttributeUpdateMode, SoftwareModule};

/// Status codes devices report for an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceActionStatus {
    Download,
    Downloaded,
    Retrieved,
    Running,
    Finished,
    Error,
    Warning,
    Canceled,
    /// Device refused a cancellation; the action resumes
    CancelRejected,
}

/// One downloadable artifact with integrity hashes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactPayload {
    pub filename: String,
    pub size: i64,
    pub md5: String,
    pub sha1: String,
    pub sha256: String,
    /// Absolute download location for this artifact
    pub download_url: String,
}

/// One software module of an update bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftwareModulePayload {
    pub module_id: i64,
    pub module_type: String,
    pub name: String,
    pub version: String,
    pub artifacts: Vec<ArtifactPayload>,
}

impl SoftwareModulePayload {
    /// Build the wire form of a module, expanding artifact download URLs
    /// under the given per-device base.
    pub fn from_module(module: &SoftwareModule, download_base: &str) -> Self {
        Self {
            module_id: module.id,
            module_type: module.module_type.clone(),
            name: module.name.clone(),
            version: module.version.clone(),
            artifacts: module
                .artifacts
                .iter()
                .map(|artifact| ArtifactPayload {
                    filename: artifact.filename.clone(),
                    size: artifact.size,
                    md5: artifact.hashes.md5.clone(),
                    sha1: artifact.hashes.sha1.clone(),
                    sha256: artifact.hashes.sha256.clone(),
                    download_url: format!(
                        "{download_base}/softwaremodules/{}/artifacts/{}",
                        module.id, artifact.filename
                    ),
                })
                .collect(),
        }
    }
}

/// Body of `DOWNLOAD` and `DOWNLOAD_AND_INSTALL` messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub action_id: i64,
    pub software_modules: Vec<SoftwareModulePayload>,
}

/// Body of `CANCEL_DOWNLOAD` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRequest {
    pub action_id: i64,
}

/// One entry of a `MULTI_ACTION` bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiActionElement {
    /// DOWNLOAD, DOWNLOAD_AND_INSTALL or CANCEL_DOWNLOAD
    pub topic: MessageTopic,
    pub weight: i32,
    pub action_id: i64,
    /// Present for download/install entries, absent for cancellations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software_modules: Option<Vec<SoftwareModulePayload>>,
}

/// Body of `MULTI_ACTION` messages: the target's full pending set,
/// ordered by weight descending then action id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiActionRequest {
    pub elements: Vec<MultiActionElement>,
}

/// Body of inbound `UPDATE_ACTION_STATUS` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStatusUpdate {
    pub action_id: i64,
    pub status: DeviceActionStatus,
    #[serde(default)]
    pub messages: Vec<String>,
    /// Module the report refers to, when the device distinguishes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software_module_id: Option<i64>,
}

/// Body of inbound `THING_CREATED` messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThingCreatedBody {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub attributes: Option<HashMap<String, String>>,
}

/// Body of inbound `UPDATE_ATTRIBUTES` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeUpdate {
    #[serde(default)]
    pub mode: AttributeUpdateMode,
    pub attributes: HashMap<String, String>,
}

/// Body of outbound `PING_RESPONSE` messages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PingResponse {
    pub server_time: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Artifact, ArtifactHashes};

    fn module() -> SoftwareModule {
        SoftwareModule {
            id: 7,
            name: "os".to_string(),
            version: "2.1.0".to_string(),
            module_type: "os".to_string(),
            artifacts: vec![Artifact {
                id: 1,
                filename: "image.raucb".to_string(),
                size: 1024,
                hashes: ArtifactHashes {
                    md5: "aa".to_string(),
                    sha1: "bb".to_string(),
                    sha256: "cc".to_string(),
                },
            }],
        }
    }

    #[test]
    fn test_module_payload_builds_download_urls() {
        let payload = SoftwareModulePayload::from_module(
            &module(),
            "https://updates.example.com/default/controller/v1/device-1",
        );
        assert_eq!(payload.module_id, 7);
        assert_eq!(
            payload.artifacts[0].download_url,
            "https://updates.example.com/default/controller/v1/device-1/softwaremodules/7/artifacts/image.raucb"
        );
        assert_eq!(payload.artifacts[0].sha256, "cc");
    }

    #[test]
    fn test_device_status_codes_wire_names() {
        assert_eq!(
            serde_json::to_string(&DeviceActionStatus::CancelRejected).unwrap(),
            r#""CANCEL_REJECTED""#
        );
        let decoded: DeviceActionStatus = serde_json::from_str(r#""DOWNLOADED""#).unwrap();
        assert_eq!(decoded, DeviceActionStatus::Downloaded);
    }

    #[test]
    fn test_status_update_defaults() {
        let update: ActionStatusUpdate =
            serde_json::from_str(r#"{"action_id": 3, "status": "FINISHED"}"#).unwrap();
        assert_eq!(update.action_id, 3);
        assert!(update.messages.is_empty());
        assert!(update.software_module_id.is_none());
    }

    #[test]
    fn test_multi_action_cancel_entry_omits_modules() {
        let element = MultiActionElement {
            topic: MessageTopic::CancelDownload,
            weight: 800,
            action_id: 4,
            software_modules: None,
        };
        let encoded = serde_json::to_string(&element).unwrap();
        assert!(!encoded.contains("software_modules"));
    }

    #[test]
    fn test_attribute_update_mode_defaults_to_merge() {
        let update: AttributeUpdate =
            serde_json::from_str(r#"{"attributes": {"os": "linux"}}"#).unwrap();
        assert_eq!(update.mode, AttributeUpdateMode::Merge);
    }
}
