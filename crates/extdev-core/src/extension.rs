//! Extension build state.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::ExtensionUuid;

/// Build state of one extension as reported by the build pipeline.
///
/// Two payloads compare equal when every field is structurally equal; the
/// payload store uses this to skip no-op rebuilds.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionPayload {
    /// Specification identifier this extension was built from.
    #[serde(rename = "type", default)]
    pub extension_type: String,
    /// Host surface (`admin`, `checkout`, `pos`, ...).
    #[serde(default)]
    pub surface: String,
    /// Output file path → content hash.
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    /// Opaque extension configuration.
    #[serde(default)]
    pub config: Value,
    /// Directory holding the built assets, served under `<uuid>/assets/`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_dir: Option<PathBuf>,
}

impl ExtensionPayload {
    /// Create a payload for the given specification type and surface.
    pub fn new(extension_type: impl Into<String>, surface: impl Into<String>) -> Self {
        Self {
            extension_type: extension_type.into(),
            surface: surface.into(),
            files: BTreeMap::new(),
            config: Value::Null,
            build_dir: None,
        }
    }

    /// Record one output file and its content hash.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<String>, hash: impl Into<String>) -> Self {
        let _ = self.files.insert(path.into(), hash.into());
        self
    }

    /// Set the directory the build writes its assets to.
    #[must_use]
    pub fn with_build_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.build_dir = Some(dir.into());
        self
    }

    /// Replace the configuration blob.
    #[must_use]
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }
}

/// One extension's current state, as held by the store and sent to clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtensionInstance {
    /// Primary key.
    pub uuid: ExtensionUuid,
    /// Per-uuid version, strictly increasing.
    pub version: u64,
    /// Build state.
    #[serde(flatten)]
    pub payload: ExtensionPayload,
}

impl ExtensionInstance {
    /// Specification identifier of this instance.
    pub fn extension_type(&self) -> &str {
        &self.payload.extension_type
    }
}
