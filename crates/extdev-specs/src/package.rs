//! Renderer dependency lookup in an extension's npm package.

use std::path::Path;

use serde_json::Value;
use tracing::debug;

/// Version of dependency `name` for the extension in `directory`.
///
/// Prefers the installed version (`node_modules/<name>/package.json`), then
/// the range declared in the extension's own `package.json`. `None` when
/// neither mentions the dependency.
pub async fn dependency_version(name: &str, directory: &Path) -> Option<String> {
    let installed = directory.join("node_modules").join(name).join("package.json");
    if let Some(manifest) = read_manifest(&installed).await {
        if let Some(version) = manifest.get("version").and_then(Value::as_str) {
            return Some(version.to_owned());
        }
    }

    let manifest = read_manifest(&directory.join("package.json")).await?;
    ["dependencies", "devDependencies", "peerDependencies"]
        .iter()
        .find_map(|section| {
            manifest
                .get(section)
                .and_then(|deps| deps.get(name))
                .and_then(Value::as_str)
                .map(str::to_owned)
        })
}

async fn read_manifest(path: &Path) -> Option<Value> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "package manifest not readable");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "package manifest is not valid JSON");
            None
        }
    }
}
