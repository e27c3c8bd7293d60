//! Extension discovery - scan a directory for engine extension folders
//!
//! An extension is a subdirectory holding both `manifest.json` and
//! `extension.py`. Manifests are surfaced verbatim to clients.

use std::path::{Path, PathBuf};

use serde::Serialize;

/// Manifest file name inside an extension folder
pub const MANIFEST_FILE: &str = "manifest.json";

/// Entry point file name inside an extension folder
pub const ENTRY_FILE: &str = "extension.py";

/// A discovered extension
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtensionInfo {
    /// Folder name
    pub name: String,

    /// Parsed `manifest.json`
    pub manifest: serde_json::Value,

    /// Path to the entry point script
    #[serde(skip)]
    pub entry: PathBuf,
}

/// Extensions found at startup, sorted by name
#[derive(Debug, Clone, Default)]
pub struct ExtensionRegistry {
    extensions: Vec<ExtensionInfo>,
}

impl ExtensionRegistry {
    /// Scan `dir` for extensions
    ///
    /// A missing directory yields an empty registry.
    #[must_use]
    pub fn load(dir: &Path) -> Self {
        let extensions = discover_extensions(dir);
        tracing::info!(
            path = %dir.display(),
            count = extensions.len(),
            "loaded extensions"
        );
        Self { extensions }
    }

    #[must_use]
    pub fn list(&self) -> &[ExtensionInfo] {
        &self.extensions
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ExtensionInfo> {
        self.extensions.iter().find(|ext| ext.name == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

/// Scan immediate subdirectories of `dir` for extensions
#[must_use]
pub fn discover_extensions(dir: &Path) -> Vec<ExtensionInfo> {
    if !dir.is_dir() {
        tracing::debug!(path = %dir.display(), "extensions directory does not exist, skipping");
        return Vec::new();
    }

    let Ok(entries) = std::fs::read_dir(dir) else {
        tracing::warn!(path = %dir.display(), "failed to read extensions directory");
        return Vec::new();
    };

    let mut results = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let entry_point = path.join(ENTRY_FILE);
        if !entry_point.is_file() {
            continue;
        }

        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if let Some(manifest) = load_manifest(&path.join(MANIFEST_FILE)) {
            tracing::debug!(extension = %name, "discovered extension");
            results.push(ExtensionInfo {
                name: name.to_string(),
                manifest,
                entry: entry_point,
            });
        }
    }

    results.sort_by(|a, b| a.name.cmp(&b.name));
    results
}

/// Load and parse a single manifest file
fn load_manifest(path: &Path) -> Option<serde_json::Value> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to parse extension manifest"
            );
            None
        }
    }
}
