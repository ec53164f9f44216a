// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin manifest parsing from `plugin.toml` files.
//!
//! Installed packages describe themselves with a `[plugin]` section and
//! declare their plugins under `[entry_points]`:
//!
//! ```toml
//! [plugin]
//! name = "chatflow-weather"
//! version = "0.2.0"
//! description = "Weather lookups"
//!
//! [entry_points."chatflow.plugins"]
//! weather = "weather_plugin"
//! ```
//!
//! Each entry point maps a plugin name to the key of a compiled-in factory
//! in the [`PluginCatalog`](crate::PluginCatalog).

use std::collections::BTreeMap;
use std::path::Path;

use chatflow_core::ChatflowError;
use serde::{Deserialize, Serialize};

/// Entry point group scanned for plugins.
pub const ENTRY_POINT_GROUP: &str = "chatflow.plugins";

/// File name of a manifest inside a plugin or package directory.
pub const MANIFEST_FILE: &str = "plugin.toml";

/// Parsed `plugin.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Package name (the unit the package manager installs).
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: Option<String>,
    /// Minimum Chatflow version required (e.g., "0.1.0").
    pub min_chatflow_version: Option<String>,
    /// Entry point group to `plugin name -> catalog key`.
    pub entry_points: BTreeMap<String, BTreeMap<String, String>>,
}

impl PluginManifest {
    /// Entry points declared for [`ENTRY_POINT_GROUP`], by plugin name.
    pub fn plugin_entry_points(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entry_points
            .get(ENTRY_POINT_GROUP)
            .into_iter()
            .flat_map(|eps| eps.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }
}

#[derive(Debug, Deserialize)]
struct PluginManifestFile {
    plugin: PluginSection,
    #[serde(default)]
    entry_points: BTreeMap<String, BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct PluginSection {
    name: String,
    version: String,
    #[serde(default)]
    description: String,
    author: Option<String>,
    min_chatflow_version: Option<String>,
}

/// Parse a plugin manifest from TOML content.
///
/// Validates that name is non-empty, that version is a semantic version,
/// and that this build satisfies `min_chatflow_version`.
pub fn parse_plugin_manifest(toml_content: &str) -> Result<PluginManifest, ChatflowError> {
    let file: PluginManifestFile = toml::from_str(toml_content)
        .map_err(|e| ChatflowError::Config(format!("invalid plugin manifest: {e}")))?;
    let section = file.plugin;

    if section.name.is_empty() {
        return Err(ChatflowError::Config(
            "plugin manifest: name must not be empty".to_string(),
        ));
    }
    semver::Version::parse(&section.version).map_err(|e| {
        ChatflowError::Config(format!(
            "plugin manifest: invalid version '{}': {e}",
            section.version
        ))
    })?;

    if let Some(min) = &section.min_chatflow_version {
        let required = semver::Version::parse(min).map_err(|e| {
            ChatflowError::Config(format!(
                "plugin manifest: invalid min_chatflow_version '{min}': {e}"
            ))
        })?;
        let current = semver::Version::parse(env!("CARGO_PKG_VERSION"))
            .map_err(|e| ChatflowError::Internal(e.to_string()))?;
        if current < required {
            return Err(ChatflowError::Config(format!(
                "plugin {} requires chatflow >= {required}, running {current}",
                section.name
            )));
        }
    }

    Ok(PluginManifest {
        name: section.name,
        version: section.version,
        description: section.description,
        author: section.author,
        min_chatflow_version: section.min_chatflow_version,
        entry_points: file.entry_points,
    })
}

/// Read `<dir>/plugin.toml`. `Ok(None)` when the file does not exist.
pub fn read_manifest(dir: &Path) -> Result<Option<PluginManifest>, ChatflowError> {
    let path = dir.join(MANIFEST_FILE);
    if !path.is_file() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&path)?;
    parse_plugin_manifest(&text).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_manifest() {
        let toml = r#"
[plugin]
name = "chatflow-weather"
version = "0.2.0"
description = "Weather lookups"
author = "Jane"

[entry_points."chatflow.plugins"]
weather = "weather_plugin"

[entry_points."other.group"]
ignored = "x"
"#;
        let manifest = parse_plugin_manifest(toml).unwrap();
        assert_eq!(manifest.name, "chatflow-weather");
        assert_eq!(manifest.author.as_deref(), Some("Jane"));
        let eps: Vec<_> = manifest.plugin_entry_points().collect();
        assert_eq!(eps, [("weather", "weather_plugin")]);
    }

    #[test]
    fn parse_minimal_manifest() {
        let manifest = parse_plugin_manifest("[plugin]\nname = \"m\"\nversion = \"1.0.0\"\n").unwrap();
        assert!(manifest.description.is_empty());
        assert!(manifest.author.is_none());
        assert_eq!(manifest.plugin_entry_points().count(), 0);
    }

    #[test]
    fn parse_missing_name() {
        let err = parse_plugin_manifest("[plugin]\nname = \"\"\nversion = \"1.0.0\"\n")
            .unwrap_err()
            .to_string();
        assert!(err.contains("name must not be empty"));
    }

    #[test]
    fn parse_bad_version() {
        let err = parse_plugin_manifest("[plugin]\nname = \"x\"\nversion = \"one\"\n")
            .unwrap_err()
            .to_string();
        assert!(err.contains("invalid version"));
    }

    #[test]
    fn rejects_newer_minimum_version() {
        let toml = "[plugin]\nname = \"x\"\nversion = \"1.0.0\"\nmin_chatflow_version = \"999.0.0\"\n";
        assert!(parse_plugin_manifest(toml).is_err());
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_manifest(dir.path()).unwrap().is_none());
    }
}
