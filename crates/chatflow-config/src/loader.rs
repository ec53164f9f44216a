// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Merge order (later overrides earlier): compiled defaults, the YAML file,
//! then `CHATFLOW_*` environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};

use crate::model::GlobalConfig;

/// Load configuration from a YAML file with env var overrides.
///
/// A missing file is not an error; defaults and env vars still apply.
pub fn load_config_from_path(path: &Path) -> Result<GlobalConfig, figment::Error> {
    build_figment(path).extract()
}

/// Load configuration from a YAML string only (no env overrides).
pub fn load_config_from_str(yaml: &str) -> Result<GlobalConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(GlobalConfig::default()))
        .merge(Yaml::string(yaml))
        .extract()
}

/// Build the Figment used for file loading, before extraction.
pub fn build_figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(GlobalConfig::default()))
        .merge(Yaml::file(path))
        .merge(env_provider())
}

/// Environment variable provider with an explicit section map.
///
/// `Env::split("_")` would turn `CHATFLOW_MEMORY_MAX_ENTRIES` into
/// `memory.max.entries`; the map keeps field names that contain underscores.
pub(crate) fn env_provider() -> Env {
    Env::prefixed("CHATFLOW_").map(|key| map_env_key(key.as_str()).into())
}

pub(crate) fn map_env_key(key: &str) -> String {
    key.replacen("defaults_", "defaults.", 1)
        .replacen("memory_persistence_file_", "memory.persistence.file.", 1)
        .replacen("memory_persistence_redis_", "memory.persistence.redis.", 1)
        .replacen("memory_persistence_", "memory.persistence.", 1)
        .replacen("memory_", "memory.", 1)
        .replacen("web_", "web.", 1)
        .replacen("plugins_", "plugins.", 1)
        .replacen("update_", "update.", 1)
        .replacen("system_", "system.", 1)
        .replacen("workflow_", "workflow.", 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_to_sections() {
        assert_eq!(map_env_key("web_port"), "web.port");
        assert_eq!(map_env_key("memory_max_entries"), "memory.max_entries");
        assert_eq!(
            map_env_key("memory_persistence_file_storage_dir"),
            "memory.persistence.file.storage_dir"
        );
        assert_eq!(map_env_key("memory_persistence_type"), "memory.persistence.type");
        assert_eq!(map_env_key("defaults_llm_model"), "defaults.llm_model");
        assert_eq!(map_env_key("system_log_level"), "system.log_level");
        assert_eq!(
            map_env_key("workflow_max_loop_iterations"),
            "workflow.max_loop_iterations"
        );
    }
}
