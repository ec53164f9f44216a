// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Chatflow runtime.
//!
//! Unknown keys are accepted. Top-level extras are preserved in
//! [`GlobalConfig::extra`] so a load/save cycle does not drop them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Free-form adapter or backend settings, passed through to the factory.
pub type AdapterSettings = serde_json::Map<String, serde_json::Value>;

/// Top-level Chatflow configuration, usually `data/config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// IM adapter instances.
    #[serde(default)]
    pub ims: Vec<ImConfig>,

    /// LLM API backends.
    #[serde(default)]
    pub llms: LlmConfig,

    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    /// Admin web server.
    #[serde(default)]
    pub web: WebConfig,

    #[serde(default)]
    pub plugins: PluginsConfig,

    /// Package registries used by plugin install and update.
    #[serde(default)]
    pub update: UpdateConfig,

    #[serde(default)]
    pub system: SystemConfig,

    /// Workflow executor settings.
    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// Unrecognized top-level keys, kept verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl GlobalConfig {
    /// Look up an IM adapter entry by name.
    pub fn im(&self, name: &str) -> Option<&ImConfig> {
        self.ims.iter().find(|im| im.name == name)
    }

    /// Look up an LLM backend entry by name.
    pub fn backend(&self, name: &str) -> Option<&LlmBackendConfig> {
        self.llms.api_backends.iter().find(|b| b.name == name)
    }
}

/// One IM adapter instance.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ImConfig {
    pub name: String,

    #[serde(default = "default_true")]
    pub enable: bool,

    /// Registered adapter type, e.g. `telegram`.
    #[serde(default = "default_im_adapter")]
    pub adapter: String,

    #[serde(default)]
    pub config: AdapterSettings,
}

impl ImConfig {
    pub fn new(name: impl Into<String>, adapter: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enable: true,
            adapter: adapter.into(),
            config: AdapterSettings::new(),
        }
    }
}

fn default_im_adapter() -> String {
    "dummy".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_backends: Vec<LlmBackendConfig>,
}

/// One LLM backend. Each model listed here routes to this backend while loaded.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LlmBackendConfig {
    pub name: String,

    /// Registered adapter type, e.g. `openai`.
    pub adapter: String,

    #[serde(default = "default_true")]
    pub enable: bool,

    #[serde(default)]
    pub models: Vec<String>,

    #[serde(default)]
    pub config: AdapterSettings,
}

impl LlmBackendConfig {
    pub fn new(name: impl Into<String>, adapter: impl Into<String>, models: Vec<String>) -> Self {
        Self {
            name: name.into(),
            adapter: adapter.into(),
            enable: true,
            models,
            config: AdapterSettings::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DefaultsConfig {
    /// Model used by blocks that do not name one.
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            llm_model: default_llm_model(),
        }
    }
}

fn default_llm_model() -> String {
    "gemini-1.5-flash".to_string()
}

/// Chat memory settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub persistence: MemoryPersistenceConfig,

    /// Per-scope-key cap; the oldest entries are evicted first.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// `member`, `group`, or `global`.
    #[serde(default = "default_scope")]
    pub default_scope: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            persistence: MemoryPersistenceConfig::default(),
            max_entries: default_max_entries(),
            default_scope: default_scope(),
        }
    }
}

fn default_max_entries() -> usize {
    100
}

fn default_scope() -> String {
    "member".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MemoryPersistenceConfig {
    /// `file` or `redis`.
    #[serde(rename = "type", default = "default_persistence_type")]
    pub kind: String,

    #[serde(default)]
    pub file: FilePersistenceConfig,

    #[serde(default)]
    pub redis: RedisPersistenceConfig,
}

impl Default for MemoryPersistenceConfig {
    fn default() -> Self {
        Self {
            kind: default_persistence_type(),
            file: FilePersistenceConfig::default(),
            redis: RedisPersistenceConfig::default(),
        }
    }
}

fn default_persistence_type() -> String {
    "file".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FilePersistenceConfig {
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,
}

impl Default for FilePersistenceConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
        }
    }
}

fn default_storage_dir() -> String {
    "./data/memory".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RedisPersistenceConfig {
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub db: u32,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for RedisPersistenceConfig {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
            db: 0,
            password: None,
        }
    }
}

fn default_redis_host() -> String {
    "localhost".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

/// Admin web server settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WebConfig {
    #[serde(default = "default_web_host")]
    pub host: String,

    #[serde(default = "default_web_port")]
    pub port: u16,

    #[serde(default)]
    pub secret_key: String,

    /// Where the admin password hash lives.
    #[serde(default = "default_password_file")]
    pub password_file: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_web_host(),
            port: default_web_port(),
            secret_key: String::new(),
            password_file: default_password_file(),
        }
    }
}

fn default_web_host() -> String {
    "127.0.0.1".to_string()
}

fn default_web_port() -> u16 {
    8080
}

fn default_password_file() -> String {
    "./data/web/password.hash".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PluginsConfig {
    /// External plugins to load at boot.
    #[serde(default)]
    pub enable: Vec<String>,

    #[serde(default = "default_market_base_url")]
    pub market_base_url: String,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            enable: Vec::new(),
            market_base_url: default_market_base_url(),
        }
    }
}

fn default_market_base_url() -> String {
    "https://plugins.chatflow.dev/api/v1".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UpdateConfig {
    #[serde(default = "default_pypi_registry")]
    pub pypi_registry: String,

    #[serde(default = "default_npm_registry")]
    pub npm_registry: String,

    /// Executable used to install, remove, and upgrade plugin packages.
    #[serde(default = "default_package_manager")]
    pub package_manager: String,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            pypi_registry: default_pypi_registry(),
            npm_registry: default_npm_registry(),
            package_manager: default_package_manager(),
        }
    }
}

fn default_pypi_registry() -> String {
    "https://pypi.org/simple".to_string()
}

fn default_npm_registry() -> String {
    "https://registry.npmjs.org".to_string()
}

fn default_package_manager() -> String {
    "pip".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SystemConfig {
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            log_level: default_log_level(),
        }
    }
}

fn default_timezone() -> String {
    "Asia/Shanghai".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct WorkflowConfig {
    /// Upper bound on loop iterations per loop block. Unset means unbounded.
    #[serde(default)]
    pub max_loop_iterations: Option<u64>,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = GlobalConfig::default();
        assert!(config.ims.is_empty());
        assert!(config.llms.api_backends.is_empty());
        assert_eq!(config.defaults.llm_model, "gemini-1.5-flash");
        assert_eq!(config.memory.persistence.kind, "file");
        assert_eq!(config.memory.persistence.file.storage_dir, "./data/memory");
        assert_eq!(config.memory.persistence.redis.port, 6379);
        assert_eq!(config.memory.max_entries, 100);
        assert_eq!(config.memory.default_scope, "member");
        assert_eq!(config.web.host, "127.0.0.1");
        assert_eq!(config.web.port, 8080);
        assert_eq!(config.update.package_manager, "pip");
        assert_eq!(config.system.timezone, "Asia/Shanghai");
        assert!(config.workflow.max_loop_iterations.is_none());
    }

    #[test]
    fn lookup_by_name() {
        let mut config = GlobalConfig::default();
        config.ims.push(ImConfig::new("tg", "telegram"));
        config
            .llms
            .api_backends
            .push(LlmBackendConfig::new("oa", "openai", vec!["gpt-4o".into()]));
        assert_eq!(config.im("tg").map(|i| i.adapter.as_str()), Some("telegram"));
        assert!(config.im("missing").is_none());
        assert_eq!(config.backend("oa").map(|b| b.models.len()), Some(1));
    }
}
