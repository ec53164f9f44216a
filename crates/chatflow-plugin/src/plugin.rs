// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The plugin interface and the info record kept for each plugin.

use std::sync::Arc;

use chatflow_core::ChatflowError;
use chatflow_ioc::Container;
use serde::{Deserialize, Serialize};

/// A unit of extension with lifecycle hooks.
///
/// A plugin is built inside its own container scope, from which it resolves
/// the registries it contributes to (blocks, workflows, IM and LLM adapter
/// types, dispatch rule types) and its [`PluginEventBus`](crate::PluginEventBus).
pub trait Plugin: Send + Sync + 'static {
    /// Register contributions. Called once after construction.
    fn on_load(&self) -> Result<(), ChatflowError>;

    fn on_start(&self) -> Result<(), ChatflowError>;

    fn on_stop(&self) -> Result<(), ChatflowError>;

    /// Free-form metadata surfaced in [`PluginInfo::metadata`].
    fn metadata(&self) -> Option<serde_json::Map<String, serde_json::Value>> {
        None
    }
}

/// Builds a plugin inside its construction scope.
pub type PluginFactory =
    Arc<dyn Fn(&Arc<Container>) -> Result<Arc<dyn Plugin>, ChatflowError> + Send + Sync>;

/// What the loader knows about one plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    /// Package providing an external plugin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    pub description: String,
    pub version: String,
    pub author: String,
    pub is_internal: bool,
    pub is_enabled: bool,
    #[serde(default)]
    pub requires_restart: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl PluginInfo {
    /// Info for a plugin shipped in the internal plugin directory.
    pub fn internal(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            package_name: None,
            description: description.into(),
            version: "1.0.0".to_string(),
            author: "Internal".to_string(),
            is_internal: true,
            is_enabled: true,
            requires_restart: false,
            metadata: None,
        }
    }
}
