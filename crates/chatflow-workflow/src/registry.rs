// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registry of block types keyed `group:id`.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use chatflow_core::ChatflowError;
use chatflow_ioc::Container;
use serde::Serialize;
use tracing::{debug, warn};

use crate::block::{BlockType, InputSpec, OutputSpec};
use crate::types::TypeSystem;

struct Registered {
    class: Arc<dyn BlockType>,
    localized_name: Option<String>,
}

/// A config field as presented to tooling, with options resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigInfo {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub description: String,
    pub required: bool,
    pub default: Option<serde_json::Value>,
    pub has_options: bool,
    pub options: Vec<serde_json::Value>,
}

/// Port and config descriptors of a block type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockInfo {
    pub type_name: String,
    pub name: String,
    pub inputs: Vec<InputSpec>,
    pub outputs: Vec<OutputSpec>,
    pub configs: Vec<ConfigInfo>,
}

/// Maps `group:id` to block types and owns the [`TypeSystem`].
pub struct BlockRegistry {
    types: RwLock<BTreeMap<String, Registered>>,
    type_system: Arc<TypeSystem>,
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::with_type_system(Arc::new(TypeSystem::with_builtins()))
    }

    pub fn with_type_system(type_system: Arc<TypeSystem>) -> Self {
        Self {
            types: RwLock::new(BTreeMap::new()),
            type_system,
        }
    }

    pub fn type_system(&self) -> &Arc<TypeSystem> {
        &self.type_system
    }

    /// Register a block type. Port types it mentions become known to the
    /// type system.
    pub fn register(
        &self,
        id: &str,
        group: &str,
        class: Arc<dyn BlockType>,
        localized_name: Option<&str>,
    ) -> Result<(), ChatflowError> {
        let key = format!("{group}:{id}");
        let mut types = self.types.write().unwrap_or_else(PoisonError::into_inner);
        if types.contains_key(&key) {
            return Err(ChatflowError::already_registered("block type", key));
        }

        let schema = class.schema();
        for name in schema
            .inputs
            .iter()
            .map(|i| &i.type_name)
            .chain(schema.outputs.iter().map(|o| &o.type_name))
        {
            self.type_system.ensure_type(name);
        }

        debug!(block_type = %key, class = class.type_name(), "block type registered");
        types.insert(
            key,
            Registered {
                class,
                localized_name: localized_name.map(str::to_string),
            },
        );
        Ok(())
    }

    pub fn unregister(&self, id: &str, group: &str) -> Result<(), ChatflowError> {
        let key = format!("{group}:{id}");
        self.types
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| ChatflowError::not_found("block type", key))
    }

    /// Look up by `group:id`.
    pub fn get(&self, key: &str) -> Option<Arc<dyn BlockType>> {
        self.types
            .read()
            .ok()
            .and_then(|t| t.get(key).map(|r| Arc::clone(&r.class)))
    }

    pub fn get_localized_name(&self, key: &str) -> Option<String> {
        self.types
            .read()
            .ok()
            .and_then(|t| t.get(key).and_then(|r| r.localized_name.clone()))
    }

    /// Reverse lookup of a class's `group:id`.
    ///
    /// Unregistered classes come back as `!!<rust type path>`, which cannot
    /// be loaded again.
    pub fn get_block_type_name(&self, class: &dyn BlockType) -> String {
        let wanted = class.type_name();
        let found = self.types.read().ok().and_then(|t| {
            t.iter()
                .find(|(_, r)| r.class.type_name() == wanted)
                .map(|(k, _)| k.clone())
        });
        found.unwrap_or_else(|| {
            warn!(class = wanted, "block type is not registered, saving by type path");
            format!("!!{wanted}")
        })
    }

    /// All registered types, sorted by key.
    pub fn get_all_types(&self) -> Vec<(String, Arc<dyn BlockType>)> {
        self.types
            .read()
            .map(|t| {
                t.iter()
                    .map(|(k, r)| (k.clone(), Arc::clone(&r.class)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Describe a class for tooling, resolving option providers against `container`.
    pub fn extract_block_info(&self, class: &dyn BlockType, container: &Container) -> BlockInfo {
        let schema = class.schema();
        let type_name = self.get_block_type_name(class);
        let name = self
            .get_localized_name(&type_name)
            .unwrap_or_else(|| class.short_name().to_string());

        let configs = schema
            .configs
            .iter()
            .map(|spec| {
                let options = spec
                    .meta
                    .options_provider
                    .as_ref()
                    .map(|provider| provider(container))
                    .unwrap_or_default();
                ConfigInfo {
                    name: spec.name.clone(),
                    label: spec.meta.label.clone().unwrap_or_else(|| spec.name.clone()),
                    type_name: spec.type_name.clone(),
                    description: spec.meta.description.clone().unwrap_or_default(),
                    required: spec.required,
                    default: spec.default.clone(),
                    has_options: spec.meta.options_provider.is_some(),
                    options,
                }
            })
            .collect();

        BlockInfo {
            type_name,
            name,
            inputs: schema.inputs,
            outputs: schema.outputs,
            configs,
        }
    }

    pub fn is_type_compatible(&self, source: &str, target: &str) -> bool {
        self.type_system.is_compatible(source, target)
    }

    pub fn get_type_compatibility_map(&self) -> BTreeMap<String, BTreeMap<String, bool>> {
        self.type_system.get_compatibility_map()
    }
}

impl std::fmt::Debug for BlockRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self
            .types
            .read()
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("BlockRegistry").field("types", &keys).finish()
    }
}
