// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registry of LLM adapter types.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use chatflow_config::model::AdapterSettings;
use chatflow_core::{ChatflowError, LlmAbility, LlmBackendAdapter};
use chatflow_ioc::Container;
use serde::de::DeserializeOwned;
use tracing::info;

/// Builds an adapter from its backend settings inside a scoped container.
pub type LlmAdapterFactory = Arc<
    dyn Fn(&AdapterSettings, &Arc<Container>) -> Result<Arc<dyn LlmBackendAdapter>, ChatflowError>
        + Send
        + Sync,
>;

/// One registered adapter type.
#[derive(Clone)]
pub struct LlmBackendType {
    pub adapter_type: String,
    pub ability: LlmAbility,
    pub factory: LlmAdapterFactory,
    pub localized_name: Option<String>,
}

impl std::fmt::Debug for LlmBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmBackendType")
            .field("adapter_type", &self.adapter_type)
            .field("ability", &self.ability)
            .field("localized_name", &self.localized_name)
            .finish()
    }
}

/// Adapter types by name (`openai`, `gemini`, ...).
#[derive(Debug, Default)]
pub struct LlmBackendRegistry {
    types: RwLock<BTreeMap<String, LlmBackendType>>,
}

impl LlmBackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter type with a raw settings factory.
    pub fn register(
        &self,
        adapter_type: &str,
        ability: LlmAbility,
        factory: LlmAdapterFactory,
    ) -> Result<(), ChatflowError> {
        let mut types = self.types.write().unwrap_or_else(PoisonError::into_inner);
        if types.contains_key(adapter_type) {
            return Err(ChatflowError::already_registered("llm adapter", adapter_type));
        }
        types.insert(
            adapter_type.to_string(),
            LlmBackendType {
                adapter_type: adapter_type.to_string(),
                ability,
                factory,
                localized_name: None,
            },
        );
        info!(adapter_type, ?ability, "llm adapter type registered");
        Ok(())
    }

    /// Register an adapter type whose settings deserialize into `C`.
    ///
    /// The parsed config is bound in the construction scope, so the
    /// constructor (or anything it resolves) can pick it up from there.
    pub fn register_with_config<C, F>(
        &self,
        adapter_type: &str,
        ability: LlmAbility,
        constructor: F,
    ) -> Result<(), ChatflowError>
    where
        C: DeserializeOwned + Clone + Send + Sync + 'static,
        F: Fn(C, &Arc<Container>) -> Result<Arc<dyn LlmBackendAdapter>, ChatflowError>
            + Send
            + Sync
            + 'static,
    {
        let name = adapter_type.to_string();
        let factory: LlmAdapterFactory = Arc::new(move |settings, scope| {
            let config: C = serde_json::from_value(serde_json::Value::Object(settings.clone()))
                .map_err(|e| ChatflowError::Config(format!("invalid {name} settings: {e}")))?;
            scope.register(config.clone());
            constructor(config, scope)
        });
        self.register(adapter_type, ability, factory)
    }

    pub fn set_localized_name(&self, adapter_type: &str, name: &str) {
        if let Some(entry) = self
            .types
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(adapter_type)
        {
            entry.localized_name = Some(name.to_string());
        }
    }

    pub fn unregister(&self, adapter_type: &str) -> Result<(), ChatflowError> {
        self.types
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(adapter_type)
            .map(|_| ())
            .ok_or_else(|| ChatflowError::not_found("llm adapter", adapter_type))
    }

    pub fn get(&self, adapter_type: &str) -> Result<LlmBackendType, ChatflowError> {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(adapter_type)
            .cloned()
            .ok_or_else(|| ChatflowError::not_found("llm adapter", adapter_type))
    }

    pub fn get_ability(&self, adapter_type: &str) -> Result<LlmAbility, ChatflowError> {
        self.get(adapter_type).map(|t| t.ability)
    }

    /// Adapter types whose ability equals `ability` exactly.
    pub fn get_adapter_by_ability(&self, ability: LlmAbility) -> Vec<String> {
        self.filter_types(|a| a == ability)
    }

    /// Adapter types whose ability contains every bit of `ability`.
    pub fn search_adapter_by_ability(&self, ability: LlmAbility) -> Vec<String> {
        self.filter_types(|a| a.contains(ability))
    }

    fn filter_types(&self, pred: impl Fn(LlmAbility) -> bool) -> Vec<String> {
        self.types
            .read()
            .map(|types| {
                types
                    .values()
                    .filter(|t| pred(t.ability))
                    .map(|t| t.adapter_type.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn adapter_types(&self) -> Vec<String> {
        self.types
            .read()
            .map(|types| types.keys().cloned().collect())
            .unwrap_or_default()
    }
}
