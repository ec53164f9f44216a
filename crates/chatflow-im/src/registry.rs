// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registry of IM adapter types.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use chatflow_config::model::AdapterSettings;
use chatflow_core::{ChatflowError, ImAdapter};
use chatflow_ioc::Container;
use serde::de::DeserializeOwned;
use tracing::info;

/// Builds an adapter from its settings inside a scoped container.
pub type ImAdapterFactory = Arc<
    dyn Fn(&AdapterSettings, &Arc<Container>) -> Result<Arc<dyn ImAdapter>, ChatflowError>
        + Send
        + Sync,
>;

/// One registered adapter type with its display metadata.
#[derive(Clone)]
pub struct ImAdapterInfo {
    pub name: String,
    pub factory: ImAdapterFactory,
    pub localized_name: Option<String>,
    pub localized_description: Option<String>,
}

impl std::fmt::Debug for ImAdapterInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImAdapterInfo")
            .field("name", &self.name)
            .field("localized_name", &self.localized_name)
            .field("localized_description", &self.localized_description)
            .finish()
    }
}

/// IM adapter types by name (`telegram`, `http`, ...).
#[derive(Debug, Default)]
pub struct ImRegistry {
    adapters: RwLock<BTreeMap<String, ImAdapterInfo>>,
}

impl ImRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, info: ImAdapterInfo) -> Result<(), ChatflowError> {
        let mut adapters = self.adapters.write().unwrap_or_else(PoisonError::into_inner);
        if adapters.contains_key(&info.name) {
            return Err(ChatflowError::already_registered("im adapter", &info.name));
        }
        info!(adapter_type = %info.name, "im adapter type registered");
        adapters.insert(info.name.clone(), info);
        Ok(())
    }

    /// Register an adapter type whose settings deserialize into `C`.
    ///
    /// The parsed config is bound in the construction scope before the
    /// constructor runs.
    pub fn register_with_config<C, F>(
        &self,
        name: &str,
        localized_name: Option<&str>,
        constructor: F,
    ) -> Result<(), ChatflowError>
    where
        C: DeserializeOwned + Clone + Send + Sync + 'static,
        F: Fn(C, &Arc<Container>) -> Result<Arc<dyn ImAdapter>, ChatflowError>
            + Send
            + Sync
            + 'static,
    {
        let type_name = name.to_string();
        let factory: ImAdapterFactory = Arc::new(move |settings, scope| {
            let config: C = serde_json::from_value(serde_json::Value::Object(settings.clone()))
                .map_err(|e| ChatflowError::Config(format!("invalid {type_name} settings: {e}")))?;
            scope.register(config.clone());
            constructor(config, scope)
        });
        self.register(ImAdapterInfo {
            name: name.to_string(),
            factory,
            localized_name: localized_name.map(str::to_string),
            localized_description: None,
        })
    }

    pub fn unregister(&self, name: &str) -> Result<(), ChatflowError> {
        self.adapters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ChatflowError::not_found("im adapter", name))
    }

    pub fn get(&self, name: &str) -> Result<ImAdapterInfo, ChatflowError> {
        self.adapters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| ChatflowError::not_found("im adapter", name))
    }

    pub fn get_all_adapters(&self) -> Vec<ImAdapterInfo> {
        self.adapters
            .read()
            .map(|a| a.values().cloned().collect())
            .unwrap_or_default()
    }
}
