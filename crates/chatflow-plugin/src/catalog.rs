// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Catalog of plugin factories compiled into the binary.
//!
//! Discovery never loads code: internal plugin directories and installed
//! package entry points name a catalog key, and the loader builds the
//! plugin from the factory registered under it.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use chatflow_core::ChatflowError;
use chatflow_ioc::Container;
use tracing::debug;

use crate::plugin::{Plugin, PluginFactory};

#[derive(Clone)]
pub struct CatalogEntry {
    pub key: String,
    pub description: String,
    pub factory: PluginFactory,
}

impl std::fmt::Debug for CatalogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogEntry")
            .field("key", &self.key)
            .field("description", &self.description)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct PluginCatalog {
    entries: RwLock<BTreeMap<String, CatalogEntry>>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, key: &str, description: &str, factory: F) -> Result<(), ChatflowError>
    where
        F: Fn(&Arc<Container>) -> Result<Arc<dyn Plugin>, ChatflowError> + Send + Sync + 'static,
    {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(key) {
            return Err(ChatflowError::already_registered("plugin factory", key));
        }
        entries.insert(
            key.to_string(),
            CatalogEntry {
                key: key.to_string(),
                description: description.to_string(),
                factory: Arc::new(factory),
            },
        );
        debug!(plugin = key, "plugin factory registered");
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<CatalogEntry, ChatflowError> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| ChatflowError::not_found("plugin factory", key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .map(|e| e.contains_key(key))
            .unwrap_or_default()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries
            .read()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Entries whose key or description contains `query`, ignoring case.
    /// An empty query returns everything.
    pub fn search(&self, query: &str) -> Vec<CatalogEntry> {
        let query = query.to_lowercase();
        self.entries
            .read()
            .map(|e| {
                e.values()
                    .filter(|entry| {
                        query.is_empty()
                            || entry.key.to_lowercase().contains(&query)
                            || entry.description.to_lowercase().contains(&query)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl Plugin for Noop {
        fn on_load(&self) -> Result<(), ChatflowError> {
            Ok(())
        }
        fn on_start(&self) -> Result<(), ChatflowError> {
            Ok(())
        }
        fn on_stop(&self) -> Result<(), ChatflowError> {
            Ok(())
        }
    }

    fn catalog() -> PluginCatalog {
        let catalog = PluginCatalog::new();
        catalog
            .register("weather", "Weather lookups", |_| Ok(Arc::new(Noop) as Arc<dyn Plugin>))
            .unwrap();
        catalog
            .register("dice", "Roll dice in chat", |_| Ok(Arc::new(Noop) as Arc<dyn Plugin>))
            .unwrap();
        catalog
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let catalog = catalog();
        assert!(catalog.register("dice", "", |_| Ok(Arc::new(Noop) as Arc<dyn Plugin>)).is_err());
    }

    #[test]
    fn search_is_case_insensitive_over_key_and_description() {
        let catalog = catalog();
        assert_eq!(catalog.search("WEATHER").len(), 1);
        assert_eq!(catalog.search("chat")[0].key, "dice");
        assert_eq!(catalog.search("").len(), 2);
        assert!(catalog.search("xyz").is_empty());
    }

    #[test]
    fn factories_build_plugins() {
        let catalog = catalog();
        let entry = catalog.get("dice").unwrap();
        assert!((entry.factory)(&Container::new()).is_ok());
        assert!(catalog.get("nope").unwrap_err().is_not_found());
    }
}
