// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Named registries of scopes, composers and decomposers.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use chatflow_core::ChatflowError;
use tracing::debug;

use crate::compose::{
    DefaultMemoryComposer, DefaultMemoryDecomposer, MemoryComposer, MemoryDecomposer,
};
use crate::scope::{GlobalScope, GroupScope, MemberScope, MemoryScope};

/// Name of the built-in composer and decomposer.
pub const DEFAULT: &str = "default";

/// A name-keyed set of shared trait objects.
pub struct NamedRegistry<T: ?Sized> {
    kind: &'static str,
    items: RwLock<BTreeMap<String, Arc<T>>>,
}

impl<T: ?Sized + Send + Sync> NamedRegistry<T> {
    fn empty(kind: &'static str) -> Self {
        Self {
            kind,
            items: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register under `name`. Fails if the name is taken.
    pub fn register(&self, name: &str, item: Arc<T>) -> Result<(), ChatflowError> {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        if items.contains_key(name) {
            return Err(ChatflowError::already_registered(self.kind, name));
        }
        items.insert(name.to_string(), item);
        debug!(kind = self.kind, name, "memory component registered");
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> Result<Arc<T>, ChatflowError> {
        self.items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .ok_or_else(|| ChatflowError::not_found(self.kind, name))
    }

    pub fn get(&self, name: &str) -> Result<Arc<T>, ChatflowError> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| ChatflowError::not_found(self.kind, name))
    }

    pub fn names(&self) -> Vec<String> {
        self.items
            .read()
            .map(|items| items.keys().cloned().collect())
            .unwrap_or_default()
    }
}

pub type ScopeRegistry = NamedRegistry<dyn MemoryScope>;
pub type ComposerRegistry = NamedRegistry<dyn MemoryComposer>;
pub type DecomposerRegistry = NamedRegistry<dyn MemoryDecomposer>;

impl NamedRegistry<dyn MemoryScope> {
    /// Registry holding `member`, `group` and `global`.
    pub fn with_builtins() -> Self {
        let registry = Self::empty("memory scope");
        let builtins: [Arc<dyn MemoryScope>; 3] =
            [Arc::new(MemberScope), Arc::new(GroupScope), Arc::new(GlobalScope)];
        let mut items = registry.items.write().unwrap_or_else(PoisonError::into_inner);
        for scope in builtins {
            items.insert(scope.name().to_string(), scope);
        }
        drop(items);
        registry
    }
}

impl NamedRegistry<dyn MemoryComposer> {
    pub fn with_builtins() -> Self {
        let registry = Self::empty("memory composer");
        registry
            .items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(DEFAULT.to_string(), Arc::new(DefaultMemoryComposer));
        registry
    }
}

impl NamedRegistry<dyn MemoryDecomposer> {
    pub fn with_builtins() -> Self {
        let registry = Self::empty("memory decomposer");
        registry
            .items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(DEFAULT.to_string(), Arc::new(DefaultMemoryDecomposer::default()));
        registry
    }
}

impl<T: ?Sized + Send + Sync> std::fmt::Debug for NamedRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedRegistry")
            .field("kind", &self.kind)
            .field("items", &self.names())
            .finish()
    }
}
