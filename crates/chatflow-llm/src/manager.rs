// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Loaded LLM backends and model routing.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use chatflow_bus::{EventBus, LLMAdapterLoaded, LLMAdapterUnloaded};
use chatflow_config::SharedConfig;
use chatflow_core::{ChatflowError, LlmAbility, LlmBackendAdapter};
use chatflow_ioc::Container;
use rand::seq::SliceRandom;
use tracing::{error, info, warn};

use crate::registry::LlmBackendRegistry;
use crate::selector::{BackendSelector, Candidate, RandomSelector};

struct LoadedBackend {
    ability: LlmAbility,
    adapter: Arc<dyn LlmBackendAdapter>,
}

#[derive(Default)]
struct State {
    backends: BTreeMap<String, LoadedBackend>,
    /// Model name to every backend serving it, in load order.
    active: BTreeMap<String, Vec<Candidate>>,
}

/// Tracks loaded backends and routes model names to them.
pub struct LlmManager {
    container: Arc<Container>,
    config: SharedConfig,
    registry: Arc<LlmBackendRegistry>,
    selector: Arc<dyn BackendSelector>,
    state: RwLock<State>,
}

impl LlmManager {
    pub fn new(
        container: Arc<Container>,
        config: SharedConfig,
        registry: Arc<LlmBackendRegistry>,
    ) -> Self {
        Self {
            container,
            config,
            registry,
            selector: Arc::new(RandomSelector),
            state: RwLock::new(State::default()),
        }
    }

    pub fn with_selector(mut self, selector: Arc<dyn BackendSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn registry(&self) -> &Arc<LlmBackendRegistry> {
        &self.registry
    }

    /// Load every enabled backend in the config. Failures are logged and
    /// skipped. Returns the number loaded.
    pub fn load_config(&self) -> usize {
        let names: Vec<String> = self
            .config
            .load()
            .llms
            .api_backends
            .iter()
            .filter(|b| b.enable)
            .map(|b| b.name.clone())
            .collect();

        let mut loaded = 0;
        for name in names {
            match self.load_backend(&name) {
                Ok(()) => loaded += 1,
                Err(e) => error!(backend = %name, error = %e, "failed to load llm backend"),
            }
        }
        loaded
    }

    /// Instantiate the backend named `name` in a fresh scope and register
    /// it under each of its models.
    pub fn load_backend(&self, name: &str) -> Result<(), ChatflowError> {
        let backend = self
            .config
            .load()
            .backend(name)
            .cloned()
            .ok_or_else(|| ChatflowError::not_found("llm backend", name))?;
        let failed = |message: String| ChatflowError::BackendLoadFailed {
            name: name.to_string(),
            message,
        };
        if !backend.enable {
            return Err(failed("backend is not enabled".into()));
        }
        if self.is_loaded(name) {
            return Err(ChatflowError::already_registered("llm backend", name));
        }

        let backend_type = self
            .registry
            .get(&backend.adapter)
            .map_err(|_| failed(format!("unknown adapter type `{}`", backend.adapter)))?;
        let scope = self.container.scoped();
        let adapter =
            (backend_type.factory)(&backend.config, &scope).map_err(|e| failed(e.to_string()))?;

        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if state.backends.contains_key(name) {
                return Err(ChatflowError::already_registered("llm backend", name));
            }
            for model in &backend.models {
                state.active.entry(model.clone()).or_default().push(Candidate {
                    backend: name.to_string(),
                    adapter: Arc::clone(&adapter),
                });
            }
            state.backends.insert(
                name.to_string(),
                LoadedBackend {
                    ability: backend_type.ability,
                    adapter: Arc::clone(&adapter),
                },
            );
        }

        info!(backend = %name, adapter_type = %backend.adapter, models = ?backend.models, "llm backend loaded");
        if let Some(bus) = self.container.try_resolve::<Arc<EventBus>>() {
            bus.post(LLMAdapterLoaded {
                backend: name.to_string(),
                adapter,
            });
        }
        Ok(())
    }

    /// Remove a loaded backend from every model it served.
    pub fn unload_backend(&self, name: &str) -> Result<(), ChatflowError> {
        let removed = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let removed = state
                .backends
                .remove(name)
                .ok_or_else(|| ChatflowError::not_found("llm backend", name))?;
            state.active.retain(|_, candidates| {
                candidates.retain(|c| c.backend != name);
                !candidates.is_empty()
            });
            removed
        };

        info!(backend = %name, "llm backend unloaded");
        if let Some(bus) = self.container.try_resolve::<Arc<EventBus>>() {
            bus.post(LLMAdapterUnloaded {
                backend: name.to_string(),
                adapter: removed.adapter,
            });
        }
        Ok(())
    }

    /// Unload (if loaded) and load again with the current config.
    pub fn reload_backend(&self, name: &str) -> Result<(), ChatflowError> {
        if self.is_loaded(name) {
            self.unload_backend(name)?;
        } else {
            warn!(backend = %name, "reloading a backend that was not loaded");
        }
        self.load_backend(name)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.state
            .read()
            .map(|s| s.backends.contains_key(name))
            .unwrap_or_default()
    }

    /// Configured, enabled, and every declared model has a live backend.
    pub fn is_backend_available(&self, name: &str) -> bool {
        let config = self.config.load();
        let Some(backend) = config.backend(name) else {
            return false;
        };
        if !backend.enable {
            return false;
        }
        self.state
            .read()
            .map(|s| {
                backend
                    .models
                    .iter()
                    .all(|m| s.active.get(m).is_some_and(|c| !c.is_empty()))
            })
            .unwrap_or_default()
    }

    /// Adapter instance for a loaded backend.
    pub fn get(&self, name: &str) -> Option<Arc<dyn LlmBackendAdapter>> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.backends.get(name).map(|b| Arc::clone(&b.adapter)))
    }

    /// A backend serving `model`, chosen by the selection policy.
    pub fn get_llm(&self, model: &str) -> Option<Arc<dyn LlmBackendAdapter>> {
        let state = self.state.read().ok()?;
        let candidates = state.active.get(model)?;
        self.selector
            .select(model, candidates)
            .map(|c| Arc::clone(&c.adapter))
    }

    /// Models with at least one backend whose ability covers `ability`.
    pub fn get_supported_models(&self, ability: LlmAbility) -> Vec<String> {
        self.state
            .read()
            .map(|s| {
                s.active
                    .iter()
                    .filter(|(_, candidates)| {
                        candidates.iter().any(|c| {
                            s.backends
                                .get(&c.backend)
                                .is_some_and(|b| b.ability.contains(ability))
                        })
                    })
                    .map(|(model, _)| model.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Any model supporting `ability`, chosen uniformly.
    pub fn get_llm_id_by_ability(&self, ability: LlmAbility) -> Option<String> {
        self.get_supported_models(ability)
            .choose(&mut rand::thread_rng())
            .cloned()
    }

    pub fn loaded_backends(&self) -> Vec<String> {
        self.state
            .read()
            .map(|s| s.backends.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Models with a live backend, sorted.
    pub fn active_models(&self) -> Vec<String> {
        self.state
            .read()
            .map(|s| s.active.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for LlmManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmManager")
            .field("backends", &self.loaded_backends())
            .field("models", &self.active_models())
            .finish()
    }
}
