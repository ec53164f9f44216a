// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! IM adapter lifecycle: create, start, stop, and track running state.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chatflow_bus::{EventBus, IMAdapterStarted, IMAdapterStopped};
use chatflow_config::SharedConfig;
use chatflow_config::model::{AdapterSettings, ImConfig};
use chatflow_core::{ChatflowError, ImAdapter};
use chatflow_ioc::Container;
use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::registry::ImRegistry;

#[derive(Clone)]
struct ManagedAdapter {
    adapter: Arc<dyn ImAdapter>,
    running: Arc<AtomicBool>,
    /// Serializes start and stop of this adapter.
    lifecycle: Arc<Mutex<()>>,
}

/// Owns every instantiated IM adapter by configured name.
pub struct ImManager {
    container: Arc<Container>,
    config: SharedConfig,
    registry: Arc<ImRegistry>,
    adapters: RwLock<BTreeMap<String, ManagedAdapter>>,
}

impl ImManager {
    pub fn new(container: Arc<Container>, config: SharedConfig, registry: Arc<ImRegistry>) -> Self {
        Self {
            container,
            config,
            registry,
            adapters: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ImRegistry> {
        &self.registry
    }

    pub fn get_adapter_config(&self, name: &str) -> Result<ImConfig, ChatflowError> {
        self.config
            .load()
            .im(name)
            .cloned()
            .ok_or_else(|| ChatflowError::not_found("im adapter", name))
    }

    pub fn get_adapter_type(&self, name: &str) -> Result<String, ChatflowError> {
        self.get_adapter_config(name).map(|c| c.adapter)
    }

    /// Replace the settings of a configured adapter. Takes effect on the
    /// next [`create_adapter`](Self::create_adapter).
    pub fn update_adapter_config(
        &self,
        name: &str,
        settings: AdapterSettings,
    ) -> Result<(), ChatflowError> {
        let mut next = (*self.config.load_full()).clone();
        let im = next
            .ims
            .iter_mut()
            .find(|im| im.name == name)
            .ok_or_else(|| ChatflowError::not_found("im adapter", name))?;
        im.config = settings;
        self.config.store(Arc::new(next));
        Ok(())
    }

    /// Stop (if running) and forget an adapter, and drop it from the config.
    pub async fn delete_adapter(&self, name: &str) -> Result<(), ChatflowError> {
        if self.is_adapter_running(name) {
            self.stop_adapter(name).await?;
        }
        self.adapters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        let mut next = (*self.config.load_full()).clone();
        next.ims.retain(|im| im.name != name);
        self.config.store(Arc::new(next));
        info!(adapter = %name, "adapter deleted");
        Ok(())
    }

    /// Instantiate the configured adapter `name` in a fresh scope.
    ///
    /// A previous instance under the same name is stopped first if it is
    /// running. The replacement shares its lifecycle lock, so start and
    /// stop stay serialized across the swap.
    pub async fn create_adapter(&self, name: &str) -> Result<Arc<dyn ImAdapter>, ChatflowError> {
        let im = self.get_adapter_config(name)?;
        let info = self.registry.get(&im.adapter)?;
        let scope = self.container.scoped();
        scope.register(im.clone());
        let adapter = (info.factory)(&im.config, &scope)?;

        let previous = self.managed(name).ok();
        let lifecycle = previous
            .as_ref()
            .map(|p| Arc::clone(&p.lifecycle))
            .unwrap_or_default();
        let _guard = lifecycle.lock().await;
        if let Some(previous) = previous.filter(|p| p.running.load(Ordering::SeqCst)) {
            info!(adapter = %name, "stopping the instance being replaced");
            if let Err(e) = self.stop_locked(name, &previous).await {
                warn!(adapter = %name, error = %e, "replaced adapter did not stop cleanly");
            }
        }

        let managed = ManagedAdapter {
            adapter: Arc::clone(&adapter),
            running: Arc::new(AtomicBool::new(false)),
            lifecycle: Arc::clone(&lifecycle),
        };
        self.adapters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), managed);
        Ok(adapter)
    }

    fn managed(&self, name: &str) -> Result<ManagedAdapter, ChatflowError> {
        self.adapters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| ChatflowError::not_found("im adapter", name))
    }

    /// Start one adapter. A failure leaves it marked not running.
    pub async fn start_adapter(&self, name: &str) -> Result<(), ChatflowError> {
        let managed = self.managed(name)?;
        let _guard = managed.lifecycle.lock().await;
        if managed.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        info!(adapter = %name, "starting adapter");
        if let Err(e) = Arc::clone(&managed.adapter).start().await {
            managed.running.store(false, Ordering::SeqCst);
            error!(adapter = %name, error = %e, "adapter failed to start");
            return Err(ChatflowError::AdapterStartFailed {
                name: name.to_string(),
                message: e.to_string(),
            });
        }
        managed.running.store(true, Ordering::SeqCst);
        info!(adapter = %name, "adapter started");

        if let Some(bus) = self.container.try_resolve::<Arc<EventBus>>() {
            bus.post(IMAdapterStarted {
                name: name.to_string(),
                adapter: Arc::clone(&managed.adapter),
            });
        }
        Ok(())
    }

    /// Stop one adapter. It is marked not running even if `stop` fails.
    pub async fn stop_adapter(&self, name: &str) -> Result<(), ChatflowError> {
        let managed = self.managed(name)?;
        let _guard = managed.lifecycle.lock().await;
        if !managed.running.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.stop_locked(name, &managed).await
    }

    /// Stop `managed`; the caller holds its lifecycle lock.
    async fn stop_locked(&self, name: &str, managed: &ManagedAdapter) -> Result<(), ChatflowError> {
        info!(adapter = %name, "stopping adapter");
        let result = managed.adapter.stop().await;
        managed.running.store(false, Ordering::SeqCst);
        if let Some(bus) = self.container.try_resolve::<Arc<EventBus>>() {
            bus.post(IMAdapterStopped {
                name: name.to_string(),
                adapter: Arc::clone(&managed.adapter),
            });
        }
        match result {
            Ok(()) => {
                info!(adapter = %name, "adapter stopped");
                Ok(())
            }
            Err(e) => {
                warn!(adapter = %name, error = %e, "adapter stop reported an error");
                Err(e)
            }
        }
    }

    /// Create every configured adapter that has no instance yet and start
    /// the enabled ones concurrently. Existing instances are reused, so a
    /// second call leaves running adapters alone. Failures are isolated per
    /// adapter and returned together.
    pub async fn start_adapters(&self) -> Vec<(String, ChatflowError)> {
        let ims: Vec<ImConfig> = self.config.load().ims.clone();
        let mut failures = Vec::new();
        let mut to_start = Vec::new();

        for im in &ims {
            let created = match self.get_adapter(&im.name) {
                Some(existing) => Ok(existing),
                None => self.create_adapter(&im.name).await,
            };
            match created {
                Ok(_) if im.enable => to_start.push(im.name.clone()),
                Ok(_) => {}
                Err(e) => {
                    error!(adapter = %im.name, error = %e, "failed to create adapter");
                    failures.push((im.name.clone(), e));
                }
            }
        }

        if to_start.is_empty() {
            warn!("no adapters to start, check the `ims` config");
            return failures;
        }

        let results = join_all(to_start.iter().map(|name| self.start_adapter(name))).await;
        for (name, result) in to_start.into_iter().zip(results) {
            if let Err(e) = result {
                failures.push((name, e));
            }
        }
        failures
    }

    /// Stop every running adapter. Errors are logged.
    pub async fn stop_adapters(&self) {
        for name in self.running_adapters() {
            if let Err(e) = self.stop_adapter(&name).await {
                error!(adapter = %name, error = %e, "failed to stop adapter");
            }
        }
    }

    pub fn has_adapter(&self, name: &str) -> bool {
        self.adapters
            .read()
            .map(|a| a.contains_key(name))
            .unwrap_or_default()
    }

    pub fn get_adapter(&self, name: &str) -> Option<Arc<dyn ImAdapter>> {
        self.managed(name).ok().map(|m| m.adapter)
    }

    /// Every instantiated adapter by name.
    pub fn get_adapters(&self) -> Vec<(String, Arc<dyn ImAdapter>)> {
        self.adapters
            .read()
            .map(|a| {
                a.iter()
                    .map(|(name, m)| (name.clone(), Arc::clone(&m.adapter)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_adapter_running(&self, name: &str) -> bool {
        self.managed(name)
            .map(|m| m.running.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    pub fn running_adapters(&self) -> Vec<String> {
        self.adapters
            .read()
            .map(|a| {
                a.iter()
                    .filter(|(_, m)| m.running.load(Ordering::SeqCst))
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for ImManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImManager")
            .field("running", &self.running_adapters())
            .finish()
    }
}
