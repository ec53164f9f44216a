// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin discovery, lifecycle, and package management.
//!
//! Internal plugins live as subdirectories of the internal plugin directory;
//! the directory name is the catalog key. External plugins come from
//! installed packages whose `plugin.toml` declares entry points in the
//! `chatflow.plugins` group. Hook failures are logged per plugin and never
//! stop the others.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chatflow_bus::{EventBus, PluginLoaded, PluginStarted, PluginStopped};
use chatflow_config::SharedConfig;
use chatflow_core::ChatflowError;
use chatflow_ioc::Container;
use tracing::{debug, error, info, warn};

use crate::catalog::PluginCatalog;
use crate::event_bus::PluginEventBus;
use crate::manifest::read_manifest;
use crate::package::{CommandPackageManager, PackageManager};
use crate::plugin::{Plugin, PluginFactory, PluginInfo};

#[derive(Clone)]
struct LoadedPlugin {
    plugin: Arc<dyn Plugin>,
    events: Arc<PluginEventBus>,
}

#[derive(Default)]
struct State {
    plugins: BTreeMap<String, LoadedPlugin>,
    infos: BTreeMap<String, PluginInfo>,
    internal: BTreeSet<String>,
    /// External plugin name to catalog key.
    entry_points: BTreeMap<String, String>,
}

pub struct PluginLoader {
    container: Arc<Container>,
    config: SharedConfig,
    catalog: Arc<PluginCatalog>,
    package_manager: Arc<dyn PackageManager>,
    internal_dir: PathBuf,
    packages_dir: PathBuf,
    state: Mutex<State>,
}

impl PluginLoader {
    pub fn new(
        container: Arc<Container>,
        config: SharedConfig,
        catalog: Arc<PluginCatalog>,
        internal_dir: impl Into<PathBuf>,
        packages_dir: impl Into<PathBuf>,
    ) -> Self {
        let packages_dir = packages_dir.into();
        let package_manager = Arc::new(CommandPackageManager::from_config(
            &config.load().update,
            packages_dir.clone(),
        ));
        Self {
            container,
            config,
            catalog,
            package_manager,
            internal_dir: internal_dir.into(),
            packages_dir,
            state: Mutex::new(State::default()),
        }
    }

    pub fn with_package_manager(mut self, package_manager: Arc<dyn PackageManager>) -> Self {
        self.package_manager = package_manager;
        self
    }

    pub fn catalog(&self) -> &Arc<PluginCatalog> {
        &self.catalog
    }

    pub fn packages_dir(&self) -> &Path {
        &self.packages_dir
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bus(&self) -> Option<Arc<EventBus>> {
        self.container.try_resolve::<Arc<EventBus>>()
    }

    /// Build a plugin in its own scope with a fresh [`PluginEventBus`].
    fn instantiate(&self, name: &str, factory: &PluginFactory) -> Result<LoadedPlugin, ChatflowError> {
        let bus = self.bus().unwrap_or_else(|| {
            warn!(plugin = %name, "no event bus bound, plugin events stay local");
            Arc::new(EventBus::new())
        });
        let events = Arc::new(PluginEventBus::new(bus));
        let scope = self.container.scoped();
        scope.register(Arc::clone(&events));
        let plugin = factory(&scope).map_err(|e| ChatflowError::PluginLoadFailed {
            name: name.to_string(),
            message: e.to_string(),
        })?;
        debug!(plugin = %name, "plugin instantiated");
        Ok(LoadedPlugin { plugin, events })
    }

    fn factory_for(&self, key: &str, plugin: &str) -> Result<PluginFactory, ChatflowError> {
        self.catalog
            .get(key)
            .map(|entry| entry.factory)
            .map_err(|_| ChatflowError::PluginLoadFailed {
                name: plugin.to_string(),
                message: format!("no compiled-in plugin named `{key}`"),
            })
    }

    /// Register a plugin directly, bypassing discovery. `author`,
    /// `version`, and `description` strings in the plugin's metadata
    /// override the internal defaults.
    pub fn register_plugin(
        &self,
        name: &str,
        factory: PluginFactory,
    ) -> Result<Arc<dyn Plugin>, ChatflowError> {
        let loaded = self.instantiate(name, &factory)?;
        let plugin = Arc::clone(&loaded.plugin);
        let metadata = plugin.metadata();
        let field = |key: &str| {
            metadata
                .as_ref()
                .and_then(|m| m.get(key))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        let mut info = PluginInfo::internal(name, field("description").unwrap_or_default());
        if let Some(author) = field("author") {
            info.author = author;
        }
        if let Some(version) = field("version") {
            info.version = version;
        }
        info.metadata = metadata;
        let mut state = self.lock();
        state.internal.insert(name.to_string());
        state.infos.insert(name.to_string(), info);
        state.plugins.insert(name.to_string(), loaded);
        info!(plugin = %name, "registered plugin");
        Ok(plugin)
    }

    /// Load every subdirectory of the internal plugin directory.
    pub fn discover_internal_plugins(&self) -> Result<usize, ChatflowError> {
        info!(dir = %self.internal_dir.display(), "discovering internal plugins");
        if !self.internal_dir.is_dir() {
            return Ok(0);
        }
        let mut dirs: Vec<PathBuf> = std::fs::read_dir(&self.internal_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();

        let mut loaded = 0;
        for dir in dirs {
            let Some(name) = dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            self.lock().internal.insert(name.clone());
            match self.load_internal(&name, &dir) {
                Ok(()) => loaded += 1,
                Err(e) => error!(plugin = %name, error = %e, "failed to load plugin"),
            }
        }
        Ok(loaded)
    }

    fn load_internal(&self, name: &str, dir: &Path) -> Result<(), ChatflowError> {
        let manifest = read_manifest(dir)?;
        let entry = self.catalog.get(name).map_err(|_| ChatflowError::PluginLoadFailed {
            name: name.to_string(),
            message: format!("no compiled-in plugin named `{name}`"),
        })?;
        let loaded = self.instantiate(name, &entry.factory)?;

        let description = manifest.map_or(entry.description, |m| m.description);
        let metadata = loaded.plugin.metadata();

        let mut state = self.lock();
        let info = state
            .infos
            .entry(name.to_string())
            .or_insert_with(|| PluginInfo::internal(name, description));
        info.metadata = metadata;
        state.plugins.insert(name.to_string(), loaded);
        info!(plugin = %name, "internal plugin loaded");
        Ok(())
    }

    /// Record every installed package's plugins and load the enabled ones.
    pub fn discover_external_plugins(&self) -> Result<usize, ChatflowError> {
        info!(dir = %self.packages_dir.display(), "discovering external plugins");
        if !self.packages_dir.is_dir() {
            return Ok(0);
        }
        let enabled: BTreeSet<String> = self.config.load().plugins.enable.iter().cloned().collect();
        let mut packages: Vec<PathBuf> = std::fs::read_dir(&self.packages_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .collect();
        packages.sort();

        let mut found = 0;
        for package_dir in packages {
            let manifest = match read_manifest(&package_dir) {
                Ok(Some(m)) => m,
                Ok(None) => continue,
                Err(e) => {
                    error!(package = %package_dir.display(), error = %e, "invalid plugin manifest");
                    continue;
                }
            };
            for (name, key) in manifest.plugin_entry_points() {
                let is_enabled = enabled.contains(name);
                {
                    let mut state = self.lock();
                    state.entry_points.insert(name.to_string(), key.to_string());
                    let requires_restart = state.infos.get(name).is_some_and(|i| i.requires_restart);
                    state.infos.insert(
                        name.to_string(),
                        PluginInfo {
                            name: name.to_string(),
                            package_name: Some(manifest.name.clone()),
                            description: manifest.description.clone(),
                            version: manifest.version.clone(),
                            author: manifest.author.clone().unwrap_or_else(|| "Unknown".to_string()),
                            is_internal: false,
                            is_enabled,
                            requires_restart,
                            metadata: None,
                        },
                    );
                }
                found += 1;
                if is_enabled && !self.is_loaded(name) {
                    if let Err(e) = self.load_external(name) {
                        error!(plugin = %name, error = %e, "failed to load external plugin");
                    }
                }
            }
        }
        Ok(found)
    }

    fn load_external(&self, name: &str) -> Result<Arc<dyn Plugin>, ChatflowError> {
        let key = self
            .lock()
            .entry_points
            .get(name)
            .cloned()
            .ok_or_else(|| ChatflowError::PluginLoadFailed {
                name: name.to_string(),
                message: "no entry point found".to_string(),
            })?;
        let loaded = self.instantiate(name, &self.factory_for(&key, name)?)?;
        let plugin = Arc::clone(&loaded.plugin);
        let mut state = self.lock();
        if let Some(info) = state.infos.get_mut(name) {
            info.metadata = plugin.metadata();
        }
        state.plugins.insert(name.to_string(), loaded);
        info!(plugin = %name, "external plugin loaded");
        Ok(plugin)
    }

    /// Load one plugin by name, internal or external. Errors are logged.
    pub fn load_plugin(&self, name: &str) {
        let result = if self.is_internal(name) {
            self.load_internal(name, &self.internal_dir.join(name))
        } else {
            self.load_external(name).map(|_| ())
        };
        if let Err(e) = result {
            error!(plugin = %name, error = %e, "failed to load plugin");
        }
    }

    fn loaded(&self) -> Vec<(String, LoadedPlugin)> {
        self.lock()
            .plugins
            .iter()
            .map(|(name, p)| (name.clone(), p.clone()))
            .collect()
    }

    /// Call `on_load` on every loaded plugin.
    pub fn load_plugins(&self) {
        info!("initializing plugins");
        for (name, loaded) in self.loaded() {
            match loaded.plugin.on_load() {
                Ok(()) => {
                    info!(plugin = %name, "plugin initialized");
                    if let Some(bus) = self.bus() {
                        bus.post(PluginLoaded { name });
                    }
                }
                Err(e) => error!(plugin = %name, error = %e, "failed to initialize plugin"),
            }
        }
    }

    /// Call `on_start` on every loaded plugin.
    pub fn start_plugins(&self) {
        info!("starting plugins");
        for (name, loaded) in self.loaded() {
            match loaded.plugin.on_start() {
                Ok(()) => {
                    info!(plugin = %name, "plugin started");
                    if let Some(bus) = self.bus() {
                        bus.post(PluginStarted { name });
                    }
                }
                Err(e) => error!(plugin = %name, error = %e, "failed to start plugin"),
            }
        }
    }

    /// Call `on_stop` on every loaded plugin and drop its listeners.
    pub fn stop_plugins(&self) {
        info!("stopping plugins");
        for (name, loaded) in self.loaded() {
            let result = loaded.plugin.on_stop();
            loaded.events.unregister_all();
            match result {
                Ok(()) => {
                    info!(plugin = %name, "plugin stopped");
                    if let Some(bus) = self.bus() {
                        bus.post(PluginStopped { name });
                    }
                }
                Err(e) => error!(plugin = %name, error = %e, "failed to stop plugin"),
            }
        }
    }

    pub fn get_plugin(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.lock().plugins.get(name).map(|p| Arc::clone(&p.plugin))
    }

    pub fn get_plugin_info(&self, name: &str) -> Option<PluginInfo> {
        self.lock().infos.get(name).cloned()
    }

    pub fn get_all_plugin_infos(&self) -> Vec<PluginInfo> {
        self.lock().infos.values().cloned().collect()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.lock().plugins.contains_key(name)
    }

    fn is_internal(&self, name: &str) -> bool {
        self.lock().internal.contains(name)
    }

    fn set_info(&self, name: &str, update: impl FnOnce(&mut PluginInfo)) {
        if let Some(info) = self.lock().infos.get_mut(name) {
            update(info);
        }
    }

    fn update_enable_list(&self, name: &str, enabled: bool) {
        let mut next = (*self.config.load_full()).clone();
        let list = &mut next.plugins.enable;
        let present = list.iter().any(|n| n == name);
        match (enabled, present) {
            (true, false) => list.push(name.to_string()),
            (false, true) => list.retain(|n| n != name),
            _ => return,
        }
        self.config.store(Arc::new(next));
    }

    /// Load, initialize, and start a plugin, and add it to `plugins.enable`.
    ///
    /// Returns `Ok(false)` when a hook fails; the plugin is then flagged as
    /// requiring a restart.
    pub fn enable_plugin(&self, name: &str) -> Result<bool, ChatflowError> {
        let info = self
            .get_plugin_info(name)
            .ok_or_else(|| ChatflowError::not_found("plugin", name))?;
        if info.is_enabled {
            return Ok(true);
        }

        let result = (|| {
            let plugin = if info.is_internal {
                self.load_internal(name, &self.internal_dir.join(name))?;
                self.get_plugin(name)
                    .ok_or_else(|| ChatflowError::not_found("plugin", name))?
            } else {
                self.load_external(name)?
            };
            self.update_enable_list(name, true);
            plugin.on_load()?;
            plugin.on_start()
        })();

        match result {
            Ok(()) => {
                self.set_info(name, |i| i.is_enabled = true);
                info!(plugin = %name, "plugin enabled");
                Ok(true)
            }
            Err(e) => {
                self.lock().plugins.remove(name);
                self.set_info(name, |i| i.requires_restart = true);
                error!(plugin = %name, error = %e, "failed to enable plugin");
                Ok(false)
            }
        }
    }

    /// Stop a plugin and remove it from `plugins.enable`.
    ///
    /// A failing `on_stop` flags the plugin as requiring a restart; the
    /// plugin is still reported as disabled.
    pub fn disable_plugin(&self, name: &str) -> Result<bool, ChatflowError> {
        let info = self
            .get_plugin_info(name)
            .ok_or_else(|| ChatflowError::not_found("plugin", name))?;
        if !info.is_enabled {
            return Ok(true);
        }

        let loaded = self.lock().plugins.remove(name);
        if let Some(loaded) = loaded {
            let result = loaded.plugin.on_stop();
            loaded.events.unregister_all();
            if let Err(e) = result {
                warn!(plugin = %name, error = %e, "plugin failed to stop, restart required");
                self.set_info(name, |i| i.requires_restart = true);
            } else if let Some(bus) = self.bus() {
                bus.post(PluginStopped {
                    name: name.to_string(),
                });
            }
        }
        self.update_enable_list(name, false);
        self.set_info(name, |i| i.is_enabled = false);
        info!(plugin = %name, "plugin disabled");
        Ok(true)
    }

    /// Install a package and return the info of the first plugin it provides.
    pub async fn install_plugin(
        &self,
        package: &str,
        version: Option<&str>,
    ) -> Result<Option<PluginInfo>, ChatflowError> {
        let output = self.package_manager.install(package, version).await?;
        info!(package = %package, output = %output.trim(), "plugin package installed");
        self.discover_external_plugins()?;
        Ok(self.find_by_package(package))
    }

    fn find_by_package(&self, package: &str) -> Option<PluginInfo> {
        self.lock()
            .infos
            .values()
            .find(|i| i.package_name.as_deref() == Some(package))
            .cloned()
    }

    /// Disable a plugin and remove its package. `Ok(false)` for unknown
    /// plugins; internal plugins cannot be uninstalled.
    pub async fn uninstall_plugin(&self, name: &str) -> Result<bool, ChatflowError> {
        let Some(info) = self.get_plugin_info(name) else {
            return Ok(false);
        };
        if info.is_internal {
            return Err(ChatflowError::Config(format!(
                "cannot uninstall internal plugin `{name}`"
            )));
        }
        let package = info.package_name.clone().unwrap_or_else(|| name.to_string());

        self.disable_plugin(name)?;
        let output = self.package_manager.uninstall(&package).await?;
        info!(package = %package, output = %output.trim(), "plugin package removed");

        let mut state = self.lock();
        state.infos.remove(name);
        state.entry_points.remove(name);
        Ok(true)
    }

    /// Upgrade the package of an external plugin.
    ///
    /// Fails when the installed version did not change.
    pub async fn update_plugin(&self, name: &str) -> Result<Option<PluginInfo>, ChatflowError> {
        let Some(info) = self.get_plugin_info(name) else {
            return Ok(None);
        };
        if info.is_internal {
            return Err(ChatflowError::Config(format!(
                "cannot update internal plugin `{name}`"
            )));
        }
        let package = info.package_name.clone().unwrap_or_else(|| name.to_string());
        let old_version = info.version.clone();

        self.disable_plugin(name)?;
        let output = self.package_manager.upgrade(&package).await?;
        info!(package = %package, output = %output.trim(), "plugin package upgraded");
        self.discover_external_plugins()?;

        match self.find_by_package(&package) {
            Some(updated) if updated.version == old_version => Err(ChatflowError::Config(format!(
                "plugin package `{package}` is already up to date ({old_version})"
            ))),
            other => Ok(other),
        }
    }
}

impl std::fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("PluginLoader")
            .field("plugins", &state.plugins.keys().collect::<Vec<_>>())
            .field("known", &state.infos.len())
            .finish()
    }
}
