// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Discovery, lifecycle, and package operations of the plugin loader.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chatflow_bus::{EventBus, PluginLoaded, PluginStarted};
use chatflow_config::{GlobalConfig, SharedConfig, shared};
use chatflow_core::ChatflowError;
use chatflow_ioc::Container;
use chatflow_plugin::{
    PackageManager, Plugin, PluginCatalog, PluginEventBus, PluginLoader,
};

#[derive(Debug, Default)]
struct Hooks {
    loads: AtomicUsize,
    starts: AtomicUsize,
    stops: AtomicUsize,
    fail_stop: AtomicBool,
}

struct Recorder {
    hooks: Arc<Hooks>,
    events: Arc<PluginEventBus>,
}

#[derive(Debug)]
struct Tick;

impl Plugin for Recorder {
    fn on_load(&self) -> Result<(), ChatflowError> {
        self.hooks.loads.fetch_add(1, Ordering::SeqCst);
        self.events.register::<Tick, _>(|_| Ok(()));
        Ok(())
    }

    fn on_start(&self) -> Result<(), ChatflowError> {
        self.hooks.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_stop(&self) -> Result<(), ChatflowError> {
        self.hooks.stops.fetch_add(1, Ordering::SeqCst);
        if self.hooks.fail_stop.load(Ordering::SeqCst) {
            return Err(ChatflowError::Internal("stuck".into()));
        }
        Ok(())
    }
}

fn register_recorder(catalog: &PluginCatalog, key: &str, hooks: &Arc<Hooks>) {
    let hooks = Arc::clone(hooks);
    catalog
        .register(key, "records hook calls", move |scope: &Arc<Container>| {
            Ok(Arc::new(Recorder {
                hooks: Arc::clone(&hooks),
                events: scope.resolve::<Arc<PluginEventBus>>()?,
            }) as Arc<dyn Plugin>)
        })
        .unwrap();
}

/// Writes and removes package manifests instead of running a real tool.
struct FakePackages {
    dir: PathBuf,
    version: Mutex<String>,
    calls: Mutex<Vec<String>>,
}

impl FakePackages {
    fn write(&self, package: &str) {
        let dir = self.dir.join(package);
        std::fs::create_dir_all(&dir).unwrap();
        let manifest = format!(
            "[plugin]\nname = \"{package}\"\nversion = \"{}\"\ndescription = \"fake\"\n\n[entry_points.\"chatflow.plugins\"]\nweather = \"weather\"\n",
            self.version.lock().unwrap()
        );
        std::fs::write(dir.join("plugin.toml"), manifest).unwrap();
    }
}

#[async_trait]
impl PackageManager for FakePackages {
    async fn install(&self, package: &str, _: Option<&str>) -> Result<String, ChatflowError> {
        self.calls.lock().unwrap().push(format!("install {package}"));
        self.write(package);
        Ok(String::new())
    }

    async fn uninstall(&self, package: &str) -> Result<String, ChatflowError> {
        self.calls.lock().unwrap().push(format!("uninstall {package}"));
        std::fs::remove_dir_all(self.dir.join(package)).map_err(ChatflowError::storage)?;
        Ok(String::new())
    }

    async fn upgrade(&self, package: &str) -> Result<String, ChatflowError> {
        self.calls.lock().unwrap().push(format!("upgrade {package}"));
        self.write(package);
        Ok(String::new())
    }
}

struct Setup {
    loader: PluginLoader,
    config: SharedConfig,
    bus: Arc<EventBus>,
    packages: Arc<FakePackages>,
    internal: Arc<Hooks>,
    external: Arc<Hooks>,
    _root: tempfile::TempDir,
}

fn setup(enabled: &[&str]) -> Setup {
    let root = tempfile::tempdir().unwrap();
    let internal_dir = root.path().join("plugins");
    let packages_dir = root.path().join("packages");
    std::fs::create_dir_all(internal_dir.join("greeter")).unwrap();
    std::fs::create_dir_all(&packages_dir).unwrap();

    let mut cfg = GlobalConfig::default();
    cfg.plugins.enable = enabled.iter().map(|s| s.to_string()).collect();
    let config = shared(cfg);

    let container = Container::new();
    let bus = Arc::new(EventBus::new());
    container.register(Arc::clone(&bus));

    let internal = Arc::new(Hooks::default());
    let external = Arc::new(Hooks::default());
    let catalog = Arc::new(PluginCatalog::new());
    register_recorder(&catalog, "greeter", &internal);
    register_recorder(&catalog, "weather", &external);

    let packages = Arc::new(FakePackages {
        dir: packages_dir.clone(),
        version: Mutex::new("1.0.0".into()),
        calls: Mutex::new(Vec::new()),
    });
    let loader = PluginLoader::new(container, config.clone(), catalog, internal_dir, packages_dir)
        .with_package_manager(Arc::clone(&packages) as Arc<dyn PackageManager>);

    Setup {
        loader,
        config,
        bus,
        packages,
        internal,
        external,
        _root: root,
    }
}

fn count(hooks: &Hooks) -> (usize, usize, usize) {
    (
        hooks.loads.load(Ordering::SeqCst),
        hooks.starts.load(Ordering::SeqCst),
        hooks.stops.load(Ordering::SeqCst),
    )
}

fn packages_dir(s: &Setup) -> &Path {
    s.loader.packages_dir()
}

#[test]
fn internal_plugins_are_discovered_with_fixed_metadata() {
    let s = setup(&[]);
    assert_eq!(s.loader.discover_internal_plugins().unwrap(), 1);
    let info = s.loader.get_plugin_info("greeter").unwrap();
    assert_eq!(info.version, "1.0.0");
    assert_eq!(info.author, "Internal");
    assert!(info.is_internal && info.is_enabled);
}

struct Described;

impl Plugin for Described {
    fn on_load(&self) -> Result<(), ChatflowError> {
        Ok(())
    }

    fn on_start(&self) -> Result<(), ChatflowError> {
        Ok(())
    }

    fn on_stop(&self) -> Result<(), ChatflowError> {
        Ok(())
    }

    fn metadata(&self) -> Option<serde_json::Map<String, serde_json::Value>> {
        match serde_json::json!({"author": "Ann", "description": "says hi"}) {
            serde_json::Value::Object(map) => Some(map),
            _ => None,
        }
    }
}

#[test]
fn registered_plugin_info_comes_from_its_metadata() {
    let s = setup(&[]);
    s.loader
        .register_plugin(
            "described",
            Arc::new(|_: &Arc<Container>| Ok::<_, ChatflowError>(Arc::new(Described) as Arc<dyn Plugin>)),
        )
        .unwrap();
    let info = s.loader.get_plugin_info("described").unwrap();
    assert_eq!(info.author, "Ann");
    assert_eq!(info.description, "says hi");
    assert_eq!(info.version, "1.0.0");
    assert_eq!(info.metadata.unwrap()["author"], "Ann");

    s.loader
        .register_plugin(
            "plain",
            Arc::new(|_: &Arc<Container>| {
                Ok::<_, ChatflowError>(Arc::new(Recorder {
                    hooks: Arc::new(Hooks::default()),
                    events: Arc::new(PluginEventBus::new(Arc::new(EventBus::new()))),
                }) as Arc<dyn Plugin>)
            }),
        )
        .unwrap();
    assert_eq!(s.loader.get_plugin_info("plain").unwrap().author, "Internal");
}

#[test]
fn unknown_internal_directory_is_skipped() {
    let s = setup(&[]);
    std::fs::create_dir_all(s._root.path().join("plugins").join("stranger")).unwrap();
    assert_eq!(s.loader.discover_internal_plugins().unwrap(), 1);
    assert!(s.loader.get_plugin_info("stranger").is_none());
}

#[test]
fn lifecycle_hooks_post_events_and_drop_listeners() {
    let s = setup(&[]);
    let loaded = Arc::new(AtomicUsize::new(0));
    let started = Arc::new(AtomicUsize::new(0));
    {
        let loaded = Arc::clone(&loaded);
        s.bus.register::<PluginLoaded, _>(move |_| {
            loaded.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let started = Arc::clone(&started);
        s.bus.register::<PluginStarted, _>(move |_| {
            started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    s.loader.discover_internal_plugins().unwrap();
    s.loader.load_plugins();
    s.loader.start_plugins();
    assert_eq!(count(&s.internal), (1, 1, 0));
    assert_eq!(loaded.load(Ordering::SeqCst), 1);
    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(s.bus.listener_count::<Tick>(), 1);

    s.loader.stop_plugins();
    assert_eq!(count(&s.internal), (1, 1, 1));
    assert_eq!(s.bus.listener_count::<Tick>(), 0);
}

#[test]
fn disable_then_enable_round_trips() {
    let s = setup(&[]);
    s.loader.discover_internal_plugins().unwrap();
    s.loader.load_plugins();

    assert!(s.loader.disable_plugin("greeter").unwrap());
    assert!(!s.loader.get_plugin_info("greeter").unwrap().is_enabled);
    assert!(!s.loader.is_loaded("greeter"));

    assert!(s.loader.enable_plugin("greeter").unwrap());
    assert!(s.loader.get_plugin_info("greeter").unwrap().is_enabled);
    assert_eq!(count(&s.internal), (2, 1, 1));
    assert!(s.config.load().plugins.enable.contains(&"greeter".to_string()));
}

#[test]
fn failing_stop_flags_restart_but_reports_success() {
    let s = setup(&[]);
    s.loader.discover_internal_plugins().unwrap();
    s.internal.fail_stop.store(true, Ordering::SeqCst);

    assert!(s.loader.disable_plugin("greeter").unwrap());
    let info = s.loader.get_plugin_info("greeter").unwrap();
    assert!(info.requires_restart);
    assert!(!info.is_enabled);
}

#[test]
fn unknown_plugin_cannot_be_toggled() {
    let s = setup(&[]);
    assert!(s.loader.enable_plugin("ghost").unwrap_err().is_not_found());
    assert!(s.loader.disable_plugin("ghost").unwrap_err().is_not_found());
}

#[test]
fn external_plugins_load_only_when_enabled() {
    let s = setup(&["weather"]);
    s.packages.write("chatflow-weather");
    assert_eq!(s.loader.discover_external_plugins().unwrap(), 1);
    let info = s.loader.get_plugin_info("weather").unwrap();
    assert_eq!(info.package_name.as_deref(), Some("chatflow-weather"));
    assert_eq!(info.author, "Unknown");
    assert!(info.is_enabled && !info.is_internal);
    assert!(s.loader.is_loaded("weather"));

    let off = setup(&[]);
    off.packages.write("chatflow-weather");
    off.loader.discover_external_plugins().unwrap();
    assert!(!off.loader.get_plugin_info("weather").unwrap().is_enabled);
    assert!(!off.loader.is_loaded("weather"));
}

#[tokio::test]
async fn install_uninstall_and_update() {
    let s = setup(&[]);
    let info = s
        .loader
        .install_plugin("chatflow-weather", Some("1.0.0"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(info.name, "weather");
    assert!(packages_dir(&s).join("chatflow-weather").is_dir());

    s.loader.enable_plugin("weather").unwrap();
    assert_eq!(count(&s.external), (1, 1, 0));

    let same = s.loader.update_plugin("weather").await;
    assert!(same.unwrap_err().to_string().contains("already up to date"));

    *s.packages.version.lock().unwrap() = "1.1.0".into();
    let updated = s.loader.update_plugin("weather").await.unwrap().unwrap();
    assert_eq!(updated.version, "1.1.0");

    assert!(s.loader.uninstall_plugin("weather").await.unwrap());
    assert!(s.loader.get_plugin_info("weather").is_none());
    assert!(!s.loader.uninstall_plugin("weather").await.unwrap());
    assert_eq!(
        *s.packages.calls.lock().unwrap(),
        [
            "install chatflow-weather",
            "upgrade chatflow-weather",
            "upgrade chatflow-weather",
            "uninstall chatflow-weather"
        ]
    );
}

#[tokio::test]
async fn internal_plugins_cannot_be_uninstalled_or_updated() {
    let s = setup(&[]);
    s.loader.discover_internal_plugins().unwrap();
    assert!(s.loader.uninstall_plugin("greeter").await.is_err());
    assert!(s.loader.update_plugin("greeter").await.is_err());
    assert!(s.packages.calls.lock().unwrap().is_empty());
}
