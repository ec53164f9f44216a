// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Application lifecycle: boot, start, and shutdown of every subsystem.
//!
//! Boot binds the event bus, registries, and managers in the root container,
//! discovers plugins, and loads workflows, dispatch rules, and LLM backends.
//! Start brings up the web server, plugins, and IM adapters. Shutdown runs
//! in reverse and flushes memory last.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chatflow_blocks::{register_builtin_blocks, register_system_workflows};
use chatflow_bus::{ApplicationStarted, ApplicationStopping, EventBus};
use chatflow_config::{DataPaths, GlobalConfig, SharedConfig, shared};
use chatflow_core::{ChatflowError, MessageHandler};
use chatflow_dispatch::{DispatchRuleRegistry, RuleTypeRegistry, WorkflowDispatcher};
use chatflow_im::{ImManager, ImRegistry};
use chatflow_ioc::Container;
use chatflow_llm::{LlmBackendRegistry, LlmManager};
use chatflow_memory::MemoryManager;
use chatflow_plugin::{PluginCatalog, PluginLoader};
use chatflow_workflow::{BlockRegistry, WorkflowRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::web::{WebServer, WebState};

/// A booted runtime.
pub struct Application {
    container: Arc<Container>,
    config: SharedConfig,
    paths: DataPaths,
    bus: Arc<EventBus>,
    im_registry: Arc<ImRegistry>,
    llm_registry: Arc<LlmBackendRegistry>,
    blocks: Arc<BlockRegistry>,
    workflows: Arc<WorkflowRegistry>,
    rules: Arc<DispatchRuleRegistry>,
    im_manager: Arc<ImManager>,
    llm_manager: Arc<LlmManager>,
    memory: Arc<MemoryManager>,
    dispatcher: Arc<WorkflowDispatcher>,
    plugins: Arc<PluginLoader>,
    restart: Arc<AtomicBool>,
    /// Cancelled when shutdown begins. Executors resolve it from the
    /// container, so running workflows stop with `Cancelled`.
    cancel: CancellationToken,
    web: Mutex<Option<WebServer>>,
    started_at: Instant,
}

impl Application {
    /// Boot every subsystem up to, but not including, serving.
    ///
    /// Plugins contribute through the registries bound in the container, so
    /// they are discovered and loaded before any workflow, rule, or backend
    /// is read from disk.
    pub fn boot(
        config: GlobalConfig,
        paths: DataPaths,
        catalog: Arc<PluginCatalog>,
    ) -> Result<Self, ChatflowError> {
        paths.ensure()?;
        let config = shared(config);

        let container = Container::new();
        container.register(config.clone());
        container.register(paths.clone());
        let bus = Arc::new(EventBus::new());
        container.register(Arc::clone(&bus));
        let cancel = CancellationToken::new();
        container.register(cancel.clone());

        let blocks = Arc::new(BlockRegistry::new());
        register_builtin_blocks(&blocks)?;
        container.register(Arc::clone(blocks.type_system()));
        container.register(Arc::clone(&blocks));
        let workflows = Arc::new(WorkflowRegistry::new(
            paths.workflows_dir(),
            Arc::clone(&blocks),
        ));
        container.register(Arc::clone(&workflows));
        let rule_types = Arc::new(RuleTypeRegistry::with_builtins());
        container.register(Arc::clone(&rule_types));
        let rules = Arc::new(DispatchRuleRegistry::new(rule_types));
        container.register(Arc::clone(&rules));
        let im_registry = Arc::new(ImRegistry::new());
        container.register(Arc::clone(&im_registry));
        let llm_registry = Arc::new(LlmBackendRegistry::new());
        container.register(Arc::clone(&llm_registry));

        let im_manager = Arc::new(ImManager::new(
            Arc::clone(&container),
            config.clone(),
            Arc::clone(&im_registry),
        ));
        container.register(Arc::clone(&im_manager));
        let llm_manager = Arc::new(LlmManager::new(
            Arc::clone(&container),
            config.clone(),
            Arc::clone(&llm_registry),
        ));
        container.register(Arc::clone(&llm_manager));

        let dispatcher = Arc::new(WorkflowDispatcher::new(Arc::clone(&container)));
        container.register(Arc::clone(&dispatcher));
        container.register(Arc::clone(&dispatcher) as Arc<dyn MessageHandler>);

        let memory = Arc::new(MemoryManager::from_config(config.clone())?);
        container.register(Arc::clone(&memory));

        let plugins = Arc::new(PluginLoader::new(
            Arc::clone(&container),
            config.clone(),
            catalog,
            paths.plugins_dir(),
            paths.root().join("packages"),
        ));
        container.register(Arc::clone(&plugins));
        if let Err(e) = plugins.discover_internal_plugins() {
            warn!(error = %e, "internal plugin discovery failed");
        }
        if let Err(e) = plugins.discover_external_plugins() {
            warn!(error = %e, "external plugin discovery failed");
        }
        plugins.load_plugins();

        workflows.load_workflows()?;
        register_system_workflows(&workflows);
        let rule_count = rules.load_rules(&paths.dispatch_rules_dir())?;
        let backend_count = llm_manager.load_config();
        info!(
            workflows = workflows.list().len(),
            rules = rule_count,
            backends = backend_count,
            "application booted"
        );

        Ok(Self {
            container,
            config,
            paths,
            bus,
            im_registry,
            llm_registry,
            blocks,
            workflows,
            rules,
            im_manager,
            llm_manager,
            memory,
            dispatcher,
            plugins,
            restart: Arc::new(AtomicBool::new(false)),
            cancel,
            web: Mutex::new(None),
            started_at: Instant::now(),
        })
    }

    /// Start serving: web server, plugins, then IM adapters.
    ///
    /// Adapter failures are logged and do not abort the start.
    pub async fn start(&self) -> Result<(), ChatflowError> {
        let (host, port) = {
            let config = self.config.load();
            (config.web.host.clone(), config.web.port)
        };
        let state = WebState {
            started_at: self.started_at,
            im_manager: Arc::clone(&self.im_manager),
            llm_manager: Arc::clone(&self.llm_manager),
            plugins: Arc::clone(&self.plugins),
        };
        let server = WebServer::start(&host, port, state).await?;
        *self.web.lock().unwrap_or_else(PoisonError::into_inner) = Some(server);

        self.plugins.start_plugins();

        for (name, e) in self.im_manager.start_adapters().await {
            error!(adapter = %name, error = %e, "adapter did not start");
        }

        self.bus.post(ApplicationStarted);
        info!("application started");
        Ok(())
    }

    /// Cancel running workflows, stop everything [`start`](Self::start)
    /// brought up, and flush memory.
    pub async fn shutdown(&self) {
        info!("shutting down");
        self.cancel.cancel();
        self.bus.post(ApplicationStopping);

        let web = self.web.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(web) = web {
            web.stop().await;
        }
        self.im_manager.stop_adapters().await;
        self.plugins.stop_plugins();
        if let Err(e) = self.memory.shutdown().await {
            error!(error = %e, "failed to flush memory");
        }
        info!("application stopped");
    }

    /// Start, wait for `cancel`, then shut down.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), ChatflowError> {
        if let Err(e) = self.start().await {
            self.shutdown().await;
            return Err(e);
        }
        cancel.cancelled().await;
        self.shutdown().await;
        Ok(())
    }

    /// Token cancelled at the start of [`shutdown`](Self::shutdown).
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Ask the supervisor to re-exec the process after shutdown.
    pub fn request_restart(&self) {
        self.restart.store(true, Ordering::SeqCst);
    }

    pub fn restart_requested(&self) -> bool {
        self.restart.load(Ordering::SeqCst)
    }

    /// Shared flag behind [`restart_requested`](Self::restart_requested).
    pub fn restart_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.restart)
    }

    pub fn web_addr(&self) -> Option<std::net::SocketAddr> {
        self.web
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(WebServer::local_addr)
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn im_registry(&self) -> &Arc<ImRegistry> {
        &self.im_registry
    }

    pub fn llm_registry(&self) -> &Arc<LlmBackendRegistry> {
        &self.llm_registry
    }

    pub fn blocks(&self) -> &Arc<BlockRegistry> {
        &self.blocks
    }

    pub fn workflows(&self) -> &Arc<WorkflowRegistry> {
        &self.workflows
    }

    pub fn rules(&self) -> &Arc<DispatchRuleRegistry> {
        &self.rules
    }

    pub fn im_manager(&self) -> &Arc<ImManager> {
        &self.im_manager
    }

    pub fn llm_manager(&self) -> &Arc<LlmManager> {
        &self.llm_manager
    }

    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    pub fn dispatcher(&self) -> &Arc<WorkflowDispatcher> {
        &self.dispatcher
    }

    pub fn plugins(&self) -> &Arc<PluginLoader> {
        &self.plugins
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("data_dir", &self.paths.root())
            .finish_non_exhaustive()
    }
}
