// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Named workflow definitions, loaded from and saved to
//! `workflows/<group>/<id>.yaml`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use chatflow_core::ChatflowError;
use chatflow_ioc::Container;
use regex::Regex;
use tracing::{error, info, warn};

use crate::builder::WorkflowBuilder;
use crate::registry::BlockRegistry;
use crate::workflow::Workflow;
use crate::yaml;

static PATH_SEGMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap());

/// Registry of workflow builders keyed `group:id`.
pub struct WorkflowRegistry {
    workflows_dir: PathBuf,
    block_registry: Arc<BlockRegistry>,
    workflows: RwLock<BTreeMap<String, Arc<WorkflowBuilder>>>,
}

impl WorkflowRegistry {
    pub fn new(workflows_dir: impl Into<PathBuf>, block_registry: Arc<BlockRegistry>) -> Self {
        Self {
            workflows_dir: workflows_dir.into(),
            block_registry,
            workflows: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn workflows_dir(&self) -> &Path {
        &self.workflows_dir
    }

    /// Register a workflow, replacing any existing one with a warning.
    pub fn register(&self, group: &str, id: &str, builder: WorkflowBuilder) {
        let key = format!("{group}:{id}");
        let previous = self
            .workflows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), Arc::new(builder));
        if previous.is_some() {
            warn!(workflow = %key, "workflow replaced an existing registration");
        } else {
            info!(workflow = %key, "workflow registered");
        }
    }

    /// Register a built-in workflow unless one is already present (for
    /// example loaded from disk).
    pub fn register_preset_workflow(&self, group: &str, id: &str, builder: WorkflowBuilder) {
        let key = format!("{group}:{id}");
        let mut workflows = self
            .workflows
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if workflows.contains_key(&key) {
            info!(workflow = %key, "preset workflow already defined, keeping existing");
            return;
        }
        workflows.insert(key, Arc::new(builder));
    }

    pub fn get(&self, workflow_id: &str) -> Option<Arc<WorkflowBuilder>> {
        self.workflows
            .read()
            .ok()
            .and_then(|w| w.get(workflow_id).cloned())
    }

    /// Build a fresh [`Workflow`] from the registered builder.
    pub fn build_workflow(&self, workflow_id: &str, container: &Container) -> Result<Workflow, ChatflowError> {
        let builder = self
            .get(workflow_id)
            .ok_or_else(|| ChatflowError::not_found("workflow", workflow_id))?;
        builder.build(container)
    }

    pub fn unregister(&self, group: &str, id: &str) -> Option<Arc<WorkflowBuilder>> {
        self.workflows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&format!("{group}:{id}"))
    }

    /// Registered workflow ids, sorted.
    pub fn list(&self) -> Vec<String> {
        self.workflows
            .read()
            .map(|w| w.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// `workflows_dir/<group>/<id>.yaml`, rejecting unsafe path segments.
    pub fn get_workflow_path(&self, group: &str, id: &str) -> Result<PathBuf, ChatflowError> {
        for segment in [group, id] {
            if !PATH_SEGMENT.is_match(segment) {
                return Err(ChatflowError::Config(format!(
                    "invalid workflow path segment `{segment}`"
                )));
            }
        }
        Ok(self.workflows_dir.join(group).join(format!("{id}.yaml")))
    }

    /// Load every `<group>/<id>.yaml` under the workflows directory.
    ///
    /// A file that fails to parse is logged and skipped. Returns the number
    /// of workflows loaded.
    pub fn load_workflows(&self) -> Result<usize, ChatflowError> {
        if !self.workflows_dir.is_dir() {
            std::fs::create_dir_all(&self.workflows_dir)?;
            return Ok(0);
        }

        let mut loaded = 0;
        for group_entry in std::fs::read_dir(&self.workflows_dir)? {
            let group_path = group_entry?.path();
            if !group_path.is_dir() {
                continue;
            }
            let Some(group) = group_path.file_name().and_then(|n| n.to_str()).map(str::to_string)
            else {
                continue;
            };

            for file in std::fs::read_dir(&group_path)? {
                let path = file?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                    continue;
                }
                let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                match yaml::load_from_yaml(&path, &self.block_registry) {
                    Ok(builder) => {
                        self.register(&group, id, builder);
                        loaded += 1;
                    }
                    Err(e) => {
                        error!(path = %path.display(), error = %e, "failed to load workflow");
                    }
                }
            }
        }
        info!(count = loaded, dir = %self.workflows_dir.display(), "workflows loaded");
        Ok(loaded)
    }

    /// Save a registered workflow to its YAML path.
    pub fn save_workflow(&self, group: &str, id: &str, container: &Container) -> Result<PathBuf, ChatflowError> {
        let key = format!("{group}:{id}");
        let builder = self
            .get(&key)
            .ok_or_else(|| ChatflowError::not_found("workflow", &key))?;
        let path = self.get_workflow_path(group, id)?;
        yaml::save_to_yaml(&builder, &path, &self.block_registry, container)?;
        info!(workflow = %key, path = %path.display(), "workflow saved");
        Ok(path)
    }
}

impl std::fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowRegistry")
            .field("workflows_dir", &self.workflows_dir)
            .field("workflows", &self.list())
            .finish()
    }
}
