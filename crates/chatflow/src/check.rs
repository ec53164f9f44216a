// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `chatflow check`: validate configuration, workflows, and rules offline.

use std::sync::Arc;

use chatflow_blocks::{register_builtin_blocks, register_system_workflows};
use chatflow_config::DataPaths;
use chatflow_core::ChatflowError;
use chatflow_dispatch::DispatchRuleRegistry;
use chatflow_ioc::Container;
use chatflow_workflow::{BlockRegistry, WorkflowRegistry};

/// What a check found.
#[derive(Debug, Default)]
pub struct CheckReport {
    pub workflows: usize,
    pub rules: usize,
    /// Human-readable problems. Empty means the check passed.
    pub problems: Vec<String>,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Load the workflows and rules under `paths` and cross-check them.
///
/// Each workflow must build against the built-in blocks, and each enabled
/// rule must point at a registered workflow. Loading never writes to disk
/// beyond creating missing directories.
pub fn run_check(paths: &DataPaths) -> Result<CheckReport, ChatflowError> {
    let blocks = Arc::new(BlockRegistry::new());
    register_builtin_blocks(&blocks)?;
    let workflows = WorkflowRegistry::new(paths.workflows_dir(), Arc::clone(&blocks));
    workflows.load_workflows()?;
    register_system_workflows(&workflows);
    let rules = DispatchRuleRegistry::default();
    rules.load_rules(&paths.dispatch_rules_dir())?;

    let container = Container::new();
    container.register(Arc::clone(&blocks));
    let mut report = CheckReport {
        workflows: workflows.list().len(),
        rules: rules.get_all_rules().len(),
        problems: Vec::new(),
    };

    for id in workflows.list() {
        if let Err(e) = workflows.build_workflow(&id, &container) {
            report.problems.push(format!("workflow `{id}` does not build: {e}"));
        }
    }
    for rule in rules.get_all_rules().into_iter().filter(|r| r.enabled) {
        if workflows.get(&rule.workflow_id).is_none() {
            report.problems.push(format!(
                "rule `{}` targets unknown workflow `{}`",
                rule.rule_id, rule.workflow_id
            ));
        }
    }
    Ok(report)
}
