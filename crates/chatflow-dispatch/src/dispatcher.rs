// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Routes inbound messages to the workflow of the first matching rule.

use std::sync::Arc;

use async_trait::async_trait;
use chatflow_core::{ChatflowError, IMMessage, ImAdapter, MessageHandler};
use chatflow_ioc::Container;
use chatflow_workflow::{ExecutionResults, WorkflowBuilder, WorkflowExecutor, WorkflowRegistry};
use tracing::{debug, error, info, warn};

use crate::registry::DispatchRuleRegistry;

/// Runs one workflow per message, each in its own container scope.
///
/// Resolves `Arc<DispatchRuleRegistry>` and `Arc<WorkflowRegistry>` from the
/// container on every dispatch, so registries may be swapped at runtime.
pub struct WorkflowDispatcher {
    container: Arc<Container>,
}

impl WorkflowDispatcher {
    pub fn new(container: Arc<Container>) -> Self {
        Self { container }
    }

    /// Dispatch `message`, propagating errors from the selected workflow.
    ///
    /// Returns `Ok(None)` when no rule matches.
    pub async fn try_dispatch(
        &self,
        adapter: Arc<dyn ImAdapter>,
        message: IMMessage,
    ) -> Result<Option<ExecutionResults>, ChatflowError> {
        let rules = self.container.resolve::<Arc<DispatchRuleRegistry>>()?;
        let workflows = self.container.resolve::<Arc<WorkflowRegistry>>()?;

        for rule in rules.get_active_rules() {
            if !rule.matches(&message) {
                continue;
            }
            let rule = rule.rule();
            let Some(builder) = workflows.get(&rule.workflow_id) else {
                warn!(
                    rule_id = %rule.rule_id,
                    workflow = %rule.workflow_id,
                    "rule matched but its workflow is not registered"
                );
                continue;
            };

            debug!(rule_id = %rule.rule_id, workflow = %rule.workflow_id, "rule matched");
            let scope = self.container.scoped();
            scope.register(Arc::clone(&adapter));
            scope.register(message.clone());

            let result = Self::run_in(&scope, &builder).await;
            scope.dispose();
            return result.map(Some);
        }

        info!(sender = %message.sender.user_id, "no dispatch rule matched");
        Ok(None)
    }

    async fn run_in(
        scope: &Arc<Container>,
        builder: &WorkflowBuilder,
    ) -> Result<ExecutionResults, ChatflowError> {
        let workflow = Arc::new(builder.build(scope)?);
        scope.register(Arc::clone(&workflow));
        let executor = Arc::new(WorkflowExecutor::new(workflow, Arc::clone(scope))?);
        scope.register(Arc::clone(&executor));
        Container::with_current(Arc::clone(scope), executor.run()).await
    }

    /// Dispatch `message`, logging any failure.
    pub async fn dispatch(
        &self,
        adapter: Arc<dyn ImAdapter>,
        message: IMMessage,
    ) -> Option<ExecutionResults> {
        match self.try_dispatch(adapter, message).await {
            Ok(results) => results,
            Err(e) => {
                error!(error = %e, "dispatch failed");
                None
            }
        }
    }
}

#[async_trait]
impl MessageHandler for WorkflowDispatcher {
    async fn handle_message(&self, adapter: Arc<dyn ImAdapter>, message: IMMessage) {
        self.dispatch(adapter, message).await;
    }
}

impl std::fmt::Debug for WorkflowDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowDispatcher").finish_non_exhaustive()
    }
}
