// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lifecycle events posted by the runtime.

use std::sync::Arc;

use chatflow_core::{ImAdapter, LlmBackendAdapter};

/// Boot finished; adapters are running.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplicationStarted;

/// Shutdown has begun.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplicationStopping;

#[derive(Debug, Clone)]
pub struct PluginLoaded {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct PluginStarted {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct PluginStopped {
    pub name: String,
}

#[derive(Clone)]
pub struct IMAdapterStarted {
    pub name: String,
    pub adapter: Arc<dyn ImAdapter>,
}

#[derive(Clone)]
pub struct IMAdapterStopped {
    pub name: String,
    pub adapter: Arc<dyn ImAdapter>,
}

#[derive(Clone)]
pub struct LLMAdapterLoaded {
    pub backend: String,
    pub adapter: Arc<dyn LlmBackendAdapter>,
}

#[derive(Clone)]
pub struct LLMAdapterUnloaded {
    pub backend: String,
    pub adapter: Arc<dyn LlmBackendAdapter>,
}

/// A workflow run is about to start.
#[derive(Debug, Clone)]
pub struct WorkflowExecutionBegin {
    pub workflow: String,
}

/// A workflow run finished, successfully or not.
#[derive(Debug, Clone)]
pub struct WorkflowExecutionEnd {
    pub workflow: String,
    pub success: bool,
}
