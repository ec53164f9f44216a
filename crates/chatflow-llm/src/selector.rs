// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Policies for choosing among backends serving the same model.

use std::sync::Arc;

use chatflow_core::LlmBackendAdapter;
use rand::seq::SliceRandom;

/// A backend serving a model, with the name it was loaded under.
#[derive(Clone)]
pub struct Candidate {
    pub backend: String,
    pub adapter: Arc<dyn LlmBackendAdapter>,
}

impl std::fmt::Debug for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Candidate").field("backend", &self.backend).finish()
    }
}

pub trait BackendSelector: Send + Sync + 'static {
    fn select<'a>(&self, model: &str, candidates: &'a [Candidate]) -> Option<&'a Candidate>;
}

/// Uniform random choice.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSelector;

impl BackendSelector for RandomSelector {
    fn select<'a>(&self, _model: &str, candidates: &'a [Candidate]) -> Option<&'a Candidate> {
        candidates.choose(&mut rand::thread_rng())
    }
}

/// Always the first backend loaded for the model.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstSelector;

impl BackendSelector for FirstSelector {
    fn select<'a>(&self, _model: &str, candidates: &'a [Candidate]) -> Option<&'a Candidate> {
        candidates.first()
    }
}
