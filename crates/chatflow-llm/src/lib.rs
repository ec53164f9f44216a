// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM backend management for the Chatflow runtime.
//!
//! The [`LlmBackendRegistry`] knows how to build each adapter type; the
//! [`LlmManager`] instantiates the backends named in the config and routes
//! model names to them.

pub mod manager;
pub mod registry;
pub mod selector;

pub use manager::LlmManager;
pub use registry::{LlmAdapterFactory, LlmBackendRegistry, LlmBackendType};
pub use selector::{BackendSelector, Candidate, FirstSelector, RandomSelector};
