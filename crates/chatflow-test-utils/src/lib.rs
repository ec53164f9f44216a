// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Chatflow integration tests.
//!
//! Provides in-process adapters and a booted runtime so tests run without
//! network access or external services.
//!
//! # Components
//!
//! - [`MockImAdapter`] - IM adapter that captures outbound messages and
//!   pushes injected inbound messages into the dispatcher
//! - [`MockLlmBackend`] - LLM backend with queued responses
//! - [`TestHarness`] - registries, managers, and dispatcher wired into a root
//!   container

pub mod harness;
pub mod mock_im;
pub mod mock_llm;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_im::MockImAdapter;
pub use mock_llm::MockLlmBackend;
