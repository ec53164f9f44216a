// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for IM platforms and LLM backends.
//!
//! Optional capabilities are separate traits reached through `as_*`
//! accessors, so callers test for support before use.

pub mod im;
pub mod llm;

pub use im::{BotProfileAdapter, EditStateAdapter, ImAdapter, MessageHandler, UserProfileAdapter};
pub use llm::{AutoDetectModels, LlmBackendAdapter, StreamingLlmAdapter};
