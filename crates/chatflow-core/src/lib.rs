// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Chatflow bot runtime.
//!
//! This crate provides the message model, the shared error type, the LLM
//! request format, and the adapter traits that IM platforms and LLM
//! backends implement. Every other Chatflow crate depends on it.

pub mod error;
pub mod llm;
pub mod message;
pub mod profile;
pub mod sender;
pub mod traits;

// Re-export key items at crate root for ergonomic imports.
pub use error::ChatflowError;
pub use llm::{
    LlmAbility, LlmChatMessage, LlmChatRequest, LlmChatResponse, LlmChoice, LlmRole,
    LlmStreamChunk, LlmUsage,
};
pub use message::{IMMessage, MediaMessage, MessageElement};
pub use profile::UserProfile;
pub use sender::{ChatSender, ChatType};

pub use traits::{
    AutoDetectModels, BotProfileAdapter, EditStateAdapter, ImAdapter, LlmBackendAdapter,
    MessageHandler, StreamingLlmAdapter, UserProfileAdapter,
};
