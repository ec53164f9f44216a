// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM backend adapter trait with optional streaming and model detection.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::ChatflowError;
use crate::llm::{LlmAbility, LlmChatRequest, LlmChatResponse, LlmStreamChunk};

/// A configured client for one LLM API backend.
#[async_trait]
pub trait LlmBackendAdapter: Send + Sync + 'static {
    /// Abilities this adapter supports. Defaults to plain text chat.
    fn ability(&self) -> LlmAbility {
        LlmAbility::TEXT_CHAT
    }

    /// Run a chat completion.
    async fn chat(&self, request: LlmChatRequest) -> Result<LlmChatResponse, ChatflowError>;

    /// Streaming support, if the backend offers it.
    fn as_streaming(&self) -> Option<&dyn StreamingLlmAdapter> {
        None
    }

    /// Model auto-detection support, if the backend offers it.
    fn as_model_detector(&self) -> Option<&dyn AutoDetectModels> {
        None
    }
}

/// Backends that can stream partial responses.
#[async_trait]
pub trait StreamingLlmAdapter: Send + Sync {
    async fn chat_stream(
        &self,
        request: LlmChatRequest,
    ) -> Result<BoxStream<'static, Result<LlmStreamChunk, ChatflowError>>, ChatflowError>;
}

/// Backends that can list the models they serve.
#[async_trait]
pub trait AutoDetectModels: Send + Sync {
    async fn auto_detect_models(&self) -> Result<Vec<String>, ChatflowError>;
}
