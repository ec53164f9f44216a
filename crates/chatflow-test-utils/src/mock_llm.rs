// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock LLM backend for deterministic testing.
//!
//! `MockLlmBackend` answers from a FIFO queue of canned responses and keeps
//! every request it receives for later assertions.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use chatflow_core::{
    AutoDetectModels, ChatflowError, LlmAbility, LlmBackendAdapter, LlmChatRequest,
    LlmChatResponse, LlmStreamChunk, StreamingLlmAdapter,
};
use chatflow_llm::LlmBackendRegistry;

/// Adapter type name used by [`MockLlmBackend::register`].
pub const MOCK_LLM_TYPE: &str = "mock";

/// Reply used once the queue is empty.
pub const DEFAULT_RESPONSE: &str = "mock response";

/// A mock LLM backend that returns pre-configured responses.
#[derive(Debug, Default)]
pub struct MockLlmBackend {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<LlmChatRequest>>,
    models: Vec<String>,
}

impl MockLlmBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend pre-loaded with the given responses.
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from(responses)),
            ..Self::default()
        }
    }

    /// Models reported through [`AutoDetectModels`].
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    pub fn add_response(&self, text: impl Into<String>) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(text.into());
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<LlmChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_response(&self, request: &LlmChatRequest) -> String {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| DEFAULT_RESPONSE.to_string())
    }

    /// Register `backend` as the single instance behind the `mock` adapter
    /// type, with text-chat ability.
    pub fn register(
        registry: &LlmBackendRegistry,
        backend: Arc<Self>,
    ) -> Result<(), ChatflowError> {
        registry.register_with_config(
            MOCK_LLM_TYPE,
            LlmAbility::TEXT_CHAT,
            move |_: serde_json::Value, _| Ok(Arc::clone(&backend) as Arc<dyn LlmBackendAdapter>),
        )
    }
}

#[async_trait]
impl LlmBackendAdapter for MockLlmBackend {
    async fn chat(&self, request: LlmChatRequest) -> Result<LlmChatResponse, ChatflowError> {
        let text = self.next_response(&request);
        Ok(LlmChatResponse::from_text(request.model, text))
    }

    fn as_streaming(&self) -> Option<&dyn StreamingLlmAdapter> {
        Some(self)
    }

    fn as_model_detector(&self) -> Option<&dyn AutoDetectModels> {
        Some(self)
    }
}

#[async_trait]
impl StreamingLlmAdapter for MockLlmBackend {
    /// Streams the next response one word at a time, then a `stop` chunk.
    async fn chat_stream(
        &self,
        request: LlmChatRequest,
    ) -> Result<BoxStream<'static, Result<LlmStreamChunk, ChatflowError>>, ChatflowError> {
        let text = self.next_response(&request);
        let mut chunks: Vec<Result<LlmStreamChunk, ChatflowError>> = text
            .split_inclusive(' ')
            .map(|word| {
                Ok(LlmStreamChunk {
                    delta: word.to_string(),
                    finish_reason: None,
                })
            })
            .collect();
        chunks.push(Ok(LlmStreamChunk {
            delta: String::new(),
            finish_reason: Some("stop".to_string()),
        }));
        Ok(stream::iter(chunks).boxed())
    }
}

#[async_trait]
impl AutoDetectModels for MockLlmBackend {
    async fn auto_detect_models(&self) -> Result<Vec<String>, ChatflowError> {
        Ok(self.models.clone())
    }
}
