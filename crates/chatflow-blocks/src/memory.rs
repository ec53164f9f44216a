// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation memory blocks.
//!
//! Each block names a scope (`member`, `group`, `global`); query and store
//! fall back to `memory.default_scope` when none is configured.

use std::sync::Arc;

use async_trait::async_trait;
use chatflow_core::{ChatSender, ChatflowError, IMMessage};
use chatflow_memory::{ComposableMessage, DEFAULT, MemoryManager, MemoryScope};
use chatflow_workflow::{
    Block, BlockContext, BlockDefinition, BlockSchema, ConfigSpec, InputSpec, Inputs, OutputSpec,
    Outputs, Params, names,
};

/// Reply posted after memory was cleared.
pub const CLEARED_REPLY: &str = "Memory for this conversation has been cleared.";

fn scope_for(
    manager: &MemoryManager,
    scope_type: Option<&str>,
) -> Result<Arc<dyn MemoryScope>, ChatflowError> {
    match scope_type {
        Some(name) => manager.scope(name),
        None => manager.default_scope(),
    }
}

fn scope_param(params: &Params) -> Option<String> {
    params.str("scope_type").filter(|s| !s.is_empty()).map(str::to_string)
}

fn scope_config() -> ConfigSpec {
    ConfigSpec::new("scope_type", names::STR)
        .label("Scope")
        .description("Memory scope; the configured default when empty")
}

/// Renders the sender's memory as prompt text.
#[derive(Debug, Clone)]
pub struct ChatMemoryQuery {
    scope_type: Option<String>,
}

#[async_trait]
impl Block for ChatMemoryQuery {
    async fn execute(&self, ctx: &BlockContext, inputs: Inputs) -> Result<Outputs, ChatflowError> {
        let sender = inputs.sender("chat_sender")?;
        let manager = ctx.resolve::<Arc<MemoryManager>>()?;
        let scope = scope_for(&manager, self.scope_type.as_deref())?;
        let decomposer = manager.decomposer(DEFAULT)?;

        let entries = manager.query(scope.as_ref(), sender).await?;
        Ok(Outputs::new().with("memory_content", decomposer.decompose(&entries)))
    }
}

impl BlockDefinition for ChatMemoryQuery {
    fn schema() -> BlockSchema {
        BlockSchema::new()
            .input(InputSpec::new("chat_sender", names::CHAT_SENDER).label("Chat sender"))
            .output(OutputSpec::new("memory_content", names::STR).label("Memory content"))
            .config(scope_config())
    }

    fn from_params(params: &Params) -> Result<Self, ChatflowError> {
        Ok(Self {
            scope_type: scope_param(params),
        })
    }
}

/// Stores the user's message together with the LLM's reply.
#[derive(Debug, Clone)]
pub struct ChatMemoryStore {
    scope_type: Option<String>,
}

#[async_trait]
impl Block for ChatMemoryStore {
    async fn execute(&self, ctx: &BlockContext, inputs: Inputs) -> Result<Outputs, ChatflowError> {
        let user_msg = inputs.message("user_msg")?;
        let manager = ctx.resolve::<Arc<MemoryManager>>()?;
        let scope = scope_for(&manager, self.scope_type.as_deref())?;
        let composer = manager.composer(DEFAULT)?;

        let mut messages = vec![ComposableMessage::from(user_msg.clone())];
        if let Ok(resp) = inputs.llm_response("llm_resp") {
            if let Some(choice) = resp.choices.first() {
                messages.push(ComposableMessage::from(choice.message.clone()));
            }
        }
        let entry = composer.compose(&user_msg.sender, &messages);
        manager
            .store(scope.as_ref(), &user_msg.sender, vec![entry])
            .await?;
        Ok(Outputs::new())
    }
}

impl BlockDefinition for ChatMemoryStore {
    fn schema() -> BlockSchema {
        BlockSchema::new()
            .input(InputSpec::new("user_msg", names::IM_MESSAGE).label("User message"))
            .input(
                InputSpec::new("llm_resp", names::LLM_CHAT_RESPONSE)
                    .nullable()
                    .label("LLM response"),
            )
            .config(scope_config())
    }

    fn from_params(params: &Params) -> Result<Self, ChatflowError> {
        Ok(Self {
            scope_type: scope_param(params),
        })
    }
}

/// Clears the sender's memory in one scope and emits a confirmation.
#[derive(Debug, Clone)]
pub struct ClearMemory {
    scope_type: String,
}

#[async_trait]
impl Block for ClearMemory {
    async fn execute(&self, ctx: &BlockContext, inputs: Inputs) -> Result<Outputs, ChatflowError> {
        let sender = inputs.sender("chat_sender")?;
        let manager = ctx.resolve::<Arc<MemoryManager>>()?;
        let scope = manager.scope(&self.scope_type)?;
        manager.clear_memory(scope.as_ref(), sender).await?;
        Ok(Outputs::new().with("response", IMMessage::text(ChatSender::bot(), CLEARED_REPLY)))
    }
}

impl BlockDefinition for ClearMemory {
    fn schema() -> BlockSchema {
        BlockSchema::new()
            .input(InputSpec::new("chat_sender", names::CHAT_SENDER).label("Chat sender"))
            .output(OutputSpec::new("response", names::IM_MESSAGE).label("Response"))
            .config(
                ConfigSpec::new("scope_type", names::STR)
                    .default_value("member")
                    .label("Scope"),
            )
    }

    fn from_params(params: &Params) -> Result<Self, ChatflowError> {
        Ok(Self {
            scope_type: params.string_or("scope_type", "member"),
        })
    }
}
