// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt construction, chat completion, and response conversion.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use chatflow_core::{ChatflowError, IMMessage, LlmAbility, LlmChatMessage, LlmChatRequest};
use chatflow_llm::LlmManager;
use chatflow_workflow::{
    Block, BlockContext, BlockDefinition, BlockSchema, ConfigSpec, InputSpec, Inputs, OutputSpec,
    Outputs, Params, Value, names,
};
use chrono::Local;
use regex::{Captures, Regex};
use tracing::{debug, info};

use crate::{render, to_json};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([^}]+)\}").unwrap());

/// Builds a system + user prompt from two templates.
///
/// Templates may reference `{user_msg}`, `{user_name}`, `{memory_content}`,
/// `{now}` (local time), and any workflow variable as `{name}` or
/// `{name.field}`. Placeholders that resolve to nothing are left as written.
#[derive(Debug, Clone, Copy)]
pub struct ChatMessageConstructor;

struct Substitution<'a> {
    ctx: &'a BlockContext,
    user_msg: &'a IMMessage,
    memory_content: &'a str,
}

impl Substitution<'_> {
    fn lookup(&self, path: &str) -> Option<String> {
        match path {
            "user_msg" => return Some(self.user_msg.content()),
            "user_name" => return Some(self.user_msg.sender.display_name.clone()),
            "memory_content" => return Some(self.memory_content.to_string()),
            "now" => return Some(Local::now().format("%Y-%m-%d %H:%M:%S").to_string()),
            _ => {}
        }

        let mut parts = path.split('.');
        let value = self.ctx.get_variable(parts.next()?)?;
        let rest: Vec<&str> = parts.collect();
        if rest.is_empty() {
            return Some(render(&value));
        }
        let mut json = to_json(&value);
        for key in rest {
            json = json.get(key)?.clone();
        }
        Some(render(&Value::Json(json)))
    }

    fn apply(&self, template: &str) -> String {
        PLACEHOLDER
            .replace_all(template, |caps: &Captures<'_>| {
                self.lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

#[async_trait]
impl Block for ChatMessageConstructor {
    async fn execute(&self, ctx: &BlockContext, inputs: Inputs) -> Result<Outputs, ChatflowError> {
        let user_msg = inputs.message("user_msg")?;
        let subst = Substitution {
            ctx,
            user_msg,
            memory_content: inputs.text("memory_content").unwrap_or_default(),
        };
        let messages = vec![
            LlmChatMessage::system(subst.apply(inputs.text("system_prompt_format").unwrap_or_default())),
            LlmChatMessage::user(subst.apply(inputs.text("user_prompt_format").unwrap_or_default())),
        ];
        let json = serde_json::to_value(messages).map_err(|e| ChatflowError::Internal(e.to_string()))?;
        Ok(Outputs::new().with("llm_msg", json))
    }
}

impl BlockDefinition for ChatMessageConstructor {
    fn schema() -> BlockSchema {
        BlockSchema::new()
            .input(InputSpec::new("user_msg", names::IM_MESSAGE).label("User message"))
            .input(
                InputSpec::new("memory_content", names::STR)
                    .default_value("")
                    .label("Conversation history"),
            )
            .input(
                InputSpec::new("system_prompt_format", names::STR)
                    .default_value("")
                    .label("System prompt template"),
            )
            .input(
                InputSpec::new("user_prompt_format", names::STR)
                    .default_value("")
                    .label("User prompt template"),
            )
            .output(
                OutputSpec::new("llm_msg", names::JSON)
                    .label("Chat messages")
                    .description("List of chat messages for an LLM request"),
            )
    }

    fn from_params(_params: &Params) -> Result<Self, ChatflowError> {
        Ok(Self)
    }
}

/// Sends the prompt to a text-chat model.
///
/// Without `model_name` any model whose backend supports text chat is used.
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    model_name: Option<String>,
}

impl ChatCompletion {
    fn model(&self, manager: &LlmManager) -> Result<String, ChatflowError> {
        if let Some(model) = &self.model_name {
            debug!(model = %model, "using configured model");
            return Ok(model.clone());
        }
        let model = manager
            .get_llm_id_by_ability(LlmAbility::TEXT_CHAT)
            .ok_or_else(|| ChatflowError::provider("no available LLM models found"))?;
        info!(model = %model, "model unspecified, using a default text chat model");
        Ok(model)
    }
}

#[async_trait]
impl Block for ChatCompletion {
    async fn execute(&self, ctx: &BlockContext, inputs: Inputs) -> Result<Outputs, ChatflowError> {
        let messages: Vec<LlmChatMessage> = match inputs.require("prompt")? {
            Value::Json(json) => serde_json::from_value(json.clone())
                .map_err(|e| ChatflowError::Internal(format!("invalid prompt: {e}")))?,
            Value::Text(text) => vec![LlmChatMessage::user(text.clone())],
            other => {
                return Err(ChatflowError::Internal(format!(
                    "prompt expects chat messages, got {}",
                    other.type_name()
                )));
            }
        };

        let manager = ctx.resolve::<Arc<LlmManager>>()?;
        let model = self.model(&manager)?;
        let llm = manager
            .get_llm(&model)
            .ok_or_else(|| ChatflowError::not_found("llm model", &model))?;
        let request = LlmChatRequest {
            messages,
            model: Some(model),
            ..Default::default()
        };
        let resp = llm.chat(request).await?;
        Ok(Outputs::new().with("resp", resp))
    }
}

impl BlockDefinition for ChatCompletion {
    fn schema() -> BlockSchema {
        BlockSchema::new()
            .input(InputSpec::new("prompt", names::JSON).label("Chat messages"))
            .output(OutputSpec::new("resp", names::LLM_CHAT_RESPONSE).label("LLM response"))
            .config(
                ConfigSpec::new("model_name", names::STR)
                    .label("Model ID")
                    .options_provider(|container| {
                        container
                            .try_resolve::<Arc<LlmManager>>()
                            .map(|m| {
                                m.get_supported_models(LlmAbility::TEXT_CHAT)
                                    .into_iter()
                                    .map(serde_json::Value::String)
                                    .collect()
                            })
                            .unwrap_or_default()
                    }),
            )
    }

    fn from_params(params: &Params) -> Result<Self, ChatflowError> {
        Ok(Self {
            model_name: params.str("model_name").filter(|s| !s.is_empty()).map(str::to_string),
        })
    }
}

/// Text of the first choice of an LLM response.
#[derive(Debug, Clone, Copy)]
pub struct LlmResponseToText;

#[async_trait]
impl Block for LlmResponseToText {
    async fn execute(&self, _ctx: &BlockContext, inputs: Inputs) -> Result<Outputs, ChatflowError> {
        let text = inputs.llm_response("response")?.text().to_string();
        Ok(Outputs::new().with("text", text))
    }
}

impl BlockDefinition for LlmResponseToText {
    fn schema() -> BlockSchema {
        BlockSchema::new()
            .input(InputSpec::new("response", names::LLM_CHAT_RESPONSE).label("LLM response"))
            .output(OutputSpec::new("text", names::STR).label("Plain text"))
    }

    fn from_params(_params: &Params) -> Result<Self, ChatflowError> {
        Ok(Self)
    }
}
