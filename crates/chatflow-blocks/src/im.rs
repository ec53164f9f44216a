// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Blocks that read the inbound message, reshape messages, and talk to IM
//! adapters.

use std::sync::Arc;

use async_trait::async_trait;
use chatflow_core::{ChatSender, ChatflowError, IMMessage, ImAdapter, MessageElement};
use chatflow_im::ImManager;
use chatflow_ioc::Container;
use chatflow_workflow::{
    Block, BlockContext, BlockDefinition, BlockSchema, ConfigSpec, InputSpec, Inputs, OutputSpec,
    Outputs, Params, Value, names,
};
use tracing::debug;

/// Names of the adapters the IM manager currently holds.
fn im_adapter_options(container: &Container) -> Vec<serde_json::Value> {
    container
        .try_resolve::<Arc<ImManager>>()
        .map(|manager| {
            manager
                .get_adapters()
                .into_iter()
                .map(|(name, _)| serde_json::Value::String(name))
                .collect()
        })
        .unwrap_or_default()
}

/// Emits the message being dispatched and its sender.
#[derive(Debug, Clone, Copy)]
pub struct GetIMMessage;

#[async_trait]
impl Block for GetIMMessage {
    async fn execute(&self, ctx: &BlockContext, _inputs: Inputs) -> Result<Outputs, ChatflowError> {
        let message = ctx.resolve::<IMMessage>()?;
        let sender = message.sender.clone();
        Ok(Outputs::new().with("msg", message).with("sender", sender))
    }
}

impl BlockDefinition for GetIMMessage {
    fn schema() -> BlockSchema {
        BlockSchema::new()
            .output(
                OutputSpec::new("msg", names::IM_MESSAGE)
                    .label("IM message")
                    .description("The message that triggered this workflow"),
            )
            .output(OutputSpec::new("sender", names::CHAT_SENDER).label("Sender"))
    }

    fn from_params(_params: &Params) -> Result<Self, ChatflowError> {
        Ok(Self)
    }
}

/// Sends `msg` through an adapter.
///
/// Without `target` the reply goes to the sender of the dispatched message.
/// Without `im_name` the adapter that received that message is used.
#[derive(Debug, Clone)]
pub struct SendIMMessage {
    im_name: Option<String>,
}

impl SendIMMessage {
    fn adapter(&self, ctx: &BlockContext) -> Result<Arc<dyn ImAdapter>, ChatflowError> {
        match &self.im_name {
            Some(name) => ctx
                .resolve::<Arc<ImManager>>()?
                .get_adapter(name)
                .ok_or_else(|| ChatflowError::not_found("im adapter", name)),
            None => ctx.resolve::<Arc<dyn ImAdapter>>(),
        }
    }
}

#[async_trait]
impl Block for SendIMMessage {
    async fn execute(&self, ctx: &BlockContext, inputs: Inputs) -> Result<Outputs, ChatflowError> {
        let message = inputs.message("msg")?;
        let target = match inputs.get("target").and_then(Value::as_sender) {
            Some(sender) => sender.clone(),
            None => ctx.resolve::<IMMessage>()?.sender,
        };
        let adapter = self.adapter(ctx)?;
        debug!(
            workflow = ctx.workflow_name(),
            target = %target.user_id,
            elements = message.elements.len(),
            "sending message"
        );
        adapter.send_message(message, &target).await?;
        Ok(Outputs::new())
    }
}

impl BlockDefinition for SendIMMessage {
    fn schema() -> BlockSchema {
        BlockSchema::new()
            .input(InputSpec::new("msg", names::IM_MESSAGE).label("IM message"))
            .input(
                InputSpec::new("target", names::CHAT_SENDER)
                    .nullable()
                    .label("Recipient")
                    .description("Defaults to the sender of the incoming message"),
            )
            .config(
                ConfigSpec::new("im_name", names::STR)
                    .label("IM adapter name")
                    .options_provider(im_adapter_options),
            )
    }

    fn from_params(params: &Params) -> Result<Self, ChatflowError> {
        Ok(Self {
            im_name: params.str("im_name").filter(|s| !s.is_empty()).map(str::to_string),
        })
    }
}

/// Plain-text rendering of a message.
#[derive(Debug, Clone, Copy)]
pub struct IMMessageToText;

#[async_trait]
impl Block for IMMessageToText {
    async fn execute(&self, _ctx: &BlockContext, inputs: Inputs) -> Result<Outputs, ChatflowError> {
        Ok(Outputs::new().with("text", inputs.message("msg")?.content()))
    }
}

impl BlockDefinition for IMMessageToText {
    fn schema() -> BlockSchema {
        BlockSchema::new()
            .input(InputSpec::new("msg", names::IM_MESSAGE).label("IM message"))
            .output(OutputSpec::new("text", names::STR).label("Plain text"))
    }

    fn from_params(_params: &Params) -> Result<Self, ChatflowError> {
        Ok(Self)
    }
}

/// Wraps text in a bot message, one text element per `split_by` segment.
#[derive(Debug, Clone)]
pub struct TextToIMMessage {
    split_by: Option<String>,
}

impl TextToIMMessage {
    fn elements(&self, text: &str) -> Vec<MessageElement> {
        match &self.split_by {
            Some(separator) => text
                .split(separator.as_str())
                .filter(|segment| !segment.trim().is_empty())
                .map(MessageElement::text)
                .collect(),
            None => vec![MessageElement::text(text)],
        }
    }
}

#[async_trait]
impl Block for TextToIMMessage {
    async fn execute(&self, _ctx: &BlockContext, inputs: Inputs) -> Result<Outputs, ChatflowError> {
        let elements = self.elements(inputs.text("text")?);
        Ok(Outputs::new().with("msg", IMMessage::new(ChatSender::bot(), elements)))
    }
}

impl BlockDefinition for TextToIMMessage {
    fn schema() -> BlockSchema {
        BlockSchema::new()
            .input(InputSpec::new("text", names::STR).label("Plain text"))
            .output(OutputSpec::new("msg", names::IM_MESSAGE).label("IM message"))
            .config(ConfigSpec::new("split_by", names::STR).label("Separator"))
    }

    fn from_params(params: &Params) -> Result<Self, ChatflowError> {
        Ok(Self {
            split_by: params.str("split_by").filter(|s| !s.is_empty()).map(str::to_string),
        })
    }
}

/// Appends one element to a message.
#[derive(Debug, Clone, Copy)]
pub struct AppendIMMessage;

#[async_trait]
impl Block for AppendIMMessage {
    async fn execute(&self, _ctx: &BlockContext, inputs: Inputs) -> Result<Outputs, ChatflowError> {
        let base = inputs.message("base_msg")?;
        let element = match inputs.require("append_msg")? {
            Value::Element(element) => element.clone(),
            Value::Text(text) => MessageElement::text(text.clone()),
            other => {
                return Err(ChatflowError::Internal(format!(
                    "append_msg expects a message element, got {}",
                    other.type_name()
                )));
            }
        };
        let mut elements = base.elements.clone();
        elements.push(element);
        Ok(Outputs::new().with("msg", IMMessage::new(base.sender.clone(), elements)))
    }
}

impl BlockDefinition for AppendIMMessage {
    fn schema() -> BlockSchema {
        BlockSchema::new()
            .input(InputSpec::new("base_msg", names::IM_MESSAGE).label("IM message"))
            .input(InputSpec::new("append_msg", names::MESSAGE_ELEMENT).label("Element to append"))
            .output(OutputSpec::new("msg", names::IM_MESSAGE).label("IM message"))
    }

    fn from_params(_params: &Params) -> Result<Self, ChatflowError> {
        Ok(Self)
    }
}

/// The sender of a message.
#[derive(Debug, Clone, Copy)]
pub struct ExtractChatSender;

#[async_trait]
impl Block for ExtractChatSender {
    async fn execute(&self, _ctx: &BlockContext, inputs: Inputs) -> Result<Outputs, ChatflowError> {
        Ok(Outputs::new().with("sender", inputs.message("msg")?.sender.clone()))
    }
}

impl BlockDefinition for ExtractChatSender {
    fn schema() -> BlockSchema {
        BlockSchema::new()
            .input(InputSpec::new("msg", names::IM_MESSAGE).label("IM message"))
            .output(OutputSpec::new("sender", names::CHAT_SENDER).label("Sender"))
    }

    fn from_params(_params: &Params) -> Result<Self, ChatflowError> {
        Ok(Self)
    }
}

/// Looks up a user's profile through the adapter of the current dispatch.
#[derive(Debug, Clone, Copy)]
pub struct QueryUserProfile;

#[async_trait]
impl Block for QueryUserProfile {
    async fn execute(&self, ctx: &BlockContext, inputs: Inputs) -> Result<Outputs, ChatflowError> {
        let sender = inputs.sender("chat_sender")?;
        let adapter = ctx.resolve::<Arc<dyn ImAdapter>>()?;
        let profiles = adapter
            .as_user_profile()
            .ok_or_else(|| ChatflowError::adapter("adapter does not support user profile queries"))?;
        let profile = profiles.query_user_profile(sender).await?;
        Ok(Outputs::new().with("profile", profile))
    }
}

impl BlockDefinition for QueryUserProfile {
    fn schema() -> BlockSchema {
        BlockSchema::new()
            .input(InputSpec::new("chat_sender", names::CHAT_SENDER).label("Chat sender"))
            .output(OutputSpec::new("profile", names::USER_PROFILE).label("User profile"))
    }

    fn from_params(_params: &Params) -> Result<Self, ChatflowError> {
        Ok(Self)
    }
}
