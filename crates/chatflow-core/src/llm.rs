// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire-neutral LLM request/response format and the backend ability bitmask.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

bitflags! {
    /// Abilities a backend adapter advertises. Composite flags combine the
    /// primitive input/output bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct LlmAbility: u32 {
        const CHAT = 1 << 1;
        const TEXT_INPUT = 1 << 2;
        const TEXT_OUTPUT = 1 << 3;
        const IMAGE_INPUT = 1 << 4;
        const IMAGE_OUTPUT = 1 << 5;
        const AUDIO_INPUT = 1 << 6;
        const AUDIO_OUTPUT = 1 << 7;
        const FUNCTION_CALLING = 1 << 8;
        const COMPLETION = 1 << 9;

        const TEXT_CHAT = Self::CHAT.bits() | Self::TEXT_INPUT.bits() | Self::TEXT_OUTPUT.bits();
        const TEXT_COMPLETION =
            Self::COMPLETION.bits() | Self::TEXT_INPUT.bits() | Self::TEXT_OUTPUT.bits();
        const IMAGE_GENERATION = Self::TEXT_INPUT.bits() | Self::IMAGE_OUTPUT.bits();
    }
}

/// Author of a chat message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LlmRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One turn of a chat conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmChatMessage {
    pub role: LlmRole,
    pub content: String,
}

impl LlmChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: LlmRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: LlmRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: LlmRole::Assistant,
            content: content.into(),
        }
    }
}

/// Requested response encoding (`text`, `json_object`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
}

/// A chat request handed to a backend adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmChatRequest {
    pub messages: Vec<LlmChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

/// Token accounting reported by a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One candidate completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmChoice {
    pub index: u32,
    pub message: LlmChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// A backend's answer to an [`LlmChatRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmChatResponse {
    #[serde(default)]
    pub model: Option<String>,
    pub choices: Vec<LlmChoice>,
    #[serde(default)]
    pub usage: Option<LlmUsage>,
}

impl LlmChatResponse {
    /// Single-choice assistant response.
    pub fn from_text(model: Option<String>, text: impl Into<String>) -> Self {
        Self {
            model,
            choices: vec![LlmChoice {
                index: 0,
                message: LlmChatMessage::assistant(text),
                finish_reason: Some("stop".to_string()),
            }],
            usage: None,
        }
    }

    /// Content of the first choice, or an empty string.
    pub fn text(&self) -> &str {
        self.choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or_default()
    }
}

/// Incremental piece of a streamed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmStreamChunk {
    pub delta: String,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_abilities_contain_their_parts() {
        assert!(LlmAbility::TEXT_CHAT.contains(LlmAbility::CHAT | LlmAbility::TEXT_INPUT));
        assert!(!LlmAbility::TEXT_CHAT.contains(LlmAbility::IMAGE_OUTPUT));
        let vision_chat = LlmAbility::TEXT_CHAT | LlmAbility::IMAGE_INPUT;
        assert!(vision_chat.contains(LlmAbility::TEXT_CHAT));
    }

    #[test]
    fn response_text_reads_first_choice() {
        let resp = LlmChatResponse::from_text(Some("m".into()), "hi");
        assert_eq!(resp.text(), "hi");
        let empty = LlmChatResponse {
            model: None,
            choices: vec![],
            usage: None,
        };
        assert_eq!(empty.text(), "");
    }

    #[test]
    fn request_omits_unset_options() {
        let req = LlmChatRequest {
            messages: vec![LlmChatMessage::user("hello")],
            ..Default::default()
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json.get("temperature").is_none());
    }
}
