// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in blocks and system workflows for the Chatflow runtime.
//!
//! Every block here is registered under the [`GROUP`] group by
//! [`register_builtin_blocks`]:
//! - text: [`text::TextBlock`], [`text::TextConcatBlock`],
//!   [`text::TextReplaceBlock`], [`text::TextExtractByRegexBlock`]
//! - IM: [`im::GetIMMessage`], [`im::SendIMMessage`] and the message
//!   conversions in [`im`]
//! - memory: [`memory::ChatMemoryQuery`], [`memory::ChatMemoryStore`],
//!   [`memory::ClearMemory`]
//! - LLM: [`llm::ChatMessageConstructor`], [`llm::ChatCompletion`],
//!   [`llm::LlmResponseToText`]
//! - help: [`help::GenerateHelp`]
//!
//! [`workflows::register_system_workflows`] adds the preset workflows
//! (`system:help`, `system:clear_memory`, `chat:normal`).

pub mod help;
pub mod im;
pub mod llm;
pub mod memory;
pub mod text;
pub mod workflows;

use std::sync::Arc;

use chatflow_core::ChatflowError;
use chatflow_workflow::{BlockRegistry, BlockType, Value, block_class};

pub use workflows::register_system_workflows;

/// Registry group of the built-in blocks.
pub const GROUP: &str = "internal";

/// `(id, class, display name)` of every built-in block.
pub fn builtin_blocks() -> Vec<(&'static str, Arc<dyn BlockType>, &'static str)> {
    vec![
        ("text_block", block_class::<text::TextBlock>(), "Text"),
        ("text_concat_block", block_class::<text::TextConcatBlock>(), "Concatenate text"),
        ("text_replace_block", block_class::<text::TextReplaceBlock>(), "Replace text"),
        (
            "text_extract_by_regex_block",
            block_class::<text::TextExtractByRegexBlock>(),
            "Extract text by regex",
        ),
        ("generate_help", block_class::<help::GenerateHelp>(), "Generate help"),
        ("msg_input", block_class::<im::GetIMMessage>(), "Message input"),
        ("msg_sender", block_class::<im::SendIMMessage>(), "Send message"),
        ("im_message_to_text", block_class::<im::IMMessageToText>(), "Message to text"),
        ("text_to_im_message", block_class::<im::TextToIMMessage>(), "Text to message"),
        ("concat_im_message", block_class::<im::AppendIMMessage>(), "Append to message"),
        ("extract_chat_sender", block_class::<im::ExtractChatSender>(), "Extract sender"),
        ("query_user_profile", block_class::<im::QueryUserProfile>(), "Query user profile"),
        ("clear_memory", block_class::<memory::ClearMemory>(), "Clear memory"),
        ("chat_memory_query", block_class::<memory::ChatMemoryQuery>(), "Query memory"),
        ("chat_memory_store", block_class::<memory::ChatMemoryStore>(), "Store memory"),
        (
            "chat_message_constructor",
            block_class::<llm::ChatMessageConstructor>(),
            "Build chat prompt",
        ),
        ("chat_completion", block_class::<llm::ChatCompletion>(), "Chat completion"),
        ("llm_response_to_text", block_class::<llm::LlmResponseToText>(), "LLM response to text"),
    ]
}

/// Register every built-in block in `registry` under [`GROUP`].
pub fn register_builtin_blocks(registry: &BlockRegistry) -> Result<(), ChatflowError> {
    for (id, class, name) in builtin_blocks() {
        registry.register(id, GROUP, class, Some(name))?;
    }
    tracing::debug!(group = GROUP, "built-in blocks registered");
    Ok(())
}

/// Plain-text rendering of a wire value, as used in prompts and replacements.
pub(crate) fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Text(s) => s.clone(),
        Value::Message(m) => m.content(),
        Value::Element(e) => e.to_plain(),
        Value::Sender(s) => s.display_name.clone(),
        Value::LlmResponse(r) => r.text().to_string(),
        Value::Json(serde_json::Value::String(s)) => s.clone(),
        other => serde_json::to_string(&to_json(other)).unwrap_or_default(),
    }
}

/// JSON view of a wire value, used for `{var.field}` lookups.
pub(crate) fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Json(j) => j.clone(),
        Value::List(items) => serde_json::Value::Array(items.iter().map(to_json).collect()),
        Value::Map(map) => serde_json::Value::Object(
            map.iter().map(|(k, v)| (k.clone(), to_json(v))).collect(),
        ),
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Float(f) => serde_json::Value::from(*f),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Message(m) => serde_json::to_value(m).unwrap_or_default(),
        Value::Element(e) => serde_json::to_value(e).unwrap_or_default(),
        Value::Sender(s) => serde_json::to_value(s).unwrap_or_default(),
        Value::LlmResponse(r) => serde_json::to_value(r).unwrap_or_default(),
        Value::Profile(p) => serde_json::to_value(p).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_registers_once() {
        let registry = BlockRegistry::new();
        register_builtin_blocks(&registry).unwrap();
        assert!(registry.get("internal:msg_sender").is_some());
        assert!(registry.get("internal:chat_completion").is_some());
        assert_eq!(
            registry.get_localized_name("internal:clear_memory").as_deref(),
            Some("Clear memory")
        );
        assert!(register_builtin_blocks(&registry).is_err());
    }

    #[test]
    fn render_flattens_common_values() {
        assert_eq!(render(&Value::Int(3)), "3");
        assert_eq!(render(&Value::Null), "");
        assert_eq!(render(&Value::from(vec![Value::from("a")])), "[\"a\"]");
    }
}
