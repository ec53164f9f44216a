// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory entries and the messages composers turn into them.

use chatflow_core::{ChatSender, IMMessage, LlmChatMessage, LlmChatResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One remembered exchange, attributed to the sender that triggered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub sender: ChatSender,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl MemoryEntry {
    /// An entry stamped with the current time.
    pub fn new(sender: ChatSender, content: impl Into<String>) -> Self {
        Self::at(sender, content, Utc::now())
    }

    pub fn at(sender: ChatSender, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            sender,
            content: content.into(),
            timestamp,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A message a composer can fold into a [`MemoryEntry`].
#[derive(Debug, Clone)]
pub enum ComposableMessage {
    /// An inbound IM message.
    Im(IMMessage),
    /// A message produced by the LLM.
    Llm(LlmChatMessage),
    /// Free text attributed to the entry's sender.
    Text(String),
}

impl From<IMMessage> for ComposableMessage {
    fn from(msg: IMMessage) -> Self {
        Self::Im(msg)
    }
}

impl From<LlmChatMessage> for ComposableMessage {
    fn from(msg: LlmChatMessage) -> Self {
        Self::Llm(msg)
    }
}

impl From<&LlmChatResponse> for ComposableMessage {
    fn from(resp: &LlmChatResponse) -> Self {
        Self::Llm(LlmChatMessage::assistant(resp.text()))
    }
}

impl From<String> for ComposableMessage {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}
