// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sender identity for inbound and outbound chat messages.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::message::IMMessage;

/// Whether a conversation is one-to-one or happens in a group.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum ChatType {
    /// Private chat between a user and the bot.
    #[serde(rename = "c2c")]
    #[strum(to_string = "c2c", serialize = "私聊")]
    C2C,
    /// Group chat.
    #[serde(rename = "group")]
    #[strum(to_string = "group", serialize = "群聊")]
    Group,
}

/// Callback some adapters attach to a sender to deliver replies out of band.
pub type SenderCallback = Arc<dyn Fn(&IMMessage) + Send + Sync>;

/// Identity of the party that sent (or will receive) a message.
///
/// Equality and hashing only consider `(user_id, chat_type, group_id)`.
#[derive(Clone, Serialize, Deserialize)]
pub struct ChatSender {
    pub user_id: String,
    pub display_name: String,
    pub chat_type: ChatType,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub raw_metadata: HashMap<String, serde_json::Value>,
    #[serde(skip)]
    pub callback: Option<SenderCallback>,
}

static BOT_SENDER: LazyLock<ChatSender> =
    LazyLock::new(|| ChatSender::from_c2c_chat("bot", "Bot"));

impl ChatSender {
    /// Sender for a private conversation.
    pub fn from_c2c_chat(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            chat_type: ChatType::C2C,
            group_id: None,
            raw_metadata: HashMap::new(),
            callback: None,
        }
    }

    /// Sender inside a group conversation.
    pub fn from_group_chat(
        user_id: impl Into<String>,
        group_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            chat_type: ChatType::Group,
            group_id: Some(group_id.into()),
            raw_metadata: HashMap::new(),
            callback: None,
        }
    }

    /// The well-known sender representing the bot itself.
    pub fn bot() -> Self {
        BOT_SENDER.clone()
    }

    /// Returns true if this sender is the bot sender.
    pub fn is_bot(&self) -> bool {
        *self == *BOT_SENDER
    }

    /// Attach a reply callback.
    pub fn with_callback(mut self, callback: SenderCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Attach one raw metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.raw_metadata.insert(key.into(), value);
        self
    }
}

impl PartialEq for ChatSender {
    fn eq(&self, other: &Self) -> bool {
        self.user_id == other.user_id
            && self.chat_type == other.chat_type
            && self.group_id == other.group_id
    }
}

impl Eq for ChatSender {}

impl Hash for ChatSender {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.user_id.hash(state);
        self.chat_type.hash(state);
        self.group_id.hash(state);
    }
}

impl fmt::Debug for ChatSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatSender")
            .field("user_id", &self.user_id)
            .field("display_name", &self.display_name)
            .field("chat_type", &self.chat_type)
            .field("group_id", &self.group_id)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}
