// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! IM adapter trait and its optional capability interfaces.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ChatflowError;
use crate::message::IMMessage;
use crate::profile::UserProfile;
use crate::sender::ChatSender;

/// A live client for one instant-messaging platform account.
///
/// Adapters push inbound messages to a [`MessageHandler`] they obtain at
/// construction time; `start` receives the adapter's own `Arc` so the
/// receive loop can hand it to the handler.
#[async_trait]
pub trait ImAdapter: Send + Sync + 'static {
    /// Convert a platform payload into an [`IMMessage`].
    fn convert_to_message(&self, raw: &serde_json::Value) -> Result<IMMessage, ChatflowError>;

    /// Deliver a message to `recipient`.
    async fn send_message(
        &self,
        message: &IMMessage,
        recipient: &ChatSender,
    ) -> Result<(), ChatflowError>;

    /// Connect to the platform and begin receiving.
    async fn start(self: Arc<Self>) -> Result<(), ChatflowError>;

    /// Disconnect and release resources.
    async fn stop(&self) -> Result<(), ChatflowError>;

    /// Typing/editing indicator support.
    fn as_edit_state(&self) -> Option<&dyn EditStateAdapter> {
        None
    }

    /// User profile lookup support.
    fn as_user_profile(&self) -> Option<&dyn UserProfileAdapter> {
        None
    }

    /// Bot profile lookup support.
    fn as_bot_profile(&self) -> Option<&dyn BotProfileAdapter> {
        None
    }
}

/// Adapters that can show "typing..." style indicators.
#[async_trait]
pub trait EditStateAdapter: Send + Sync {
    async fn set_chat_editing_state(
        &self,
        chat: &ChatSender,
        is_editing: bool,
    ) -> Result<(), ChatflowError>;
}

/// Adapters that can look up a user's profile.
#[async_trait]
pub trait UserProfileAdapter: Send + Sync {
    async fn query_user_profile(&self, chat: &ChatSender) -> Result<UserProfile, ChatflowError>;
}

/// Adapters that can report the bot account's own profile.
#[async_trait]
pub trait BotProfileAdapter: Send + Sync {
    async fn get_bot_profile(&self) -> Result<Option<UserProfile>, ChatflowError>;
}

/// Receiver of inbound messages. The workflow dispatcher implements this.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle_message(&self, adapter: Arc<dyn ImAdapter>, message: IMMessage);
}
