// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock IM adapter for deterministic testing.
//!
//! `MockImAdapter` captures every outbound message with its recipient and
//! forwards injected inbound messages to the bound [`MessageHandler`], the
//! same path a real platform adapter takes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio::sync::Mutex;

use chatflow_core::{
    ChatSender, ChatflowError, IMMessage, ImAdapter, MessageHandler, UserProfile,
    UserProfileAdapter,
};
use chatflow_im::ImRegistry;

/// Adapter type name used by [`MockImAdapter::register`].
pub const MOCK_IM_TYPE: &str = "mock";

/// A mock IM platform for testing.
///
/// Outbound messages are retrievable via [`sent_messages`](Self::sent_messages).
/// Inbound messages passed to [`receive`](Self::receive) reach the handler
/// bound with [`set_handler`](Self::set_handler).
#[derive(Default)]
pub struct MockImAdapter {
    sent: Mutex<Vec<(ChatSender, IMMessage)>>,
    handler: OnceLock<Arc<dyn MessageHandler>>,
    running: AtomicBool,
    fail_start: AtomicBool,
}

impl MockImAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next [`start`](ImAdapter::start) calls fail.
    pub fn fail_on_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Bind the handler inbound messages are delivered to. Only the first
    /// binding is kept.
    pub fn set_handler(&self, handler: Arc<dyn MessageHandler>) {
        let _ = self.handler.set(handler);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Deliver `message` as if it arrived from the platform.
    pub async fn receive(self: &Arc<Self>, message: IMMessage) -> Result<(), ChatflowError> {
        let handler = self
            .handler
            .get()
            .ok_or_else(|| ChatflowError::adapter("mock adapter has no message handler"))?;
        handler
            .handle_message(Arc::clone(self) as Arc<dyn ImAdapter>, message)
            .await;
        Ok(())
    }

    /// Messages sent so far, with their recipients.
    pub async fn sent_messages(&self) -> Vec<(ChatSender, IMMessage)> {
        self.sent.lock().await.clone()
    }

    /// Plain-text content of every message sent so far.
    pub async fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().await.iter().map(|(_, m)| m.content()).collect()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    pub async fn clear_sent(&self) {
        self.sent.lock().await.clear();
    }

    /// Register `adapter` as the single instance behind the `mock` adapter
    /// type. The constructing scope's `Arc<dyn MessageHandler>`, if any, is
    /// bound as its handler.
    pub fn register(registry: &ImRegistry, adapter: Arc<Self>) -> Result<(), ChatflowError> {
        registry.register_with_config(
            MOCK_IM_TYPE,
            Some("Mock"),
            move |_: serde_json::Value, scope| {
                if let Some(handler) = scope.try_resolve::<Arc<dyn MessageHandler>>() {
                    adapter.set_handler(handler);
                }
                Ok(Arc::clone(&adapter) as Arc<dyn ImAdapter>)
            },
        )
    }
}

impl std::fmt::Debug for MockImAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockImAdapter")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ImAdapter for MockImAdapter {
    /// Accepts `{"user_id", "display_name"?, "group_id"?, "text"}`.
    fn convert_to_message(&self, raw: &serde_json::Value) -> Result<IMMessage, ChatflowError> {
        let field = |key: &str| raw.get(key).and_then(serde_json::Value::as_str);
        let user_id = field("user_id").ok_or_else(|| ChatflowError::adapter("missing user_id"))?;
        let display_name = field("display_name").unwrap_or(user_id);
        let sender = match field("group_id") {
            Some(group_id) => ChatSender::from_group_chat(user_id, group_id, display_name),
            None => ChatSender::from_c2c_chat(user_id, display_name),
        };
        let message = IMMessage::text(sender, field("text").unwrap_or_default());
        Ok(match raw.as_object() {
            Some(map) => message.with_raw(map.clone()),
            None => message,
        })
    }

    async fn send_message(
        &self,
        message: &IMMessage,
        recipient: &ChatSender,
    ) -> Result<(), ChatflowError> {
        self.sent
            .lock()
            .await
            .push((recipient.clone(), message.clone()));
        Ok(())
    }

    async fn start(self: Arc<Self>) -> Result<(), ChatflowError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(ChatflowError::adapter("mock adapter configured to fail"));
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ChatflowError> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn as_user_profile(&self) -> Option<&dyn UserProfileAdapter> {
        Some(self)
    }
}

#[async_trait]
impl UserProfileAdapter for MockImAdapter {
    async fn query_user_profile(&self, chat: &ChatSender) -> Result<UserProfile, ChatflowError> {
        Ok(UserProfile {
            user_id: chat.user_id.clone(),
            display_name: Some(chat.display_name.clone()),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Echo {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MessageHandler for Echo {
        async fn handle_message(&self, adapter: Arc<dyn ImAdapter>, message: IMMessage) {
            self.seen.lock().await.push(message.content());
            let reply = IMMessage::text(ChatSender::bot(), format!("re: {}", message.content()));
            adapter.send_message(&reply, &message.sender).await.unwrap();
        }
    }

    #[tokio::test]
    async fn receive_reaches_handler_and_captures_reply() {
        let adapter = Arc::new(MockImAdapter::new());
        let echo = Arc::new(Echo::default());
        adapter.set_handler(echo.clone());

        let msg = IMMessage::text(ChatSender::from_c2c_chat("u1", "Ann"), "hello");
        adapter.receive(msg).await.unwrap();

        assert_eq!(*echo.seen.lock().await, ["hello"]);
        let sent = adapter.sent_messages().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.user_id, "u1");
        assert_eq!(sent[0].1.content(), "re: hello");
    }

    #[tokio::test]
    async fn receive_without_handler_fails() {
        let adapter = Arc::new(MockImAdapter::new());
        let msg = IMMessage::text(ChatSender::from_c2c_chat("u1", "Ann"), "hello");
        assert!(adapter.receive(msg).await.is_err());
    }

    #[test]
    fn convert_builds_group_sender() {
        let adapter = MockImAdapter::new();
        let msg = adapter
            .convert_to_message(&serde_json::json!({
                "user_id": "u1",
                "group_id": "g1",
                "text": "hi all",
            }))
            .unwrap();
        assert_eq!(msg.sender.group_id.as_deref(), Some("g1"));
        assert_eq!(msg.sender.display_name, "u1");
        assert_eq!(msg.content(), "hi all");
        assert!(adapter.convert_to_message(&serde_json::json!({})).is_err());
    }

    #[tokio::test]
    async fn start_failure_is_configurable() {
        let adapter = Arc::new(MockImAdapter::new());
        adapter.fail_on_start(true);
        assert!(Arc::clone(&adapter).start().await.is_err());
        assert!(!adapter.is_running());

        adapter.fail_on_start(false);
        Arc::clone(&adapter).start().await.unwrap();
        assert!(adapter.is_running());
        adapter.stop().await.unwrap();
        assert!(!adapter.is_running());
    }

    #[tokio::test]
    async fn sent_count_and_clear() {
        let adapter = MockImAdapter::new();
        let to = ChatSender::from_c2c_chat("u1", "Ann");
        let msg = IMMessage::text(ChatSender::bot(), "x");
        adapter.send_message(&msg, &to).await.unwrap();
        adapter.send_message(&msg, &to).await.unwrap();
        assert_eq!(adapter.sent_count().await, 2);
        adapter.clear_sent().await;
        assert_eq!(adapter.sent_count().await, 0);
    }
}
