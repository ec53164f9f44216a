// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` boots the registries, managers, and dispatcher into a root
//! container the way the server does, with [`MockImAdapter`] and
//! [`MockLlmBackend`] in place of real platforms. Memory lives in process.

use std::sync::Arc;

use chatflow_blocks::{register_builtin_blocks, register_system_workflows};
use chatflow_bus::EventBus;
use chatflow_config::model::{ImConfig, LlmBackendConfig};
use chatflow_config::{GlobalConfig, SharedConfig, shared};
use chatflow_core::{ChatSender, ChatflowError, IMMessage, ImAdapter, MessageHandler};
use chatflow_dispatch::{
    CombinedDispatchRule, DispatchRuleRegistry, RuleTypeRegistry, SimpleDispatchRule,
    WorkflowDispatcher,
};
use chatflow_im::{ImManager, ImRegistry};
use chatflow_ioc::Container;
use chatflow_llm::{LlmBackendRegistry, LlmManager};
use chatflow_memory::{InMemoryPersistence, MemoryManager};
use chatflow_workflow::{BlockRegistry, ExecutionResults, WorkflowRegistry};

use crate::mock_im::{MOCK_IM_TYPE, MockImAdapter};
use crate::mock_llm::{MOCK_LLM_TYPE, MockLlmBackend};

/// Name of the mock IM adapter instance.
pub const MOCK_IM_NAME: &str = "mock";

/// Model served by the mock LLM backend.
pub const MOCK_MODEL: &str = "mock-model";

/// `/help`, `/clear`, and a chat fallback, like a fresh install.
pub fn default_rules() -> Vec<CombinedDispatchRule> {
    let help = CombinedDispatchRule::single(
        "help",
        "system:help",
        SimpleDispatchRule::new("prefix").with("prefix", "/help"),
    )
    .priority(10);
    let clear = CombinedDispatchRule::single(
        "clear_memory",
        "system:clear_memory",
        SimpleDispatchRule::new("prefix").with("prefix", "/clear"),
    )
    .priority(10);
    let chat = CombinedDispatchRule::single("chat", "chat:normal", SimpleDispatchRule::new("fallback"))
        .priority(0);
    vec![help, clear, chat]
}

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    responses: Vec<String>,
    rules: Option<Vec<CombinedDispatchRule>>,
    config: GlobalConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            responses: Vec::new(),
            rules: None,
            config: GlobalConfig::default(),
        }
    }

    /// Set mock LLM responses.
    pub fn with_mock_responses(mut self, responses: Vec<String>) -> Self {
        self.responses = responses;
        self
    }

    /// Replace the default dispatch rules.
    pub fn with_rules(mut self, rules: Vec<CombinedDispatchRule>) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Start from `config` instead of the defaults. The mock IM adapter and
    /// LLM backend are added to it.
    pub fn with_config(mut self, config: GlobalConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the harness, creating all registries and managers.
    pub async fn build(self) -> Result<TestHarness, ChatflowError> {
        let temp_dir = tempfile::TempDir::new().map_err(ChatflowError::storage)?;

        let mut config = self.config;
        config.ims.push(ImConfig::new(MOCK_IM_NAME, MOCK_IM_TYPE));
        config.llms.api_backends.push(LlmBackendConfig::new(
            "mock",
            MOCK_LLM_TYPE,
            vec![MOCK_MODEL.to_string()],
        ));
        let config = shared(config);

        let container = Container::new();
        container.register(config.clone());
        let bus = Arc::new(EventBus::new());
        container.register(Arc::clone(&bus));

        let blocks = Arc::new(BlockRegistry::new());
        register_builtin_blocks(&blocks)?;
        container.register(Arc::clone(blocks.type_system()));
        container.register(Arc::clone(&blocks));

        let workflows = Arc::new(WorkflowRegistry::new(
            temp_dir.path().join("workflows"),
            Arc::clone(&blocks),
        ));
        register_system_workflows(&workflows);
        container.register(Arc::clone(&workflows));

        let rules = Arc::new(DispatchRuleRegistry::new(Arc::new(
            RuleTypeRegistry::with_builtins(),
        )));
        for rule in self.rules.unwrap_or_else(default_rules) {
            rules.register(rule)?;
        }
        container.register(Arc::clone(&rules));

        let im_registry = Arc::new(ImRegistry::new());
        let im = Arc::new(MockImAdapter::new());
        MockImAdapter::register(&im_registry, Arc::clone(&im))?;
        container.register(Arc::clone(&im_registry));

        let llm_registry = Arc::new(LlmBackendRegistry::new());
        let llm = Arc::new(MockLlmBackend::with_responses(self.responses));
        MockLlmBackend::register(&llm_registry, Arc::clone(&llm))?;
        container.register(Arc::clone(&llm_registry));

        let im_manager = Arc::new(ImManager::new(
            Arc::clone(&container),
            config.clone(),
            im_registry,
        ));
        container.register(Arc::clone(&im_manager));
        let llm_manager = Arc::new(LlmManager::new(
            Arc::clone(&container),
            config.clone(),
            llm_registry,
        ));
        container.register(Arc::clone(&llm_manager));

        let dispatcher = Arc::new(WorkflowDispatcher::new(Arc::clone(&container)));
        container.register(Arc::clone(&dispatcher));
        container.register(Arc::clone(&dispatcher) as Arc<dyn MessageHandler>);

        let memory = Arc::new(MemoryManager::new(
            config.clone(),
            Arc::new(InMemoryPersistence::new()),
        ));
        container.register(Arc::clone(&memory));

        llm_manager.load_config();
        im_manager.create_adapter(MOCK_IM_NAME).await?;

        Ok(TestHarness {
            container,
            config,
            bus,
            blocks,
            workflows,
            rules,
            im_manager,
            llm_manager,
            memory,
            dispatcher,
            im,
            llm,
            _temp_dir: temp_dir,
        })
    }
}

/// A booted runtime for end-to-end tests.
///
/// The temp directory is dropped (and deleted) with the harness.
pub struct TestHarness {
    pub container: Arc<Container>,
    pub config: SharedConfig,
    pub bus: Arc<EventBus>,
    pub blocks: Arc<BlockRegistry>,
    pub workflows: Arc<WorkflowRegistry>,
    pub rules: Arc<DispatchRuleRegistry>,
    pub im_manager: Arc<ImManager>,
    pub llm_manager: Arc<LlmManager>,
    pub memory: Arc<MemoryManager>,
    pub dispatcher: Arc<WorkflowDispatcher>,
    pub im: Arc<MockImAdapter>,
    pub llm: Arc<MockLlmBackend>,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Sender used by [`send_text`](Self::send_text).
    pub fn default_sender() -> ChatSender {
        ChatSender::from_c2c_chat("tester", "Tester")
    }

    /// Dispatch `message` through the mock adapter, propagating workflow
    /// errors.
    pub async fn dispatch(
        &self,
        message: IMMessage,
    ) -> Result<Option<ExecutionResults>, ChatflowError> {
        let adapter = Arc::clone(&self.im) as Arc<dyn ImAdapter>;
        self.dispatcher.try_dispatch(adapter, message).await
    }

    /// Send `text` from `sender` and return the replies it produced.
    pub async fn send_as(
        &self,
        sender: ChatSender,
        text: &str,
    ) -> Result<Vec<IMMessage>, ChatflowError> {
        let before = self.im.sent_count().await;
        self.dispatch(IMMessage::text(sender, text)).await?;
        let sent = self.im.sent_messages().await;
        Ok(sent.into_iter().skip(before).map(|(_, m)| m).collect())
    }

    /// Send `text` from [`default_sender`](Self::default_sender).
    pub async fn send_text(&self, text: &str) -> Result<Vec<IMMessage>, ChatflowError> {
        self.send_as(Self::default_sender(), text).await
    }
}

impl std::fmt::Debug for TestHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestHarness").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn harness_boots_with_mock_backends() {
        let harness = TestHarness::builder().build().await.unwrap();
        assert!(harness.im_manager.has_adapter(MOCK_IM_NAME));
        assert_eq!(harness.llm_manager.active_models(), [MOCK_MODEL]);
        assert_eq!(harness.rules.get_active_rules().len(), 3);
        assert!(harness.workflows.get("chat:normal").is_some());
    }

    #[tokio::test]
    async fn chat_reply_comes_from_mock_llm() {
        let harness = TestHarness::builder()
            .with_mock_responses(vec!["Hello from Chatflow!".to_string()])
            .build()
            .await
            .unwrap();

        let replies = harness.send_text("Hi there").await.unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].content(), "Hello from Chatflow!");
        assert_eq!(harness.llm.requests()[0].model.as_deref(), Some(MOCK_MODEL));
    }
}
