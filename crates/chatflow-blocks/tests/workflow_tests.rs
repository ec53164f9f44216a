// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The preset workflows, run end to end against in-process adapters.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chatflow_blocks::im::{GetIMMessage, QueryUserProfile, SendIMMessage};
use chatflow_blocks::memory::CLEARED_REPLY;
use chatflow_blocks::{register_builtin_blocks, register_system_workflows};
use chatflow_config::model::LlmBackendConfig;
use chatflow_config::{GlobalConfig, shared};
use chatflow_core::{
    ChatSender, ChatflowError, IMMessage, ImAdapter, LlmAbility, LlmBackendAdapter, LlmChatRequest,
    LlmChatResponse, UserProfile, UserProfileAdapter,
};
use chatflow_dispatch::{CombinedDispatchRule, DispatchRuleRegistry, SimpleDispatchRule};
use chatflow_ioc::Container;
use chatflow_llm::{LlmBackendRegistry, LlmManager};
use chatflow_memory::{GroupScope, InMemoryPersistence, MemberScope, MemoryEntry, MemoryManager};
use chatflow_workflow::{
    BlockRegistry, ExecutionResults, NodeSpec, Value, WorkflowBuilder, WorkflowExecutor,
    WorkflowRegistry,
};

/// Records outbound messages and answers profile queries.
#[derive(Default)]
struct Recorder {
    sent: Mutex<Vec<(String, IMMessage)>>,
}

impl Recorder {
    fn sent(&self) -> Vec<(String, IMMessage)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImAdapter for Recorder {
    fn convert_to_message(&self, _: &serde_json::Value) -> Result<IMMessage, ChatflowError> {
        Err(ChatflowError::adapter("unsupported"))
    }

    async fn send_message(&self, message: &IMMessage, recipient: &ChatSender) -> Result<(), ChatflowError> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.user_id.clone(), message.clone()));
        Ok(())
    }

    async fn start(self: Arc<Self>) -> Result<(), ChatflowError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), ChatflowError> {
        Ok(())
    }

    fn as_user_profile(&self) -> Option<&dyn UserProfileAdapter> {
        Some(self)
    }
}

#[async_trait]
impl UserProfileAdapter for Recorder {
    async fn query_user_profile(&self, chat: &ChatSender) -> Result<UserProfile, ChatflowError> {
        Ok(UserProfile {
            user_id: chat.user_id.clone(),
            display_name: Some(chat.display_name.to_uppercase()),
            ..Default::default()
        })
    }
}

/// Replies `echo: <last message><break>bye` and keeps every request.
struct EchoLlm {
    requests: Arc<Mutex<Vec<LlmChatRequest>>>,
}

#[async_trait]
impl LlmBackendAdapter for EchoLlm {
    async fn chat(&self, request: LlmChatRequest) -> Result<LlmChatResponse, ChatflowError> {
        let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
        self.requests.lock().unwrap().push(request.clone());
        Ok(LlmChatResponse::from_text(request.model, format!("echo: {last}<break>bye")))
    }
}

struct Env {
    root: Arc<Container>,
    adapter: Arc<Recorder>,
    memory: Arc<MemoryManager>,
    rules: Arc<DispatchRuleRegistry>,
    workflows: Arc<WorkflowRegistry>,
    requests: Arc<Mutex<Vec<LlmChatRequest>>>,
    _dir: tempfile::TempDir,
}

fn env() -> Env {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = GlobalConfig::default();
    cfg.llms.api_backends = vec![LlmBackendConfig::new("local", "echo", vec!["echo-1".into()])];
    let config = shared(cfg);
    let root = Container::new();

    let blocks = Arc::new(BlockRegistry::new());
    register_builtin_blocks(&blocks).unwrap();
    let workflows = Arc::new(WorkflowRegistry::new(dir.path(), Arc::clone(&blocks)));
    register_system_workflows(&workflows);

    let requests = Arc::new(Mutex::new(Vec::new()));
    let llm_types = Arc::new(LlmBackendRegistry::new());
    {
        let requests = Arc::clone(&requests);
        llm_types
            .register_with_config("echo", LlmAbility::TEXT_CHAT, move |_: serde_json::Value, _| {
                Ok(Arc::new(EchoLlm {
                    requests: Arc::clone(&requests),
                }) as Arc<dyn LlmBackendAdapter>)
            })
            .unwrap();
    }
    let llm = Arc::new(LlmManager::new(Arc::clone(&root), config.clone(), llm_types));
    assert_eq!(llm.load_config(), 1);

    let memory = Arc::new(MemoryManager::new(config, Arc::new(InMemoryPersistence::new())));
    let rules = Arc::new(DispatchRuleRegistry::default());

    root.register(blocks);
    root.register(Arc::clone(&workflows));
    root.register(Arc::clone(&memory));
    root.register(llm);
    root.register(Arc::clone(&rules));

    Env {
        root,
        adapter: Arc::new(Recorder::default()),
        memory,
        rules,
        workflows,
        requests,
        _dir: dir,
    }
}

impl Env {
    async fn try_run(&self, builder: &WorkflowBuilder, message: IMMessage) -> Result<ExecutionResults, ChatflowError> {
        let scope = self.root.scoped();
        scope.register(Arc::clone(&self.adapter) as Arc<dyn ImAdapter>);
        scope.register(message);
        let workflow = builder.build(&scope)?;
        WorkflowExecutor::new(Arc::new(workflow), scope)?.run().await
    }

    async fn run(&self, workflow_id: &str, message: IMMessage) -> ExecutionResults {
        let builder = self.workflows.get(workflow_id).unwrap();
        self.try_run(&builder, message).await.unwrap()
    }
}

fn alice() -> ChatSender {
    ChatSender::from_c2c_chat("alice", "Alice")
}

fn alice_in_group() -> ChatSender {
    ChatSender::from_group_chat("alice", "g1", "Alice")
}

#[tokio::test]
async fn help_replies_with_active_rules() {
    let env = env();
    let mut rule = CombinedDispatchRule::single(
        "help",
        "system:help",
        SimpleDispatchRule::new("prefix").with("prefix", "/help"),
    );
    rule.description = "List commands".into();
    env.rules.register(rule).unwrap();

    env.run("system:help", IMMessage::text(alice(), "/help")).await;

    let sent = env.adapter.sent();
    assert_eq!(sent.len(), 1);
    let (recipient, reply) = &sent[0];
    assert_eq!(recipient, "alice");
    assert!(reply.sender.is_bot());
    assert!(reply.content().contains("[SYSTEM]"));
    assert!(reply.content().contains("input starts with /help"));
    assert!(reply.content().contains("Description: List commands"));
}

#[tokio::test]
async fn clear_memory_wipes_group_and_member_scopes() {
    let env = env();
    let sender = alice_in_group();
    env.memory
        .store(&GroupScope, &sender, vec![MemoryEntry::new(sender.clone(), "group note")])
        .await
        .unwrap();
    env.memory
        .store(&MemberScope, &sender, vec![MemoryEntry::new(sender.clone(), "member note")])
        .await
        .unwrap();

    env.run("system:clear_memory", IMMessage::text(sender.clone(), "/clear")).await;

    assert!(env.memory.query(&GroupScope, &sender).await.unwrap().is_empty());
    assert!(env.memory.query(&MemberScope, &sender).await.unwrap().is_empty());
    let sent = env.adapter.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.content(), CLEARED_REPLY);
}

#[tokio::test]
async fn chat_replies_in_parts_and_remembers_the_exchange() {
    let env = env();

    env.run("chat:normal", IMMessage::text(alice(), "hi")).await;
    let sent = env.adapter.sent();
    assert_eq!(sent.len(), 1);
    let texts: Vec<String> = sent[0].1.elements.iter().map(|e| e.to_plain()).collect();
    assert_eq!(texts, ["echo: Alice says: hi", "bye"]);

    env.run("chat:normal", IMMessage::text(alice(), "again")).await;
    let requests = env.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].model.as_deref(), Some("echo-1"));
    let system = &requests[1].messages[0].content;
    assert!(system.contains("Alice said: hi"));
    assert!(system.contains("<@LLM> said: echo: Alice says: hi<break>bye"));
    assert!(!system.contains("{memory_content}"));
    assert_eq!(requests[1].messages[1].content, "Alice says: again");
}

#[tokio::test]
async fn unknown_im_name_fails_the_run() {
    let env = env();
    let builder = WorkflowBuilder::new("misrouted")
        .use_block(NodeSpec::of::<GetIMMessage>().name("get_message"))
        .chain(NodeSpec::of::<SendIMMessage>().name("send").param("im_name", "nowhere"));

    let result = env.try_run(&builder, IMMessage::text(alice(), "x")).await;
    assert!(result.is_err());
    assert!(env.adapter.sent().is_empty());
}

#[tokio::test]
async fn profile_query_goes_through_the_dispatching_adapter() {
    let env = env();
    let builder = WorkflowBuilder::new("whois")
        .use_block(NodeSpec::of::<GetIMMessage>().name("get_message"))
        .chain(NodeSpec::of::<QueryUserProfile>().name("profile"));

    let results = env.try_run(&builder, IMMessage::text(alice(), "x")).await.unwrap();
    let profile = results["profile"].get("profile").and_then(Value::as_profile).unwrap();
    assert_eq!(profile.user_id, "alice");
    assert_eq!(profile.display_name.as_deref(), Some("ALICE"));
}
