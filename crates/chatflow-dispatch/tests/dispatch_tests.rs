// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rule matching and dispatch through real workflows.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chatflow_core::{ChatSender, ChatflowError, IMMessage, ImAdapter, MessageHandler};
use chatflow_dispatch::{
    CombinedDispatchRule, DispatchRuleRegistry, RuleGroup, RuleTypeRegistry, SimpleDispatchRule,
    WorkflowDispatcher,
};
use chatflow_ioc::Container;
use chatflow_workflow::{
    Block, BlockContext, BlockDefinition, BlockRegistry, BlockSchema, ConfigSpec, Inputs,
    NodeSpec, OutputSpec, Outputs, Params, WorkflowBuilder, WorkflowRegistry, names,
};
use futures::future::join_all;

/// Tags of the workflows that ran, with the message content they saw.
#[derive(Clone, Default)]
struct RunLog(Arc<Mutex<Vec<(String, String)>>>);

impl RunLog {
    fn tags(&self) -> Vec<String> {
        self.0.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
    }
}

struct Marker {
    tag: String,
}

#[async_trait]
impl Block for Marker {
    async fn execute(&self, ctx: &BlockContext, _: Inputs) -> Result<Outputs, ChatflowError> {
        let message = ctx.resolve::<IMMessage>()?;
        if let Some(log) = ctx.try_resolve::<RunLog>() {
            log.0.lock().unwrap().push((self.tag.clone(), message.content()));
        }
        Ok(Outputs::new().with("tag", self.tag.clone()))
    }
}

impl BlockDefinition for Marker {
    fn schema() -> BlockSchema {
        BlockSchema::new()
            .output(OutputSpec::new("tag", names::STR))
            .config(ConfigSpec::new("tag", names::STR).required())
    }

    fn from_params(params: &Params) -> Result<Self, ChatflowError> {
        Ok(Self {
            tag: params.string_or("tag", ""),
        })
    }
}

struct NullAdapter;

#[async_trait]
impl ImAdapter for NullAdapter {
    fn convert_to_message(&self, _: &serde_json::Value) -> Result<IMMessage, ChatflowError> {
        Err(ChatflowError::adapter("unsupported"))
    }

    async fn send_message(&self, _: &IMMessage, _: &ChatSender) -> Result<(), ChatflowError> {
        Ok(())
    }

    async fn start(self: Arc<Self>) -> Result<(), ChatflowError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), ChatflowError> {
        Ok(())
    }
}

struct Harness {
    rules: Arc<DispatchRuleRegistry>,
    dispatcher: WorkflowDispatcher,
    log: RunLog,
    _dir: tempfile::TempDir,
}

fn harness(workflows: &[&str]) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let container = Container::new();
    let block_registry = Arc::new(BlockRegistry::new());
    let workflow_registry = Arc::new(WorkflowRegistry::new(dir.path(), Arc::clone(&block_registry)));
    for id in workflows {
        let (group, name) = id.split_once(':').unwrap();
        workflow_registry.register(
            group,
            name,
            WorkflowBuilder::new(*id).use_block(NodeSpec::of::<Marker>().param("tag", *id)),
        );
    }
    let rules = Arc::new(DispatchRuleRegistry::default());
    let log = RunLog::default();

    container.register(block_registry);
    container.register(workflow_registry);
    container.register(Arc::clone(&rules));
    container.register(log.clone());

    Harness {
        rules,
        dispatcher: WorkflowDispatcher::new(container),
        log,
        _dir: dir,
    }
}

fn adapter() -> Arc<dyn ImAdapter> {
    Arc::new(NullAdapter)
}

fn c2c(text: &str) -> IMMessage {
    IMMessage::text(ChatSender::from_c2c_chat("alice", "Alice"), text)
}

fn group(text: &str) -> IMMessage {
    IMMessage::text(ChatSender::from_group_chat("alice", "g1", "Alice"), text)
}

fn fallback(id: &str, workflow: &str) -> CombinedDispatchRule {
    CombinedDispatchRule::single(id, workflow, SimpleDispatchRule::new("fallback")).priority(0)
}

/// Matches every message without being a fallback, so its priority is kept.
fn catch_all(id: &str, workflow: &str) -> CombinedDispatchRule {
    CombinedDispatchRule::single(id, workflow, SimpleDispatchRule::new("prefix").with("prefix", ""))
}

#[tokio::test]
async fn prefix_rule_selects_its_workflow_over_fallback() {
    let h = harness(&["system:help", "chat:normal"]);
    h.rules
        .register(CombinedDispatchRule::single(
            "help",
            "system:help",
            SimpleDispatchRule::new("prefix").with("prefix", "/help"),
        ))
        .unwrap();
    h.rules.register(fallback("fallback", "chat:normal")).unwrap();

    let results = h.dispatcher.try_dispatch(adapter(), c2c("/help")).await.unwrap();
    assert!(results.is_some());
    assert_eq!(h.log.tags(), ["system:help"]);

    h.dispatcher.try_dispatch(adapter(), c2c("hello")).await.unwrap();
    assert_eq!(h.log.tags(), ["system:help", "chat:normal"]);
}

#[tokio::test]
async fn and_group_requires_every_rule() {
    let h = harness(&["game:ping"]);
    h.rules
        .register(CombinedDispatchRule::new("ping", "game:ping").group(RuleGroup::and(vec![
            SimpleDispatchRule::new("prefix").with("prefix", "!"),
            SimpleDispatchRule::new("chat_type").with("chat_type", "group"),
        ])))
        .unwrap();

    let miss = h.dispatcher.try_dispatch(adapter(), c2c("!ping")).await.unwrap();
    assert!(miss.is_none());
    assert!(h.log.tags().is_empty());

    let hit = h.dispatcher.try_dispatch(adapter(), group("!ping")).await.unwrap();
    assert!(hit.is_some());
    assert_eq!(h.log.0.lock().unwrap()[0], ("game:ping".to_string(), "!ping".to_string()));
}

#[tokio::test]
async fn equal_priority_prefers_earlier_rule() {
    let h = harness(&["test:a", "test:b"]);
    h.rules.register(catch_all("a", "test:a").priority(5)).unwrap();
    h.rules.register(catch_all("b", "test:b").priority(5)).unwrap();

    h.dispatcher.try_dispatch(adapter(), c2c("x")).await.unwrap();
    assert_eq!(h.log.tags(), ["test:a"]);
}

#[tokio::test]
async fn unregistered_workflow_falls_through_to_next_rule() {
    let h = harness(&["chat:normal"]);
    h.rules
        .register(CombinedDispatchRule::single(
            "ghost",
            "missing:workflow",
            SimpleDispatchRule::new("keyword").with("keywords", serde_json::json!(["x"])),
        ))
        .unwrap();
    h.rules.register(fallback("fallback", "chat:normal")).unwrap();

    h.dispatcher.try_dispatch(adapter(), c2c("x")).await.unwrap();
    assert_eq!(h.log.tags(), ["chat:normal"]);
}

#[tokio::test]
async fn disabled_rules_are_ignored() {
    let h = harness(&["test:a"]);
    h.rules.register(fallback("a", "test:a")).unwrap();
    h.rules.disable_rule("a").unwrap();
    assert!(h.dispatcher.dispatch(adapter(), c2c("x")).await.is_none());

    h.rules.enable_rule("a").unwrap();
    assert!(h.dispatcher.dispatch(adapter(), c2c("x")).await.is_some());
}

#[tokio::test]
async fn message_handler_runs_concurrent_dispatches_independently() {
    let h = harness(&["chat:normal"]);
    h.rules.register(fallback("fallback", "chat:normal")).unwrap();

    let handler: &dyn MessageHandler = &h.dispatcher;
    join_all(["one", "two", "three"].map(|t| handler.handle_message(adapter(), c2c(t)))).await;

    let mut seen: Vec<String> = h.log.0.lock().unwrap().iter().map(|(_, c)| c.clone()).collect();
    seen.sort();
    assert_eq!(seen, ["one", "three", "two"]);
}

#[tokio::test]
async fn missing_registries_surface_as_errors() {
    let dispatcher = WorkflowDispatcher::new(Container::new());
    let err = dispatcher.try_dispatch(adapter(), c2c("x")).await.err().unwrap();
    assert!(err.is_not_found());
    assert!(dispatcher.dispatch(adapter(), c2c("x")).await.is_none());
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    fn constant(registry: &RuleTypeRegistry) {
        registry
            .register_typed("yes", |_: serde_json::Value| Ok(|_: &IMMessage| true))
            .unwrap();
        registry
            .register_typed("no", |_: serde_json::Value| Ok(|_: &IMMessage| false))
            .unwrap();
    }

    proptest! {
        #[test]
        fn active_rules_are_ordered_by_priority_then_insertion(
            priorities in proptest::collection::vec(0i32..4, 1..12),
        ) {
            let registry = DispatchRuleRegistry::default();
            for (i, p) in priorities.iter().enumerate() {
                registry.register(catch_all(&format!("r{i}"), "test:wf").priority(*p)).unwrap();
            }
            let active = registry.get_active_rules();
            for pair in active.windows(2) {
                let (a, b) = (pair[0].rule(), pair[1].rule());
                prop_assert!(a.priority >= b.priority);
                if a.priority == b.priority {
                    let index = |id: &str| id[1..].parse::<usize>().unwrap();
                    prop_assert!(index(&a.rule_id) < index(&b.rule_id));
                }
            }
        }

        #[test]
        fn combined_rule_matches_iff_every_group_matches(
            groups in proptest::collection::vec(
                (any::<bool>(), proptest::collection::vec(any::<bool>(), 1..4)),
                0..4,
            ),
        ) {
            let types = Arc::new(RuleTypeRegistry::with_builtins());
            constant(&types);
            let registry = DispatchRuleRegistry::new(types);

            let mut rule = CombinedDispatchRule::new("r", "test:wf");
            for (is_and, values) in &groups {
                let rules = values
                    .iter()
                    .map(|v| SimpleDispatchRule::new(if *v { "yes" } else { "no" }))
                    .collect();
                rule = rule.group(if *is_and { RuleGroup::and(rules) } else { RuleGroup::or(rules) });
            }
            registry.register(rule).unwrap();

            let expected = groups.iter().all(|(is_and, values)| {
                if *is_and { values.iter().all(|v| *v) } else { values.iter().any(|v| *v) }
            });
            let active = registry.get_active_rules();
            prop_assert_eq!(active[0].matches(&c2c("anything")), expected);
        }
    }
}
