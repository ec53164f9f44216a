// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for backend loading and model routing.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chatflow_bus::{EventBus, LLMAdapterLoaded, LLMAdapterUnloaded};
use chatflow_config::GlobalConfig;
use chatflow_config::model::LlmBackendConfig;
use chatflow_core::{ChatflowError, LlmAbility, LlmBackendAdapter, LlmChatRequest, LlmChatResponse};
use chatflow_ioc::Container;
use chatflow_llm::{FirstSelector, LlmBackendRegistry, LlmManager};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
struct EchoConfig {
    prefix: String,
}

struct EchoBackend {
    prefix: String,
}

#[async_trait]
impl LlmBackendAdapter for EchoBackend {
    async fn chat(&self, request: LlmChatRequest) -> Result<LlmChatResponse, ChatflowError> {
        let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
        Ok(LlmChatResponse::from_text(None, format!("{}{last}", self.prefix)))
    }
}

fn backend(name: &str, adapter: &str, models: &[&str], prefix: &str) -> LlmBackendConfig {
    let mut b = LlmBackendConfig::new(name, adapter, models.iter().map(|m| m.to_string()).collect());
    b.config.insert("prefix".into(), prefix.into());
    b
}

fn setup(backends: Vec<LlmBackendConfig>) -> (Arc<Container>, LlmManager) {
    let mut cfg = GlobalConfig::default();
    cfg.llms.api_backends = backends;
    let container = Container::new();
    let registry = Arc::new(LlmBackendRegistry::new());
    registry
        .register_with_config("echo", LlmAbility::TEXT_CHAT, |c: EchoConfig, _scope| {
            Ok(Arc::new(EchoBackend { prefix: c.prefix }) as Arc<dyn LlmBackendAdapter>)
        })
        .unwrap();
    registry
        .register_with_config(
            "painter",
            LlmAbility::IMAGE_GENERATION,
            |c: EchoConfig, _scope| Ok(Arc::new(EchoBackend { prefix: c.prefix }) as Arc<dyn LlmBackendAdapter>),
        )
        .unwrap();
    let manager = LlmManager::new(
        Arc::clone(&container),
        chatflow_config::shared(cfg),
        registry,
    );
    (container, manager)
}

#[tokio::test]
async fn loaded_backend_serves_its_models() {
    let (_, manager) = setup(vec![backend("a", "echo", &["m1", "m2"], "A:")]);
    assert_eq!(manager.load_config(), 1);

    let llm = manager.get_llm("m2").unwrap();
    let resp = llm
        .chat(LlmChatRequest {
            messages: vec![chatflow_core::LlmChatMessage::user("hi")],
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(resp.text(), "A:hi");
    assert!(manager.is_backend_available("a"));
    assert!(manager.get_llm("m3").is_none());
}

#[test]
fn unload_removes_backend_from_every_model() {
    let (_, manager) = setup(vec![
        backend("a", "echo", &["m1", "shared"], "A:"),
        backend("b", "echo", &["shared"], "B:"),
    ]);
    manager.load_config();
    manager.unload_backend("a").unwrap();

    assert!(manager.get_llm("m1").is_none());
    assert!(manager.get_llm("shared").is_some());
    assert_eq!(manager.active_models(), vec!["shared"]);
    assert!(!manager.is_backend_available("a"));
}

#[test]
fn double_load_and_unknown_backend_error() {
    let (_, manager) = setup(vec![backend("a", "echo", &["m1"], "A:")]);
    manager.load_backend("a").unwrap();
    assert!(matches!(
        manager.load_backend("a"),
        Err(ChatflowError::AlreadyRegistered { .. })
    ));
    assert!(manager.load_backend("missing").unwrap_err().is_not_found());
    assert!(manager.unload_backend("missing").unwrap_err().is_not_found());
}

#[test]
fn bad_settings_and_unknown_type_fail_in_isolation() {
    let mut broken = backend("broken", "echo", &["m1"], "x");
    broken.config.remove("prefix");
    let (_, manager) = setup(vec![
        broken,
        backend("ghost", "nope", &["m2"], "x"),
        backend("ok", "echo", &["m3"], "x"),
    ]);
    assert_eq!(manager.load_config(), 1);
    assert!(matches!(
        manager.load_backend("broken"),
        Err(ChatflowError::BackendLoadFailed { .. })
    ));
    assert_eq!(manager.loaded_backends(), vec!["ok"]);
}

#[test]
fn disabled_backend_is_not_loaded() {
    let mut off = backend("off", "echo", &["m1"], "x");
    off.enable = false;
    let (_, manager) = setup(vec![off]);
    assert_eq!(manager.load_config(), 0);
    assert!(matches!(
        manager.load_backend("off"),
        Err(ChatflowError::BackendLoadFailed { .. })
    ));
}

#[test]
fn ability_lookup_requires_superset() {
    let (_, manager) = setup(vec![
        backend("chat", "echo", &["gpt"], "x"),
        backend("img", "painter", &["dalle"], "x"),
    ]);
    manager.load_config();
    assert_eq!(manager.get_supported_models(LlmAbility::TEXT_CHAT), vec!["gpt"]);
    assert_eq!(
        manager.get_llm_id_by_ability(LlmAbility::IMAGE_OUTPUT).as_deref(),
        Some("dalle")
    );
    assert!(manager.get_llm_id_by_ability(LlmAbility::AUDIO_OUTPUT).is_none());
    assert_eq!(
        manager.registry().search_adapter_by_ability(LlmAbility::TEXT_INPUT),
        vec!["echo", "painter"]
    );
}

#[test]
fn reload_and_events() {
    let (container, manager) = setup(vec![backend("a", "echo", &["m1"], "A:")]);
    let bus = Arc::new(EventBus::new());
    container.register(Arc::clone(&bus));
    let log = Arc::new(Mutex::new(Vec::new()));
    let l = Arc::clone(&log);
    bus.register(move |e: &LLMAdapterLoaded| {
        l.lock().unwrap().push(format!("loaded:{}", e.backend));
        Ok(())
    });
    let l = Arc::clone(&log);
    bus.register(move |e: &LLMAdapterUnloaded| {
        l.lock().unwrap().push(format!("unloaded:{}", e.backend));
        Ok(())
    });

    manager.load_backend("a").unwrap();
    manager.reload_backend("a").unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec!["loaded:a", "unloaded:a", "loaded:a"]
    );
}

#[test]
fn first_selector_is_deterministic() {
    let (_, manager) = setup(vec![
        backend("a", "echo", &["m"], "A:"),
        backend("b", "echo", &["m"], "B:"),
    ]);
    let manager = manager.with_selector(Arc::new(FirstSelector));
    manager.load_config();
    let first = manager.get_llm("m").unwrap();
    assert!(Arc::ptr_eq(&first, &manager.get("a").unwrap()));
}
