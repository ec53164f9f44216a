// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Chatflow configuration system.

use chatflow_config::diagnostic::ConfigError;
use chatflow_config::model::GlobalConfig;
use chatflow_config::{load_and_validate, load_and_validate_str, load_config_from_str};
use serial_test::serial;

/// A complete config deserializes into the model.
#[test]
fn valid_yaml_deserializes_into_global_config() {
    let yaml = r#"
ims:
  - name: tg-main
    enable: true
    adapter: telegram
    config:
      token: "123:ABC"
llms:
  api_backends:
    - name: openai-main
      adapter: openai
      enable: true
      models: [gpt-4o, gpt-4o-mini]
      config:
        api_key: sk-test
defaults:
  llm_model: gpt-4o
memory:
  persistence:
    type: file
    file:
      storage_dir: /tmp/mem
  max_entries: 20
  default_scope: group
web:
  host: 0.0.0.0
  port: 9090
system:
  timezone: UTC
workflow:
  max_loop_iterations: 50
"#;

    let config = load_config_from_str(yaml).expect("valid YAML should deserialize");
    assert_eq!(config.ims.len(), 1);
    assert_eq!(config.ims[0].adapter, "telegram");
    assert_eq!(config.ims[0].config["token"], "123:ABC");
    assert_eq!(config.llms.api_backends[0].models, vec!["gpt-4o", "gpt-4o-mini"]);
    assert_eq!(config.defaults.llm_model, "gpt-4o");
    assert_eq!(config.memory.persistence.file.storage_dir, "/tmp/mem");
    assert_eq!(config.memory.max_entries, 20);
    assert_eq!(config.memory.default_scope, "group");
    assert_eq!(config.web.host, "0.0.0.0");
    assert_eq!(config.web.port, 9090);
    assert_eq!(config.system.timezone, "UTC");
    assert_eq!(config.workflow.max_loop_iterations, Some(50));
}

/// Missing sections fall back to defaults.
#[test]
fn empty_yaml_uses_defaults() {
    let config = load_config_from_str("{}").expect("empty YAML should use defaults");
    assert_eq!(config, GlobalConfig::default());
}

/// IM entries default `enable` to true and `adapter` to `dummy`.
#[test]
fn im_entry_defaults() {
    let yaml = "ims:\n  - name: only-name\n";
    let config = load_config_from_str(yaml).unwrap();
    assert!(config.ims[0].enable);
    assert_eq!(config.ims[0].adapter, "dummy");
}

/// Unknown top-level keys are kept and surfaced as warnings, not errors.
#[test]
fn unknown_top_level_keys_are_preserved() {
    let yaml = r#"
frpc:
  enable: false
memroy:
  max_entries: 3
"#;
    let loaded = load_and_validate_str(yaml).expect("unknown keys are permitted");
    assert!(loaded.config.extra.contains_key("frpc"));
    assert_eq!(loaded.warnings.len(), 2);

    let memroy = loaded
        .warnings
        .iter()
        .find(|w| matches!(w, ConfigError::UnknownKey { key, .. } if key == "memroy"))
        .expect("memroy warning");
    match memroy {
        ConfigError::UnknownKey {
            suggestion, span, ..
        } => {
            assert_eq!(suggestion.as_deref(), Some("memory"));
            assert!(span.is_some(), "inline source should give a span");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

/// Invalid type (string where number expected) produces an InvalidType diagnostic.
#[test]
fn invalid_type_is_reported_with_key_path() {
    let yaml = "web:\n  port: not_a_number\n";
    let errors = load_and_validate_str(yaml).expect_err("should reject invalid type");
    let has_invalid_type = errors
        .iter()
        .any(|e| matches!(e, ConfigError::InvalidType { detail, .. } if detail.contains("not_a_number")));
    assert!(has_invalid_type, "expected InvalidType for the port value, got: {errors:?}");
}

/// Validation errors are collected, not fail-fast.
#[test]
fn validation_collects_all_errors() {
    let yaml = r#"
web:
  port: 0
memory:
  max_entries: 0
  default_scope: everyone
"#;
    let errors = load_and_validate_str(yaml).expect_err("should fail validation");
    assert_eq!(errors.len(), 3, "got: {errors:?}");
    assert!(
        errors
            .iter()
            .all(|e| matches!(e, ConfigError::Validation { .. }))
    );
}

/// ConfigError can be rendered using miette's graphical handler.
#[test]
fn config_error_renders_with_miette() {
    use miette::{Diagnostic, GraphicalReportHandler};

    let error = ConfigError::UnknownKey {
        key: "memroy".to_string(),
        suggestion: Some("memory".to_string()),
        valid_keys: "ims, llms, memory".to_string(),
        span: None,
        src: None,
    };
    assert!(error.code().is_some());
    let help = error.help().expect("help text").to_string();
    assert!(help.contains("did you mean `memory`"), "got: {help}");

    let mut buf = String::new();
    GraphicalReportHandler::new()
        .render_report(&mut buf, &error)
        .expect("should render without error");
    assert!(buf.contains("memroy"));
}

/// A missing config file is not an error; defaults apply.
#[test]
#[serial]
fn missing_file_loads_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let loaded = load_and_validate(&dir.path().join("config.yaml")).expect("defaults validate");
    assert_eq!(loaded.config.web.port, 8080);
}

/// `CHATFLOW_*` variables override file values using the section map.
#[test]
#[serial]
fn env_vars_override_file_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "web:\n  port: 9000\nmemory:\n  max_entries: 10\n").unwrap();

    // SAFETY: env mutation is serialized by #[serial] across this test binary.
    unsafe {
        std::env::set_var("CHATFLOW_WEB_PORT", "9100");
        std::env::set_var("CHATFLOW_MEMORY_MAX_ENTRIES", "42");
    }
    let result = load_and_validate(&path);
    unsafe {
        std::env::remove_var("CHATFLOW_WEB_PORT");
        std::env::remove_var("CHATFLOW_MEMORY_MAX_ENTRIES");
    }

    let loaded = result.expect("env overrides should validate");
    assert_eq!(loaded.config.web.port, 9100);
    assert_eq!(loaded.config.memory.max_entries, 42);
}

/// A file saved with backup loads back to the same config.
#[test]
#[serial]
fn save_then_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");

    let mut config = GlobalConfig::default();
    config.plugins.enable.push("weather".into());
    config
        .extra
        .insert("custom".into(), serde_json::json!({"x": 1}));
    chatflow_config::save_config_with_backup(&path, &config).unwrap();

    let loaded = load_and_validate(&path).unwrap();
    assert_eq!(loaded.config, config);
}
