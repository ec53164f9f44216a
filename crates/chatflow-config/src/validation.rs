// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks constraints serde cannot express: value ranges, enumerated
//! strings, and name uniqueness across list entries.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::GlobalConfig;

/// Memory scope names accepted by `memory.default_scope`.
pub const MEMORY_SCOPES: &[&str] = &["member", "group", "global"];

/// Persistence back-ends accepted by `memory.persistence.type`.
pub const PERSISTENCE_TYPES: &[&str] = &["file", "redis"];

/// Validate a deserialized configuration.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &GlobalConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.web.port == 0 {
        errors.push(ConfigError::validation("web.port must be non-zero"));
    }

    if config.web.host.trim().is_empty() {
        errors.push(ConfigError::validation("web.host must not be empty"));
    }

    if config.memory.max_entries == 0 {
        errors.push(ConfigError::validation(
            "memory.max_entries must be greater than zero",
        ));
    }

    if !MEMORY_SCOPES.contains(&config.memory.default_scope.as_str()) {
        errors.push(ConfigError::validation(format!(
            "memory.default_scope `{}` must be one of {}",
            config.memory.default_scope,
            MEMORY_SCOPES.join(", ")
        )));
    }

    if !PERSISTENCE_TYPES.contains(&config.memory.persistence.kind.as_str()) {
        errors.push(ConfigError::validation(format!(
            "memory.persistence.type `{}` must be one of {}",
            config.memory.persistence.kind,
            PERSISTENCE_TYPES.join(", ")
        )));
    }

    let mut seen_ims = HashSet::new();
    for (i, im) in config.ims.iter().enumerate() {
        if im.name.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "ims[{i}].name must not be empty"
            )));
        } else if !seen_ims.insert(im.name.as_str()) {
            errors.push(ConfigError::validation(format!(
                "duplicate IM adapter name `{}` in ims",
                im.name
            )));
        }
        if im.adapter.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "ims[{i}].adapter must not be empty"
            )));
        }
    }

    let mut seen_backends = HashSet::new();
    for (i, backend) in config.llms.api_backends.iter().enumerate() {
        if backend.name.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "llms.api_backends[{i}].name must not be empty"
            )));
        } else if !seen_backends.insert(backend.name.as_str()) {
            errors.push(ConfigError::validation(format!(
                "duplicate LLM backend name `{}` in llms.api_backends",
                backend.name
            )));
        }
        if backend.adapter.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "llms.api_backends[{i}].adapter must not be empty"
            )));
        }
    }

    if config.workflow.max_loop_iterations == Some(0) {
        errors.push(ConfigError::validation(
            "workflow.max_loop_iterations must be at least 1 when set",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
