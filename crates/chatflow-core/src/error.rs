// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Chatflow runtime.

use thiserror::Error;

/// The primary error type used across all Chatflow crates.
#[derive(Debug, Error)]
pub enum ChatflowError {
    /// Configuration errors (invalid YAML, missing sections, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// A registry or container lookup missed.
    #[error("{kind} not found: {name}")]
    NotFound { kind: String, name: String },

    /// A registry already holds an entry under this key.
    #[error("{kind} already registered: {name}")]
    AlreadyRegistered { kind: String, name: String },

    /// A wire connects an output to an input of an incompatible type.
    #[error(
        "type mismatch on wire {source_block}.{source_output} -> {target_block}.{target_input}: \
         `{source_type}` is not compatible with `{target_type}`"
    )]
    TypeMismatch {
        source_block: String,
        source_output: String,
        source_type: String,
        target_block: String,
        target_input: String,
        target_type: String,
    },

    /// A block raised an error while executing; aborts the workflow run.
    #[error("block {block} execution failed: {message}")]
    BlockExecutionFailed { block: String, message: String },

    /// A dispatch rule could not be evaluated. Treated as a non-match.
    #[error("rule {rule} evaluation failed: {message}")]
    RuleEvaluationFailed { rule: String, message: String },

    /// An IM adapter failed to start.
    #[error("adapter {name} failed to start: {message}")]
    AdapterStartFailed { name: String, message: String },

    /// An LLM backend failed to load.
    #[error("backend {name} failed to load: {message}")]
    BackendLoadFailed { name: String, message: String },

    /// A plugin failed to load or run one of its hooks.
    #[error("plugin {name} failed to load: {message}")]
    PluginLoadFailed { name: String, message: String },

    /// The operation was cancelled by shutdown.
    #[error("operation cancelled")]
    Cancelled,

    /// Persistence errors (file IO, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// IM adapter errors (connection failure, message format).
    #[error("adapter error: {message}")]
    Adapter {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// LLM backend errors (API failure, model not found).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatflowError {
    /// Shorthand for [`ChatflowError::NotFound`].
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Shorthand for [`ChatflowError::AlreadyRegistered`].
    pub fn already_registered(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::AlreadyRegistered {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Shorthand for a [`ChatflowError::Storage`] wrapping any error.
    pub fn storage(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage {
            source: Box::new(source),
        }
    }

    /// Shorthand for an [`ChatflowError::Adapter`] without a source.
    pub fn adapter(message: impl Into<String>) -> Self {
        Self::Adapter {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a [`ChatflowError::Provider`] without a source.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
            source: None,
        }
    }

    /// Returns true for [`ChatflowError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<std::io::Error> for ChatflowError {
    fn from(e: std::io::Error) -> Self {
        Self::storage(e)
    }
}

impl From<serde_json::Error> for ChatflowError {
    fn from(e: serde_json::Error) -> Self {
        Self::storage(e)
    }
}
