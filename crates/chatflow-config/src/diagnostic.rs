// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Figment-to-miette error bridge with fuzzy match suggestions.
//!
//! Deserialization failures become [`ConfigError`] diagnostics carrying the
//! YAML source and a span where one can be found. Unrecognized top-level
//! keys are tolerated by the loader but reported as warnings with a
//! "did you mean?" hint.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::model::GlobalConfig;

/// Minimum Jaro-Winkler similarity score to suggest a correction.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// Keys understood at the top level of `config.yaml`.
pub const TOP_LEVEL_KEYS: &[&str] = &[
    "ims", "llms", "defaults", "memory", "web", "plugins", "update", "system", "workflow",
];

/// A configuration error with rich diagnostic information.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// A key the runtime does not understand. Reported as a warning.
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(
        code(chatflow::config::unknown_key),
        severity(Warning),
        help("{}", format_unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        suggestion: Option<String>,
        valid_keys: String,
        #[label("this key is not recognized")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A configuration value has the wrong type.
    #[error("invalid type for key `{key}`: {detail}")]
    #[diagnostic(code(chatflow::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        key: String,
        detail: String,
        expected: String,
        #[label("wrong type here")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A required configuration key is missing.
    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(chatflow::config::missing_key),
        help("add `{key}: <value>` to your config.yaml")
    )]
    MissingKey { key: String },

    /// A semantic constraint failed after deserialization.
    #[error("validation error: {message}")]
    #[diagnostic(code(chatflow::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(chatflow::config::other))]
    Other(String),
}

impl ConfigError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Warnings do not stop the process from starting.
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::UnknownKey { .. })
    }
}

fn format_unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// Convert a `figment::Error` into a list of `ConfigError` diagnostics.
pub fn figment_to_config_errors(
    err: figment::Error,
    yaml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    let mut errors = Vec::new();

    for error in err {
        let config_error = match &error.kind {
            Kind::UnknownField(field, expected) => {
                let valid_keys: Vec<&str> = expected.to_vec();
                let suggestion = suggest_key(field, &valid_keys);
                let section: Vec<String> = error.path.iter().map(|s| s.to_string()).collect();
                let (span, src) = find_source_span(&error, &section, field, yaml_sources);
                ConfigError::UnknownKey {
                    key: field.clone(),
                    suggestion,
                    valid_keys: valid_keys.join(", "),
                    span,
                    src,
                }
            }
            Kind::MissingField(field) => ConfigError::MissingKey {
                key: field.clone().into_owned(),
            },
            Kind::InvalidType(actual, expected) => {
                let path: Vec<String> = error.path.iter().map(|s| s.to_string()).collect();
                let (span, src) = match path.split_last() {
                    Some((field, section)) => {
                        find_source_span(&error, section, field, yaml_sources)
                    }
                    None => (None, None),
                };
                ConfigError::InvalidType {
                    key: path.join("."),
                    detail: format!("found {actual}, expected {expected}"),
                    expected: expected.to_string(),
                    span,
                    src,
                }
            }
            _ => ConfigError::Other(format!("{error}")),
        };

        errors.push(config_error);
    }

    errors
}

/// Report top-level keys that landed in [`GlobalConfig::extra`].
pub fn unknown_key_warnings(config: &GlobalConfig, source: Option<(&str, &str)>) -> Vec<ConfigError> {
    config
        .extra
        .keys()
        .map(|key| {
            let (span, src) = match source {
                Some((path, content)) => match find_key_offset(content, &[], key) {
                    Some(offset) => (
                        Some(SourceSpan::new(offset.into(), key.len())),
                        Some(NamedSource::new(path, content.to_string())),
                    ),
                    None => (None, None),
                },
                None => (None, None),
            };
            ConfigError::UnknownKey {
                key: key.clone(),
                suggestion: suggest_key(key, TOP_LEVEL_KEYS),
                valid_keys: TOP_LEVEL_KEYS.join(", "),
                span,
                src,
            }
        })
        .collect()
}

fn find_source_span(
    error: &figment::error::Error,
    section: &[String],
    field: &str,
    yaml_sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let source_path = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .and_then(|s| match s {
            figment::Source::File(path) => Some(path.display().to_string()),
            _ => None,
        });

    let source = source_path.as_ref().and_then(|path| {
        yaml_sources
            .iter()
            .find(|(p, _)| p == path)
            .map(|(p, content)| (p.as_str(), content.as_str()))
    });

    if let Some((path, content)) = source {
        if let Some(offset) = find_key_offset(content, section, field) {
            let span = SourceSpan::new(offset.into(), field.len());
            return (Some(span), Some(NamedSource::new(path, content.to_string())));
        }
    }

    (None, None)
}

/// Find the byte offset of a mapping key in YAML content.
///
/// For `path = ["web"]` and `field = "prot"`, finds the `web:` line and
/// searches for `prot:` after it. Top-level fields must start at column 0.
pub fn find_key_offset(content: &str, path: &[String], field: &str) -> Option<usize> {
    let search_start = match path.first() {
        None => 0,
        Some(section) => {
            let header = format!("{section}:");
            let mut offset = 0;
            let mut found = None;
            for line in content.split_inclusive('\n') {
                if line.starts_with(&header) {
                    found = Some(offset + line.len());
                    break;
                }
                offset += line.len();
            }
            found?
        }
    };

    let remaining = &content[search_start..];
    let mut byte_offset = 0;
    for line in remaining.split_inclusive('\n') {
        let trimmed = line.trim_start();
        let indented = trimmed.len() != line.len();
        if path.is_empty() == !indented
            && let Some(after) = trimmed.strip_prefix(field)
            && after.starts_with(':')
        {
            return Some(search_start + byte_offset + (line.len() - trimmed.len()));
        }
        byte_offset += line.len();
    }

    None
}

/// Suggest a similar key name using Jaro-Winkler string similarity.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    let mut best_score = SUGGESTION_THRESHOLD;
    let mut best_match = None;

    for &key in valid_keys {
        let score = strsim::jaro_winkler(unknown, key);
        if score > best_score {
            best_score = score;
            best_match = Some(key.to_string());
        }
    }

    best_match
}

/// Render a list of `ConfigError`s to stderr using miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    use miette::GraphicalReportHandler;

    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut buf = String::new();
        let diagnostic: &dyn Diagnostic = error;
        if handler.render_report(&mut buf, diagnostic).is_ok() {
            eprint!("{buf}");
        } else {
            eprintln!("Error: {error}");
        }
    }
}
