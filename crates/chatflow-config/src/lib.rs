// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Chatflow runtime.
//!
//! Provides YAML configuration parsing with layered defaults, environment
//! variable overrides, semantic validation, and diagnostic error rendering
//! with typo suggestions. The loaded config is shared at runtime through
//! [`SharedConfig`], so managers see updates made by admin operations.
//!
//! # Usage
//!
//! ```no_run
//! use std::path::Path;
//! use chatflow_config::load_and_validate;
//!
//! let loaded = load_and_validate(Path::new("data/config.yaml")).expect("config errors");
//! println!("web port: {}", loaded.config.web.port);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod paths;
pub mod persist;
pub mod validation;

use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config_from_path, load_config_from_str};
pub use model::GlobalConfig;
pub use paths::DataPaths;
pub use persist::{save_config, save_config_with_backup};

/// Runtime handle to the current config. Readers `load()`, writers `store()`.
pub type SharedConfig = Arc<ArcSwap<GlobalConfig>>;

/// Wrap a config for sharing across managers.
pub fn shared(config: GlobalConfig) -> SharedConfig {
    Arc::new(ArcSwap::from_pointee(config))
}

/// A validated config plus non-fatal warnings found while loading it.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: GlobalConfig,
    pub warnings: Vec<ConfigError>,
}

/// Load a config file with env overrides and validate it.
///
/// On a Figment error the YAML source is attached to the diagnostics so
/// miette can point at the offending line.
pub fn load_and_validate(path: &Path) -> Result<LoadedConfig, Vec<ConfigError>> {
    let content = std::fs::read_to_string(path).ok();
    match loader::load_config_from_path(path) {
        Ok(config) => finish(config, content.as_deref().map(|c| (path, c))),
        Err(err) => {
            let sources: Vec<(String, String)> = content
                .map(|c| (path.display().to_string(), c))
                .into_iter()
                .collect();
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

/// Load configuration from a YAML string and validate it.
pub fn load_and_validate_str(yaml: &str) -> Result<LoadedConfig, Vec<ConfigError>> {
    match loader::load_config_from_str(yaml) {
        Ok(config) => finish(config, Some((Path::new("<inline>"), yaml))),
        Err(err) => {
            let sources = vec![("<inline>".to_string(), yaml.to_string())];
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

fn finish(config: GlobalConfig, source: Option<(&Path, &str)>) -> Result<LoadedConfig, Vec<ConfigError>> {
    validation::validate_config(&config)?;
    let display = source.map(|(p, c)| (p.display().to_string(), c));
    let warnings = diagnostic::unknown_key_warnings(
        &config,
        display.as_ref().map(|(p, c)| (p.as_str(), *c)),
    );
    Ok(LoadedConfig { config, warnings })
}
