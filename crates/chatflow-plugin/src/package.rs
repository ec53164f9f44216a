// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Installing and removing plugin packages through the host package manager.

use std::path::PathBuf;

use async_trait::async_trait;
use chatflow_config::model::UpdateConfig;
use chatflow_core::ChatflowError;
use tracing::info;

/// Installs, removes, and upgrades plugin packages.
#[async_trait]
pub trait PackageManager: Send + Sync + 'static {
    /// Install `package`, pinned to `version` when given. Returns the tool output.
    async fn install(&self, package: &str, version: Option<&str>) -> Result<String, ChatflowError>;

    async fn uninstall(&self, package: &str) -> Result<String, ChatflowError>;

    async fn upgrade(&self, package: &str) -> Result<String, ChatflowError>;
}

/// Shells out to a pip-compatible executable, installing into the
/// directory scanned for external plugins.
#[derive(Debug, Clone)]
pub struct CommandPackageManager {
    program: String,
    index_url: String,
    target: PathBuf,
}

impl CommandPackageManager {
    pub fn new(program: impl Into<String>, index_url: impl Into<String>, target: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            index_url: index_url.into(),
            target: target.into(),
        }
    }

    /// `update.package_manager` with `update.pypi_registry` as the index.
    pub fn from_config(update: &UpdateConfig, target: impl Into<PathBuf>) -> Self {
        Self::new(&update.package_manager, &update.pypi_registry, target)
    }

    fn install_args(&self, upgrade: bool, spec: String) -> Vec<String> {
        let mut args = vec!["install".to_string()];
        if upgrade {
            args.push("--upgrade".to_string());
        }
        args.extend([
            "--index-url".to_string(),
            self.index_url.clone(),
            "--target".to_string(),
            self.target.display().to_string(),
            spec,
        ]);
        args
    }

    async fn run(&self, package: &str, args: Vec<String>) -> Result<String, ChatflowError> {
        info!(program = %self.program, args = ?args, "running package manager");
        let output = tokio::process::Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(|e| ChatflowError::PluginLoadFailed {
                name: package.to_string(),
                message: format!("failed to run {}: {e}", self.program),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ChatflowError::PluginLoadFailed {
                name: package.to_string(),
                message: format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            });
        }
        Ok(stdout)
    }
}

#[async_trait]
impl PackageManager for CommandPackageManager {
    async fn install(&self, package: &str, version: Option<&str>) -> Result<String, ChatflowError> {
        let spec = match version {
            Some(v) => format!("{package}=={v}"),
            None => package.to_string(),
        };
        self.run(package, self.install_args(false, spec)).await
    }

    async fn uninstall(&self, package: &str) -> Result<String, ChatflowError> {
        let args = vec!["uninstall".to_string(), "-y".to_string(), package.to_string()];
        self.run(package, args).await
    }

    async fn upgrade(&self, package: &str) -> Result<String, ChatflowError> {
        self.run(package, self.install_args(true, package.to_string())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_args_pin_version_and_index() {
        let pm = CommandPackageManager::new("pip", "https://pypi.org/simple", "/tmp/pkgs");
        let args = pm.install_args(false, "chatflow-weather==1.2.0".into());
        assert_eq!(
            args,
            ["install", "--index-url", "https://pypi.org/simple", "--target", "/tmp/pkgs", "chatflow-weather==1.2.0"]
        );
        assert_eq!(pm.install_args(true, "x".into())[1], "--upgrade");
    }

    #[test]
    fn from_config_uses_update_section() {
        let pm = CommandPackageManager::from_config(&UpdateConfig::default(), "pkgs");
        assert_eq!(pm.program, "pip");
        assert_eq!(pm.index_url, "https://pypi.org/simple");
    }

    #[tokio::test]
    async fn missing_program_is_a_load_failure() {
        let pm = CommandPackageManager::new("chatflow-no-such-binary", "idx", "t");
        let err = pm.install("pkg", None).await.unwrap_err();
        assert!(matches!(err, ChatflowError::PluginLoadFailed { ref name, .. } if name == "pkg"));
    }
}
