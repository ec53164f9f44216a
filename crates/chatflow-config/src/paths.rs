// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! On-disk layout under the data root.

use std::path::{Path, PathBuf};

/// Well-known locations below the `data/` directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    root: PathBuf,
}

impl Default for DataPaths {
    fn default() -> Self {
        Self::new("data")
    }
}

impl DataPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.yaml")
    }

    /// `workflows/<group>/<id>.yaml`
    pub fn workflows_dir(&self) -> PathBuf {
        self.root.join("workflows")
    }

    pub fn dispatch_rules_dir(&self) -> PathBuf {
        self.root.join("dispatch_rules")
    }

    pub fn memory_dir(&self) -> PathBuf {
        self.root.join("memory")
    }

    pub fn password_file(&self) -> PathBuf {
        self.root.join("web").join("password.hash")
    }

    /// Internal plugin directories are discovered here.
    pub fn plugins_dir(&self) -> PathBuf {
        self.root.join("plugins")
    }

    /// Create every directory in the layout.
    pub fn ensure(&self) -> std::io::Result<()> {
        for dir in [
            self.root.clone(),
            self.workflows_dir(),
            self.dispatch_rules_dir(),
            self.memory_dir(),
            self.root.join("web"),
            self.plugins_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}
