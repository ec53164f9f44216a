// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Writing the global config back to disk.

use std::io::Write;
use std::path::{Path, PathBuf};

use chatflow_core::ChatflowError;
use tracing::debug;

use crate::model::GlobalConfig;

/// Path of the backup written next to `path`.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

/// Serialize `config` to YAML and write it to `path` atomically.
pub fn save_config(path: &Path, config: &GlobalConfig) -> Result<(), ChatflowError> {
    let yaml = serde_yaml::to_string(config).map_err(ChatflowError::storage)?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(yaml.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| ChatflowError::storage(e.error))?;
    Ok(())
}

/// Copy the current file to `<path>.bak`, then save.
///
/// A failed backup aborts the save so the previous config is never lost.
pub fn save_config_with_backup(path: &Path, config: &GlobalConfig) -> Result<(), ChatflowError> {
    if path.exists() {
        let backup = backup_path(path);
        std::fs::copy(path, &backup)?;
        debug!(backup = %backup.display(), "config backup written");
    }
    save_config(path, config)
}
