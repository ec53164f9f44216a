// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage back-ends for memory partitions.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chatflow_core::ChatflowError;
use tracing::debug;

use crate::entry::MemoryEntry;

/// Load and save whole partitions by scope key.
#[async_trait]
pub trait MemoryPersistence: Send + Sync + 'static {
    /// Entries for `scope_key`, oldest first. Missing keys load as empty.
    async fn load(&self, scope_key: &str) -> Result<Vec<MemoryEntry>, ChatflowError>;

    async fn save(&self, scope_key: &str, entries: &[MemoryEntry]) -> Result<(), ChatflowError>;

    /// Flush anything buffered. Called at shutdown.
    async fn flush(&self) -> Result<(), ChatflowError> {
        Ok(())
    }
}

/// One JSON array per scope key under a directory.
///
/// File names encode the key reversibly: ASCII letters, digits, and `-`
/// stay as they are, `:` becomes `_`, and every other byte is written as
/// `%XX`. So `member:g1:alice` lives in `member_g1_alice.json` while
/// `member:g1_x:alice` lives in `member_g1%5Fx_alice.json`.
#[derive(Debug, Clone)]
pub struct FileMemoryPersistence {
    dir: PathBuf,
}

impl FileMemoryPersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, scope_key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(scope_key)))
    }
}

fn encode_key(scope_key: &str) -> String {
    let mut encoded = String::with_capacity(scope_key.len());
    for byte in scope_key.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' => encoded.push(char::from(byte)),
            b':' => encoded.push('_'),
            _ => {
                let _ = write!(encoded, "%{byte:02X}");
            }
        }
    }
    encoded
}

#[async_trait]
impl MemoryPersistence for FileMemoryPersistence {
    async fn load(&self, scope_key: &str) -> Result<Vec<MemoryEntry>, ChatflowError> {
        let path = self.path_for(scope_key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let entries: Vec<MemoryEntry> = serde_json::from_slice(&bytes)?;
        debug!(scope_key, count = entries.len(), "memory loaded from file");
        Ok(entries)
    }

    async fn save(&self, scope_key: &str, entries: &[MemoryEntry]) -> Result<(), ChatflowError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(scope_key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(entries)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

/// Keeps partitions in process memory only.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    partitions: Mutex<HashMap<String, Vec<MemoryEntry>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryPersistence for InMemoryPersistence {
    async fn load(&self, scope_key: &str) -> Result<Vec<MemoryEntry>, ChatflowError> {
        Ok(self
            .partitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(scope_key)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, scope_key: &str, entries: &[MemoryEntry]) -> Result<(), ChatflowError> {
        self.partitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(scope_key.to_string(), entries.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chatflow_core::ChatSender;

    use super::*;

    #[tokio::test]
    async fn file_round_trip_uses_sanitized_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMemoryPersistence::new(dir.path());
        let sender = ChatSender::from_group_chat("alice", "g1", "Alice");
        let entries = vec![MemoryEntry::new(sender, "Alice said: hi")];

        store.save("member:g1:alice", &entries).await.unwrap();
        assert!(dir.path().join("member_g1_alice.json").is_file());
        assert_eq!(store.load("member:g1:alice").await.unwrap(), entries);
    }

    #[tokio::test]
    async fn similar_keys_get_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMemoryPersistence::new(dir.path());
        let a = ChatSender::from_group_chat("x_alice", "g1", "A");
        let b = ChatSender::from_group_chat("alice", "g1_x", "B");

        assert_ne!(store.path_for("member:g1_x:alice"), store.path_for("member:g1:x_alice"));
        store.save("member:g1_x:alice", &[MemoryEntry::new(b.clone(), "B said: one")]).await.unwrap();
        store.save("member:g1:x_alice", &[MemoryEntry::new(a.clone(), "A said: two")]).await.unwrap();
        assert_eq!(store.load("member:g1_x:alice").await.unwrap()[0].sender, b);
        assert_eq!(store.load("member:g1:x_alice").await.unwrap()[0].sender, a);
    }

    #[tokio::test]
    async fn slashes_in_ids_stay_inside_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMemoryPersistence::new(dir.path());
        let sender = ChatSender::from_c2c_chat("../a/b", "Slash");
        let entries = vec![MemoryEntry::new(sender, "Slash said: hi")];

        store.save("member:../a/b", &entries).await.unwrap();
        assert_eq!(store.path_for("member:../a/b").parent(), Some(dir.path()));
        assert_eq!(store.load("member:../a/b").await.unwrap(), entries);
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMemoryPersistence::new(dir.path().join("nested"));
        assert!(store.load("global").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("global.json"), "not json").unwrap();
        let store = FileMemoryPersistence::new(dir.path());
        assert!(matches!(
            store.load("global").await,
            Err(ChatflowError::Storage { .. })
        ));
    }
}
