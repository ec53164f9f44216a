// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded, scope-keyed conversation memory.

use std::sync::Arc;

use chatflow_config::SharedConfig;
use chatflow_core::{ChatSender, ChatflowError};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::compose::{MemoryComposer, MemoryDecomposer};
use crate::entry::MemoryEntry;
use crate::persistence::{FileMemoryPersistence, MemoryPersistence};
use crate::registry::{ComposerRegistry, DecomposerRegistry, ScopeRegistry};
use crate::scope::MemoryScope;

/// Partitions kept in memory before idle ones are dropped.
pub const DEFAULT_CACHED_PARTITIONS: usize = 1024;

#[derive(Debug, Default)]
struct Partition {
    loaded: bool,
    entries: Vec<MemoryEntry>,
}

impl Partition {
    async fn ensure_loaded(
        &mut self,
        key: &str,
        persistence: &dyn MemoryPersistence,
    ) -> Result<(), ChatflowError> {
        if !self.loaded {
            self.entries = persistence.load(key).await?;
            self.loaded = true;
        }
        Ok(())
    }
}

/// Owns every memory partition and its persistence.
///
/// Each scope key has its own lock: writers to one key are serialized,
/// writers to different keys never wait on each other. Partitions are
/// loaded from persistence on first touch and written through on every
/// change. Once more than the cache limit are held, partitions no task is
/// using are dropped and reload on their next touch.
pub struct MemoryManager {
    config: SharedConfig,
    persistence: Arc<dyn MemoryPersistence>,
    partitions: DashMap<String, Arc<Mutex<Partition>>>,
    cache_limit: usize,
    scopes: Arc<ScopeRegistry>,
    composers: Arc<ComposerRegistry>,
    decomposers: Arc<DecomposerRegistry>,
}

impl MemoryManager {
    pub fn new(config: SharedConfig, persistence: Arc<dyn MemoryPersistence>) -> Self {
        Self {
            config,
            persistence,
            partitions: DashMap::new(),
            cache_limit: DEFAULT_CACHED_PARTITIONS,
            scopes: Arc::new(ScopeRegistry::with_builtins()),
            composers: Arc::new(ComposerRegistry::with_builtins()),
            decomposers: Arc::new(DecomposerRegistry::with_builtins()),
        }
    }

    /// Build the manager with the persistence back-end named in
    /// `memory.persistence.type`.
    pub fn from_config(config: SharedConfig) -> Result<Self, ChatflowError> {
        let persistence: Arc<dyn MemoryPersistence> = {
            let cfg = config.load();
            let persistence = &cfg.memory.persistence;
            match persistence.kind.as_str() {
                "file" => Arc::new(FileMemoryPersistence::new(&persistence.file.storage_dir)),
                "redis" => {
                    return Err(ChatflowError::Config(
                        "memory.persistence.type `redis` is not available in this build, use `file`"
                            .into(),
                    ));
                }
                other => {
                    return Err(ChatflowError::Config(format!(
                        "unknown memory persistence type `{other}`"
                    )));
                }
            }
        };
        info!(
            max_entries = config.load().memory.max_entries,
            "memory manager initialized"
        );
        Ok(Self::new(config, persistence))
    }

    pub fn with_cache_limit(mut self, partitions: usize) -> Self {
        self.cache_limit = partitions;
        self
    }

    /// Partitions currently held in memory.
    pub fn cached_partitions(&self) -> usize {
        self.partitions.len()
    }

    pub fn scopes(&self) -> &Arc<ScopeRegistry> {
        &self.scopes
    }

    pub fn composers(&self) -> &Arc<ComposerRegistry> {
        &self.composers
    }

    pub fn decomposers(&self) -> &Arc<DecomposerRegistry> {
        &self.decomposers
    }

    /// Scope registered under `name`.
    pub fn scope(&self, name: &str) -> Result<Arc<dyn MemoryScope>, ChatflowError> {
        self.scopes.get(name)
    }

    /// Scope named by `memory.default_scope`.
    pub fn default_scope(&self) -> Result<Arc<dyn MemoryScope>, ChatflowError> {
        let name = self.config.load().memory.default_scope.clone();
        self.scopes.get(&name)
    }

    pub fn composer(&self, name: &str) -> Result<Arc<dyn MemoryComposer>, ChatflowError> {
        self.composers.get(name)
    }

    pub fn decomposer(&self, name: &str) -> Result<Arc<dyn MemoryDecomposer>, ChatflowError> {
        self.decomposers.get(name)
    }

    fn partition(&self, key: &str) -> Arc<Mutex<Partition>> {
        self.partitions.entry(key.to_string()).or_default().clone()
    }

    /// Drop idle partitions once the cache is over its limit. A partition
    /// is idle when the map holds the only handle to it.
    fn evict_idle(&self) {
        if self.partitions.len() <= self.cache_limit {
            return;
        }
        let before = self.partitions.len();
        self.partitions.retain(|_, p| Arc::strong_count(p) > 1);
        debug!(before, after = self.partitions.len(), "evicted idle memory partitions");
    }

    /// Append `entries` to the sender's partition, keep the newest
    /// `memory.max_entries`, and persist.
    pub async fn store(
        &self,
        scope: &dyn MemoryScope,
        sender: &ChatSender,
        entries: Vec<MemoryEntry>,
    ) -> Result<(), ChatflowError> {
        let key = scope.get_scope_key(sender);
        let cap = self.config.load().memory.max_entries.max(1);
        {
            let partition = self.partition(&key);
            let mut partition = partition.lock().await;
            partition.ensure_loaded(&key, self.persistence.as_ref()).await?;

            partition.entries.extend(entries);
            let len = partition.entries.len();
            if len > cap {
                partition.entries.drain(..len - cap);
            }
            self.persistence.save(&key, &partition.entries).await?;
            debug!(scope_key = %key, count = partition.entries.len(), "memory stored");
        }
        self.evict_idle();
        Ok(())
    }

    /// Snapshot of the entries in the sender's partition that are in scope
    /// for the sender, oldest first.
    pub async fn query(
        &self,
        scope: &dyn MemoryScope,
        sender: &ChatSender,
    ) -> Result<Vec<MemoryEntry>, ChatflowError> {
        let key = scope.get_scope_key(sender);
        let entries = {
            let partition = self.partition(&key);
            let mut partition = partition.lock().await;
            partition.ensure_loaded(&key, self.persistence.as_ref()).await?;
            partition
                .entries
                .iter()
                .filter(|e| scope.is_in_scope(&e.sender, sender))
                .cloned()
                .collect()
        };
        self.evict_idle();
        Ok(entries)
    }

    pub async fn clear_memory(
        &self,
        scope: &dyn MemoryScope,
        sender: &ChatSender,
    ) -> Result<(), ChatflowError> {
        let key = scope.get_scope_key(sender);
        {
            let partition = self.partition(&key);
            let mut partition = partition.lock().await;
            partition.entries.clear();
            partition.loaded = true;
            self.persistence.save(&key, &partition.entries).await?;
        }
        info!(scope_key = %key, "memory cleared");
        self.evict_idle();
        Ok(())
    }

    /// Write every loaded partition and flush the back-end.
    ///
    /// A partition that fails to save is logged; the first error is
    /// returned after all partitions were attempted.
    pub async fn shutdown(&self) -> Result<(), ChatflowError> {
        let partitions: Vec<(String, Arc<Mutex<Partition>>)> = self
            .partitions
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        let mut first_error = None;
        for (key, partition) in partitions {
            let partition = partition.lock().await;
            if !partition.loaded {
                continue;
            }
            if let Err(e) = self.persistence.save(&key, &partition.entries).await {
                warn!(scope_key = %key, error = %e, "failed to flush memory partition");
                first_error.get_or_insert(e);
            }
        }
        self.persistence.flush().await?;
        info!("memory flushed");
        first_error.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryManager")
            .field("partitions", &self.partitions.len())
            .field("scopes", &self.scopes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use chatflow_config::GlobalConfig;

    use super::*;
    use crate::persistence::InMemoryPersistence;
    use crate::scope::{GlobalScope, MemberScope};

    fn manager(max_entries: usize) -> MemoryManager {
        let mut cfg = GlobalConfig::default();
        cfg.memory.max_entries = max_entries;
        MemoryManager::new(
            chatflow_config::shared(cfg),
            Arc::new(InMemoryPersistence::new()),
        )
    }

    #[tokio::test]
    async fn clear_empties_only_that_key() {
        let mgr = manager(10);
        let alice = ChatSender::from_group_chat("alice", "g1", "Alice");
        let bob = ChatSender::from_group_chat("bob", "g1", "Bob");
        mgr.store(&MemberScope, &alice, vec![MemoryEntry::new(alice.clone(), "a")])
            .await
            .unwrap();
        mgr.store(&MemberScope, &bob, vec![MemoryEntry::new(bob.clone(), "b")])
            .await
            .unwrap();

        mgr.clear_memory(&MemberScope, &alice).await.unwrap();
        assert!(mgr.query(&MemberScope, &alice).await.unwrap().is_empty());
        assert_eq!(mgr.query(&MemberScope, &bob).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn global_scope_is_shared() {
        let mgr = manager(10);
        let alice = ChatSender::from_c2c_chat("alice", "Alice");
        let bob = ChatSender::from_group_chat("bob", "g9", "Bob");
        mgr.store(&GlobalScope, &alice, vec![MemoryEntry::new(alice.clone(), "a")])
            .await
            .unwrap();
        assert_eq!(mgr.query(&GlobalScope, &bob).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn idle_partitions_are_evicted_and_reload() {
        let mgr = manager(10).with_cache_limit(2);

        for id in ["a", "b", "c", "d"] {
            let sender = ChatSender::from_c2c_chat(id, id);
            mgr.store(&MemberScope, &sender, vec![MemoryEntry::new(sender.clone(), id)])
                .await
                .unwrap();
            assert!(mgr.cached_partitions() <= 2);
        }

        let first = ChatSender::from_c2c_chat("a", "a");
        let entries = mgr.query(&MemberScope, &first).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content, "a");
    }

    #[test]
    fn redis_persistence_is_rejected() {
        let mut cfg = GlobalConfig::default();
        cfg.memory.persistence.kind = "redis".into();
        let err = MemoryManager::from_config(chatflow_config::shared(cfg)).unwrap_err();
        assert!(matches!(err, ChatflowError::Config(_)));
    }
}
