// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation memory for the Chatflow runtime.
//!
//! A [`MemoryScope`] maps a sender to a partition key, the
//! [`MemoryManager`] keeps a bounded vector of [`MemoryEntry`] per key,
//! and composers and decomposers translate between chat messages and
//! stored entries.

pub mod compose;
pub mod entry;
pub mod manager;
pub mod persistence;
pub mod registry;
pub mod scope;

pub use compose::{
    DefaultMemoryComposer, DefaultMemoryDecomposer, MemoryComposer, MemoryDecomposer,
};
pub use entry::{ComposableMessage, MemoryEntry};
pub use manager::MemoryManager;
pub use persistence::{FileMemoryPersistence, InMemoryPersistence, MemoryPersistence};
pub use registry::{ComposerRegistry, DEFAULT, DecomposerRegistry, NamedRegistry, ScopeRegistry};
pub use scope::{GlobalScope, GroupScope, MemberScope, MemoryScope};
