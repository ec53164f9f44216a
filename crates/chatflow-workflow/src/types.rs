// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Named port types and their compatibility relation.
//!
//! Every input and output declares a type name. A type may declare parent
//! types; a source is compatible with a target when it is the target or
//! a (transitive) descendant of it. `Any` accepts everything, and a target
//! written `A|B` accepts anything compatible with one of its members.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{PoisonError, RwLock};

use tracing::trace;

/// Built-in type names.
pub mod names {
    pub const ANY: &str = "Any";
    pub const STR: &str = "str";
    pub const INT: &str = "int";
    pub const FLOAT: &str = "float";
    pub const BOOL: &str = "bool";
    pub const LIST: &str = "list";
    pub const MAP: &str = "map";
    pub const JSON: &str = "json";
    pub const IM_MESSAGE: &str = "IMMessage";
    pub const CHAT_SENDER: &str = "ChatSender";
    pub const MESSAGE_ELEMENT: &str = "MessageElement";
    pub const TEXT_MESSAGE: &str = "TextMessage";
    pub const MEDIA_MESSAGE: &str = "MediaMessage";
    pub const IMAGE_MESSAGE: &str = "ImageMessage";
    pub const VOICE_MESSAGE: &str = "VoiceMessage";
    pub const FILE_MESSAGE: &str = "FileMessage";
    pub const VIDEO_MESSAGE: &str = "VideoMessage";
    pub const LLM_CHAT_RESPONSE: &str = "LLMChatResponse";
    pub const USER_PROFILE: &str = "UserProfile";
}

/// Registry of type names plus a memoized compatibility table.
#[derive(Debug, Default)]
pub struct TypeSystem {
    parents: RwLock<HashMap<String, Vec<String>>>,
    cache: RwLock<HashMap<(String, String), bool>>,
}

impl TypeSystem {
    /// An empty type system. Most callers want [`TypeSystem::with_builtins`].
    pub fn new() -> Self {
        Self::default()
    }

    /// A type system preloaded with the runtime's built-in types.
    pub fn with_builtins() -> Self {
        use names::*;
        let ts = Self::new();
        for root in [
            ANY,
            STR,
            INT,
            FLOAT,
            BOOL,
            LIST,
            MAP,
            JSON,
            IM_MESSAGE,
            CHAT_SENDER,
            MESSAGE_ELEMENT,
            LLM_CHAT_RESPONSE,
            USER_PROFILE,
        ] {
            ts.register_type(root, &[]);
        }
        ts.register_type(TEXT_MESSAGE, &[MESSAGE_ELEMENT]);
        ts.register_type(MEDIA_MESSAGE, &[MESSAGE_ELEMENT]);
        for media in [IMAGE_MESSAGE, VOICE_MESSAGE, FILE_MESSAGE, VIDEO_MESSAGE] {
            ts.register_type(media, &[MEDIA_MESSAGE]);
        }
        ts
    }

    /// Register (or redefine) a type with its direct parents.
    pub fn register_type(&self, name: &str, parents: &[&str]) {
        self.parents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), parents.iter().map(|p| p.to_string()).collect());
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        trace!(type_name = name, ?parents, "type registered");
    }

    /// Register `name` as a root type unless it is already known.
    ///
    /// Union spellings are never registered.
    pub fn ensure_type(&self, name: &str) {
        if name.contains('|') || self.is_registered(name) {
            return;
        }
        self.register_type(name, &[]);
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.parents
            .read()
            .map(|p| p.contains_key(name))
            .unwrap_or_default()
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .parents
            .read()
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Whether a value of `source` may flow into a port of type `target`.
    pub fn is_compatible(&self, source: &str, target: &str) -> bool {
        let key = (source.to_string(), target.to_string());
        if let Some(hit) = self.cache.read().ok().and_then(|c| c.get(&key).copied()) {
            return hit;
        }
        let result = self.compute(source, target);
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, result);
        result
    }

    fn compute(&self, source: &str, target: &str) -> bool {
        if target.contains('|') {
            return split_union(target).any(|member| self.is_compatible(source, member));
        }
        if source.contains('|') {
            return split_union(source).all(|member| self.is_compatible(member, target));
        }
        if target == names::ANY || source == target {
            return true;
        }

        let parents = self.parents.read().unwrap_or_else(PoisonError::into_inner);
        if !parents.contains_key(source) || !parents.contains_key(target) {
            return false;
        }

        let mut seen = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([source]);
        while let Some(current) = queue.pop_front() {
            if current == target {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(ps) = parents.get(current) {
                queue.extend(ps.iter().map(String::as_str));
            }
        }
        false
    }

    /// For every registered source type, the registered targets it may flow into.
    pub fn get_compatibility_map(&self) -> BTreeMap<String, BTreeMap<String, bool>> {
        let names = self.type_names();
        let mut map = BTreeMap::new();
        for source in &names {
            let targets: BTreeMap<String, bool> = names
                .iter()
                .filter(|target| self.is_compatible(source, target))
                .map(|target| (target.clone(), true))
                .collect();
            map.insert(source.clone(), targets);
        }
        map
    }
}

fn split_union(name: &str) -> impl Iterator<Item = &str> {
    name.split('|').map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::names::*;
    use super::*;

    #[test]
    fn any_accepts_everything() {
        let ts = TypeSystem::with_builtins();
        assert!(ts.is_compatible(STR, ANY));
        assert!(ts.is_compatible("SomethingUnregistered", ANY));
    }

    #[test]
    fn identity_is_compatible_even_when_unknown() {
        let ts = TypeSystem::new();
        assert!(ts.is_compatible("Foo", "Foo"));
        assert!(!ts.is_compatible("Foo", "Bar"));
    }

    #[test]
    fn subtypes_flow_into_parents_transitively() {
        let ts = TypeSystem::with_builtins();
        assert!(ts.is_compatible(IMAGE_MESSAGE, MEDIA_MESSAGE));
        assert!(ts.is_compatible(IMAGE_MESSAGE, MESSAGE_ELEMENT));
        assert!(!ts.is_compatible(MESSAGE_ELEMENT, IMAGE_MESSAGE));
        assert!(!ts.is_compatible(STR, INT));
    }

    #[test]
    fn union_targets_accept_any_member() {
        let ts = TypeSystem::with_builtins();
        assert!(ts.is_compatible(STR, "int|str"));
        assert!(ts.is_compatible(IMAGE_MESSAGE, "str|MediaMessage"));
        assert!(!ts.is_compatible(BOOL, "int|str"));
    }

    #[test]
    fn union_source_needs_every_member() {
        let ts = TypeSystem::with_builtins();
        assert!(ts.is_compatible("ImageMessage|VoiceMessage", MEDIA_MESSAGE));
        assert!(!ts.is_compatible("ImageMessage|str", MEDIA_MESSAGE));
    }

    #[test]
    fn registering_invalidates_cache() {
        let ts = TypeSystem::with_builtins();
        assert!(!ts.is_compatible("Sticker", MESSAGE_ELEMENT));
        ts.register_type("Sticker", &[IMAGE_MESSAGE]);
        assert!(ts.is_compatible("Sticker", MESSAGE_ELEMENT));
    }

    #[test]
    fn compatibility_map_lists_only_true_pairs() {
        let ts = TypeSystem::with_builtins();
        let map = ts.get_compatibility_map();
        let image = &map[IMAGE_MESSAGE];
        assert!(image.contains_key(MEDIA_MESSAGE));
        assert!(image.contains_key(ANY));
        assert!(!image.contains_key(STR));
        assert!(image.values().all(|v| *v));
    }

    #[test]
    fn ensure_type_skips_unions_and_known_names() {
        let ts = TypeSystem::with_builtins();
        ts.ensure_type("int|str");
        assert!(!ts.is_registered("int|str"));
        ts.ensure_type("Custom");
        assert!(ts.is_registered("Custom"));
    }
}
