// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory scopes: how a sender maps to a memory partition key.
//!
//! | scope    | group chat                | private chat   |
//! |----------|---------------------------|----------------|
//! | `member` | `member:<group>:<user>`   | `c2c:<user>`   |
//! | `group`  | `group:<group>`           | `c2c:<user>`   |
//! | `global` | `global`                  | `global`       |

use chatflow_core::{ChatSender, ChatType};

/// Partitioning strategy for conversation memory.
pub trait MemoryScope: Send + Sync + 'static {
    /// Registry name of the scope (`member`, `group`, ...).
    fn name(&self) -> &str;

    /// Key of the partition `sender` writes to.
    fn get_scope_key(&self, sender: &ChatSender) -> String;

    /// Whether an entry written by `target` is visible to `query`.
    fn is_in_scope(&self, target: &ChatSender, query: &ChatSender) -> bool;
}

fn group_of(sender: &ChatSender) -> Option<&str> {
    match sender.chat_type {
        ChatType::Group => Some(sender.group_id.as_deref().unwrap_or_default()),
        ChatType::C2C => None,
    }
}

/// One partition per user per group, or per private chat.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemberScope;

impl MemoryScope for MemberScope {
    fn name(&self) -> &str {
        "member"
    }

    fn get_scope_key(&self, sender: &ChatSender) -> String {
        match group_of(sender) {
            Some(group) => format!("member:{group}:{}", sender.user_id),
            None => format!("c2c:{}", sender.user_id),
        }
    }

    fn is_in_scope(&self, target: &ChatSender, query: &ChatSender) -> bool {
        target.chat_type == query.chat_type
            && target.user_id == query.user_id
            && group_of(target) == group_of(query)
    }
}

/// One partition per group; private chats fall back to the user.
#[derive(Debug, Default, Clone, Copy)]
pub struct GroupScope;

impl MemoryScope for GroupScope {
    fn name(&self) -> &str {
        "group"
    }

    fn get_scope_key(&self, sender: &ChatSender) -> String {
        match group_of(sender) {
            Some(group) => format!("group:{group}"),
            None => format!("c2c:{}", sender.user_id),
        }
    }

    fn is_in_scope(&self, target: &ChatSender, query: &ChatSender) -> bool {
        match (group_of(target), group_of(query)) {
            (Some(a), Some(b)) => a == b,
            (None, None) => target.user_id == query.user_id,
            _ => false,
        }
    }
}

/// A single partition shared by everyone.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalScope;

impl MemoryScope for GlobalScope {
    fn name(&self) -> &str {
        "global"
    }

    fn get_scope_key(&self, _sender: &ChatSender) -> String {
        "global".to_string()
    }

    fn is_in_scope(&self, _target: &ChatSender, _query: &ChatSender) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice_in(group: &str) -> ChatSender {
        ChatSender::from_group_chat("alice", group, "Alice")
    }

    #[test]
    fn member_keys_distinguish_group_and_private() {
        assert_eq!(MemberScope.get_scope_key(&alice_in("g1")), "member:g1:alice");
        assert_eq!(
            MemberScope.get_scope_key(&ChatSender::from_c2c_chat("alice", "Alice")),
            "c2c:alice"
        );
    }

    #[test]
    fn group_scope_shares_members_of_one_group() {
        let bob = ChatSender::from_group_chat("bob", "g1", "Bob");
        assert_eq!(GroupScope.get_scope_key(&bob), "group:g1");
        assert!(GroupScope.is_in_scope(&alice_in("g1"), &bob));
        assert!(!GroupScope.is_in_scope(&alice_in("g2"), &bob));
        assert!(!MemberScope.is_in_scope(&alice_in("g1"), &bob));
    }

    #[test]
    fn private_chat_never_sees_group_memory() {
        let private = ChatSender::from_c2c_chat("alice", "Alice");
        assert!(!MemberScope.is_in_scope(&alice_in("g1"), &private));
        assert!(!GroupScope.is_in_scope(&alice_in("g1"), &private));
        assert!(GlobalScope.is_in_scope(&alice_in("g1"), &private));
    }
}
