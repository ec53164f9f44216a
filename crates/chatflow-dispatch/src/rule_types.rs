// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Simple rule types and their registry.
//!
//! Every built-in type compares against `IMMessage::content()`
//! case-sensitively, or against the sender.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use chatflow_core::{ChatSender, ChatType, ChatflowError, IMMessage, MessageElement};
use rand::Rng;
use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::rule::RuleConfig;

/// A compiled simple rule.
pub trait DispatchRule: Send + Sync + 'static {
    /// Evaluate against a message. An error counts as "no result" for the
    /// enclosing group.
    fn matches(&self, message: &IMMessage) -> Result<bool, ChatflowError>;
}

impl<F> DispatchRule for F
where
    F: Fn(&IMMessage) -> bool + Send + Sync + 'static,
{
    fn matches(&self, message: &IMMessage) -> Result<bool, ChatflowError> {
        Ok(self(message))
    }
}

/// Compiles a rule's settings into a [`DispatchRule`].
pub type RuleFactory =
    Arc<dyn Fn(&RuleConfig) -> Result<Box<dyn DispatchRule>, ChatflowError> + Send + Sync>;

/// Rule types by name. Extensible at runtime by plugins.
pub struct RuleTypeRegistry {
    types: RwLock<BTreeMap<String, RuleFactory>>,
}

impl RuleTypeRegistry {
    pub fn empty() -> Self {
        Self {
            types: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registry with `prefix`, `keyword`, `regex`, `bot_mention`, `sender`,
    /// `sender_mismatch`, `chat_type`, `random` and `fallback`.
    pub fn with_builtins() -> Self {
        let registry = Self::empty();
        registry.insert("prefix", typed(|c: PrefixConfig| {
            Ok(move |m: &IMMessage| m.content().starts_with(&c.prefix))
        }));
        registry.insert("keyword", typed(|c: KeywordConfig| {
            Ok(move |m: &IMMessage| {
                let content = m.content();
                c.keywords.iter().any(|k| content.contains(k.as_str()))
            })
        }));
        registry.insert("regex", typed(|c: RegexConfig| {
            let pattern = Regex::new(&c.pattern)
                .map_err(|e| ChatflowError::Config(format!("invalid regex `{}`: {e}", c.pattern)))?;
            Ok(move |m: &IMMessage| pattern.is_match(&m.content()))
        }));
        registry.insert("bot_mention", typed(|_: EmptyConfig| {
            Ok(|m: &IMMessage| {
                let bot = ChatSender::bot();
                m.elements
                    .iter()
                    .any(|e| matches!(e, MessageElement::Mention { target } if *target == bot))
            })
        }));
        registry.insert("sender", typed(|c: SenderConfig| {
            Ok(move |m: &IMMessage| {
                let group_ok = c.sender_group.is_empty()
                    || m.sender.group_id.as_deref() == Some(c.sender_group.as_str());
                group_ok && m.sender.user_id == c.sender_id
            })
        }));
        registry.insert("sender_mismatch", typed(|c: SenderConfig| {
            Ok(move |m: &IMMessage| {
                let group_ok = c.sender_group.is_empty()
                    || m.sender.group_id.as_deref() != Some(c.sender_group.as_str());
                group_ok && m.sender.user_id != c.sender_id
            })
        }));
        registry.insert("chat_type", typed(|c: ChatTypeConfig| {
            let chat_type = ChatType::from_str(&c.chat_type).map_err(|_| {
                ChatflowError::Config(format!("unknown chat type `{}`", c.chat_type))
            })?;
            Ok(move |m: &IMMessage| m.sender.chat_type == chat_type)
        }));
        registry.insert("random", typed(|c: RandomConfig| {
            if !(0.0..=100.0).contains(&c.chance) {
                return Err(ChatflowError::Config(format!(
                    "random chance must be within 0..=100, got {}",
                    c.chance
                )));
            }
            Ok(move |_: &IMMessage| rand::thread_rng().gen_range(0.0..1.0) * 100.0 < c.chance)
        }));
        registry.insert("fallback", typed(|_: EmptyConfig| Ok(|_: &IMMessage| true)));
        registry
    }

    fn insert(&self, name: &str, factory: RuleFactory) {
        self.types
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), factory);
    }

    pub fn register(&self, name: &str, factory: RuleFactory) -> Result<(), ChatflowError> {
        let mut types = self.types.write().unwrap_or_else(PoisonError::into_inner);
        if types.contains_key(name) {
            return Err(ChatflowError::already_registered("rule type", name));
        }
        types.insert(name.to_string(), factory);
        debug!(rule_type = name, "rule type registered");
        Ok(())
    }

    /// Register a rule type whose settings deserialize into `C`.
    pub fn register_typed<C, R, F>(&self, name: &str, build: F) -> Result<(), ChatflowError>
    where
        C: DeserializeOwned + 'static,
        R: DispatchRule,
        F: Fn(C) -> Result<R, ChatflowError> + Send + Sync + 'static,
    {
        self.register(name, typed(build))
    }

    pub fn unregister(&self, name: &str) -> Result<(), ChatflowError> {
        self.types
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ChatflowError::not_found("rule type", name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types
            .read()
            .map(|t| t.contains_key(name))
            .unwrap_or_default()
    }

    pub fn type_names(&self) -> Vec<String> {
        self.types
            .read()
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Compile one simple rule.
    pub fn compile(
        &self,
        rule_type: &str,
        config: &RuleConfig,
    ) -> Result<Box<dyn DispatchRule>, ChatflowError> {
        let factory = self
            .types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(rule_type)
            .cloned()
            .ok_or_else(|| ChatflowError::not_found("rule type", rule_type))?;
        factory(config)
    }
}

impl Default for RuleTypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for RuleTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleTypeRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}

fn typed<C, R, F>(build: F) -> RuleFactory
where
    C: DeserializeOwned + 'static,
    R: DispatchRule,
    F: Fn(C) -> Result<R, ChatflowError> + Send + Sync + 'static,
{
    Arc::new(move |config: &RuleConfig| {
        let parsed: C = serde_json::from_value(serde_json::Value::Object(config.clone()))
            .map_err(|e| ChatflowError::Config(format!("invalid rule config: {e}")))?;
        build(parsed).map(|rule| Box::new(rule) as Box<dyn DispatchRule>)
    })
}

#[derive(Debug, Deserialize)]
struct EmptyConfig {}

#[derive(Debug, Deserialize)]
struct PrefixConfig {
    prefix: String,
}

#[derive(Debug, Deserialize)]
struct KeywordConfig {
    keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RegexConfig {
    pattern: String,
}

#[derive(Debug, Deserialize)]
struct SenderConfig {
    sender_id: String,
    #[serde(default)]
    sender_group: String,
}

#[derive(Debug, Deserialize)]
struct ChatTypeConfig {
    chat_type: String,
}

fn default_chance() -> f64 {
    50.0
}

#[derive(Debug, Deserialize)]
struct RandomConfig {
    #[serde(default = "default_chance")]
    chance: f64,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn config(value: serde_json::Value) -> RuleConfig {
        value.as_object().cloned().unwrap_or_default()
    }

    fn eval(registry: &RuleTypeRegistry, rule_type: &str, cfg: serde_json::Value, msg: &IMMessage) -> bool {
        registry
            .compile(rule_type, &config(cfg))
            .unwrap()
            .matches(msg)
            .unwrap()
    }

    fn from(user: &str, group: Option<&str>, text: &str) -> IMMessage {
        let sender = match group {
            Some(g) => ChatSender::from_group_chat(user, g, user),
            None => ChatSender::from_c2c_chat(user, user),
        };
        IMMessage::text(sender, text)
    }

    #[test]
    fn content_rules_are_case_sensitive() {
        let r = RuleTypeRegistry::with_builtins();
        let msg = from("u", None, "Hello /help");
        assert!(!eval(&r, "prefix", json!({"prefix": "/help"}), &msg));
        assert!(eval(&r, "prefix", json!({"prefix": "Hello"}), &msg));
        assert!(eval(&r, "keyword", json!({"keywords": ["x", "/help"]}), &msg));
        assert!(!eval(&r, "keyword", json!({"keywords": ["hello"]}), &msg));
        assert!(eval(&r, "regex", json!({"pattern": r"/h\w+"}), &msg));
    }

    #[test]
    fn sender_rules_respect_optional_group() {
        let r = RuleTypeRegistry::with_builtins();
        let msg = from("alice", Some("g1"), "hi");
        assert!(eval(&r, "sender", json!({"sender_id": "alice"}), &msg));
        assert!(!eval(&r, "sender", json!({"sender_id": "alice", "sender_group": "g2"}), &msg));
        assert!(eval(&r, "sender_mismatch", json!({"sender_id": "bob"}), &msg));
        assert!(!eval(&r, "sender_mismatch", json!({"sender_id": "bob", "sender_group": "g1"}), &msg));
    }

    #[test]
    fn chat_type_accepts_both_spellings() {
        let r = RuleTypeRegistry::with_builtins();
        let group_msg = from("u", Some("g"), "x");
        assert!(eval(&r, "chat_type", json!({"chat_type": "group"}), &group_msg));
        assert!(eval(&r, "chat_type", json!({"chat_type": "群聊"}), &group_msg));
        assert!(!eval(&r, "chat_type", json!({"chat_type": "私聊"}), &group_msg));
    }

    #[test]
    fn bot_mention_needs_the_bot_sender() {
        let r = RuleTypeRegistry::with_builtins();
        let mut msg = from("u", Some("g"), "hey");
        assert!(!eval(&r, "bot_mention", json!({}), &msg));
        msg.elements.push(MessageElement::mention(ChatSender::bot()));
        assert!(eval(&r, "bot_mention", json!({}), &msg));
    }

    #[test]
    fn random_bounds() {
        let r = RuleTypeRegistry::with_builtins();
        let msg = from("u", None, "x");
        assert!(eval(&r, "random", json!({"chance": 100}), &msg));
        assert!(!eval(&r, "random", json!({"chance": 0}), &msg));
        assert!(r.compile("random", &config(json!({"chance": 101}))).is_err());
        assert!(r.compile("random", &config(json!({}))).is_ok());
    }

    #[test]
    fn invalid_configs_fail_to_compile() {
        let r = RuleTypeRegistry::with_builtins();
        assert!(r.compile("regex", &config(json!({"pattern": "("}))).is_err());
        assert!(r.compile("prefix", &config(json!({}))).is_err());
        assert!(r.compile("chat_type", &config(json!({"chat_type": "channel"}))).is_err());
        assert!(r.compile("nope", &RuleConfig::new()).err().is_some_and(|e| e.is_not_found()));
    }
}
