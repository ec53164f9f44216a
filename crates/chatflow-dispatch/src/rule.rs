// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dispatch rule model as stored in `dispatch_rules/*.yaml`.
//!
//! A [`CombinedDispatchRule`] matches when every one of its rule groups
//! matches; a group combines its simple rules with `and` or `or`.
//!
//! Older files hold flat single rules:
//!
//! ```yaml
//! - type: prefix
//!   workflow: system:help
//!   prefix: /help
//! ```
//!
//! These are lifted into a combined rule with one `and` group.

use serde::{Deserialize, Serialize};

/// Settings of one simple rule, interpreted by its rule type.
pub type RuleConfig = serde_json::Map<String, serde_json::Value>;

/// Default priority of a rule that does not set one.
pub const DEFAULT_PRIORITY: i32 = 5;

/// One predicate: a registered rule type plus its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleDispatchRule {
    #[serde(rename = "type")]
    pub rule_type: String,
    #[serde(default)]
    pub config: RuleConfig,
}

impl SimpleDispatchRule {
    pub fn new(rule_type: impl Into<String>) -> Self {
        Self {
            rule_type: rule_type.into(),
            config: RuleConfig::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }
}

/// How the simple rules of a group combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleOperator {
    And,
    #[default]
    Or,
}

impl std::fmt::Display for RuleOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::And => "and",
            Self::Or => "or",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleGroup {
    #[serde(default)]
    pub operator: RuleOperator,
    pub rules: Vec<SimpleDispatchRule>,
}

impl RuleGroup {
    pub fn and(rules: Vec<SimpleDispatchRule>) -> Self {
        Self {
            operator: RuleOperator::And,
            rules,
        }
    }

    pub fn or(rules: Vec<SimpleDispatchRule>) -> Self {
        Self {
            operator: RuleOperator::Or,
            rules,
        }
    }
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

fn default_enabled() -> bool {
    true
}

/// A named, prioritized rule selecting a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedDispatchRule {
    pub rule_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub workflow_id: String,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub rule_groups: Vec<RuleGroup>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl CombinedDispatchRule {
    pub fn new(rule_id: impl Into<String>, workflow_id: impl Into<String>) -> Self {
        let rule_id = rule_id.into();
        Self {
            name: rule_id.clone(),
            rule_id,
            description: String::new(),
            workflow_id: workflow_id.into(),
            priority: DEFAULT_PRIORITY,
            enabled: true,
            rule_groups: Vec::new(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn group(mut self, group: RuleGroup) -> Self {
        self.rule_groups.push(group);
        self
    }

    /// Shorthand for a rule with a single simple rule.
    pub fn single(
        rule_id: impl Into<String>,
        workflow_id: impl Into<String>,
        rule: SimpleDispatchRule,
    ) -> Self {
        Self::new(rule_id, workflow_id).group(RuleGroup::and(vec![rule]))
    }

    /// True when every simple rule is a `fallback`.
    pub fn is_fallback(&self) -> bool {
        let mut rules = self.rule_groups.iter().flat_map(|g| g.rules.iter()).peekable();
        rules.peek().is_some() && rules.all(|r| r.rule_type == "fallback")
    }
}

/// Flat single-rule form of older rule files.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyDispatchRule {
    #[serde(default)]
    pub rule_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub rule_type: String,
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub workflow: Option<String>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub config: RuleConfig,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Rule settings written inline next to `type`.
    #[serde(flatten)]
    pub inline: RuleConfig,
}

impl LegacyDispatchRule {
    /// Lift into a combined rule with one `and` group. `fallback` rules get
    /// priority 0.
    pub fn lift(self) -> Option<CombinedDispatchRule> {
        let workflow_id = self.workflow_id.or(self.workflow)?;
        let rule_id = self
            .rule_id
            .unwrap_or_else(|| format!("{}_{}", self.rule_type, workflow_id.replace(':', "_")));
        let config = if self.config.is_empty() {
            self.inline
        } else {
            self.config
        };
        let priority = if self.rule_type == "fallback" {
            0
        } else {
            self.priority.unwrap_or(DEFAULT_PRIORITY)
        };
        Some(CombinedDispatchRule {
            name: self.name.unwrap_or_else(|| rule_id.clone()),
            rule_id,
            description: self.description,
            workflow_id,
            priority,
            enabled: self.enabled,
            rule_groups: vec![RuleGroup::and(vec![SimpleDispatchRule {
                rule_type: self.rule_type,
                config,
            }])],
            metadata: self.metadata,
        })
    }
}

/// One entry of a rule file, in either form.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RuleDocument {
    Combined(CombinedDispatchRule),
    Legacy(LegacyDispatchRule),
}

impl RuleDocument {
    pub fn into_rule(self) -> Option<CombinedDispatchRule> {
        match self {
            Self::Combined(rule) => Some(rule),
            Self::Legacy(legacy) => legacy.lift(),
        }
    }
}

/// A rule file: a list of rules or a single rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RuleFile {
    Many(Vec<RuleDocument>),
    One(RuleDocument),
}

impl RuleFile {
    pub fn into_documents(self) -> Vec<RuleDocument> {
        match self {
            Self::Many(docs) => docs,
            Self::One(doc) => vec![doc],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_rule_parses_with_defaults() {
        let yaml = r#"
- rule_id: help
  name: Help
  workflow_id: system:help
  rule_groups:
    - operator: and
      rules:
        - type: prefix
          config: { prefix: /help }
"#;
        let docs = serde_yaml::from_str::<RuleFile>(yaml).unwrap().into_documents();
        let rule = docs.into_iter().next().and_then(RuleDocument::into_rule).unwrap();
        assert_eq!(rule.priority, DEFAULT_PRIORITY);
        assert!(rule.enabled);
        assert_eq!(rule.rule_groups[0].operator, RuleOperator::And);
        assert_eq!(rule.rule_groups[0].rules[0].config["prefix"], "/help");
    }

    #[test]
    fn legacy_rule_is_lifted_into_one_and_group() {
        let yaml = "type: keyword\nworkflow: chat:normal\nkeywords: [hi, hello]\npriority: 7\n";
        let rule = serde_yaml::from_str::<RuleFile>(yaml)
            .unwrap()
            .into_documents()
            .remove(0)
            .into_rule()
            .unwrap();
        assert_eq!(rule.rule_id, "keyword_chat_normal");
        assert_eq!(rule.workflow_id, "chat:normal");
        assert_eq!(rule.priority, 7);
        assert_eq!(rule.rule_groups, vec![RuleGroup::and(vec![
            SimpleDispatchRule::new("keyword").with("keywords", serde_json::json!(["hi", "hello"]))
        ])]);
    }

    #[test]
    fn legacy_fallback_is_pinned_to_zero() {
        let yaml = "type: fallback\nworkflow_id: chat:normal\npriority: 9\n";
        let rule = serde_yaml::from_str::<RuleDocument>(yaml).unwrap().into_rule().unwrap();
        assert_eq!(rule.priority, 0);
        assert!(rule.is_fallback());
    }

    #[test]
    fn group_operator_defaults_to_or() {
        let group: RuleGroup = serde_yaml::from_str("rules: []").unwrap();
        assert_eq!(group.operator, RuleOperator::Or);
    }
}
