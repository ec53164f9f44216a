// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Help text generated from the active dispatch rules.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chatflow_core::{ChatSender, ChatflowError, IMMessage};
use chatflow_dispatch::{
    CombinedDispatchRule, DispatchRuleRegistry, RuleConfig, RuleGroup, RuleOperator,
    SimpleDispatchRule,
};
use chatflow_workflow::{
    Block, BlockContext, BlockDefinition, BlockSchema, Inputs, OutputSpec, Outputs, Params, names,
};

/// Lists every active rule, grouped by the workflow group it dispatches to.
#[derive(Debug, Clone, Copy)]
pub struct GenerateHelp;

fn config_str<'a>(config: &'a RuleConfig, key: &str) -> &'a str {
    config.get(key).and_then(|v| v.as_str()).unwrap_or_default()
}

fn describe_rule(rule: &SimpleDispatchRule) -> String {
    match rule.rule_type.as_str() {
        "prefix" => format!("input starts with {}", config_str(&rule.config, "prefix")),
        "keyword" => {
            let keywords: Vec<&str> = rule
                .config
                .get("keywords")
                .and_then(|v| v.as_array())
                .map(|list| list.iter().filter_map(|k| k.as_str()).collect())
                .unwrap_or_default();
            format!("input contains {}", keywords.join(" or "))
        }
        "regex" => format!("input matches regex {}", config_str(&rule.config, "pattern")),
        "fallback" => "any input".to_string(),
        other => format!("uses the {other} rule"),
    }
}

fn describe_group(group: &RuleGroup) -> String {
    let joiner = match group.operator {
        RuleOperator::And => " and ",
        RuleOperator::Or => " or ",
    };
    group
        .rules
        .iter()
        .map(describe_rule)
        .collect::<Vec<_>>()
        .join(joiner)
}

struct Command {
    name: String,
    trigger: String,
    description: String,
}

impl Command {
    fn from_rule(rule: &CombinedDispatchRule) -> Self {
        let trigger = rule
            .rule_groups
            .iter()
            .map(|g| format!("({})", describe_group(g)))
            .collect::<Vec<_>>()
            .join(" and also ");
        Self {
            name: if rule.name.is_empty() {
                rule.rule_id.clone()
            } else {
                rule.name.clone()
            },
            trigger,
            description: rule.description.clone(),
        }
    }
}

/// Render the help text for `rules`.
pub fn help_text<'a>(rules: impl IntoIterator<Item = &'a CombinedDispatchRule>) -> String {
    let mut categories: BTreeMap<String, Vec<Command>> = BTreeMap::new();
    for rule in rules {
        let category = rule
            .workflow_id
            .split(':')
            .next()
            .unwrap_or_default()
            .to_lowercase();
        categories
            .entry(category)
            .or_default()
            .push(Command::from_rule(rule));
    }

    let mut text = String::from("Bot command help\n\n");
    for (category, mut commands) in categories {
        commands.sort_by(|a, b| a.name.cmp(&b.name));
        text.push_str(&format!("[{}]\n", category.to_uppercase()));
        for command in commands {
            text.push_str(&format!("- {}\n", command.name));
            text.push_str(&format!("  Trigger: {}\n", command.trigger));
            if !command.description.is_empty() {
                text.push_str(&format!("  Description: {}\n", command.description));
            }
            text.push('\n');
        }
        text.push('\n');
    }
    text
}

#[async_trait]
impl Block for GenerateHelp {
    async fn execute(&self, ctx: &BlockContext, _inputs: Inputs) -> Result<Outputs, ChatflowError> {
        let registry = ctx.resolve::<Arc<DispatchRuleRegistry>>()?;
        let active = registry.get_active_rules();
        let text = help_text(active.iter().map(|r| r.rule()));
        Ok(Outputs::new().with("response", IMMessage::text(ChatSender::bot(), text)))
    }
}

impl BlockDefinition for GenerateHelp {
    fn schema() -> BlockSchema {
        BlockSchema::new().output(OutputSpec::new("response", names::IM_MESSAGE).label("Help message"))
    }

    fn from_params(_params: &Params) -> Result<Self, ChatflowError> {
        Ok(Self)
    }
}
