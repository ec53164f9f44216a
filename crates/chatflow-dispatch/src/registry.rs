// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registry of combined dispatch rules, compiled against the rule types.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use chatflow_core::{ChatflowError, IMMessage};
use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::rule::{CombinedDispatchRule, RuleFile, RuleOperator};
use crate::rule_types::{DispatchRule, RuleTypeRegistry};

static RULE_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap());

struct CompiledGroup {
    operator: RuleOperator,
    /// `Err` holds why the simple rule could not be compiled.
    rules: Vec<Result<Box<dyn DispatchRule>, ChatflowError>>,
}

/// A rule together with its compiled predicates.
pub struct CompiledRule {
    rule: CombinedDispatchRule,
    groups: Vec<CompiledGroup>,
}

impl CompiledRule {
    fn compile(mut rule: CombinedDispatchRule, types: &RuleTypeRegistry) -> Self {
        if rule.is_fallback() && rule.priority != 0 {
            debug!(rule_id = %rule.rule_id, priority = rule.priority, "fallback rule pinned to priority 0");
            rule.priority = 0;
        }
        let groups = rule
            .rule_groups
            .iter()
            .map(|group| CompiledGroup {
                operator: group.operator,
                rules: group
                    .rules
                    .iter()
                    .map(|simple| {
                        let compiled = types.compile(&simple.rule_type, &simple.config);
                        if let Err(e) = &compiled {
                            warn!(
                                rule_id = %rule.rule_id,
                                rule_type = %simple.rule_type,
                                error = %e,
                                "invalid simple rule, it will be skipped"
                            );
                        }
                        compiled
                    })
                    .collect(),
            })
            .collect();
        Self { rule, groups }
    }

    pub fn rule(&self) -> &CombinedDispatchRule {
        &self.rule
    }

    /// True when every group matches, so a rule without groups always
    /// matches. Invalid rules and evaluation errors contribute no result; a
    /// group left with no results does not match.
    pub fn matches(&self, message: &IMMessage) -> bool {
        self.groups.iter().all(|group| {
            let results: Vec<bool> = group
                .rules
                .iter()
                .filter_map(|compiled| compiled.as_ref().ok())
                .filter_map(|rule| match rule.matches(message) {
                    Ok(hit) => Some(hit),
                    Err(e) => {
                        warn!(rule_id = %self.rule.rule_id, error = %e, "rule evaluation failed");
                        None
                    }
                })
                .collect();
            match (results.is_empty(), group.operator) {
                (true, _) => false,
                (false, RuleOperator::And) => results.iter().all(|hit| *hit),
                (false, RuleOperator::Or) => results.iter().any(|hit| *hit),
            }
        })
    }
}

impl std::fmt::Debug for CompiledRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledRule")
            .field("rule_id", &self.rule.rule_id)
            .field("workflow_id", &self.rule.workflow_id)
            .field("priority", &self.rule.priority)
            .finish()
    }
}

/// Dispatch rules by id, kept in insertion order.
pub struct DispatchRuleRegistry {
    rule_types: Arc<RuleTypeRegistry>,
    rules: RwLock<Vec<Arc<CompiledRule>>>,
}

impl DispatchRuleRegistry {
    pub fn new(rule_types: Arc<RuleTypeRegistry>) -> Self {
        Self {
            rule_types,
            rules: RwLock::new(Vec::new()),
        }
    }

    pub fn rule_types(&self) -> &Arc<RuleTypeRegistry> {
        &self.rule_types
    }

    pub fn register(&self, rule: CombinedDispatchRule) -> Result<(), ChatflowError> {
        let compiled = Arc::new(CompiledRule::compile(rule, &self.rule_types));
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        if rules.iter().any(|r| r.rule.rule_id == compiled.rule.rule_id) {
            return Err(ChatflowError::already_registered(
                "dispatch rule",
                &compiled.rule.rule_id,
            ));
        }
        debug!(rule_id = %compiled.rule.rule_id, workflow = %compiled.rule.workflow_id, "dispatch rule registered");
        rules.push(compiled);
        Ok(())
    }

    /// Replace a rule in place, keeping its insertion position.
    pub fn update_rule(&self, rule: CombinedDispatchRule) -> Result<(), ChatflowError> {
        let compiled = Arc::new(CompiledRule::compile(rule, &self.rule_types));
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        let slot = rules
            .iter_mut()
            .find(|r| r.rule.rule_id == compiled.rule.rule_id)
            .ok_or_else(|| ChatflowError::not_found("dispatch rule", &compiled.rule.rule_id))?;
        *slot = compiled;
        Ok(())
    }

    pub fn delete_rule(&self, rule_id: &str) -> Result<CombinedDispatchRule, ChatflowError> {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        let index = rules
            .iter()
            .position(|r| r.rule.rule_id == rule_id)
            .ok_or_else(|| ChatflowError::not_found("dispatch rule", rule_id))?;
        Ok(rules.remove(index).rule.clone())
    }

    pub fn enable_rule(&self, rule_id: &str) -> Result<(), ChatflowError> {
        self.set_enabled(rule_id, true)
    }

    pub fn disable_rule(&self, rule_id: &str) -> Result<(), ChatflowError> {
        self.set_enabled(rule_id, false)
    }

    fn set_enabled(&self, rule_id: &str, enabled: bool) -> Result<(), ChatflowError> {
        let mut rule = self.get_rule(rule_id)?;
        if rule.enabled == enabled {
            return Ok(());
        }
        rule.enabled = enabled;
        self.update_rule(rule)
    }

    pub fn get_rule(&self, rule_id: &str) -> Result<CombinedDispatchRule, ChatflowError> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|r| r.rule.rule_id == rule_id)
            .map(|r| r.rule.clone())
            .ok_or_else(|| ChatflowError::not_found("dispatch rule", rule_id))
    }

    pub fn get_all_rules(&self) -> Vec<CombinedDispatchRule> {
        self.rules
            .read()
            .map(|rules| rules.iter().map(|r| r.rule.clone()).collect())
            .unwrap_or_default()
    }

    /// Enabled rules, highest priority first. Ties keep insertion order.
    pub fn get_active_rules(&self) -> Vec<Arc<CompiledRule>> {
        let mut active: Vec<Arc<CompiledRule>> = self
            .rules
            .read()
            .map(|rules| rules.iter().filter(|r| r.rule.enabled).cloned().collect())
            .unwrap_or_default();
        active.sort_by(|a, b| b.rule.priority.cmp(&a.rule.priority));
        active
    }

    /// Load every `*.yaml` file in `dir`, in file name order. Files that
    /// fail to parse and rules with duplicate ids are logged and skipped.
    pub fn load_rules(&self, dir: &Path) -> Result<usize, ChatflowError> {
        if !dir.is_dir() {
            std::fs::create_dir_all(dir)?;
            return Ok(0);
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("yaml"))
            .collect();
        files.sort();

        let mut loaded = 0;
        for path in files {
            let parsed = std::fs::read_to_string(&path)
                .map_err(ChatflowError::storage)
                .and_then(|text| {
                    serde_yaml::from_str::<RuleFile>(&text)
                        .map_err(|e| ChatflowError::Config(e.to_string()))
                });
            let documents = match parsed {
                Ok(file) => file.into_documents(),
                Err(e) => {
                    error!(path = %path.display(), error = %e, "failed to load dispatch rules");
                    continue;
                }
            };
            for document in documents {
                let Some(rule) = document.into_rule() else {
                    warn!(path = %path.display(), "legacy rule without a workflow, skipped");
                    continue;
                };
                let rule_id = rule.rule_id.clone();
                match self.register(rule) {
                    Ok(()) => loaded += 1,
                    Err(e) => warn!(rule_id = %rule_id, error = %e, "dispatch rule skipped"),
                }
            }
        }
        info!(count = loaded, dir = %dir.display(), "dispatch rules loaded");
        Ok(loaded)
    }

    /// Write each rule to `<dir>/<rule_id>.yaml` and remove the `.yaml`
    /// files of rules that are no longer registered. Every id is checked
    /// before anything is written.
    pub fn save_rules(&self, dir: &Path) -> Result<usize, ChatflowError> {
        let rules = self.get_all_rules();
        if let Some(bad) = rules.iter().find(|r| !RULE_ID.is_match(&r.rule_id)) {
            return Err(ChatflowError::Config(format!(
                "rule id `{}` cannot be used as a file name",
                bad.rule_id
            )));
        }
        let documents = rules
            .iter()
            .map(|rule| {
                serde_yaml::to_string(&vec![rule])
                    .map(|text| (format!("{}.yaml", rule.rule_id), text))
                    .map_err(|e| ChatflowError::Internal(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        std::fs::create_dir_all(dir)?;
        for (file_name, text) in &documents {
            std::fs::write(dir.join(file_name), text)?;
        }

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let stale = path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some("yaml")
                && path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .is_none_or(|stem| !rules.iter().any(|r| r.rule_id == stem));
            if stale {
                debug!(path = %path.display(), "removing stale rule file");
                std::fs::remove_file(&path)?;
            }
        }
        info!(count = rules.len(), dir = %dir.display(), "dispatch rules saved");
        Ok(rules.len())
    }
}

impl Default for DispatchRuleRegistry {
    fn default() -> Self {
        Self::new(Arc::new(RuleTypeRegistry::with_builtins()))
    }
}

impl std::fmt::Debug for DispatchRuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<String> = self.get_all_rules().into_iter().map(|r| r.rule_id).collect();
        f.debug_struct("DispatchRuleRegistry")
            .field("rules", &ids)
            .finish()
    }
}
