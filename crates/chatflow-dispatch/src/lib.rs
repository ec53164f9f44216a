// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message dispatch for the Chatflow runtime.
//!
//! Inbound messages are matched against [`CombinedDispatchRule`]s in
//! priority order; the first match selects the workflow that the
//! [`WorkflowDispatcher`] builds and runs in a fresh container scope.

pub mod dispatcher;
pub mod registry;
pub mod rule;
pub mod rule_types;

pub use dispatcher::WorkflowDispatcher;
pub use registry::{CompiledRule, DispatchRuleRegistry};
pub use rule::{
    CombinedDispatchRule, DEFAULT_PRIORITY, LegacyDispatchRule, RuleConfig, RuleDocument,
    RuleFile, RuleGroup, RuleOperator, SimpleDispatchRule,
};
pub use rule_types::{DispatchRule, RuleFactory, RuleTypeRegistry};
