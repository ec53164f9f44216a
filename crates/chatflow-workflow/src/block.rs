// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Block model: port and config descriptors, the [`Block`] trait, and the
//! [`BlockType`] factories the registry stores.
//!
//! A block type describes itself with an explicit [`BlockSchema`] instead of
//! being introspected; config fields carry a [`ParamMeta`] for UI labels and
//! option enumerations.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chatflow_core::ChatflowError;
use chatflow_ioc::Container;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::value::{Inputs, Outputs, Value};

/// Callback that enumerates the allowed values of a config field.
pub type OptionsProvider = Arc<dyn Fn(&Container) -> Vec<serde_json::Value> + Send + Sync>;

/// A named, typed input port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub description: String,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl InputSpec {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            type_name: type_name.into(),
            description: String::new(),
            nullable: false,
            default: None,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Whether the executor must find a wired value before running the block.
    pub fn is_required(&self) -> bool {
        !self.nullable && self.default.is_none()
    }
}

/// A named, typed output port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub description: String,
}

impl OutputSpec {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            type_name: type_name.into(),
            description: String::new(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Display metadata attached to a config field.
#[derive(Clone, Default)]
pub struct ParamMeta {
    pub label: Option<String>,
    pub description: Option<String>,
    pub options_provider: Option<OptionsProvider>,
}

impl fmt::Debug for ParamMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamMeta")
            .field("label", &self.label)
            .field("description", &self.description)
            .field("has_options", &self.options_provider.is_some())
            .finish()
    }
}

/// A constructor parameter of a block type.
#[derive(Debug, Clone)]
pub struct ConfigSpec {
    pub name: String,
    pub type_name: String,
    pub required: bool,
    pub default: Option<serde_json::Value>,
    pub meta: ParamMeta,
}

impl ConfigSpec {
    /// An optional parameter with no default.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            required: false,
            default: None,
            meta: ParamMeta::default(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<serde_json::Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.meta.label = Some(label.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.meta.description = Some(description.into());
        self
    }

    pub fn options_provider<F>(mut self, provider: F) -> Self
    where
        F: Fn(&Container) -> Vec<serde_json::Value> + Send + Sync + 'static,
    {
        self.meta.options_provider = Some(Arc::new(provider));
        self
    }
}

/// Everything a block type declares about itself.
#[derive(Debug, Clone, Default)]
pub struct BlockSchema {
    pub inputs: Vec<InputSpec>,
    pub outputs: Vec<OutputSpec>,
    pub configs: Vec<ConfigSpec>,
}

impl BlockSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, spec: InputSpec) -> Self {
        self.inputs.push(spec);
        self
    }

    pub fn output(mut self, spec: OutputSpec) -> Self {
        self.outputs.push(spec);
        self
    }

    pub fn config(mut self, spec: ConfigSpec) -> Self {
        self.configs.push(spec);
        self
    }

    pub fn find_input(&self, name: &str) -> Option<&InputSpec> {
        self.inputs.iter().find(|i| i.name == name)
    }

    pub fn find_output(&self, name: &str) -> Option<&OutputSpec> {
        self.outputs.iter().find(|o| o.name == name)
    }
}

/// How the executor treats a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockKind {
    #[default]
    Plain,
    /// Emits `condition_result`; successor 0 is "then", successor 1 "else".
    Condition,
    /// Emits `should_continue`; successor 0 is the loop body.
    Loop,
    /// Closes a loop body and aggregates per-iteration results.
    LoopEnd,
}

/// A unit of computation inside a workflow.
#[async_trait]
pub trait Block: Send + Sync + 'static {
    fn kind(&self) -> BlockKind {
        BlockKind::Plain
    }

    /// Run the block. Inputs hold one value per wired (or defaulted) port.
    async fn execute(&self, ctx: &BlockContext, inputs: Inputs) -> Result<Outputs, ChatflowError>;

    /// Forget state carried between executions. Called each time a loop is
    /// entered, for its head and end.
    fn reset_state(&self) {}
}

/// A factory for one kind of block, as stored in the [`BlockRegistry`](crate::BlockRegistry).
pub trait BlockType: Send + Sync + 'static {
    /// Fully qualified Rust type name; used for reverse lookup.
    fn type_name(&self) -> &'static str;

    /// Human readable class name, used for generated node names.
    fn short_name(&self) -> &'static str {
        short_type_name(self.type_name())
    }

    fn schema(&self) -> BlockSchema;

    fn create(&self, params: &Params) -> Result<Arc<dyn Block>, ChatflowError>;
}

/// Implemented by concrete block structs; [`block_class`] turns them into a
/// [`BlockType`].
pub trait BlockDefinition: Block + Sized {
    fn schema() -> BlockSchema;

    fn from_params(params: &Params) -> Result<Self, ChatflowError>;
}

/// [`BlockType`] for a [`BlockDefinition`].
pub struct BlockClassOf<B>(PhantomData<fn() -> B>);

impl<B: BlockDefinition> BlockType for BlockClassOf<B> {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<B>()
    }

    fn schema(&self) -> BlockSchema {
        B::schema()
    }

    fn create(&self, params: &Params) -> Result<Arc<dyn Block>, ChatflowError> {
        let params = params.with_defaults(self.short_name(), &B::schema().configs)?;
        Ok(Arc::new(B::from_params(&params)?))
    }
}

/// The block type for `B`.
pub fn block_class<B: BlockDefinition>() -> Arc<dyn BlockType> {
    Arc::new(BlockClassOf::<B>(PhantomData))
}

pub(crate) fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Constructor parameters for a block instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, serde_json::Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(serde_json::Value::as_str)
    }

    pub fn string_or(&self, key: &str, default: &str) -> String {
        self.str(key).unwrap_or(default).to_string()
    }

    pub fn i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(serde_json::Value::as_i64)
    }

    pub fn f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(serde_json::Value::as_f64)
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(serde_json::Value::as_bool)
    }

    /// Deserialize a parameter into `T`; `Ok(None)` when absent.
    pub fn parse<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ChatflowError> {
        self.get(key)
            .map(|v| {
                serde_json::from_value(v.clone()).map_err(|e| {
                    ChatflowError::Config(format!("parameter `{key}` has the wrong shape: {e}"))
                })
            })
            .transpose()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fill declared defaults and reject missing required parameters.
    pub fn with_defaults(&self, block: &str, configs: &[ConfigSpec]) -> Result<Params, ChatflowError> {
        let mut out = self.clone();
        for spec in configs {
            if out.get(&spec.name).is_some() {
                continue;
            }
            match (&spec.default, spec.required) {
                (Some(default), _) => out.insert(spec.name.clone(), default.clone()),
                (None, true) => {
                    return Err(ChatflowError::Config(format!(
                        "block `{block}` is missing required parameter `{}`",
                        spec.name
                    )));
                }
                (None, false) => {}
            }
        }
        Ok(out)
    }
}

impl FromIterator<(String, serde_json::Value)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, serde_json::Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Per-run variable store shared by every block of one execution.
#[derive(Debug, Default)]
pub struct Variables(DashMap<String, Value>);

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.get(name).map(|v| v.value().clone())
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.0.remove(name).map(|(_, v)| v)
    }

    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.0
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}

/// What a running block can see: its scope, the run's variables, and names.
#[derive(Debug, Clone)]
pub struct BlockContext {
    container: Arc<Container>,
    variables: Arc<Variables>,
    workflow: Arc<str>,
    block: Arc<str>,
}

impl BlockContext {
    pub fn new(
        container: Arc<Container>,
        variables: Arc<Variables>,
        workflow: impl Into<Arc<str>>,
        block: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            container,
            variables,
            workflow: workflow.into(),
            block: block.into(),
        }
    }

    /// A context outside any run, for calling blocks directly.
    pub fn detached(container: Arc<Container>) -> Self {
        Self::new(container, Arc::new(Variables::new()), "", "")
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    pub fn resolve<T>(&self) -> Result<T, ChatflowError>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.container.resolve::<T>()
    }

    pub fn try_resolve<T>(&self) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.container.try_resolve::<T>()
    }

    pub fn workflow_name(&self) -> &str {
        &self.workflow
    }

    pub fn block_name(&self) -> &str {
        &self.block
    }

    pub fn variables(&self) -> &Arc<Variables> {
        &self.variables
    }

    pub fn set_variable(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.variables.set(name, value);
    }

    pub fn get_variable(&self, name: &str) -> Option<Value> {
        self.variables.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::names;

    struct Shout {
        suffix: String,
    }

    #[async_trait]
    impl Block for Shout {
        async fn execute(&self, _ctx: &BlockContext, inputs: Inputs) -> Result<Outputs, ChatflowError> {
            let text = inputs.text("text")?;
            Ok(Outputs::new().with("text", format!("{}{}", text.to_uppercase(), self.suffix)))
        }
    }

    impl BlockDefinition for Shout {
        fn schema() -> BlockSchema {
            BlockSchema::new()
                .input(InputSpec::new("text", names::STR))
                .output(OutputSpec::new("text", names::STR))
                .config(ConfigSpec::new("suffix", names::STR).default_value("!"))
        }

        fn from_params(params: &Params) -> Result<Self, ChatflowError> {
            Ok(Self {
                suffix: params.string_or("suffix", ""),
            })
        }
    }

    struct NeedsTarget;

    #[async_trait]
    impl Block for NeedsTarget {
        async fn execute(&self, _ctx: &BlockContext, _inputs: Inputs) -> Result<Outputs, ChatflowError> {
            Ok(Outputs::new())
        }
    }

    impl BlockDefinition for NeedsTarget {
        fn schema() -> BlockSchema {
            BlockSchema::new().config(ConfigSpec::new("target", names::STR).required())
        }

        fn from_params(_params: &Params) -> Result<Self, ChatflowError> {
            Ok(Self)
        }
    }

    #[tokio::test]
    async fn class_applies_param_defaults() {
        let class = block_class::<Shout>();
        assert_eq!(class.short_name(), "Shout");
        let block = class.create(&Params::new()).unwrap();
        let ctx = BlockContext::detached(Container::new());
        let out = block
            .execute(&ctx, Inputs::new().with("text", "hi"))
            .await
            .unwrap();
        assert_eq!(out.text("text").unwrap(), "HI!");
    }

    #[test]
    fn missing_required_param_is_config_error() {
        let err = block_class::<NeedsTarget>()
            .create(&Params::new())
            .err()
            .expect("should fail");
        assert!(matches!(err, ChatflowError::Config(ref m) if m.contains("target")));
    }

    #[test]
    fn input_requirement_accounts_for_defaults() {
        assert!(InputSpec::new("a", names::STR).is_required());
        assert!(!InputSpec::new("a", names::STR).nullable().is_required());
        assert!(!InputSpec::new("a", names::STR).default_value("x").is_required());
    }

    #[test]
    fn short_name_strips_path_and_generics() {
        assert_eq!(short_type_name("a::b::Thing<c::D>"), "Thing");
        assert_eq!(short_type_name("Plain"), "Plain");
    }

    #[test]
    fn params_parse_reports_shape_errors() {
        let params = Params::new().with("n", "not a number");
        assert!(params.parse::<u32>("n").is_err());
        assert_eq!(params.parse::<u32>("absent").unwrap(), None);
    }
}
