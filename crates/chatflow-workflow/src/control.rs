// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Control-flow blocks inserted by the builder: conditions and loops.
//!
//! Their ports mirror the outputs of whatever precedes them so data flows
//! through unchanged. They carry closures, so they are never registered and
//! cannot be persisted to YAML.

use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chatflow_core::ChatflowError;

use crate::block::{
    Block, BlockContext, BlockKind, BlockSchema, BlockType, InputSpec, OutputSpec, Params,
};
use crate::types::names;
use crate::value::{Inputs, Outputs, Value};

/// Predicate evaluated by condition and loop blocks.
pub type Predicate = Arc<dyn Fn(&BlockContext, &Inputs) -> bool + Send + Sync>;

pub const CONDITION_RESULT: &str = "condition_result";
pub const SHOULD_CONTINUE: &str = "should_continue";
pub const ITERATION: &str = "iteration";
pub const PREVIOUS_RESULTS: &str = "previous_results";
pub const LOOP_RESULTS: &str = "loop_results";

fn mirrored_inputs(outputs: &[OutputSpec]) -> Vec<InputSpec> {
    outputs
        .iter()
        .map(|o| InputSpec::new(o.name.clone(), o.type_name.clone()).nullable())
        .collect()
}

fn passthrough_outputs(inputs: &[InputSpec], reserved: &[&str]) -> Vec<OutputSpec> {
    inputs
        .iter()
        .filter(|i| !reserved.contains(&i.name.as_str()))
        .map(|i| OutputSpec::new(i.name.clone(), i.type_name.clone()))
        .collect()
}

/// Collect the outputs of `upstream` into one port list, first name wins.
pub(crate) fn merge_outputs<'a>(upstream: impl IntoIterator<Item = &'a BlockSchema>) -> Vec<OutputSpec> {
    let mut merged: Vec<OutputSpec> = Vec::new();
    for schema in upstream {
        for output in &schema.outputs {
            if !merged.iter().any(|o| o.name == output.name) {
                merged.push(output.clone());
            }
        }
    }
    merged
}

/// Branches on a predicate over its (passed-through) inputs.
pub struct ConditionBlock {
    predicate: Predicate,
}

#[async_trait]
impl Block for ConditionBlock {
    fn kind(&self) -> BlockKind {
        BlockKind::Condition
    }

    async fn execute(&self, ctx: &BlockContext, inputs: Inputs) -> Result<Outputs, ChatflowError> {
        let result = (self.predicate)(ctx, &inputs);
        let mut outputs = inputs;
        outputs.insert(CONDITION_RESULT, result);
        Ok(outputs)
    }
}

pub(crate) struct ConditionClass {
    predicate: Predicate,
    upstream: Vec<OutputSpec>,
}

impl ConditionClass {
    pub(crate) fn new(predicate: Predicate, upstream: Vec<OutputSpec>) -> Self {
        Self { predicate, upstream }
    }
}

impl BlockType for ConditionClass {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<ConditionBlock>()
    }

    fn schema(&self) -> BlockSchema {
        let inputs = mirrored_inputs(&self.upstream);
        let mut outputs = vec![OutputSpec::new(CONDITION_RESULT, names::BOOL)];
        outputs.extend(passthrough_outputs(&inputs, &[CONDITION_RESULT]));
        BlockSchema {
            inputs,
            outputs,
            configs: Vec::new(),
        }
    }

    fn create(&self, _params: &Params) -> Result<Arc<dyn Block>, ChatflowError> {
        Ok(Arc::new(ConditionBlock {
            predicate: Arc::clone(&self.predicate),
        }))
    }
}

/// Loop head. Publishes its iteration index as a run variable before
/// evaluating the predicate.
pub struct LoopBlock {
    predicate: Predicate,
    iteration_var: String,
    iteration: AtomicI64,
}

#[async_trait]
impl Block for LoopBlock {
    fn kind(&self) -> BlockKind {
        BlockKind::Loop
    }

    async fn execute(&self, ctx: &BlockContext, inputs: Inputs) -> Result<Outputs, ChatflowError> {
        let index = self.iteration.fetch_add(1, Ordering::SeqCst);
        ctx.set_variable(self.iteration_var.clone(), index);
        let should_continue = (self.predicate)(ctx, &inputs);

        let mut iteration: std::collections::BTreeMap<String, Value> = inputs
            .iter()
            .filter(|(k, _)| k.as_str() != PREVIOUS_RESULTS)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        iteration.insert(self.iteration_var.clone(), Value::Int(index));

        let mut outputs = inputs;
        outputs.remove(PREVIOUS_RESULTS);
        outputs.insert(SHOULD_CONTINUE, should_continue);
        outputs.insert(ITERATION, Value::Map(iteration));
        Ok(outputs)
    }

    fn reset_state(&self) {
        self.iteration.store(0, Ordering::SeqCst);
    }
}

pub(crate) struct LoopClass {
    predicate: Predicate,
    iteration_var: String,
    upstream: Vec<OutputSpec>,
}

impl LoopClass {
    pub(crate) fn new(predicate: Predicate, iteration_var: String, upstream: Vec<OutputSpec>) -> Self {
        Self {
            predicate,
            iteration_var,
            upstream,
        }
    }
}

impl BlockType for LoopClass {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<LoopBlock>()
    }

    fn schema(&self) -> BlockSchema {
        let mut inputs = mirrored_inputs(&self.upstream);
        inputs.retain(|i| i.name != PREVIOUS_RESULTS);
        let mut outputs = vec![
            OutputSpec::new(SHOULD_CONTINUE, names::BOOL),
            OutputSpec::new(ITERATION, names::MAP),
        ];
        outputs.extend(passthrough_outputs(&inputs, &[SHOULD_CONTINUE, ITERATION]));
        inputs.push(InputSpec::new(PREVIOUS_RESULTS, names::LIST).nullable());
        BlockSchema {
            inputs,
            outputs,
            configs: Vec::new(),
        }
    }

    fn create(&self, _params: &Params) -> Result<Arc<dyn Block>, ChatflowError> {
        Ok(Arc::new(LoopBlock {
            predicate: Arc::clone(&self.predicate),
            iteration_var: self.iteration_var.clone(),
            iteration: AtomicI64::new(0),
        }))
    }
}

/// Closes a loop body; every execution appends its inputs to `loop_results`.
#[derive(Default)]
pub struct LoopEndBlock {
    collected: Mutex<Vec<Value>>,
}

#[async_trait]
impl Block for LoopEndBlock {
    fn kind(&self) -> BlockKind {
        BlockKind::LoopEnd
    }

    async fn execute(&self, _ctx: &BlockContext, inputs: Inputs) -> Result<Outputs, ChatflowError> {
        let mut collected = self.collected.lock().unwrap_or_else(PoisonError::into_inner);
        collected.push(Value::Map(inputs.into_map()));
        Ok(Outputs::new().with(LOOP_RESULTS, Value::List(collected.clone())))
    }

    fn reset_state(&self) {
        self.collected.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

pub(crate) struct LoopEndClass {
    upstream: Vec<OutputSpec>,
}

impl LoopEndClass {
    pub(crate) fn new(upstream: Vec<OutputSpec>) -> Self {
        Self { upstream }
    }
}

impl BlockType for LoopEndClass {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<LoopEndBlock>()
    }

    fn schema(&self) -> BlockSchema {
        BlockSchema {
            inputs: mirrored_inputs(&self.upstream),
            outputs: vec![OutputSpec::new(LOOP_RESULTS, names::LIST)],
            configs: Vec::new(),
        }
    }

    fn create(&self, _params: &Params) -> Result<Arc<dyn Block>, ChatflowError> {
        Ok(Arc::new(LoopEndBlock::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatflow_ioc::Container;

    fn upstream() -> Vec<OutputSpec> {
        vec![OutputSpec::new("text", names::STR)]
    }

    #[tokio::test]
    async fn condition_passes_inputs_through() {
        let class = ConditionClass::new(
            Arc::new(|_, inputs: &Inputs| inputs.text("text").is_ok_and(|t| t == "a")),
            upstream(),
        );
        let schema = class.schema();
        assert!(schema.find_input("text").is_some_and(|i| i.nullable));
        assert!(schema.find_output(CONDITION_RESULT).is_some());

        let block = class.create(&Params::new()).unwrap();
        assert_eq!(block.kind(), BlockKind::Condition);
        let ctx = BlockContext::detached(Container::new());
        let out = block
            .execute(&ctx, Inputs::new().with("text", "a"))
            .await
            .unwrap();
        assert_eq!(out.get(CONDITION_RESULT), Some(&Value::Bool(true)));
        assert_eq!(out.text("text").unwrap(), "a");
    }

    #[tokio::test]
    async fn loop_counts_iterations_into_variable() {
        let class = LoopClass::new(
            Arc::new(|ctx: &BlockContext, _: &Inputs| {
                ctx.get_variable("i").and_then(|v| v.as_int()).unwrap_or(0) < 2
            }),
            "i".into(),
            Vec::new(),
        );
        let block = class.create(&Params::new()).unwrap();
        let ctx = BlockContext::detached(Container::new());

        let mut seen = Vec::new();
        for _ in 0..3 {
            let out = block.execute(&ctx, Inputs::new()).await.unwrap();
            seen.push(out.get(SHOULD_CONTINUE).and_then(Value::as_bool).unwrap());
        }
        assert_eq!(seen, vec![true, true, false]);
        assert_eq!(ctx.get_variable("i"), Some(Value::Int(2)));
    }

    #[tokio::test]
    async fn loop_end_accumulates() {
        let block = LoopEndClass::new(upstream()).create(&Params::new()).unwrap();
        let ctx = BlockContext::detached(Container::new());
        block.execute(&ctx, Inputs::new().with("text", "x")).await.unwrap();
        let out = block.execute(&ctx, Inputs::new().with("text", "y")).await.unwrap();
        assert_eq!(out.list(LOOP_RESULTS).unwrap().len(), 2);
    }
}
