// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Workflow execution.
//!
//! The executor walks the wire graph from its entry blocks. A block runs
//! once all of its predecessors finished (or were skipped by a branch) and
//! every required input has a wired value. Block bodies run on spawned
//! tasks; sibling successors are driven concurrently. Conditions pick one
//! successor and skip the other branch; loops re-run their body until the
//! predicate says stop.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chatflow_bus::{EventBus, WorkflowExecutionBegin, WorkflowExecutionEnd};
use chatflow_config::SharedConfig;
use chatflow_core::ChatflowError;
use chatflow_ioc::Container;
use futures::FutureExt;
use futures::future::{BoxFuture, try_join_all};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::block::{BlockContext, BlockKind, Variables};
use crate::control::{CONDITION_RESULT, LOOP_RESULTS, SHOULD_CONTINUE};
use crate::registry::BlockRegistry;
use crate::types::TypeSystem;
use crate::value::{Inputs, Outputs, Value};
use crate::workflow::Workflow;

/// Outputs of every executed block, by block name.
pub type ExecutionResults = BTreeMap<String, Outputs>;

/// Knobs that otherwise come from the container.
#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    /// Abort a loop after this many body runs. `None` trusts the predicate.
    pub max_loop_iterations: Option<u64>,
    pub cancel: Option<CancellationToken>,
}

struct Graph {
    /// Distinct targets of non-loop wires, in wire order.
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
    /// Loop head to its loop end.
    loop_ends: HashMap<usize, usize>,
}

#[derive(Default)]
struct RunState {
    results: HashMap<usize, Outputs>,
    started: HashSet<usize>,
    completed: HashSet<usize>,
    skipped: HashSet<usize>,
}

/// Runs one [`Workflow`] inside one container scope.
pub struct WorkflowExecutor {
    workflow: Arc<Workflow>,
    container: Arc<Container>,
    graph: Graph,
    state: Mutex<RunState>,
    variables: Arc<Variables>,
    options: ExecutorOptions,
    bus: Option<Arc<EventBus>>,
}

impl WorkflowExecutor {
    /// Validate every wire and prepare the execution graph.
    ///
    /// Loop bound, cancellation token, and event bus are picked up from
    /// `container` when bound there.
    pub fn new(workflow: Arc<Workflow>, container: Arc<Container>) -> Result<Self, ChatflowError> {
        let types = container
            .try_resolve::<Arc<BlockRegistry>>()
            .map(|r| Arc::clone(r.type_system()))
            .unwrap_or_else(|| Arc::new(TypeSystem::with_builtins()));
        if let Err(e) = workflow.validate(&types) {
            error!(workflow = %workflow.name(), error = %e, "workflow failed validation");
            return Err(e);
        }

        let options = ExecutorOptions {
            max_loop_iterations: container
                .try_resolve::<SharedConfig>()
                .and_then(|c| c.load().workflow.max_loop_iterations),
            cancel: container.try_resolve::<CancellationToken>(),
        };
        let bus = container.try_resolve::<Arc<EventBus>>();
        let graph = build_graph(&workflow);
        info!(
            workflow = %workflow.name(),
            blocks = workflow.blocks().len(),
            "executor initialized"
        );

        Ok(Self {
            workflow,
            container,
            graph,
            state: Mutex::new(RunState::default()),
            variables: Arc::new(Variables::new()),
            options,
            bus,
        })
    }

    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn workflow(&self) -> &Arc<Workflow> {
        &self.workflow
    }

    pub fn set_variable(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.variables.set(name, value);
    }

    pub fn get_variable(&self, name: &str) -> Option<Value> {
        self.variables.get(name)
    }

    /// Results recorded so far, by block name.
    pub fn results(&self) -> ExecutionResults {
        let state = self.lock();
        state
            .results
            .iter()
            .map(|(idx, out)| (self.workflow.blocks()[*idx].name.clone(), out.clone()))
            .collect()
    }

    /// Execute the workflow from its entry blocks.
    pub async fn run(&self) -> Result<ExecutionResults, ChatflowError> {
        *self.lock() = RunState::default();
        let name = self.workflow.name().to_string();
        if let Some(bus) = &self.bus {
            bus.post(WorkflowExecutionBegin {
                workflow: name.clone(),
            });
        }

        let entries = self.entry_blocks();
        info!(workflow = %name, entries = entries.len(), "workflow execution started");
        let outcome = self.exec_nodes(entries).await;

        if let Some(bus) = &self.bus {
            bus.post(WorkflowExecutionEnd {
                workflow: name.clone(),
                success: outcome.is_ok(),
            });
        }
        match outcome {
            Ok(()) => {
                info!(workflow = %name, "workflow execution completed");
                Ok(self.results())
            }
            Err(e) => {
                error!(workflow = %name, error = %e, "workflow execution failed");
                Err(e)
            }
        }
    }

    /// Blocks with no incoming wire apart from loop-backs.
    fn entry_blocks(&self) -> Vec<usize> {
        (0..self.workflow.blocks().len())
            .filter(|idx| self.graph.predecessors[*idx].is_empty())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn exec_nodes(&self, nodes: Vec<usize>) -> BoxFuture<'_, Result<(), ChatflowError>> {
        async move {
            try_join_all(nodes.into_iter().map(|idx| self.exec_node(idx))).await?;
            Ok(())
        }
        .boxed()
    }

    async fn exec_node(&self, idx: usize) -> Result<(), ChatflowError> {
        match self.workflow.blocks()[idx].block.kind() {
            BlockKind::Condition => self.exec_condition(idx).await,
            BlockKind::Loop => self.exec_loop(idx).await,
            BlockKind::Plain | BlockKind::LoopEnd => self.exec_plain(idx).await,
        }
    }

    async fn exec_plain(&self, idx: usize) -> Result<(), ChatflowError> {
        let Some(inputs) = self.claim(idx) else {
            return Ok(());
        };
        let outputs = self.invoke(idx, inputs).await?;
        self.complete(idx, outputs);

        // The loop head resumes after its end; see `exec_loop`.
        if self.workflow.blocks()[idx].block.kind() == BlockKind::LoopEnd {
            return Ok(());
        }
        let next = self.graph.successors[idx].clone();
        if next.is_empty() {
            return Ok(());
        }
        self.exec_nodes(next).await
    }

    async fn exec_condition(&self, idx: usize) -> Result<(), ChatflowError> {
        let Some(inputs) = self.claim(idx) else {
            return Ok(());
        };
        let outputs = self.invoke(idx, inputs).await?;
        let result = outputs
            .get(CONDITION_RESULT)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        self.complete(idx, outputs);
        info!(
            workflow = %self.workflow.name(),
            block = %self.workflow.blocks()[idx].name,
            result,
            "condition evaluated"
        );

        let successors = &self.graph.successors[idx];
        let (taken, untaken) = if result {
            (successors.first().copied(), successors.get(1).copied())
        } else {
            (successors.get(1).copied(), successors.first().copied())
        };
        if let Some(untaken) = untaken {
            self.skip_branch(untaken, taken);
        }
        match taken {
            Some(next) => self.exec_nodes(vec![next]).await,
            None => Ok(()),
        }
    }

    async fn exec_loop(&self, idx: usize) -> Result<(), ChatflowError> {
        let Some(mut inputs) = self.claim(idx) else {
            return Ok(());
        };
        let name = self.workflow.blocks()[idx].name.clone();
        let body = self.graph.successors[idx].first().copied();
        let end = self.graph.loop_ends.get(&idx).copied();
        let mut iterations: u64 = 0;
        for member in std::iter::once(idx).chain(end) {
            self.workflow.blocks()[member].block.reset_state();
        }

        loop {
            let outputs = self.invoke(idx, inputs).await?;
            let should_continue = outputs
                .get(SHOULD_CONTINUE)
                .and_then(Value::as_bool)
                .unwrap_or(false);
            self.complete(idx, outputs);
            if !should_continue {
                break;
            }

            iterations += 1;
            if let Some(max) = self.options.max_loop_iterations {
                if iterations > max {
                    return Err(ChatflowError::BlockExecutionFailed {
                        block: name,
                        message: format!("loop exceeded {max} iterations"),
                    });
                }
            }
            if let Some(body) = body {
                trace!(block = %name, iteration = iterations, "running loop body");
                self.reset(&self.body_members(idx, body, end));
                self.exec_nodes(vec![body]).await?;
            }
            inputs = self.gather(&self.lock(), idx);
        }
        info!(
            workflow = %self.workflow.name(),
            block = %name,
            iterations,
            "loop finished"
        );

        let Some(end) = end else {
            return Ok(());
        };
        {
            let mut state = self.lock();
            state
                .results
                .entry(end)
                .or_insert_with(|| Outputs::new().with(LOOP_RESULTS, Value::List(Vec::new())));
            state.started.insert(end);
            state.completed.insert(end);
        }
        let next = self.graph.successors[end].clone();
        if next.is_empty() {
            return Ok(());
        }
        self.exec_nodes(next).await
    }

    /// Atomically check readiness and mark `idx` started. Returns its inputs.
    fn claim(&self, idx: usize) -> Option<Inputs> {
        let mut state = self.lock();
        if !self.is_ready(&state, idx) {
            trace!(block = %self.workflow.blocks()[idx].name, "block not ready");
            return None;
        }
        state.started.insert(idx);
        Some(self.gather(&state, idx))
    }

    fn is_ready(&self, state: &RunState, idx: usize) -> bool {
        if state.started.contains(&idx) || state.skipped.contains(&idx) {
            return false;
        }
        let predecessors_done = self.graph.predecessors[idx]
            .iter()
            .all(|p| state.completed.contains(p) || state.skipped.contains(p));
        if !predecessors_done {
            return false;
        }
        let block = &self.workflow.blocks()[idx];
        block
            .schema
            .inputs
            .iter()
            .filter(|input| input.is_required())
            .all(|input| self.wired_value(state, idx, &input.name).is_some())
    }

    /// The value on the first available wire into `idx.input`.
    fn wired_value<'s>(&self, state: &'s RunState, idx: usize, input: &str) -> Option<&'s Value> {
        let target = &self.workflow.blocks()[idx].name;
        self.workflow
            .wires()
            .iter()
            .filter(|w| &w.target == target)
            .filter_map(|w| w.mapping.as_ref().map(|m| (w, m)))
            .filter(|(_, m)| m.to == input)
            .find_map(|(w, m)| {
                let source = self.index_of(&w.source)?;
                let available = if w.loop_back {
                    state.results.contains_key(&source)
                } else {
                    state.completed.contains(&source)
                };
                if !available {
                    return None;
                }
                state.results.get(&source).and_then(|out| out.get(&m.from))
            })
    }

    fn gather(&self, state: &RunState, idx: usize) -> Inputs {
        let mut inputs = Inputs::new();
        for input in &self.workflow.blocks()[idx].schema.inputs {
            match self.wired_value(state, idx, &input.name) {
                Some(value) => inputs.insert(input.name.clone(), value.clone()),
                None => {
                    if let Some(default) = &input.default {
                        inputs.insert(input.name.clone(), default.clone());
                    }
                }
            }
        }
        inputs
    }

    fn complete(&self, idx: usize, outputs: Outputs) {
        let mut state = self.lock();
        state.results.insert(idx, outputs);
        state.completed.insert(idx);
    }

    async fn invoke(&self, idx: usize, inputs: Inputs) -> Result<Outputs, ChatflowError> {
        if self.options.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Err(ChatflowError::Cancelled);
        }
        let entry = &self.workflow.blocks()[idx];
        let block = Arc::clone(&entry.block);
        let ctx = BlockContext::new(
            Arc::clone(&self.container),
            Arc::clone(&self.variables),
            self.workflow.name(),
            entry.name.as_str(),
        );
        debug!(workflow = %self.workflow.name(), block = %entry.name, "executing block");

        let scope = Arc::clone(&self.container);
        let handle = tokio::spawn(Container::with_current(scope, async move {
            block.execute(&ctx, inputs).await
        }));
        let joined = match &self.options.cancel {
            Some(cancel) => {
                let abort = handle.abort_handle();
                tokio::select! {
                    joined = handle => joined,
                    () = cancel.cancelled() => {
                        abort.abort();
                        info!(workflow = %self.workflow.name(), block = %entry.name, "block cancelled");
                        return Err(ChatflowError::Cancelled);
                    }
                }
            }
            None => handle.await,
        };
        match joined {
            Ok(Ok(outputs)) => Ok(outputs),
            Ok(Err(ChatflowError::Cancelled)) => Err(ChatflowError::Cancelled),
            Ok(Err(e)) => Err(ChatflowError::BlockExecutionFailed {
                block: entry.name.clone(),
                message: e.to_string(),
            }),
            Err(join) => Err(ChatflowError::BlockExecutionFailed {
                block: entry.name.clone(),
                message: join.to_string(),
            }),
        }
    }

    /// Mark everything only reachable through `untaken` as skipped.
    fn skip_branch(&self, untaken: usize, taken: Option<usize>) {
        let keep = taken.map(|t| self.reachable(t, None)).unwrap_or_default();
        let mut state = self.lock();
        for idx in self.reachable(untaken, None) {
            if !keep.contains(&idx) && !state.started.contains(&idx) {
                trace!(block = %self.workflow.blocks()[idx].name, "skipping untaken branch");
                state.skipped.insert(idx);
            }
        }
    }

    /// Body of a loop: reachable from `body` without passing the end or the head.
    fn body_members(&self, head: usize, body: usize, end: Option<usize>) -> HashSet<usize> {
        let mut members = self.reachable(body, end);
        members.remove(&head);
        members
    }

    fn reachable(&self, start: usize, stop_at: Option<usize>) -> HashSet<usize> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(idx) = queue.pop_front() {
            if !seen.insert(idx) || Some(idx) == stop_at {
                continue;
            }
            queue.extend(self.graph.successors[idx].iter().copied());
        }
        seen
    }

    fn reset(&self, members: &HashSet<usize>) {
        let mut state = self.lock();
        for idx in members {
            state.started.remove(idx);
            state.completed.remove(idx);
            state.skipped.remove(idx);
        }
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.workflow.blocks().iter().position(|b| b.name == name)
    }
}

fn build_graph(workflow: &Workflow) -> Graph {
    let index: HashMap<&str, usize> = workflow
        .blocks()
        .iter()
        .enumerate()
        .map(|(i, b)| (b.name.as_str(), i))
        .collect();
    let n = workflow.blocks().len();
    let mut successors = vec![Vec::new(); n];
    let mut predecessors = vec![Vec::new(); n];
    let mut loop_ends = HashMap::new();

    for wire in workflow.wires() {
        let (Some(&source), Some(&target)) =
            (index.get(wire.source.as_str()), index.get(wire.target.as_str()))
        else {
            continue;
        };
        if wire.loop_back {
            loop_ends.insert(target, source);
            continue;
        }
        if !successors[source].contains(&target) {
            successors[source].push(target);
        }
        if !predecessors[target].contains(&source) {
            predecessors[target].push(source);
        }
    }

    Graph {
        successors,
        predecessors,
        loop_ends,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, BlockDefinition, BlockSchema, InputSpec, OutputSpec, Params};
    use crate::builder::{NodeSpec, WorkflowBuilder};
    use crate::types::names;
    use async_trait::async_trait;

    struct Emit;

    #[async_trait]
    impl Block for Emit {
        async fn execute(&self, _: &BlockContext, _: Inputs) -> Result<Outputs, ChatflowError> {
            Ok(Outputs::new().with("text", "hello"))
        }
    }

    impl BlockDefinition for Emit {
        fn schema() -> BlockSchema {
            BlockSchema::new().output(OutputSpec::new("text", names::STR))
        }
        fn from_params(_: &Params) -> Result<Self, ChatflowError> {
            Ok(Self)
        }
    }

    struct Fail;

    #[async_trait]
    impl Block for Fail {
        async fn execute(&self, _: &BlockContext, _: Inputs) -> Result<Outputs, ChatflowError> {
            Err(ChatflowError::Internal("boom".into()))
        }
    }

    impl BlockDefinition for Fail {
        fn schema() -> BlockSchema {
            BlockSchema::new().input(InputSpec::new("text", names::STR))
        }
        fn from_params(_: &Params) -> Result<Self, ChatflowError> {
            Ok(Self)
        }
    }

    #[tokio::test]
    async fn block_failure_aborts_run() {
        let container = Container::new();
        let workflow = WorkflowBuilder::new("failing")
            .use_block(NodeSpec::of::<Emit>().name("emit"))
            .chain(NodeSpec::of::<Fail>().name("fail"))
            .build(&container)
            .unwrap();
        let executor = WorkflowExecutor::new(Arc::new(workflow), container).unwrap();
        let err = executor.run().await.unwrap_err();
        assert!(
            matches!(err, ChatflowError::BlockExecutionFailed { ref block, ref message }
                if block == "fail" && message.contains("boom"))
        );
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_first_block() {
        let container = Container::new();
        let token = CancellationToken::new();
        token.cancel();
        container.register(token);
        let workflow = WorkflowBuilder::new("cancelled")
            .use_block(NodeSpec::of::<Emit>())
            .build(&container)
            .unwrap();
        let executor = WorkflowExecutor::new(Arc::new(workflow), container).unwrap();
        assert!(matches!(executor.run().await, Err(ChatflowError::Cancelled)));
    }

    struct Stall;

    #[async_trait]
    impl Block for Stall {
        async fn execute(&self, _: &BlockContext, _: Inputs) -> Result<Outputs, ChatflowError> {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            Ok(Outputs::new())
        }
    }

    impl BlockDefinition for Stall {
        fn schema() -> BlockSchema {
            BlockSchema::new()
        }
        fn from_params(_: &Params) -> Result<Self, ChatflowError> {
            Ok(Self)
        }
    }

    #[tokio::test]
    async fn cancelling_mid_block_ends_run_with_cancelled() {
        let container = Container::new();
        let token = CancellationToken::new();
        container.register(token.clone());
        let workflow = WorkflowBuilder::new("stalled")
            .use_block(NodeSpec::of::<Stall>())
            .build(&container)
            .unwrap();
        let executor = WorkflowExecutor::new(Arc::new(workflow), container).unwrap();

        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            token.cancel();
        });
        let outcome = tokio::time::timeout(std::time::Duration::from_secs(5), executor.run())
            .await
            .expect("run should end once cancelled");
        assert!(matches!(outcome, Err(ChatflowError::Cancelled)));
    }

    #[tokio::test]
    async fn posts_begin_and_end_events() {
        let container = Container::new();
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let begin = Arc::clone(&seen);
        bus.register(move |e: &WorkflowExecutionBegin| {
            begin.lock().unwrap().push(format!("begin:{}", e.workflow));
            Ok(())
        });
        let end = Arc::clone(&seen);
        bus.register(move |e: &WorkflowExecutionEnd| {
            end.lock().unwrap().push(format!("end:{}", e.success));
            Ok(())
        });
        container.register(Arc::clone(&bus));

        let workflow = WorkflowBuilder::new("evented")
            .use_block(NodeSpec::of::<Emit>())
            .build(&container)
            .unwrap();
        WorkflowExecutor::new(Arc::new(workflow), container)
            .unwrap()
            .run()
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["begin:evented", "end:true"]);
    }

    #[test]
    fn mismatched_wire_is_rejected_at_construction() {
        use crate::workflow::{Wire, WorkflowBlock};
        let emit = crate::block::block_class::<Emit>();
        let fail = crate::block::block_class::<Fail>();
        let mut fail_schema = fail.schema();
        fail_schema.inputs[0].type_name = names::INT.into();
        let blocks = vec![
            WorkflowBlock {
                name: "a".into(),
                schema: emit.schema(),
                block: emit.create(&Params::new()).unwrap(),
                class: emit,
                params: Params::new(),
                parallel: false,
            },
            WorkflowBlock {
                name: "b".into(),
                schema: fail_schema,
                block: fail.create(&Params::new()).unwrap(),
                class: fail,
                params: Params::new(),
                parallel: false,
            },
        ];
        let workflow = Workflow::new("bad", blocks, vec![Wire::data("a", "text", "b", "text")]);
        let err = WorkflowExecutor::new(Arc::new(workflow), Container::new())
            .err()
            .expect("type mismatch");
        assert!(matches!(err, ChatflowError::TypeMismatch { .. }));
    }
}
