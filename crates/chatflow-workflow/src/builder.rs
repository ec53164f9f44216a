// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fluent construction of workflows.
//!
//! The builder records node definitions and links; nothing is instantiated
//! until [`WorkflowBuilder::build`], so one builder can produce a fresh
//! [`Workflow`] per dispatch. Mistakes made while chaining (duplicate names,
//! unbalanced `end_if`) are reported by `build`.
//!
//! ```ignore
//! let builder = WorkflowBuilder::new("echo")
//!     .use_block(NodeSpec::of::<GetIMMessage>())
//!     .chain(NodeSpec::of::<SendIMMessage>());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chatflow_core::ChatflowError;
use chatflow_ioc::Container;
use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::{debug, trace};

use crate::block::{BlockContext, BlockDefinition, BlockSchema, BlockType, Params, block_class};
use crate::control::{
    CONDITION_RESULT, ConditionClass, ITERATION, LOOP_RESULTS, LoopClass, LoopEndClass,
    PREVIOUS_RESULTS, SHOULD_CONTINUE, merge_outputs,
};
use crate::registry::BlockRegistry;
use crate::types::TypeSystem;
use crate::value::Inputs;
use crate::workflow::{Wire, Workflow, WorkflowBlock};

/// Description of one node to add.
#[derive(Clone)]
pub struct NodeSpec {
    class: Arc<dyn BlockType>,
    name: Option<String>,
    params: Params,
    wire_from: Option<Vec<String>>,
    wires: Vec<(String, String, String)>,
}

impl NodeSpec {
    pub fn of<B: BlockDefinition>() -> Self {
        Self::class(block_class::<B>())
    }

    pub fn class(class: Arc<dyn BlockType>) -> Self {
        Self {
            class,
            name: None,
            params: Params::new(),
            wire_from: None,
            wires: Vec::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key, value);
        self
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Auto-wire from these nodes instead of the current cursor.
    pub fn wire_from<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.wire_from = Some(sources.into_iter().map(Into::into).collect());
        self
    }

    /// Add an explicit wire `source.output -> this.input`.
    pub fn wire(
        mut self,
        source: impl Into<String>,
        output: impl Into<String>,
        input: impl Into<String>,
    ) -> Self {
        self.wires.push((source.into(), output.into(), input.into()));
        self
    }
}

#[derive(Clone)]
struct NodeDef {
    name: String,
    class: Arc<dyn BlockType>,
    params: Params,
    parallel: bool,
}

#[derive(Debug, Clone)]
enum Link {
    /// Wire by port names and types, resolved at build time.
    Auto { from: String, to: String },
    Explicit(Wire),
}

#[derive(Debug, Clone)]
enum BuildIssue {
    DuplicateName(String),
    Unbalanced(&'static str),
}

impl BuildIssue {
    fn into_error(self) -> ChatflowError {
        match self {
            Self::DuplicateName(name) => ChatflowError::already_registered("block name", name),
            Self::Unbalanced(msg) => ChatflowError::Config(msg.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
struct BranchFrame {
    condition: String,
    then_tail: Option<Vec<String>>,
}

/// Outputs produced by control blocks that should only wire by name.
const CONTROL_OUTPUTS: &[&str] = &[CONDITION_RESULT, SHOULD_CONTINUE, ITERATION, LOOP_RESULTS];

/// Records a workflow definition; see the module docs.
#[derive(Clone)]
pub struct WorkflowBuilder {
    name: String,
    nodes: Vec<NodeDef>,
    links: Vec<Link>,
    cursor: Vec<String>,
    branches: Vec<BranchFrame>,
    loops: Vec<String>,
    issues: Vec<BuildIssue>,
}

impl WorkflowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            links: Vec::new(),
            cursor: Vec::new(),
            branches: Vec::new(),
            loops: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.name.as_str())
    }

    /// Start the workflow with its first node.
    pub fn use_block(mut self, spec: NodeSpec) -> Self {
        let name = self.add_node(spec, false, &[]);
        self.cursor = vec![name];
        self
    }

    /// Append a node wired from the cursor (or from `wire_from`).
    pub fn chain(mut self, spec: NodeSpec) -> Self {
        let sources = self.cursor.clone();
        let name = self.add_node(spec, false, &sources);
        self.cursor = vec![name];
        self
    }

    /// Append nodes that all hang off the cursor; the cursor becomes the group.
    pub fn parallel(mut self, specs: impl IntoIterator<Item = NodeSpec>) -> Self {
        let sources = self.cursor.clone();
        let group: Vec<String> = specs
            .into_iter()
            .map(|spec| self.add_node(spec, true, &sources))
            .collect();
        self.cursor = group;
        self
    }

    /// Insert a condition; nodes chained next form the "then" branch.
    pub fn if_then<F>(mut self, name: Option<&str>, predicate: F) -> Self
    where
        F: Fn(&BlockContext, &Inputs) -> bool + Send + Sync + 'static,
    {
        let upstream = merge_outputs(self.cursor_schemas().iter());
        let class = Arc::new(ConditionClass::new(Arc::new(predicate), upstream));
        let condition = self.add_control(class, name);
        self.branches.push(BranchFrame {
            condition: condition.clone(),
            then_tail: None,
        });
        self.cursor = vec![condition];
        self
    }

    /// Close the "then" branch; nodes chained next form the "else" branch.
    pub fn else_then(mut self) -> Self {
        match self.branches.last_mut() {
            Some(frame) if frame.then_tail.is_none() => {
                frame.then_tail = Some(std::mem::take(&mut self.cursor));
                self.cursor = vec![frame.condition.clone()];
            }
            Some(_) => self.issues.push(BuildIssue::Unbalanced("else_then called twice")),
            None => self.issues.push(BuildIssue::Unbalanced("else_then without if_then")),
        }
        self
    }

    /// Close the conditional. The next node is wired from both branch tails,
    /// or from the "then" tail and the condition itself when there is no else.
    pub fn end_if(mut self) -> Self {
        let Some(frame) = self.branches.pop() else {
            self.issues.push(BuildIssue::Unbalanced("end_if without if_then"));
            return self;
        };
        let mut merge = match frame.then_tail {
            Some(mut then_tail) => {
                then_tail.append(&mut self.cursor);
                then_tail
            }
            None => {
                let mut tail = std::mem::take(&mut self.cursor);
                tail.push(frame.condition);
                tail
            }
        };
        let mut seen = std::collections::HashSet::new();
        merge.retain(|n| seen.insert(n.clone()));
        self.cursor = merge;
        self
    }

    /// Insert a loop head; nodes chained next form the body, which
    /// [`end_loop`](Self::end_loop) closes. The iteration index is published
    /// as the run variable `iteration_var`.
    pub fn loop_while<F>(mut self, name: Option<&str>, iteration_var: &str, predicate: F) -> Self
    where
        F: Fn(&BlockContext, &Inputs) -> bool + Send + Sync + 'static,
    {
        let upstream = merge_outputs(self.cursor_schemas().iter());
        let class = Arc::new(LoopClass::new(
            Arc::new(predicate),
            iteration_var.to_string(),
            upstream,
        ));
        let head = self.add_control(class, name);
        self.loops.push(head.clone());
        self.cursor = vec![head];
        self
    }

    /// Close the innermost loop with a loop-end node wired back to its head.
    pub fn end_loop(mut self) -> Self {
        let Some(head) = self.loops.pop() else {
            self.issues.push(BuildIssue::Unbalanced("end_loop without loop_while"));
            return self;
        };
        let upstream = merge_outputs(self.cursor_schemas().iter());
        let end = self.add_control(Arc::new(LoopEndClass::new(upstream)), None);
        self.links.push(Link::Explicit(
            Wire::data(end.clone(), LOOP_RESULTS, head, PREVIOUS_RESULTS).looping_back(),
        ));
        self.cursor = vec![end];
        self
    }

    fn add_control(&mut self, class: Arc<dyn BlockType>, name: Option<&str>) -> String {
        let mut spec = NodeSpec::class(class);
        if let Some(name) = name {
            spec = spec.name(name);
        }
        let sources = self.cursor.clone();
        self.add_node(spec, false, &sources)
    }

    fn add_node(&mut self, spec: NodeSpec, parallel: bool, default_sources: &[String]) -> String {
        let name = spec
            .name
            .unwrap_or_else(|| generated_name(spec.class.short_name()));
        if self.nodes.iter().any(|n| n.name == name) {
            self.issues.push(BuildIssue::DuplicateName(name.clone()));
        }

        let sources = spec.wire_from.unwrap_or_else(|| default_sources.to_vec());
        for from in sources {
            self.links.push(Link::Auto {
                from,
                to: name.clone(),
            });
        }
        for (source, output, input) in spec.wires {
            self.links
                .push(Link::Explicit(Wire::data(source, output, name.clone(), input)));
        }

        trace!(workflow = %self.name, node = %name, "node added");
        self.nodes.push(NodeDef {
            name: name.clone(),
            class: spec.class,
            params: spec.params,
            parallel,
        });
        name
    }

    fn cursor_schemas(&self) -> Vec<BlockSchema> {
        self.cursor
            .iter()
            .filter_map(|c| self.nodes.iter().find(|n| &n.name == c))
            .map(|n| n.class.schema())
            .collect()
    }

    pub(crate) fn push_node(
        &mut self,
        name: String,
        class: Arc<dyn BlockType>,
        params: Params,
        parallel: bool,
    ) {
        if self.nodes.iter().any(|n| n.name == name) {
            self.issues.push(BuildIssue::DuplicateName(name.clone()));
        }
        self.cursor = vec![name.clone()];
        self.nodes.push(NodeDef {
            name,
            class,
            params,
            parallel,
        });
    }

    pub(crate) fn push_wire(&mut self, wire: Wire) {
        self.links.push(Link::Explicit(wire));
    }

    /// Instantiate every node and resolve wires.
    ///
    /// Types are checked with the [`BlockRegistry`] bound in `container`,
    /// or the built-in type system when none is bound.
    pub fn build(&self, container: &Container) -> Result<Workflow, ChatflowError> {
        if let Some(issue) = self.issues.first() {
            return Err(issue.clone().into_error());
        }
        if !self.branches.is_empty() {
            return Err(ChatflowError::Config(format!(
                "workflow `{}` has an if_then without end_if",
                self.name
            )));
        }
        if !self.loops.is_empty() {
            return Err(ChatflowError::Config(format!(
                "workflow `{}` has a loop_while without end_loop",
                self.name
            )));
        }

        let types = container
            .try_resolve::<Arc<BlockRegistry>>()
            .map(|r| Arc::clone(r.type_system()))
            .unwrap_or_else(|| Arc::new(TypeSystem::with_builtins()));

        let mut blocks = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            blocks.push(WorkflowBlock {
                name: node.name.clone(),
                class: Arc::clone(&node.class),
                schema: node.class.schema(),
                params: node.params.clone(),
                parallel: node.parallel,
                block: node.class.create(&node.params)?,
            });
        }

        let schemas: HashMap<&str, &BlockSchema> =
            blocks.iter().map(|b| (b.name.as_str(), &b.schema)).collect();
        let mut wires: Vec<Wire> = Vec::new();
        for link in &self.links {
            match link {
                Link::Explicit(wire) => push_unique(&mut wires, wire.clone()),
                Link::Auto { from, to } => {
                    let source = schemas
                        .get(from.as_str())
                        .ok_or_else(|| ChatflowError::not_found("block", from))?;
                    let target = schemas
                        .get(to.as_str())
                        .ok_or_else(|| ChatflowError::not_found("block", to))?;
                    auto_wire(from, source, to, target, &types, &mut wires);
                }
            }
        }

        let workflow = Workflow::new(self.name.clone(), blocks, wires);
        workflow.validate(&types)?;
        debug!(
            workflow = %self.name,
            blocks = workflow.blocks().len(),
            wires = workflow.wires().len(),
            "workflow built"
        );
        Ok(workflow)
    }
}

impl std::fmt::Debug for WorkflowBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowBuilder")
            .field("name", &self.name)
            .field("nodes", &self.node_names().collect::<Vec<_>>())
            .field("links", &self.links)
            .finish()
    }
}

fn generated_name(short: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();
    format!("{short}_{suffix}")
}

fn push_unique(wires: &mut Vec<Wire>, wire: Wire) {
    if !wires.contains(&wire) {
        wires.push(wire);
    }
}

/// Wire same-named compatible ports; other outputs take the first input of
/// the same type that nothing feeds yet. With no data wire the link still
/// orders execution.
fn auto_wire(
    from: &str,
    source: &BlockSchema,
    to: &str,
    target: &BlockSchema,
    types: &TypeSystem,
    wires: &mut Vec<Wire>,
) {
    let mut added = false;
    let mut unmatched = Vec::new();
    for output in &source.outputs {
        match target.find_input(&output.name) {
            Some(input) if types.is_compatible(&output.type_name, &input.type_name) => {
                push_unique(wires, Wire::data(from, &output.name, to, &input.name));
                added = true;
            }
            _ => unmatched.push(output),
        }
    }

    for output in unmatched {
        if CONTROL_OUTPUTS.contains(&output.name.as_str()) {
            continue;
        }
        let free = target.inputs.iter().find(|input| {
            input.type_name == output.type_name
                && !wires.iter().any(|w| {
                    w.target == to && w.mapping.as_ref().is_some_and(|m| m.to == input.name)
                })
        });
        if let Some(input) = free {
            push_unique(wires, Wire::data(from, &output.name, to, &input.name));
            added = true;
        }
    }

    if !added {
        push_unique(wires, Wire::trigger(from, to));
    }
}
