// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Workflow engine for the Chatflow runtime.
//!
//! Blocks are typed units of computation with named input and output ports.
//! A [`WorkflowBuilder`] assembles them into a graph of wires, checked
//! against the [`TypeSystem`]; a [`WorkflowExecutor`] runs the graph inside
//! a container scope. Definitions persist as YAML through the
//! [`WorkflowRegistry`].

pub mod block;
pub mod builder;
pub mod control;
pub mod executor;
pub mod registry;
pub mod types;
pub mod value;
pub mod workflow;
pub mod workflow_registry;
pub mod yaml;

pub use block::{
    Block, BlockClassOf, BlockContext, BlockDefinition, BlockKind, BlockSchema, BlockType,
    ConfigSpec, InputSpec, OptionsProvider, OutputSpec, ParamMeta, Params, Variables, block_class,
};
pub use builder::{NodeSpec, WorkflowBuilder};
pub use control::{ConditionBlock, LoopBlock, LoopEndBlock, Predicate};
pub use executor::{ExecutionResults, ExecutorOptions, WorkflowExecutor};
pub use registry::{BlockInfo, BlockRegistry, ConfigInfo};
pub use types::{TypeSystem, names};
pub use value::{Inputs, Outputs, Value, Values};
pub use workflow::{Wire, WireMapping, Workflow, WorkflowBlock};
pub use workflow_registry::WorkflowRegistry;
