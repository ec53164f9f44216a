// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A built workflow: named block instances plus the wires between them.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chatflow_core::ChatflowError;
use serde::{Deserialize, Serialize};

use crate::block::{Block, BlockSchema, BlockType, Params};
use crate::types::TypeSystem;

/// Output-to-input mapping carried by a data wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WireMapping {
    pub from: String,
    pub to: String,
}

/// An edge between two blocks.
///
/// A wire with a mapping moves a value; a wire without one only orders
/// execution (the target runs after the source). Loop-back wires feed a
/// loop head from its loop end and are ignored when ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Wire {
    pub source: String,
    pub target: String,
    pub mapping: Option<WireMapping>,
    pub loop_back: bool,
}

impl Wire {
    pub fn data(
        source: impl Into<String>,
        output: impl Into<String>,
        target: impl Into<String>,
        input: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            mapping: Some(WireMapping {
                from: output.into(),
                to: input.into(),
            }),
            loop_back: false,
        }
    }

    pub fn trigger(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            mapping: None,
            loop_back: false,
        }
    }

    pub fn looping_back(mut self) -> Self {
        self.loop_back = true;
        self
    }
}

/// A block instance placed in a workflow.
pub struct WorkflowBlock {
    pub name: String,
    pub class: Arc<dyn BlockType>,
    pub schema: BlockSchema,
    pub params: Params,
    pub parallel: bool,
    pub block: Arc<dyn Block>,
}

impl fmt::Debug for WorkflowBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowBlock")
            .field("name", &self.name)
            .field("class", &self.class.type_name())
            .field("params", &self.params)
            .field("parallel", &self.parallel)
            .finish()
    }
}

/// A block-and-wire graph with a name.
#[derive(Debug)]
pub struct Workflow {
    name: String,
    blocks: Vec<WorkflowBlock>,
    wires: Vec<Wire>,
}

impl Workflow {
    pub fn new(name: impl Into<String>, blocks: Vec<WorkflowBlock>, wires: Vec<Wire>) -> Self {
        Self {
            name: name.into(),
            blocks,
            wires,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn blocks(&self) -> &[WorkflowBlock] {
        &self.blocks
    }

    pub fn wires(&self) -> &[Wire] {
        &self.wires
    }

    pub fn block(&self, name: &str) -> Option<&WorkflowBlock> {
        self.blocks.iter().find(|b| b.name == name)
    }

    /// Check block names are unique, every wire endpoint exists, and every
    /// data wire joins compatible types.
    pub fn validate(&self, types: &TypeSystem) -> Result<(), ChatflowError> {
        let mut seen = HashSet::new();
        for block in &self.blocks {
            if !seen.insert(block.name.as_str()) {
                return Err(ChatflowError::already_registered("block name", &block.name));
            }
        }

        let by_name: HashMap<&str, &WorkflowBlock> =
            self.blocks.iter().map(|b| (b.name.as_str(), b)).collect();
        for wire in &self.wires {
            let source = by_name
                .get(wire.source.as_str())
                .ok_or_else(|| ChatflowError::not_found("block", &wire.source))?;
            let target = by_name
                .get(wire.target.as_str())
                .ok_or_else(|| ChatflowError::not_found("block", &wire.target))?;
            let Some(mapping) = &wire.mapping else {
                continue;
            };

            let output = source.schema.find_output(&mapping.from).ok_or_else(|| {
                ChatflowError::not_found("output", format!("{}.{}", wire.source, mapping.from))
            })?;
            let input = target.schema.find_input(&mapping.to).ok_or_else(|| {
                ChatflowError::not_found("input", format!("{}.{}", wire.target, mapping.to))
            })?;
            if !types.is_compatible(&output.type_name, &input.type_name) {
                return Err(ChatflowError::TypeMismatch {
                    source_block: wire.source.clone(),
                    source_output: mapping.from.clone(),
                    source_type: output.type_name.clone(),
                    target_block: wire.target.clone(),
                    target_input: mapping.to.clone(),
                    target_type: input.type_name.clone(),
                });
            }
        }
        Ok(())
    }
}
