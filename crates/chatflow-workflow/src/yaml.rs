// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! YAML persistence of workflow definitions.
//!
//! ```yaml
//! name: echo
//! blocks:
//!   - type: internal:msg_input
//!     name: input
//!     params: {}
//!     connected_to:
//!       - target: send
//!         mapping: { from: msg, to: msg }
//! ```

use std::path::Path;

use chatflow_core::ChatflowError;
use chatflow_ioc::Container;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::block::Params;
use crate::builder::WorkflowBuilder;
use crate::registry::BlockRegistry;
use crate::workflow::{Wire, WireMapping};

#[derive(Debug, Serialize, Deserialize)]
struct WorkflowDoc {
    name: String,
    #[serde(default)]
    blocks: Vec<BlockDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct BlockDoc {
    #[serde(rename = "type")]
    type_name: String,
    name: String,
    #[serde(default)]
    params: Params,
    #[serde(default, skip_serializing_if = "is_false")]
    parallel: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    connected_to: Vec<ConnectionDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConnectionDoc {
    target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mapping: Option<WireMapping>,
    #[serde(default, skip_serializing_if = "is_false")]
    loop_back: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn yaml_error(e: serde_yaml::Error) -> ChatflowError {
    ChatflowError::storage(e)
}

/// Render a builder's workflow as YAML.
///
/// Block types are written as their registry key; unregistered types fall
/// back to `!!<type path>` and will not load again.
pub fn to_yaml_string(
    builder: &WorkflowBuilder,
    registry: &BlockRegistry,
    container: &Container,
) -> Result<String, ChatflowError> {
    let workflow = builder.build(container)?;
    let blocks = workflow
        .blocks()
        .iter()
        .map(|block| BlockDoc {
            type_name: registry.get_block_type_name(block.class.as_ref()),
            name: block.name.clone(),
            params: block.params.clone(),
            parallel: block.parallel,
            connected_to: workflow
                .wires()
                .iter()
                .filter(|w| w.source == block.name)
                .map(|w| ConnectionDoc {
                    target: w.target.clone(),
                    mapping: w.mapping.clone(),
                    loop_back: w.loop_back,
                })
                .collect(),
        })
        .collect();
    let doc = WorkflowDoc {
        name: workflow.name().to_string(),
        blocks,
    };
    serde_yaml::to_string(&doc).map_err(yaml_error)
}

/// Parse YAML into a builder: blocks first, then wires.
pub fn from_yaml_str(yaml: &str, registry: &BlockRegistry) -> Result<WorkflowBuilder, ChatflowError> {
    let doc: WorkflowDoc = serde_yaml::from_str(yaml).map_err(yaml_error)?;
    let mut builder = WorkflowBuilder::new(doc.name);

    for block in &doc.blocks {
        if block.type_name.starts_with("!!") {
            return Err(ChatflowError::not_found("block type", &block.type_name));
        }
        let class = registry
            .get(&block.type_name)
            .ok_or_else(|| ChatflowError::not_found("block type", &block.type_name))?;
        builder.push_node(
            block.name.clone(),
            class,
            block.params.clone(),
            block.parallel,
        );
    }

    for block in &doc.blocks {
        for conn in &block.connected_to {
            let mut wire = match &conn.mapping {
                Some(m) => Wire::data(&block.name, &m.from, &conn.target, &m.to),
                None => Wire::trigger(&block.name, &conn.target),
            };
            wire.loop_back = conn.loop_back;
            builder.push_wire(wire);
        }
    }
    debug!(workflow = %builder.name(), blocks = doc.blocks.len(), "workflow parsed from yaml");
    Ok(builder)
}

/// Write a builder's workflow to `path`, creating parent directories.
pub fn save_to_yaml(
    builder: &WorkflowBuilder,
    path: &Path,
    registry: &BlockRegistry,
    container: &Container,
) -> Result<(), ChatflowError> {
    let yaml = to_yaml_string(builder, registry, container)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, yaml)?;
    Ok(())
}

/// Read a builder from `path`.
pub fn load_from_yaml(path: &Path, registry: &BlockRegistry) -> Result<WorkflowBuilder, ChatflowError> {
    let yaml = std::fs::read_to_string(path)?;
    from_yaml_str(&yaml, registry)
}
