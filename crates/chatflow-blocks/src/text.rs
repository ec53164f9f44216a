// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text constants and string manipulation.

use async_trait::async_trait;
use chatflow_core::ChatflowError;
use chatflow_workflow::{
    Block, BlockContext, BlockDefinition, BlockSchema, ConfigSpec, InputSpec, Inputs, OutputSpec,
    Outputs, Params, names,
};
use regex::Regex;

use crate::render;

/// Emits a fixed text.
#[derive(Debug, Clone)]
pub struct TextBlock {
    text: String,
}

#[async_trait]
impl Block for TextBlock {
    async fn execute(&self, _ctx: &BlockContext, _inputs: Inputs) -> Result<Outputs, ChatflowError> {
        Ok(Outputs::new().with("text", self.text.clone()))
    }
}

impl BlockDefinition for TextBlock {
    fn schema() -> BlockSchema {
        BlockSchema::new()
            .output(OutputSpec::new("text", names::STR).label("Text"))
            .config(
                ConfigSpec::new("text", names::STR)
                    .required()
                    .label("Text")
                    .description("Text to output"),
            )
    }

    fn from_params(params: &Params) -> Result<Self, ChatflowError> {
        Ok(Self {
            text: params.string_or("text", ""),
        })
    }
}

/// `text1 + text2`.
#[derive(Debug, Clone, Copy)]
pub struct TextConcatBlock;

#[async_trait]
impl Block for TextConcatBlock {
    async fn execute(&self, _ctx: &BlockContext, inputs: Inputs) -> Result<Outputs, ChatflowError> {
        let joined = format!("{}{}", inputs.text("text1")?, inputs.text("text2")?);
        Ok(Outputs::new().with("text", joined))
    }
}

impl BlockDefinition for TextConcatBlock {
    fn schema() -> BlockSchema {
        BlockSchema::new()
            .input(InputSpec::new("text1", names::STR).label("Text 1"))
            .input(InputSpec::new("text2", names::STR).label("Text 2"))
            .output(OutputSpec::new("text", names::STR).label("Concatenated text"))
    }

    fn from_params(_params: &Params) -> Result<Self, ChatflowError> {
        Ok(Self)
    }
}

/// Replaces every occurrence of `variable` in `text` with `new_text`.
#[derive(Debug, Clone)]
pub struct TextReplaceBlock {
    variable: String,
}

#[async_trait]
impl Block for TextReplaceBlock {
    async fn execute(&self, _ctx: &BlockContext, inputs: Inputs) -> Result<Outputs, ChatflowError> {
        let text = inputs.text("text")?;
        let new_text = render(inputs.require("new_text")?);
        Ok(Outputs::new().with("text", text.replace(&self.variable, &new_text)))
    }
}

impl BlockDefinition for TextReplaceBlock {
    fn schema() -> BlockSchema {
        BlockSchema::new()
            .input(InputSpec::new("text", names::STR).label("Original text"))
            .input(InputSpec::new("new_text", names::ANY).label("New text"))
            .output(OutputSpec::new("text", names::STR).label("Replaced text"))
            .config(
                ConfigSpec::new("variable", names::STR)
                    .required()
                    .label("Text to replace"),
            )
    }

    fn from_params(params: &Params) -> Result<Self, ChatflowError> {
        Ok(Self {
            variable: params.string_or("variable", ""),
        })
    }
}

/// Emits the first capture group of `regex` in `text`, or `""`.
#[derive(Debug, Clone)]
pub struct TextExtractByRegexBlock {
    regex: Regex,
}

#[async_trait]
impl Block for TextExtractByRegexBlock {
    async fn execute(&self, _ctx: &BlockContext, inputs: Inputs) -> Result<Outputs, ChatflowError> {
        let text = inputs.text("text")?;
        let extracted = self
            .regex
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        Ok(Outputs::new().with("text", extracted))
    }
}

impl BlockDefinition for TextExtractByRegexBlock {
    fn schema() -> BlockSchema {
        BlockSchema::new()
            .input(InputSpec::new("text", names::STR).label("Original text"))
            .output(OutputSpec::new("text", names::STR).label("Extracted text"))
            .config(
                ConfigSpec::new("regex", names::STR)
                    .required()
                    .label("Regular expression"),
            )
    }

    fn from_params(params: &Params) -> Result<Self, ChatflowError> {
        let pattern = params.string_or("regex", "");
        let regex = Regex::new(&pattern)
            .map_err(|e| ChatflowError::Config(format!("invalid regex `{pattern}`: {e}")))?;
        Ok(Self { regex })
    }
}
