// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Preset workflows shipped with the runtime.

use chatflow_workflow::{NodeSpec, WorkflowBuilder, WorkflowRegistry};

use crate::help::GenerateHelp;
use crate::im::{GetIMMessage, SendIMMessage, TextToIMMessage};
use crate::llm::{ChatCompletion, ChatMessageConstructor, LlmResponseToText};
use crate::memory::{ChatMemoryQuery, ChatMemoryStore, ClearMemory};
use crate::text::TextBlock;

/// Separator the chat persona uses to split a reply into several messages.
pub const BREAK: &str = "<break>";

const SYSTEM_PROMPT: &str = "\
# Role

You are a friendly member of this chat. Keep replies short and natural, \
the way people write in a messenger. Use <break> where you would send the \
next part as a separate message.

# Information

Current time: {now}

# Memories

Earlier conversation:
-- begin --
{memory_content}
-- end --

Lines starting with <@LLM> are your own earlier replies; never write that \
marker yourself.";

const USER_PROMPT: &str = "{user_name} says: {user_msg}";

/// `system:help`: reply with the command list.
pub fn help_workflow() -> WorkflowBuilder {
    WorkflowBuilder::new("help")
        .use_block(NodeSpec::of::<GenerateHelp>().name("generate_help"))
        .chain(NodeSpec::of::<SendIMMessage>().name("send"))
}

/// `system:clear_memory`: clear the sender's group and member memory.
pub fn clear_memory_workflow() -> WorkflowBuilder {
    WorkflowBuilder::new("clear_memory")
        .use_block(NodeSpec::of::<GetIMMessage>().name("get_message"))
        .parallel([
            NodeSpec::of::<ClearMemory>()
                .name("clear_group")
                .param("scope_type", "group"),
            NodeSpec::of::<ClearMemory>()
                .name("clear_member")
                .param("scope_type", "member"),
        ])
        .chain(NodeSpec::of::<SendIMMessage>().name("send"))
}

/// `chat:normal`: memory-aware LLM chat.
///
/// Reads group memory, builds the prompt, asks the default text model,
/// replies (split on [`BREAK`]), and stores the exchange.
pub fn chat_workflow() -> WorkflowBuilder {
    WorkflowBuilder::new("chat")
        .use_block(NodeSpec::of::<GetIMMessage>().name("get_message"))
        .chain(
            NodeSpec::of::<ChatMemoryQuery>()
                .name("query_memory")
                .param("scope_type", "group"),
        )
        .chain(
            NodeSpec::of::<TextBlock>()
                .name("system_prompt")
                .param("text", SYSTEM_PROMPT),
        )
        .chain(
            NodeSpec::of::<TextBlock>()
                .name("user_prompt")
                .param("text", USER_PROMPT),
        )
        .chain(
            NodeSpec::of::<ChatMessageConstructor>()
                .name("build_prompt")
                .wire_from(["get_message"])
                .wire("query_memory", "memory_content", "memory_content")
                .wire("system_prompt", "text", "system_prompt_format")
                .wire("user_prompt", "text", "user_prompt_format"),
        )
        .chain(NodeSpec::of::<ChatCompletion>().name("llm_chat"))
        .chain(NodeSpec::of::<LlmResponseToText>().name("response_text"))
        .chain(
            NodeSpec::of::<TextToIMMessage>()
                .name("reply")
                .param("split_by", BREAK),
        )
        .parallel([
            NodeSpec::of::<SendIMMessage>().name("send"),
            NodeSpec::of::<ChatMemoryStore>()
                .name("store_memory")
                .param("scope_type", "group")
                .wire_from(["get_message", "llm_chat"]),
        ])
}

/// Register the preset workflows, keeping any definition already loaded
/// under the same id.
pub fn register_system_workflows(registry: &WorkflowRegistry) {
    registry.register_preset_workflow("system", "help", help_workflow());
    registry.register_preset_workflow("system", "clear_memory", clear_memory_workflow());
    registry.register_preset_workflow("chat", "normal", chat_workflow());
}
