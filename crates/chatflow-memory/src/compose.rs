// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Composers fold chat messages into memory entries; decomposers render
//! entries back into prompt text.

use chatflow_core::ChatSender;
use chrono::{DateTime, TimeDelta, Utc};

use crate::entry::{ComposableMessage, MemoryEntry};

/// Turns the messages of one exchange into a [`MemoryEntry`].
pub trait MemoryComposer: Send + Sync + 'static {
    fn compose(&self, sender: &ChatSender, messages: &[ComposableMessage]) -> MemoryEntry;
}

/// Renders stored entries as text for a prompt.
pub trait MemoryDecomposer: Send + Sync + 'static {
    fn decompose(&self, entries: &[MemoryEntry]) -> String;

    /// Text used when there is nothing to render.
    fn empty_message(&self) -> &str {
        "<empty memory>"
    }
}

/// Writes one `<speaker> said: <text>` line per message.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultMemoryComposer;

impl MemoryComposer for DefaultMemoryComposer {
    fn compose(&self, sender: &ChatSender, messages: &[ComposableMessage]) -> MemoryEntry {
        let lines: Vec<String> = messages
            .iter()
            .map(|msg| match msg {
                ComposableMessage::Im(im) => {
                    format!("{} said: {}", sender.display_name, im.content())
                }
                ComposableMessage::Text(text) => format!("{} said: {text}", sender.display_name),
                ComposableMessage::Llm(llm) => format!("<@LLM> said: {}", llm.content),
            })
            .collect();
        MemoryEntry::new(sender.clone(), lines.join("\n").trim())
    }
}

/// Renders the most recent entries, each prefixed with its age.
#[derive(Debug, Clone, Copy)]
pub struct DefaultMemoryDecomposer {
    pub max_entries: usize,
}

impl Default for DefaultMemoryDecomposer {
    fn default() -> Self {
        Self { max_entries: 10 }
    }
}

impl DefaultMemoryDecomposer {
    /// Render relative to a fixed `now`.
    pub fn decompose_at(&self, entries: &[MemoryEntry], now: DateTime<Utc>) -> String {
        if entries.is_empty() {
            return self.empty_message().to_string();
        }
        let start = entries.len().saturating_sub(self.max_entries);
        entries[start..]
            .iter()
            .map(|e| format!("{}, {}", relative_time(now - e.timestamp), e.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl MemoryDecomposer for DefaultMemoryDecomposer {
    fn decompose(&self, entries: &[MemoryEntry]) -> String {
        self.decompose_at(entries, Utc::now())
    }
}

fn relative_time(age: TimeDelta) -> String {
    if age.num_days() > 0 {
        format!("{} days ago", age.num_days())
    } else if age.num_hours() > 0 {
        format!("{} hours ago", age.num_hours())
    } else if age.num_minutes() > 0 {
        format!("{} minutes ago", age.num_minutes())
    } else {
        "just now".to_string()
    }
}

#[cfg(test)]
mod tests {
    use chatflow_core::{IMMessage, LlmChatMessage};

    use super::*;

    #[test]
    fn composer_prefixes_each_speaker() {
        let alice = ChatSender::from_c2c_chat("alice", "Alice");
        let entry = DefaultMemoryComposer.compose(
            &alice,
            &[
                IMMessage::text(alice.clone(), "hi").into(),
                LlmChatMessage::assistant("hello").into(),
            ],
        );
        assert_eq!(entry.content, "Alice said: hi\n<@LLM> said: hello");
        assert_eq!(entry.sender, alice);
    }

    #[test]
    fn decomposer_renders_last_ten_with_age() {
        let alice = ChatSender::from_c2c_chat("alice", "Alice");
        let now = Utc::now();
        let entries: Vec<MemoryEntry> = (0..12)
            .map(|i| MemoryEntry::at(alice.clone(), format!("m{i}"), now - TimeDelta::minutes(5)))
            .collect();
        let text = DefaultMemoryDecomposer::default().decompose_at(&entries, now);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0], "5 minutes ago, m2");
        assert_eq!(lines[9], "5 minutes ago, m11");
    }

    #[test]
    fn relative_time_buckets() {
        assert_eq!(relative_time(TimeDelta::seconds(30)), "just now");
        assert_eq!(relative_time(TimeDelta::hours(3)), "3 hours ago");
        assert_eq!(relative_time(TimeDelta::days(2)), "2 days ago");
    }

    #[test]
    fn empty_memory_has_placeholder() {
        assert_eq!(DefaultMemoryDecomposer::default().decompose(&[]), "<empty memory>");
    }
}
