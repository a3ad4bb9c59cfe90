//! Consumer-side join of tool `start`/`end` events by `toolCallId`.
//!
//! The adapter emits both phases independently. Renderers that want one row
//! per tool call build this index over a snapshot's messages.

use std::collections::HashMap;

use crate::model::{CanonicalMessage, ToolMessage, ToolPhase};

/// A tool call as seen so far: always a start, optionally an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolCallEntry<'a> {
    pub start: &'a ToolMessage,
    pub end: Option<&'a ToolMessage>,
}

impl ToolCallEntry<'_> {
    /// A start without an end is an in-flight or abandoned call.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.end.is_none()
    }
}

/// Correlation table over one ordered message sequence.
#[derive(Debug, Default)]
pub struct ToolCallIndex<'a> {
    entries: Vec<ToolCallEntry<'a>>,
    by_call_id: HashMap<&'a str, usize>,
    orphaned_ends: Vec<&'a ToolMessage>,
}

impl<'a> ToolCallIndex<'a> {
    /// Builds the index in emission order.
    ///
    /// An `end` whose `start` has not been seen yet (or that repeats an
    /// already-closed call) is recorded as orphaned rather than joined.
    #[must_use]
    pub fn build(messages: &'a [CanonicalMessage]) -> Self {
        let mut index = Self::default();

        for tool in messages.iter().filter_map(CanonicalMessage::as_tool) {
            match tool.phase() {
                ToolPhase::Start => {
                    if index.by_call_id.contains_key(tool.tool_call_id.as_str()) {
                        tracing::debug!(
                            tool_call_id = %tool.tool_call_id,
                            "ignoring repeated tool start"
                        );
                        continue;
                    }

                    index
                        .by_call_id
                        .insert(tool.tool_call_id.as_str(), index.entries.len());
                    index.entries.push(ToolCallEntry {
                        start: tool,
                        end: None,
                    });
                }
                ToolPhase::End => {
                    let slot = index
                        .by_call_id
                        .get(tool.tool_call_id.as_str())
                        .and_then(|position| index.entries.get_mut(*position))
                        .filter(|entry| entry.end.is_none());

                    match slot {
                        Some(entry) => entry.end = Some(tool),
                        None => index.orphaned_ends.push(tool),
                    }
                }
            }
        }

        index
    }

    #[must_use]
    pub fn get(&self, tool_call_id: &str) -> Option<&ToolCallEntry<'a>> {
        self.by_call_id
            .get(tool_call_id)
            .and_then(|position| self.entries.get(*position))
    }

    /// All calls in order of their `start` event.
    pub fn entries(&self) -> impl Iterator<Item = &ToolCallEntry<'a>> {
        self.entries.iter()
    }

    pub fn pending(&self) -> impl Iterator<Item = &ToolCallEntry<'a>> {
        self.entries.iter().filter(|entry| entry.is_pending())
    }

    #[must_use]
    pub fn orphaned_ends(&self) -> &[&'a ToolMessage] {
        &self.orphaned_ends
    }
}
