//! Streaming response accumulator.

use tracing::warn;

use super::types::{FinalChoice, FinalMessage, Fragment, ToolCallDelta, Usage};

/// Index-addressed slots that tolerate sparse and out-of-order indices.
///
/// Addressing an index past the end pads with empty holes; an existing slot
/// never moves once created.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedSlots<T> {
    slots: Vec<Option<T>>,
}

impl<T> Default for IndexedSlots<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T> IndexedSlots<T> {
    /// Slot at `index`, if it was ever addressed
    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index)?.as_ref()
    }

    /// Occupied slots in index order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|value| (index, value)))
    }

    /// Number of occupied slots
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.occupied() == 0
    }
}

/// Highest choice or tool-call index a fragment may address
pub const MAX_SLOT_INDEX: usize = 1023;

impl<T: Default> IndexedSlots<T> {
    /// Slot at `index`, created empty if missing.
    ///
    /// Returns `None` for indices above [`MAX_SLOT_INDEX`]; padding is never
    /// allocated for them.
    pub fn slot_mut(&mut self, index: usize) -> Option<&mut T> {
        if index > MAX_SLOT_INDEX {
            return None;
        }
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        Some(self.slots[index].get_or_insert_with(T::default))
    }
}

/// A tool call being rebuilt from its deltas
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallAccumulator {
    pub id: Option<String>,
    pub r#type: Option<String>,
    pub name: Option<String>,
    /// Append-only
    pub arguments: String,
}

impl ToolCallAccumulator {
    fn apply(&mut self, delta: &ToolCallDelta) {
        if let Some(id) = &delta.id {
            self.id = Some(id.clone());
        }
        if let Some(kind) = &delta.r#type {
            self.r#type = Some(kind.clone());
        }
        if let Some(function) = &delta.function {
            if let Some(name) = &function.name {
                self.name = Some(name.clone());
            }
            if let Some(arguments) = &function.arguments {
                self.arguments.push_str(arguments);
            }
        }
    }

    /// Both an id and a function name arrived
    pub fn is_complete(&self) -> bool {
        let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.is_empty());
        present(&self.id) && present(&self.name)
    }

    fn to_tool_call(&self) -> crate::ToolCall {
        crate::ToolCall {
            id: self.id.clone().unwrap_or_default(),
            r#type: self
                .r#type
                .clone()
                .unwrap_or_else(|| "function".to_string()),
            function: crate::FunctionCall {
                name: self.name.clone().unwrap_or_default(),
                arguments: self.arguments.clone(),
            },
        }
    }
}

/// One choice being rebuilt from its deltas
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChoiceAccumulator {
    /// Last write wins
    pub role: String,
    /// Append-only
    pub content: String,
    /// Append-only
    pub reasoning_content: String,
    pub tool_calls: IndexedSlots<ToolCallAccumulator>,
    pub finish_reason: Option<String>,
}

/// Reduces fragments, in arrival order, into per-choice state.
#[derive(Debug, Clone, Default)]
pub struct ResponseAccumulator {
    choices: IndexedSlots<ChoiceAccumulator>,
    usage: Option<Usage>,
    model: Option<String>,
    fragments: usize,
}

impl ResponseAccumulator {
    /// Create a new accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a single fragment.
    ///
    /// Deltas addressing an index above [`MAX_SLOT_INDEX`] are skipped with a
    /// warning; the rest of the fragment still applies.
    pub fn apply(&mut self, fragment: &Fragment) {
        self.fragments += 1;

        if self.model.is_none() {
            self.model = fragment.model.clone();
        }

        for choice_delta in &fragment.choices {
            let Some(choice) = self.choices.slot_mut(choice_delta.index) else {
                warn!(index = choice_delta.index, "skipping choice delta with out-of-range index");
                continue;
            };
            let delta = &choice_delta.delta;

            if let Some(role) = &delta.role {
                choice.role = role.clone();
            }
            if let Some(content) = &delta.content {
                choice.content.push_str(content);
            }
            if let Some(reasoning) = &delta.reasoning_content {
                choice.reasoning_content.push_str(reasoning);
            }
            for tool_delta in &delta.tool_calls {
                match choice.tool_calls.slot_mut(tool_delta.index) {
                    Some(call) => call.apply(tool_delta),
                    None => warn!(
                        index = tool_delta.index,
                        "skipping tool-call delta with out-of-range index"
                    ),
                }
            }
            if let Some(reason) = &choice_delta.finish_reason {
                choice.finish_reason = Some(reason.clone());
            }
        }

        if let Some(usage) = fragment.usage {
            self.usage = Some(usage);
        }
    }

    /// Choice at `index`, if any delta addressed it
    pub fn choice(&self, index: usize) -> Option<&ChoiceAccumulator> {
        self.choices.get(index)
    }

    /// All choices, holes included
    pub fn choices(&self) -> &IndexedSlots<ChoiceAccumulator> {
        &self.choices
    }

    /// Usage reported by the provider, if any fragment carried it
    pub fn usage(&self) -> Option<Usage> {
        self.usage
    }

    /// First model name reported by the provider
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Fragments applied so far
    pub fn fragments_seen(&self) -> usize {
        self.fragments
    }

    /// Snapshot every choice, keeping incomplete tool calls.
    ///
    /// Fallback estimation counts what the model actually emitted, so the
    /// filtering of incomplete calls happens afterwards in
    /// [`retain_complete_tool_calls`].
    pub fn assemble_choices(&self) -> Vec<FinalChoice> {
        self.choices
            .iter()
            .map(|(index, choice)| FinalChoice {
                index,
                message: FinalMessage {
                    role: choice.role.clone(),
                    content: choice.content.clone(),
                    tool_calls: choice
                        .tool_calls
                        .iter()
                        .map(|(_, call)| call.to_tool_call())
                        .collect(),
                    reasoning_content: choice.reasoning_content.clone(),
                },
                finish_reason: choice.finish_reason.clone(),
            })
            .collect()
    }
}

/// Drop tool calls lacking an id or function name (truncated-stream artifacts).
pub fn retain_complete_tool_calls(choices: &mut [FinalChoice]) {
    for choice in choices {
        choice
            .message
            .tool_calls
            .retain(|call| !call.id.is_empty() && !call.function.name.is_empty());
    }
}
