//! Type definitions for streaming responses.

use std::pin::Pin;

use futures_util::Stream;
use serde::{Deserialize, Serialize};

use super::cancel::CancelHandle;
use crate::error::Result;

/// Object marker carried by every finished record
pub const COMPLETION_OBJECT: &str = "chat.completion";

/// One increment of a streaming chat completion (OpenAI chunk wire shape)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// Provider-assigned chunk id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Model reported by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Provider creation timestamp (unix seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    /// Per-choice deltas
    #[serde(default)]
    pub choices: Vec<ChoiceDelta>,
    /// Terminal usage block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl Fragment {
    /// Fragment carrying one choice delta
    pub fn from_choice(choice: ChoiceDelta) -> Self {
        Self {
            choices: vec![choice],
            ..Self::default()
        }
    }

    /// Role announcement for choice 0
    pub fn role(role: impl Into<String>) -> Self {
        Self::from_choice(ChoiceDelta::new(
            0,
            Delta {
                role: Some(role.into()),
                ..Delta::default()
            },
        ))
    }

    /// Content delta for choice 0
    pub fn content(text: impl Into<String>) -> Self {
        Self::from_choice(ChoiceDelta::new(
            0,
            Delta {
                content: Some(text.into()),
                ..Delta::default()
            },
        ))
    }

    /// Reasoning delta for choice 0
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self::from_choice(ChoiceDelta::new(
            0,
            Delta {
                reasoning_content: Some(text.into()),
                ..Delta::default()
            },
        ))
    }

    /// Tool-call delta for choice 0
    pub fn tool_call(delta: ToolCallDelta) -> Self {
        Self::from_choice(ChoiceDelta::new(
            0,
            Delta {
                tool_calls: vec![delta],
                ..Delta::default()
            },
        ))
    }

    /// Finish marker for choice 0
    pub fn finish(reason: impl Into<String>) -> Self {
        Self::from_choice(ChoiceDelta {
            finish_reason: Some(reason.into()),
            ..ChoiceDelta::default()
        })
    }

    /// Terminal usage fragment without choices
    pub fn usage(usage: Usage) -> Self {
        Self {
            usage: Some(usage),
            ..Self::default()
        }
    }
}

/// Delta for a single choice index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChoiceDelta {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub delta: Delta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

impl ChoiceDelta {
    pub fn new(index: usize, delta: Delta) -> Self {
        Self {
            index,
            delta,
            finish_reason: None,
        }
    }
}

/// Incremental message content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,
}

/// Partial update to the tool call at `index`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default)]
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionDelta>,
}

impl ToolCallDelta {
    /// Delta opening a tool call with its id and function name
    pub fn start(index: usize, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            index,
            id: Some(id.into()),
            r#type: Some("function".to_string()),
            function: Some(FunctionDelta {
                name: Some(name.into()),
                arguments: None,
            }),
        }
    }

    /// Delta carrying only an arguments fragment
    pub fn arguments(index: usize, arguments: impl Into<String>) -> Self {
        Self {
            index,
            function: Some(FunctionDelta {
                name: None,
                arguments: Some(arguments.into()),
            }),
            ..Self::default()
        }
    }
}

/// Partial function name/arguments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// Token accounting for one completion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    /// Usage with `total_tokens` derived from the two parts
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Finished chat completion, produced by a provider directly or by aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<FinalChoice>,
    pub usage: Usage,
}

/// Non-streaming completions share the aggregated record shape.
pub type ChatCompletion = FinalResponse;

impl FinalResponse {
    /// Fresh completion id
    pub fn generate_id() -> String {
        format!("chatcmpl-{}", ulid::Ulid::new())
    }

    /// Message of the first choice, if any
    pub fn first_message(&self) -> Option<&FinalMessage> {
        self.choices.first().map(|choice| &choice.message)
    }
}

/// One finished choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalChoice {
    pub index: usize,
    pub message: FinalMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Assembled assistant message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalMessage {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<crate::ToolCall>,
    #[serde(default)]
    pub reasoning_content: String,
}

/// Boxed fragment source as produced by an adapter
pub type FragmentSource = Pin<Box<dyn Stream<Item = Result<Fragment>> + Send>>;

/// A lazy, finite, non-restartable fragment sequence plus its cancel operation
pub struct FragmentStream {
    /// The underlying fragment sequence
    pub stream: FragmentSource,
    /// Handle to cancel the stream
    pub cancel: CancelHandle,
}

impl FragmentStream {
    /// Wrap a stream with a fresh cancel handle
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Fragment>> + Send + 'static,
    {
        Self::with_cancel(stream, CancelHandle::new())
    }

    /// Wrap a stream with a cancel handle the adapter already observes
    pub fn with_cancel<S>(stream: S, cancel: CancelHandle) -> Self
    where
        S: Stream<Item = Result<Fragment>> + Send + 'static,
    {
        Self {
            stream: Box::pin(stream),
            cancel,
        }
    }
}

impl std::fmt::Debug for FragmentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentStream")
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}
