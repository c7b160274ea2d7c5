//! UMF Stream
//!
//! Client-side generation core on top of pluggable provider adapters.
//! Chat completions come back either as one finished record or as a live
//! stream of fragments that is re-emitted unchanged while being reduced into
//! the same finished record.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use futures_util::StreamExt;
//! use umf_stream::{ChatMessage, ChatParams, Generation};
//!
//! let generation = Generation::new(adapter)?;
//!
//! let mut stream = generation
//!     .chat()
//!     .stream(ChatParams::new(vec![ChatMessage::user("Hello")]))
//!     .await?;
//!
//! while let Some(fragment) = stream.next().await {
//!     let fragment = fragment?;
//!     // render fragment.choices[..].delta as it arrives
//! }
//!
//! // Free after a full drain: the record was built while iterating.
//! let completion = stream.finalize().await?;
//! println!("{}", completion.choices[0].message.content);
//! ```
//!
//! ## Core Principles
//!
//! 1. **Capability-checked**: every operation verifies the adapter supports it
//!    before anything is sent
//! 2. **OpenAI-Compatible Base**: fragments and completions follow the
//!    widely-used chat-completion wire shape
//! 3. **One drive**: iteration and finalization pull from the same cursor, so
//!    a non-replayable provider stream is never read twice
//! 4. **Graceful usage**: when the provider never reports token usage, a local
//!    tokenizer estimates it

use serde::{Deserialize, Serialize};

pub mod adapter;
pub mod client;
pub mod config;
pub mod error;
pub mod preprocess;
pub mod streaming;
pub mod usage;

pub use adapter::{
    CapabilityAdapter, ChatParams, Embedding, EmbeddingGeneration, EmbeddingParams,
    EmbeddingResponse, StreamingTextGeneration, TextGeneration,
};
pub use client::{Chat, Embeddings, Generation, GenerationBuilder};
pub use config::{GenerationConfig, TokenizerKind};
pub use error::{GenerationError, Result};
pub use preprocess::{ContentPreprocessor, NoopPreprocessor, ReferenceInliner, ReferenceResolver};
pub use streaming::{
    AggregatorState, CancelHandle, ChatCompletion, ChoiceDelta, Delta, FinalChoice, FinalMessage,
    FinalResponse, Fragment, FragmentStream, StreamAggregator, ToolCallDelta, Usage,
};
pub use usage::{TiktokenEstimator, UsageEstimator};

// ============================================================================
// Core Message Types
// ============================================================================

/// A message in an outbound prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message role (system, user, assistant, tool)
    pub role: MessageRole,
    /// Message content (text or structured blocks)
    pub content: MessageContent,
    /// Optional participant name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool call ID for tool messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool calls previously requested by the assistant
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl ChatMessage {
    fn with_role(role: MessageRole, content: MessageContent) -> Self {
        Self {
            role,
            content,
            name: None,
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    /// Create a system message
    pub fn system(text: impl Into<String>) -> Self {
        Self::with_role(MessageRole::System, MessageContent::Text(text.into()))
    }

    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::with_role(MessageRole::User, MessageContent::Text(text.into()))
    }

    /// Create a user message from structured blocks
    pub fn user_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self::with_role(MessageRole::User, MessageContent::Blocks(blocks))
    }

    /// Create an assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_role(MessageRole::Assistant, MessageContent::Text(text.into()))
    }

    /// Create an assistant message carrying tool calls
    pub fn assistant_with_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::assistant(text)
        }
    }

    /// Create a tool result message
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_role(MessageRole::Tool, MessageContent::Text(content.into()))
        }
    }

    /// Get text content if this is a text message
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Extract all text content from the message
    ///
    /// For block messages, text blocks are joined with newlines; binary and
    /// reference blocks contribute nothing.
    pub fn to_text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(ContentBlock::as_text)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System-level instructions
    System,
    /// User input
    User,
    /// Assistant response
    Assistant,
    /// Tool execution result
    Tool,
}

impl MessageRole {
    /// Convert to string representation
    pub fn as_str(&self) -> &str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Message content (text or structured blocks)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Simple text content
    Text(String),
    /// Structured content blocks (images, file and audio references)
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// Check if any block still points at an unresolved reference
    pub fn has_references(&self) -> bool {
        match self {
            Self::Text(_) => false,
            Self::Blocks(blocks) => blocks.iter().any(ContentBlock::is_reference),
        }
    }
}

// ============================================================================
// Content Block Types
// ============================================================================

/// Image source for image blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageSource {
    /// Base64-encoded image data
    Base64 {
        /// MIME type of the image (e.g., "image/png")
        media_type: String,
        /// Base64-encoded image data
        data: String,
    },
    /// URL to an image
    Url {
        /// URL of the image
        url: String,
    },
}

/// A content block within a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Text content
    Text {
        /// The text content
        text: String,
    },
    /// Image content
    Image {
        /// The image source
        source: ImageSource,
    },
    /// Reference to a stored file whose text must be inlined before dispatch
    File {
        /// Identifier understood by the configured resolver
        file_id: String,
    },
    /// Reference to remote audio that must be fetched and encoded before dispatch
    AudioUrl {
        /// Location of the audio
        url: String,
        /// Audio container format (e.g., "mp3", "wav")
        format: String,
    },
    /// Inline audio
    InputAudio {
        /// Base64-encoded audio bytes
        data: String,
        /// Audio container format
        format: String,
    },
}

impl ContentBlock {
    /// Create a text block
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create a file reference block
    pub fn file(file_id: impl Into<String>) -> Self {
        Self::File {
            file_id: file_id.into(),
        }
    }

    /// Create a remote audio reference block
    pub fn audio_url(url: impl Into<String>, format: impl Into<String>) -> Self {
        Self::AudioUrl {
            url: url.into(),
            format: format.into(),
        }
    }

    /// Get the text from a text block
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Whether this block must be resolved by a preprocessor
    pub fn is_reference(&self) -> bool {
        matches!(self, Self::File { .. } | Self::AudioUrl { .. })
    }
}

// ============================================================================
// OpenAI-Compatible Tool Types
// ============================================================================

/// Function call structure for tool invocations
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// Tool call structure for function calling
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub r#type: String,
    pub function: FunctionCall,
}

/// Function definition for tools
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Tool definition for OpenAI-compatible tools
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Tool {
    #[serde(rename = "type")]
    pub r#type: String,
    pub function: Function,
}

impl Tool {
    /// Create a function tool
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            r#type: "function".to_string(),
            function: Function {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = ChatMessage::system("You are a helpful assistant");
        assert_eq!(msg.role, MessageRole::System);
        assert_eq!(msg.text(), Some("You are a helpful assistant"));

        let msg = ChatMessage::user("Hello");
        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.text(), Some("Hello"));

        let msg = ChatMessage::tool_result("call_1", "72°F");
        assert_eq!(msg.role, MessageRole::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_role_string_conversion() {
        assert_eq!(MessageRole::System.as_str(), "system");
        assert_eq!(MessageRole::User.as_str(), "user");
        assert_eq!(MessageRole::Assistant.as_str(), "assistant");
        assert_eq!(MessageRole::Tool.as_str(), "tool");
    }

    #[test]
    fn test_to_text_skips_non_text_blocks() {
        let msg = ChatMessage::user_blocks(vec![
            ContentBlock::text("first"),
            ContentBlock::file("file_1"),
            ContentBlock::text("second"),
        ]);
        assert_eq!(msg.to_text(), "first\nsecond");
        assert!(msg.content.has_references());
    }

    #[test]
    fn test_text_message_serializes_flat() {
        let json = serde_json::to_value(ChatMessage::user("Hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "Hi"}));
    }

    #[test]
    fn test_reference_blocks_wire_shape() {
        let json = serde_json::to_value(ContentBlock::audio_url("https://a/b.mp3", "mp3")).unwrap();
        assert_eq!(json["type"], "audio_url");
        assert_eq!(json["url"], "https://a/b.mp3");
        assert_eq!(json["format"], "mp3");

        let block: ContentBlock =
            serde_json::from_value(serde_json::json!({"type": "file", "file_id": "f1"})).unwrap();
        assert_eq!(block, ContentBlock::file("f1"));
    }

    #[test]
    fn test_assistant_tool_calls_roundtrip() {
        let msg = ChatMessage::assistant_with_tool_calls(
            "",
            vec![ToolCall {
                id: "call_123".to_string(),
                r#type: "function".to_string(),
                function: FunctionCall {
                    name: "search".to_string(),
                    arguments: "{\"q\":\"rust\"}".to_string(),
                },
            }],
        );
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["tool_calls"][0]["type"], "function");
        assert_eq!(json["tool_calls"][0]["function"]["name"], "search");

        let back: ChatMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }
}
