//! Provider capability contract.
//!
//! A provider plugs in by implementing [`CapabilityAdapter`] and whichever
//! operation traits it supports. The facade asks for each capability before
//! dispatching and reports a capability error when it is missing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::streaming::{ChatCompletion, FragmentStream, Usage};
use crate::{ChatMessage, Tool};

/// Parameters of a chat completion request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Provider-specific fields passed through untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ChatParams {
    /// Request over `messages` with every option unset
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// Set the model name
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Offer `tools` to the model
    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Cap the completion length
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Parameters of an embedding request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub input: Vec<String>,
}

impl EmbeddingParams {
    /// Request embedding every string in `input`
    pub fn new(input: Vec<String>) -> Self {
        Self { model: None, input }
    }
}

/// One embedding vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub index: usize,
    pub embedding: Vec<f32>,
}

/// Result of an embedding request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub model: String,
    pub data: Vec<Embedding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Direct (non-streaming) chat generation
#[async_trait]
pub trait TextGeneration: Send + Sync {
    async fn generate_text(&self, params: ChatParams) -> Result<ChatCompletion>;
}

/// Streaming chat generation
#[async_trait]
pub trait StreamingTextGeneration: Send + Sync {
    /// Start a stream. The returned sequence is lazy and can be read once.
    async fn stream_text(&self, params: ChatParams) -> Result<FragmentStream>;
}

/// Embedding generation
#[async_trait]
pub trait EmbeddingGeneration: Send + Sync {
    async fn generate_embedding(&self, params: EmbeddingParams) -> Result<EmbeddingResponse>;
}

/// A pluggable provider
pub trait CapabilityAdapter: Send + Sync {
    /// Name used in diagnostics
    fn name(&self) -> &str;

    /// Reject misconfiguration before any request is attempted
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn as_text_generation(&self) -> Option<&dyn TextGeneration> {
        None
    }

    fn as_streaming(&self) -> Option<&dyn StreamingTextGeneration> {
        None
    }

    fn as_embedding(&self) -> Option<&dyn EmbeddingGeneration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_params_extra_fields_flatten() {
        let mut params = ChatParams::new(vec![ChatMessage::user("hi")]).with_model("gpt-4o");
        params
            .extra
            .insert("seed".to_string(), serde_json::json!(7));

        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["seed"], 7);
        assert!(json.get("tools").is_none());

        let back: ChatParams = serde_json::from_value(json).unwrap();
        assert_eq!(back.extra.get("seed"), Some(&serde_json::json!(7)));
    }

    struct Bare;

    impl CapabilityAdapter for Bare {
        fn name(&self) -> &str {
            "bare"
        }
    }

    #[test]
    fn test_capabilities_default_to_absent() {
        let adapter = Bare;
        assert!(adapter.validate().is_ok());
        assert!(adapter.as_text_generation().is_none());
        assert!(adapter.as_streaming().is_none());
        assert!(adapter.as_embedding().is_none());
    }
}
