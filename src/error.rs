//! Error types for generation requests and stream aggregation

use thiserror::Error;

/// Errors raised by the generation facade, adapters and the stream aggregator
#[derive(Error, Debug)]
pub enum GenerationError {
    /// The adapter does not implement the requested operation
    #[error("adapter '{adapter}' does not support {capability}")]
    Capability {
        /// Adapter name as reported by the adapter
        adapter: String,
        /// Operation that was requested
        capability: &'static str,
    },

    /// Adapter rejected its own configuration at construction time
    #[error("adapter validation failed: {0}")]
    Validation(String),

    /// The provider or its fragment source failed
    #[error("upstream error: {0}")]
    Upstream(String),

    /// A finalize drive ended without producing a record
    #[error("stream drive ended without a finalized response")]
    FinalizationInvariant,

    /// The fallback tokenizer could not be loaded or used
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON (de)serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GenerationError {
    /// Create a capability error
    pub fn capability(adapter: impl Into<String>, capability: &'static str) -> Self {
        Self::Capability {
            adapter: adapter.into(),
            capability,
        }
    }

    /// Create an upstream error
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Result type for generation operations
pub type Result<T> = std::result::Result<T, GenerationError>;
