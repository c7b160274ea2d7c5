//! Generation configuration

use serde::{Deserialize, Serialize};

use crate::error::{GenerationError, Result};

/// Model name reported when neither the request nor the provider names one
pub const DEFAULT_MODEL_SENTINEL: &str = "unknown";

/// Tokenizer used for fallback usage estimation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenizerKind {
    /// GPT-3.5/GPT-4 family encoding
    #[default]
    Cl100kBase,
    /// Codex/legacy davinci encoding
    P50kBase,
}

impl TokenizerKind {
    /// Convert to string representation
    pub fn as_str(&self) -> &str {
        match self {
            Self::Cl100kBase => "cl100k_base",
            Self::P50kBase => "p50k_base",
        }
    }
}

impl std::fmt::Display for TokenizerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Settings shared by every request issued through a [`crate::Generation`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Model used when a request leaves `model` unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    /// Model name reported in a finished record when none is known
    pub model_sentinel: String,
    /// Encoding used by the fallback usage estimator
    pub tokenizer: TokenizerKind,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            default_model: None,
            model_sentinel: DEFAULT_MODEL_SENTINEL.to_string(),
            tokenizer: TokenizerKind::default(),
        }
    }
}

impl GenerationConfig {
    /// Parse configuration from JSON, filling omitted fields with defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the default model
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// Set the tokenizer used for fallback estimation
    pub fn with_tokenizer(mut self, tokenizer: TokenizerKind) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    /// Reject settings that would produce unusable records
    pub fn validate(&self) -> Result<()> {
        if self.model_sentinel.trim().is_empty() {
            return Err(GenerationError::Config(
                "model_sentinel must not be empty".to_string(),
            ));
        }
        if matches!(&self.default_model, Some(model) if model.trim().is_empty()) {
            return Err(GenerationError::Config(
                "default_model must not be blank when set".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GenerationConfig::default();
        assert_eq!(config.model_sentinel, "unknown");
        assert_eq!(config.tokenizer, TokenizerKind::Cl100kBase);
        assert!(config.default_model.is_none());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config =
            GenerationConfig::from_json_str(r#"{"default_model": "gpt-4o", "tokenizer": "p50k_base"}"#)
                .unwrap();
        assert_eq!(config.default_model.as_deref(), Some("gpt-4o"));
        assert_eq!(config.tokenizer, TokenizerKind::P50kBase);
        assert_eq!(config.model_sentinel, "unknown");
    }

    #[test]
    fn test_blank_sentinel_rejected() {
        let err = GenerationConfig::from_json_str(r#"{"model_sentinel": "  "}"#).unwrap_err();
        assert!(matches!(err, GenerationError::Config(_)));
    }
}
