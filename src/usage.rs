//! Fallback token accounting for providers that never report usage.

use tiktoken_rs::{cl100k_base, p50k_base, CoreBPE};
use tracing::trace;

use crate::config::TokenizerKind;
use crate::error::{GenerationError, Result};
use crate::streaming::{FinalChoice, Usage};
use crate::ChatMessage;

/// Produces a usage record from the prompt and the assembled choices
pub trait UsageEstimator: Send + Sync {
    fn estimate(&self, prompt: &[ChatMessage], choices: &[FinalChoice]) -> Result<Usage>;
}

/// [`UsageEstimator`] backed by a tiktoken encoding
#[derive(Debug, Clone, Copy, Default)]
pub struct TiktokenEstimator {
    kind: TokenizerKind,
}

impl TiktokenEstimator {
    pub fn new(kind: TokenizerKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> TokenizerKind {
        self.kind
    }
}

impl UsageEstimator for TiktokenEstimator {
    fn estimate(&self, prompt: &[ChatMessage], choices: &[FinalChoice]) -> Result<Usage> {
        estimate_usage(prompt, choices, self.kind)
    }
}

/// Count tokens for a prompt and its completion.
///
/// Each prompt message counts as its role concatenated with its text; each
/// choice counts its content plus every tool-call name and arguments.
pub fn estimate_usage(
    prompt: &[ChatMessage],
    choices: &[FinalChoice],
    kind: TokenizerKind,
) -> Result<Usage> {
    let tokenizer = Tokenizer::acquire(kind)?;

    let prompt_tokens: u64 = prompt
        .iter()
        .map(|message| tokenizer.count(&format!("{}{}", message.role, message.to_text())))
        .sum();

    let completion_tokens: u64 = choices
        .iter()
        .map(|choice| {
            let message = &choice.message;
            let calls: u64 = message
                .tool_calls
                .iter()
                .map(|call| {
                    tokenizer.count(&call.function.name) + tokenizer.count(&call.function.arguments)
                })
                .sum();
            tokenizer.count(&message.content) + calls
        })
        .sum();

    Ok(Usage::new(prompt_tokens, completion_tokens))
}

/// Scoped tokenizer; released when dropped, on every exit path.
struct Tokenizer {
    bpe: CoreBPE,
    kind: TokenizerKind,
}

impl Tokenizer {
    fn acquire(kind: TokenizerKind) -> Result<Self> {
        let bpe = match kind {
            TokenizerKind::Cl100kBase => cl100k_base(),
            TokenizerKind::P50kBase => p50k_base(),
        }
        .map_err(|err| GenerationError::Tokenizer(format!("failed to load {kind}: {err}")))?;
        trace!(tokenizer = %kind, "acquired tokenizer");
        Ok(Self { bpe, kind })
    }

    fn count(&self, text: &str) -> u64 {
        if text.is_empty() {
            return 0;
        }
        self.bpe.encode_with_special_tokens(text).len() as u64
    }
}

impl Drop for Tokenizer {
    fn drop(&mut self) {
        trace!(tokenizer = %self.kind, "released tokenizer");
    }
}
