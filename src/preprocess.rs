//! Outbound content preprocessing.
//!
//! Structured references (stored files, remote audio) are rewritten into
//! inline text or encoded bytes before a request reaches the adapter. A
//! reference that fails to resolve is replaced by a placeholder; the request
//! itself always proceeds.

use async_trait::async_trait;
use base64::Engine;
use futures_util::future::join_all;
use tracing::warn;

use crate::error::Result;
use crate::{ChatMessage, ContentBlock, MessageContent};

/// Rewrites outbound messages before dispatch
#[async_trait]
pub trait ContentPreprocessor: Send + Sync {
    async fn preprocess(&self, messages: Vec<ChatMessage>) -> Vec<ChatMessage>;
}

/// Leaves messages untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPreprocessor;

#[async_trait]
impl ContentPreprocessor for NoopPreprocessor {
    async fn preprocess(&self, messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
        messages
    }
}

/// Looks up the data behind content references
#[async_trait]
pub trait ReferenceResolver: Send + Sync {
    /// Text content of a stored file
    async fn resolve_file(&self, file_id: &str) -> Result<String>;

    /// Raw bytes of remote audio
    async fn fetch_audio(&self, url: &str) -> Result<Vec<u8>>;
}

/// Inlines file and audio references through a [`ReferenceResolver`].
///
/// Every reference in a request is resolved concurrently; all of them are
/// joined before the messages are returned.
#[derive(Debug, Clone)]
pub struct ReferenceInliner<R> {
    resolver: R,
}

impl<R: ReferenceResolver> ReferenceInliner<R> {
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }

    async fn inline_message(&self, mut message: ChatMessage) -> ChatMessage {
        message.content = match message.content {
            MessageContent::Blocks(blocks) if blocks.iter().any(ContentBlock::is_reference) => {
                MessageContent::Blocks(
                    join_all(blocks.into_iter().map(|block| self.inline_block(block))).await,
                )
            }
            content => content,
        };
        message
    }

    async fn inline_block(&self, block: ContentBlock) -> ContentBlock {
        match block {
            ContentBlock::File { file_id } => match self.resolver.resolve_file(&file_id).await {
                Ok(text) => ContentBlock::Text { text },
                Err(err) => {
                    warn!(file_id = %file_id, error = %err, "file reference could not be resolved");
                    ContentBlock::text(format!("[file {file_id} unavailable]"))
                }
            },
            ContentBlock::AudioUrl { url, format } => match self.resolver.fetch_audio(&url).await {
                Ok(bytes) => ContentBlock::InputAudio {
                    data: base64::engine::general_purpose::STANDARD.encode(bytes),
                    format,
                },
                Err(err) => {
                    warn!(url = %url, error = %err, "audio reference could not be fetched");
                    ContentBlock::text(format!("[audio {url} unavailable]"))
                }
            },
            other => other,
        }
    }
}

#[async_trait]
impl<R: ReferenceResolver> ContentPreprocessor for ReferenceInliner<R> {
    async fn preprocess(&self, messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
        join_all(messages.into_iter().map(|message| self.inline_message(message))).await
    }
}
