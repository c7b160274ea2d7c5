//! Generation facade: `chat().create`, `chat().stream`, `embedding().create`.

use std::sync::Arc;

use tracing::debug;

use crate::adapter::{CapabilityAdapter, ChatParams, EmbeddingParams, EmbeddingResponse};
use crate::config::GenerationConfig;
use crate::error::{GenerationError, Result};
use crate::preprocess::{ContentPreprocessor, NoopPreprocessor};
use crate::streaming::{ChatCompletion, StreamAggregator};
use crate::usage::{TiktokenEstimator, UsageEstimator};

/// Entry point wrapping one capability adapter
#[derive(Clone)]
pub struct Generation {
    adapter: Arc<dyn CapabilityAdapter>,
    preprocessor: Arc<dyn ContentPreprocessor>,
    estimator: Arc<dyn UsageEstimator>,
    config: GenerationConfig,
}

impl Generation {
    /// Build with defaults. Runs the adapter's validator once; its error is
    /// returned here, before any request can be issued.
    pub fn new(adapter: Arc<dyn CapabilityAdapter>) -> Result<Self> {
        Self::builder(adapter).build()
    }

    /// Start configuring a facade over `adapter`
    pub fn builder(adapter: Arc<dyn CapabilityAdapter>) -> GenerationBuilder {
        GenerationBuilder {
            adapter,
            preprocessor: None,
            estimator: None,
            config: GenerationConfig::default(),
        }
    }

    /// Chat-completion operations
    pub fn chat(&self) -> Chat<'_> {
        Chat { generation: self }
    }

    /// Embedding operations
    pub fn embedding(&self) -> Embeddings<'_> {
        Embeddings { generation: self }
    }

    /// Configuration the facade was built with
    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Name reported by the wrapped adapter
    pub fn adapter_name(&self) -> &str {
        self.adapter.name()
    }

    async fn prepare(&self, mut params: ChatParams) -> ChatParams {
        if params.model.is_none() {
            params.model = self.config.default_model.clone();
        }
        params.messages = self.preprocessor.preprocess(params.messages).await;
        params
    }
}

impl std::fmt::Debug for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generation")
            .field("adapter", &self.adapter.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Generation`]
pub struct GenerationBuilder {
    adapter: Arc<dyn CapabilityAdapter>,
    preprocessor: Option<Arc<dyn ContentPreprocessor>>,
    estimator: Option<Arc<dyn UsageEstimator>>,
    config: GenerationConfig,
}

impl GenerationBuilder {
    /// Use `config` instead of the defaults
    pub fn config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    /// Rewrite outbound messages with `preprocessor` before dispatch
    pub fn preprocessor(mut self, preprocessor: impl ContentPreprocessor + 'static) -> Self {
        self.preprocessor = Some(Arc::new(preprocessor));
        self
    }

    /// Override the fallback usage estimator (defaults to tiktoken with the
    /// configured encoding)
    pub fn estimator(mut self, estimator: Arc<dyn UsageEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    /// Validate the config and the adapter, then assemble the facade
    pub fn build(self) -> Result<Generation> {
        self.config.validate()?;
        self.adapter.validate()?;
        debug!(adapter = self.adapter.name(), "adapter validated");

        let estimator = self.estimator.unwrap_or_else(|| {
            Arc::new(TiktokenEstimator::new(self.config.tokenizer)) as Arc<dyn UsageEstimator>
        });

        Ok(Generation {
            adapter: self.adapter,
            preprocessor: self
                .preprocessor
                .unwrap_or_else(|| Arc::new(NoopPreprocessor) as Arc<dyn ContentPreprocessor>),
            estimator,
            config: self.config,
        })
    }
}

/// Chat operations
#[derive(Debug, Clone, Copy)]
pub struct Chat<'a> {
    generation: &'a Generation,
}

impl Chat<'_> {
    /// One finished completion from the provider
    pub async fn create(&self, params: ChatParams) -> Result<ChatCompletion> {
        let adapter = &self.generation.adapter;
        let text = adapter
            .as_text_generation()
            .ok_or_else(|| GenerationError::capability(adapter.name(), "text generation"))?;

        let params = self.generation.prepare(params).await;
        debug!(adapter = adapter.name(), model = ?params.model, "dispatching chat completion");
        text.generate_text(params).await
    }

    /// A live fragment stream that also builds the finished completion
    pub async fn stream(&self, params: ChatParams) -> Result<StreamAggregator> {
        let adapter = &self.generation.adapter;
        let streaming = adapter
            .as_streaming()
            .ok_or_else(|| GenerationError::capability(adapter.name(), "streaming text generation"))?;

        let params = self.generation.prepare(params).await;
        let prompt = params.messages.clone();
        let model = params.model.clone();
        debug!(adapter = adapter.name(), model = ?model, "dispatching chat stream");

        let source = streaming.stream_text(params).await?;
        Ok(StreamAggregator::new(source, prompt, model)
            .with_estimator(Arc::clone(&self.generation.estimator))
            .with_model_sentinel(self.generation.config.model_sentinel.clone()))
    }
}

/// Embedding operations
#[derive(Debug, Clone, Copy)]
pub struct Embeddings<'a> {
    generation: &'a Generation,
}

impl Embeddings<'_> {
    /// Pass-through to the adapter; no aggregation
    pub async fn create(&self, params: EmbeddingParams) -> Result<EmbeddingResponse> {
        let adapter = &self.generation.adapter;
        let embedding = adapter
            .as_embedding()
            .ok_or_else(|| GenerationError::capability(adapter.name(), "embedding generation"))?;

        debug!(adapter = adapter.name(), inputs = params.input.len(), "dispatching embedding");
        embedding.generate_embedding(params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{
        Embedding, EmbeddingGeneration, StreamingTextGeneration, TextGeneration,
    };
    use crate::preprocess::ReferenceResolver;
    use crate::streaming::{FinalChoice, FinalMessage, FinalResponse, Fragment, FragmentStream, Usage};
    use crate::{ChatMessage, ContentBlock, ReferenceInliner};
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockAdapter {
        text: bool,
        streaming: bool,
        embedding: bool,
        invalid: bool,
        fragments: Vec<Fragment>,
        seen: Mutex<Vec<ChatParams>>,
    }

    impl CapabilityAdapter for MockAdapter {
        fn name(&self) -> &str {
            "mock"
        }

        fn validate(&self) -> Result<()> {
            if self.invalid {
                Err(GenerationError::validation("missing api key"))
            } else {
                Ok(())
            }
        }

        fn as_text_generation(&self) -> Option<&dyn TextGeneration> {
            self.text.then_some(self as &dyn TextGeneration)
        }

        fn as_streaming(&self) -> Option<&dyn StreamingTextGeneration> {
            self.streaming.then_some(self as &dyn StreamingTextGeneration)
        }

        fn as_embedding(&self) -> Option<&dyn EmbeddingGeneration> {
            self.embedding.then_some(self as &dyn EmbeddingGeneration)
        }
    }

    #[async_trait]
    impl TextGeneration for MockAdapter {
        async fn generate_text(&self, params: ChatParams) -> Result<ChatCompletion> {
            let model = params.model.clone().unwrap_or_default();
            self.seen.lock().unwrap().push(params);
            Ok(FinalResponse {
                id: FinalResponse::generate_id(),
                object: "chat.completion".to_string(),
                created: 0,
                model,
                choices: vec![FinalChoice {
                    index: 0,
                    message: FinalMessage {
                        role: "assistant".to_string(),
                        content: "direct".to_string(),
                        ..FinalMessage::default()
                    },
                    finish_reason: Some("stop".to_string()),
                }],
                usage: Usage::new(3, 1),
            })
        }
    }

    #[async_trait]
    impl StreamingTextGeneration for MockAdapter {
        async fn stream_text(&self, params: ChatParams) -> Result<FragmentStream> {
            self.seen.lock().unwrap().push(params);
            let items: Vec<Result<Fragment>> = self.fragments.iter().cloned().map(Ok).collect();
            Ok(FragmentStream::new(futures_util::stream::iter(items)))
        }
    }

    #[async_trait]
    impl EmbeddingGeneration for MockAdapter {
        async fn generate_embedding(&self, params: EmbeddingParams) -> Result<EmbeddingResponse> {
            Ok(EmbeddingResponse {
                model: params.model.unwrap_or_else(|| "embed".to_string()),
                data: params
                    .input
                    .iter()
                    .enumerate()
                    .map(|(index, text)| Embedding {
                        index,
                        embedding: vec![text.len() as f32],
                    })
                    .collect(),
                usage: None,
            })
        }
    }

    #[test]
    fn test_validation_error_surfaces_at_construction() {
        let adapter = Arc::new(MockAdapter {
            invalid: true,
            ..MockAdapter::default()
        });
        let err = Generation::new(adapter).unwrap_err();
        assert!(matches!(err, GenerationError::Validation(_)));
    }

    #[tokio::test]
    async fn test_missing_capabilities_are_reported() {
        let adapter = Arc::new(MockAdapter::default());
        let generation = Generation::new(adapter.clone()).unwrap();
        let params = ChatParams::new(vec![ChatMessage::user("hi")]);

        let err = generation.chat().create(params.clone()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Capability { capability: "text generation", .. }));

        let err = generation.chat().stream(params).await.unwrap_err();
        assert!(matches!(
            err,
            GenerationError::Capability { capability: "streaming text generation", .. }
        ));

        let err = generation
            .embedding()
            .create(EmbeddingParams::new(vec!["x".to_string()]))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Capability { .. }));

        assert!(adapter.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_applies_default_model() {
        let adapter = Arc::new(MockAdapter {
            text: true,
            ..MockAdapter::default()
        });
        let generation = Generation::builder(adapter.clone())
            .config(GenerationConfig::default().with_default_model("gpt-4o-mini"))
            .build()
            .unwrap();

        let completion = generation
            .chat()
            .create(ChatParams::new(vec![ChatMessage::user("hi")]))
            .await
            .unwrap();

        assert_eq!(completion.model, "gpt-4o-mini");
        assert_eq!(completion.first_message().unwrap().content, "direct");
        assert_eq!(
            adapter.seen.lock().unwrap()[0].model.as_deref(),
            Some("gpt-4o-mini")
        );
    }

    #[tokio::test]
    async fn test_stream_echoes_request_model_and_fragments() {
        let adapter = Arc::new(MockAdapter {
            streaming: true,
            fragments: vec![
                Fragment::role("assistant"),
                Fragment::content("Hi"),
                Fragment::usage(Usage::new(4, 1)),
            ],
            ..MockAdapter::default()
        });
        let generation = Generation::new(adapter).unwrap();

        let mut stream = generation
            .chat()
            .stream(ChatParams::new(vec![ChatMessage::user("hi")]).with_model("gpt-4o"))
            .await
            .unwrap();

        let mut emitted = Vec::new();
        while let Some(fragment) = stream.next().await {
            emitted.push(fragment.unwrap());
        }
        assert_eq!(emitted.len(), 3);
        assert_eq!(emitted[1], Fragment::content("Hi"));

        let completion = stream.finalize().await.unwrap();
        assert_eq!(completion.model, "gpt-4o");
        assert_eq!(completion.usage, Usage::new(4, 1));
        assert_eq!(completion.first_message().unwrap().content, "Hi");
    }

    #[tokio::test]
    async fn test_stream_without_model_uses_sentinel() {
        let adapter = Arc::new(MockAdapter {
            streaming: true,
            fragments: vec![Fragment::content("x"), Fragment::usage(Usage::new(1, 1))],
            ..MockAdapter::default()
        });
        let generation = Generation::new(adapter).unwrap();

        let mut stream = generation
            .chat()
            .stream(ChatParams::new(vec![ChatMessage::user("hi")]))
            .await
            .unwrap();
        let completion = stream.finalize().await.unwrap();
        assert_eq!(completion.model, "unknown");
    }

    struct OneFile;

    #[async_trait]
    impl ReferenceResolver for OneFile {
        async fn resolve_file(&self, _file_id: &str) -> Result<String> {
            Ok("inlined".to_string())
        }

        async fn fetch_audio(&self, url: &str) -> Result<Vec<u8>> {
            Err(GenerationError::upstream(format!("unreachable: {url}")))
        }
    }

    #[tokio::test]
    async fn test_preprocessor_runs_before_dispatch() {
        let adapter = Arc::new(MockAdapter {
            text: true,
            ..MockAdapter::default()
        });
        let generation = Generation::builder(adapter.clone())
            .preprocessor(ReferenceInliner::new(OneFile))
            .build()
            .unwrap();

        generation
            .chat()
            .create(ChatParams::new(vec![ChatMessage::user_blocks(vec![
                ContentBlock::file("f1"),
            ])]))
            .await
            .unwrap();

        let seen = adapter.seen.lock().unwrap();
        assert_eq!(seen[0].messages[0].to_text(), "inlined");
    }

    #[tokio::test]
    async fn test_embedding_passes_through() {
        let adapter = Arc::new(MockAdapter {
            embedding: true,
            ..MockAdapter::default()
        });
        let generation = Generation::new(adapter).unwrap();

        let response = generation
            .embedding()
            .create(EmbeddingParams::new(vec!["ab".to_string(), "abcd".to_string()]))
            .await
            .unwrap();
        assert_eq!(response.data.len(), 2);
        assert_eq!(response.data[1].embedding, vec![4.0]);
    }
}
