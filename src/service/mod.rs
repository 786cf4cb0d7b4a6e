//! Capability services - language model, embeddings, and the shared context
//!
//! The engine talks to its model backends through the traits here; concrete
//! OpenAI- and Ollama-backed implementations live alongside a deterministic
//! simulated pair for tests.

mod embedding;
mod http;
mod llm;
mod ollama;
mod openai;
mod retry;
mod simulated;

pub use embedding::{
    agg_embedding_from_queries, mean_agg, similarity, EmbeddingService, SimilarityMode,
    DEFAULT_EMBED_BATCH_SIZE,
};
pub use llm::{LanguageModelService, LlmMetadata, Prediction};
pub use ollama::{OllamaEmbedding, OllamaLlm};
pub use openai::{OpenAiEmbedding, OpenAiLlm};
pub use retry::{with_backoff, RetryPolicy};
pub use simulated::{SimulatedEmbedding, SimulatedLlm};

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::prompt::PromptHelper;
use crate::split::{TiktokenTokenizer, Tokenizer};

/// Shared handles to the services one query execution depends on.
///
/// Cheap to clone; every field is behind an `Arc`.
#[derive(Clone)]
pub struct ServiceContext {
    pub llm: Arc<dyn LanguageModelService>,
    pub embed: Arc<dyn EmbeddingService>,
    pub tokenizer: Arc<dyn Tokenizer>,
    pub prompt_helper: PromptHelper,
}

impl ServiceContext {
    /// Build a context with prompt sizing derived from the model's window.
    pub fn new(
        llm: Arc<dyn LanguageModelService>,
        embed: Arc<dyn EmbeddingService>,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Self {
        let prompt_helper = PromptHelper::from_llm_metadata(llm.metadata(), tokenizer.clone(), None);
        Self {
            llm,
            embed,
            tokenizer,
            prompt_helper,
        }
    }

    /// Build a context using the tiktoken tokenizer and an optional
    /// chunk-size ceiling from configuration.
    pub fn from_config(
        config: &EngineConfig,
        llm: Arc<dyn LanguageModelService>,
        embed: Arc<dyn EmbeddingService>,
    ) -> crate::error::Result<Self> {
        let tokenizer: Arc<dyn Tokenizer> = Arc::new(TiktokenTokenizer::new()?);
        let prompt_helper = PromptHelper::from_llm_metadata(
            llm.metadata(),
            tokenizer.clone(),
            config.model.chunk_size_limit,
        );
        Ok(Self {
            llm,
            embed,
            tokenizer,
            prompt_helper,
        })
    }

    pub fn with_prompt_helper(mut self, prompt_helper: PromptHelper) -> Self {
        self.prompt_helper = prompt_helper;
        self
    }
}
