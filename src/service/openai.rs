//! OpenAI-backed language model and embedding services

use std::env;
use std::sync::atomic::{AtomicU64, Ordering};

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
        CreateEmbeddingRequestArgs, EmbeddingInput,
    },
    Client,
};
use async_trait::async_trait;
use tracing::info;

use crate::error::{CapabilityErrorKind, EngineError, Result};
use crate::prompt::PromptTemplate;
use crate::service::llm::{LanguageModelService, LlmMetadata, Prediction};
use crate::service::retry::{with_backoff, RetryPolicy};
use crate::service::EmbeddingService;

/// Input window sizes for common chat models.
fn context_window_for(model_name: &str) -> usize {
    let base_name = model_name.split(':').next().unwrap_or(model_name);
    match base_name {
        "gpt-3.5-turbo" | "gpt-3.5-turbo-instruct" => 4096,
        "gpt-3.5-turbo-16k" => 16384,
        "gpt-4" => 8192,
        "gpt-4-32k" => 32768,
        name if name.starts_with("gpt-4o") || name.starts_with("gpt-4-turbo") => 128_000,
        _ => crate::config::DEFAULT_MAX_INPUT_SIZE,
    }
}

fn classify_openai_error(err: &OpenAIError) -> CapabilityErrorKind {
    match err {
        OpenAIError::Reqwest(e) => {
            if e.is_timeout() || e.is_connect() {
                CapabilityErrorKind::Connection
            } else {
                CapabilityErrorKind::Other
            }
        }
        OpenAIError::ApiError(api) => {
            let type_str = api.r#type.as_deref().unwrap_or_default();
            let haystack = format!("{} {}", api.message.to_lowercase(), type_str.to_lowercase());
            if haystack.contains("rate limit") || haystack.contains("rate_limit") {
                CapabilityErrorKind::RateLimited
            } else if haystack.contains("overloaded")
                || haystack.contains("server_error")
                || haystack.contains("unavailable")
            {
                CapabilityErrorKind::Unavailable
            } else {
                CapabilityErrorKind::Other
            }
        }
        _ => CapabilityErrorKind::Other,
    }
}

fn map_openai_error(service_name: &str, err: OpenAIError) -> EngineError {
    EngineError::capability(
        classify_openai_error(&err),
        format!("{}: {}", service_name, err),
    )
}

fn resolve_config(api_key: Option<String>, base_url: Option<String>) -> Result<OpenAIConfig> {
    let api_key = api_key
        .or_else(|| env::var("OPENAI_API_KEY").ok())
        .ok_or_else(|| EngineError::Configuration("OPENAI_API_KEY not set".into()))?;

    let mut config = OpenAIConfig::new().with_api_key(api_key);
    if let Some(base_url) = base_url.or_else(|| env::var("OPENAI_BASE_URL").ok()) {
        config = config.with_api_base(base_url);
    }
    Ok(config)
}

/// OpenAI language model service.
pub struct OpenAiLlm {
    client: Client<OpenAIConfig>,
    model_name: String,
    metadata: LlmMetadata,
    retry: RetryPolicy,
    tokens_used: AtomicU64,
}

impl OpenAiLlm {
    pub fn new(
        model_name: String,
        api_key: Option<String>,
        base_url: Option<String>,
    ) -> Result<Self> {
        let config = resolve_config(api_key, base_url)?;
        let client = Client::with_config(config);
        let metadata = LlmMetadata {
            max_input_size: context_window_for(&model_name),
            num_output: crate::config::NUM_OUTPUTS,
        };

        info!("OpenAI LLM service: {}", model_name);

        Ok(Self {
            client,
            model_name,
            metadata,
            retry: RetryPolicy::default(),
            tokens_used: AtomicU64::new(0),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl LanguageModelService for OpenAiLlm {
    async fn predict(&self, prompt: &PromptTemplate, vars: &[(&str, &str)]) -> Result<Prediction> {
        let rendered = prompt.format(vars);

        let response = with_backoff(&self.retry, "openai chat completion", || {
            let rendered = &rendered;
            async move {
                let request = CreateChatCompletionRequestArgs::default()
                    .model(&self.model_name)
                    .messages([ChatCompletionRequestUserMessageArgs::default()
                        .content(rendered.as_str())
                        .build()
                        .map_err(|e| map_openai_error("OpenAI", e))?
                        .into()])
                    .max_tokens(self.metadata.num_output as u32)
                    .build()
                    .map_err(|e| map_openai_error("OpenAI", e))?;

                self.client
                    .chat()
                    .create(request)
                    .await
                    .map_err(|e| map_openai_error("OpenAI", e))
            }
        })
        .await?;

        if let Some(usage) = &response.usage {
            self.tokens_used
                .fetch_add(usage.total_tokens as u64, Ordering::Relaxed);
        }

        let text = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .map(|s| s.to_string())
            .unwrap_or_default();

        Ok(Prediction {
            text,
            rendered_prompt: rendered,
        })
    }

    fn metadata(&self) -> LlmMetadata {
        self.metadata
    }

    fn total_tokens_used(&self) -> u64 {
        self.tokens_used.load(Ordering::Relaxed)
    }
}

/// OpenAI embedding service.
pub struct OpenAiEmbedding {
    client: Client<OpenAIConfig>,
    model_name: String,
    retry: RetryPolicy,
    tokens_used: AtomicU64,
}

impl OpenAiEmbedding {
    pub fn new(
        model_name: String,
        api_key: Option<String>,
        base_url: Option<String>,
    ) -> Result<Self> {
        let config = resolve_config(api_key, base_url)?;
        let client = Client::with_config(config);

        info!("OpenAI embedding service: {}", model_name);

        Ok(Self {
            client,
            model_name,
            retry: RetryPolicy::default(),
            tokens_used: AtomicU64::new(0),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = with_backoff(&self.retry, "openai embeddings", || {
            let texts = &texts;
            async move {
                let request = CreateEmbeddingRequestArgs::default()
                    .model(&self.model_name)
                    .input(EmbeddingInput::StringArray(texts.clone()))
                    .build()
                    .map_err(|e| map_openai_error("OpenAI", e))?;

                self.client
                    .embeddings()
                    .create(request)
                    .await
                    .map_err(|e| map_openai_error("OpenAI", e))
            }
        })
        .await?;

        self.tokens_used
            .fetch_add(response.usage.total_tokens as u64, Ordering::Relaxed);

        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingService for OpenAiEmbedding {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_texts(vec![text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| EngineError::capability(CapabilityErrorKind::Other, "empty embedding response"))
    }

    async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_query(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // The API accepts up to 100 inputs per request.
        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(100) {
            all.extend(self.embed_texts(batch.to_vec()).await?);
        }
        Ok(all)
    }

    fn batch_size(&self) -> usize {
        100
    }

    fn total_tokens_used(&self) -> u64 {
        self.tokens_used.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_window_lookup() {
        assert_eq!(context_window_for("gpt-4"), 8192);
        assert_eq!(context_window_for("gpt-4o-mini"), 128_000);
        assert_eq!(context_window_for("unknown-model"), 4096);
    }
}
