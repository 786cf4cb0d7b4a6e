//! Ollama-backed language model and embedding services

use std::env;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::prompt::PromptTemplate;
use crate::service::http::{check_response, create_client, transport_error};
use crate::service::llm::{LanguageModelService, LlmMetadata, Prediction};
use crate::service::retry::{with_backoff, RetryPolicy};
use crate::service::EmbeddingService;

fn resolve_host(host: Option<String>) -> String {
    host.or_else(|| env::var("OLLAMA_HOST").ok())
        .unwrap_or_else(|| "http://localhost:11434".to_string())
}

/// Ollama language model service.
pub struct OllamaLlm {
    client: Client,
    host: String,
    model_name: String,
    metadata: LlmMetadata,
    retry: RetryPolicy,
    tokens_used: AtomicU64,
}

#[derive(Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
    done: bool,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

impl OllamaLlm {
    pub fn new(model_name: String, host: Option<String>) -> Result<Self> {
        let host = resolve_host(host);
        let client = create_client()?;

        info!("Ollama LLM service: {} @ {}", model_name, host);

        Ok(Self {
            client,
            host,
            model_name,
            metadata: LlmMetadata::default(),
            retry: RetryPolicy::default(),
            tokens_used: AtomicU64::new(0),
        })
    }

    pub fn with_metadata(mut self, metadata: LlmMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl LanguageModelService for OllamaLlm {
    async fn predict(&self, prompt: &PromptTemplate, vars: &[(&str, &str)]) -> Result<Prediction> {
        let rendered = prompt.format(vars);

        let text = with_backoff(&self.retry, "ollama generate", || {
            let rendered = &rendered;
            async move {
                let request = GenerateRequest {
                    model: self.model_name.clone(),
                    prompt: rendered.clone(),
                    stream: false,
                };

                let response = self
                    .client
                    .post(format!("{}/api/generate", self.host))
                    .json(&request)
                    .send()
                    .await
                    .map_err(|e| transport_error("Ollama", e))?;

                let response = check_response(response, "Ollama").await?;
                let body = response
                    .text()
                    .await
                    .map_err(|e| transport_error("Ollama", e))?;

                // Parse streaming-style response (multiple JSON objects).
                let mut full_response = String::new();
                for line in body.lines() {
                    if line.is_empty() {
                        continue;
                    }
                    if let Ok(resp) = serde_json::from_str::<GenerateResponse>(line) {
                        full_response.push_str(&resp.response);
                        self.tokens_used
                            .fetch_add(resp.prompt_eval_count + resp.eval_count, Ordering::Relaxed);
                        if resp.done {
                            break;
                        }
                    }
                }

                Ok(full_response)
            }
        })
        .await?;

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

/// Ollama embedding service.
pub struct OllamaEmbedding {
    client: Client,
    host: String,
    model_name: String,
    retry: RetryPolicy,
    tokens_used: AtomicU64,
}

#[derive(Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    prompt_eval_count: u64,
}

impl OllamaEmbedding {
    pub fn new(model_name: String, host: Option<String>) -> Result<Self> {
        let host = resolve_host(host);
        let client = create_client()?;

        info!("Ollama embedding service: {} @ {}", model_name, host);

        Ok(Self {
            client,
            host,
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

        let response = with_backoff(&self.retry, "ollama embed", || {
            let texts = &texts;
            async move {
                let request = EmbedRequest {
                    model: self.model_name.clone(),
                    input: texts.clone(),
                };

                let response = self
                    .client
                    .post(format!("{}/api/embed", self.host))
                    .json(&request)
                    .send()
                    .await
                    .map_err(|e| transport_error("Ollama", e))?;

                let response = check_response(response, "Ollama").await?;
                response
                    .json::<EmbedResponse>()
                    .await
                    .map_err(|e| transport_error("Ollama", e))
            }
        })
        .await?;

        self.tokens_used
            .fetch_add(response.prompt_eval_count, Ordering::Relaxed);

        Ok(response.embeddings)
    }
}

#[async_trait]
impl EmbeddingService for OllamaEmbedding {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_texts(vec![text.to_string()]).await?;
        embeddings.pop().ok_or_else(|| {
            crate::error::EngineError::capability(
                crate::error::CapabilityErrorKind::Other,
                "empty embedding response",
            )
        })
    }

    async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_query(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // Ollama handles modest batches well; 32 is the usual recommendation.
        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(32) {
            all.extend(self.embed_texts(batch.to_vec()).await?);
        }
        Ok(all)
    }

    fn batch_size(&self) -> usize {
        32
    }

    fn total_tokens_used(&self) -> u64 {
        self.tokens_used.load(Ordering::Relaxed)
    }
}
