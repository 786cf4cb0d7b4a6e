//! Simulated services for testing
//!
//! Deterministic, in-process stand-ins for the language model and embedding
//! capabilities. No external API calls; identical inputs always produce
//! identical outputs, which keeps retrieval rankings and synthesis traces
//! reproducible in tests.

use std::hash::Hasher;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::error::Result;
use crate::prompt::PromptTemplate;
use crate::service::llm::{LanguageModelService, LlmMetadata, Prediction};
use crate::service::EmbeddingService;

fn lookup<'a>(vars: &'a [(&str, &str)], key: &str) -> Option<&'a str> {
    vars.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// Simulated language model.
///
/// Recognizes the engine's prompt shapes by their variables: keyword
/// extraction returns a `KEYWORDS:` line, step decomposition echoes the
/// original question, refinement returns the existing answer unchanged, and
/// question answering produces a canned answer naming the query.
pub struct SimulatedLlm {
    metadata: LlmMetadata,
    tokens_used: AtomicU64,
}

impl Default for SimulatedLlm {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedLlm {
    pub fn new() -> Self {
        Self {
            metadata: LlmMetadata::default(),
            tokens_used: AtomicU64::new(0),
        }
    }

    pub fn with_metadata(mut self, metadata: LlmMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    fn respond(&self, vars: &[(&str, &str)]) -> String {
        if let Some(question) = lookup(vars, "question") {
            let keywords: Vec<String> = question
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| w.len() >= 4)
                .map(|w| w.to_lowercase())
                .collect();
            return format!("KEYWORDS: {}", keywords.join(", "));
        }
        if lookup(vars, "prev_reasoning").is_some() {
            // Step decomposition: the sub-question is the original question.
            return lookup(vars, "query_str").unwrap_or_default().to_string();
        }
        if let Some(existing) = lookup(vars, "existing_answer") {
            // Refinement: treat the new context as not useful.
            return existing.to_string();
        }
        if lookup(vars, "context_str").is_some() {
            let query = lookup(vars, "query_str").unwrap_or("the question");
            return format!("Based on the provided context: {}", query);
        }
        "Simulated response.".to_string()
    }
}

#[async_trait]
impl LanguageModelService for SimulatedLlm {
    async fn predict(&self, prompt: &PromptTemplate, vars: &[(&str, &str)]) -> Result<Prediction> {
        let rendered = prompt.format(vars);
        let text = self.respond(vars);
        let cost = (rendered.split_whitespace().count() + text.split_whitespace().count()) as u64;
        self.tokens_used.fetch_add(cost, Ordering::Relaxed);
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

/// Simulated embedding service.
///
/// Hashes words into a fixed number of buckets and L2-normalizes the counts,
/// so identical texts embed identically and overlapping texts score high
/// cosine similarity.
pub struct SimulatedEmbedding {
    dimensions: usize,
    tokens_used: AtomicU64,
}

impl Default for SimulatedEmbedding {
    fn default() -> Self {
        Self::new(16)
    }
}

impl SimulatedEmbedding {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            tokens_used: AtomicU64::new(0),
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut buckets = vec![0.0f32; self.dimensions];
        let mut words = 0u64;
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = rustc_hash::FxHasher::default();
            hasher.write(word.to_lowercase().as_bytes());
            let bucket = (hasher.finish() % self.dimensions as u64) as usize;
            buckets[bucket] += 1.0;
            words += 1;
        }
        self.tokens_used.fetch_add(words, Ordering::Relaxed);

        let norm: f32 = buckets.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in buckets.iter_mut() {
                *value /= norm;
            }
        }
        buckets
    }
}

#[async_trait]
impl EmbeddingService for SimulatedEmbedding {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn total_tokens_used(&self) -> u64 {
        self.tokens_used.load(Ordering::Relaxed)
    }
}
