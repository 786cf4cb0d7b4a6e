//! Embedding capability interface and similarity math

use async_trait::async_trait;

use crate::error::{EngineError, Result};

/// Default number of texts sent per embedding request.
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 10;

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed a query string.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a document/passage string.
    async fn embed_document(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of documents, preserving input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Preferred request batch size.
    fn batch_size(&self) -> usize {
        DEFAULT_EMBED_BATCH_SIZE
    }

    /// Cumulative token cost of all calls made through this service.
    fn total_tokens_used(&self) -> u64;
}

/// Embed every embedding-string of a query and aggregate by mean.
pub async fn agg_embedding_from_queries(
    service: &dyn EmbeddingService,
    queries: &[String],
) -> Result<Vec<f32>> {
    let mut embeddings = Vec::with_capacity(queries.len());
    for query in queries {
        embeddings.push(service.embed_query(query).await?);
    }
    mean_agg(&embeddings)
}

/// Element-wise mean of several embeddings.
pub fn mean_agg(embeddings: &[Vec<f32>]) -> Result<Vec<f32>> {
    let first = embeddings
        .first()
        .ok_or_else(|| EngineError::Configuration("no embeddings to aggregate".into()))?;
    let dims = first.len();
    let mut sum = vec![0.0f32; dims];
    for emb in embeddings {
        if emb.len() != dims {
            return Err(EngineError::DataIntegrity(format!(
                "embedding dimension mismatch: {} vs {}",
                emb.len(),
                dims
            )));
        }
        for (acc, value) in sum.iter_mut().zip(emb.iter()) {
            *acc += value;
        }
    }
    let n = embeddings.len() as f32;
    Ok(sum.into_iter().map(|v| v / n).collect())
}

/// How two embeddings are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMode {
    /// Cosine similarity in [-1, 1], higher is better.
    #[default]
    Cosine,
    /// Raw dot product, higher is better.
    DotProduct,
    /// Euclidean distance, lower is better.
    Euclidean,
}

impl SimilarityMode {
    /// Ordering semantics: false for distance modes.
    pub fn higher_is_better(&self) -> bool {
        !matches!(self, SimilarityMode::Euclidean)
    }
}

/// Score two embeddings under the given mode.
pub fn similarity(a: &[f32], b: &[f32], mode: SimilarityMode) -> f32 {
    match mode {
        SimilarityMode::Euclidean => a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt(),
        SimilarityMode::DotProduct => a.iter().zip(b.iter()).map(|(x, y)| x * y).sum(),
        SimilarityMode::Cosine => {
            let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
            let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
            let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
            dot / (norm_a * norm_b)
        }
    }
}
