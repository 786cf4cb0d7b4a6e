//! Vector retrieval - embedding similarity ranking

use async_trait::async_trait;

use crate::docstore::DocumentStore;
use crate::error::Result;
use crate::index::VectorDict;
use crate::node::NodeWithScore;
use crate::query::{QueryBundle, QueryConfig};
use crate::service::{similarity, ServiceContext, SimilarityMode};

use super::Retriever;

/// Rank candidate embeddings against a query embedding.
///
/// Candidates are scanned in the given order; the sort is stable, so ties
/// keep scan order. Cosine and dot-product rank descending; Euclidean is a
/// distance and ranks ascending.
pub fn top_k_embeddings<I: Copy>(
    query_embedding: &[f32],
    candidates: &[(I, &[f32])],
    top_k: usize,
    mode: SimilarityMode,
) -> Vec<(I, f32)> {
    let mut scored: Vec<(I, f32)> = candidates
        .iter()
        .map(|(id, embedding)| (*id, similarity(query_embedding, embedding, mode)))
        .collect();

    if mode.higher_is_better() {
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    } else {
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    }
    scored.truncate(top_k);
    scored
}

/// Retriever over a vector-dict index.
pub struct VectorRetriever<'a> {
    index: &'a VectorDict,
    docstore: &'a DocumentStore,
    ctx: &'a ServiceContext,
    top_k: usize,
    mode: SimilarityMode,
}

impl<'a> VectorRetriever<'a> {
    pub fn new(
        index: &'a VectorDict,
        docstore: &'a DocumentStore,
        ctx: &'a ServiceContext,
        config: &QueryConfig,
    ) -> Self {
        Self {
            index,
            docstore,
            ctx,
            top_k: config.similarity_top_k,
            mode: config.similarity_mode,
        }
    }
}

#[async_trait]
impl Retriever for VectorRetriever<'_> {
    async fn retrieve(&self, bundle: &mut QueryBundle) -> Result<Vec<NodeWithScore>> {
        let query_embedding = bundle.resolve_embedding(self.ctx.embed.as_ref()).await?;

        let keys = self.index.embedded_keys();
        let candidates: Vec<(&str, &[f32])> = keys
            .iter()
            .filter_map(|key| self.index.embedding_for(key).map(|emb| (*key, emb)))
            .collect();

        let ranked = top_k_embeddings(&query_embedding, &candidates, self.top_k, self.mode);

        let mut results = Vec::with_capacity(ranked.len());
        for (vector_id, score) in ranked {
            let node_id = self.index.node_id_for(vector_id)?;
            let node = self.docstore.get(node_id)?.clone();
            results.push(NodeWithScore::new(node, Some(score)));
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_k_cosine_descending() {
        let query = vec![1.0, 0.0];
        let a = vec![1.0, 0.0];
        let b = vec![0.7, 0.7];
        let c = vec![0.0, 1.0];
        let candidates: Vec<(&str, &[f32])> = vec![("a", &a), ("b", &b), ("c", &c)];

        let ranked = top_k_embeddings(&query, &candidates, 2, SimilarityMode::Cosine);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0, "a");
        assert_eq!(ranked[1].0, "b");
        assert!(ranked[0].1 >= ranked[1].1);
        for (_, score) in &ranked {
            assert!((-1.0..=1.0).contains(score));
        }
    }

    #[test]
    fn test_top_k_euclidean_ascending() {
        let query = vec![0.0, 0.0];
        let near = vec![0.1, 0.0];
        let far = vec![5.0, 5.0];
        let candidates: Vec<(&str, &[f32])> = vec![("far", &far), ("near", &near)];

        let ranked = top_k_embeddings(&query, &candidates, 2, SimilarityMode::Euclidean);
        assert_eq!(ranked[0].0, "near");
        assert!(ranked[0].1 <= ranked[1].1);
    }

    #[test]
    fn test_ties_keep_scan_order() {
        let query = vec![1.0, 0.0];
        let same1 = vec![1.0, 0.0];
        let same2 = vec![2.0, 0.0];
        let candidates: Vec<(&str, &[f32])> = vec![("first", &same1), ("second", &same2)];

        // Both cosine scores are exactly 1.0; stable sort keeps scan order.
        let ranked = top_k_embeddings(&query, &candidates, 2, SimilarityMode::Cosine);
        assert_eq!(ranked[0].0, "first");
        assert_eq!(ranked[1].0, "second");
    }

    #[test]
    fn test_rerun_is_order_stable() {
        let query = vec![0.3, 0.8];
        let e1 = vec![0.2, 0.9];
        let e2 = vec![0.9, 0.1];
        let e3 = vec![0.5, 0.5];
        let candidates: Vec<(&str, &[f32])> = vec![("x", &e1), ("y", &e2), ("z", &e3)];

        let first = top_k_embeddings(&query, &candidates, 3, SimilarityMode::Cosine);
        let second = top_k_embeddings(&query, &candidates, 3, SimilarityMode::Cosine);
        assert_eq!(first, second);
    }
}
