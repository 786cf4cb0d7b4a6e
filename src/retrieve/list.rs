//! List retrieval - full traversal and the optional embedding mode

use async_trait::async_trait;

use crate::docstore::DocumentStore;
use crate::error::Result;
use crate::index::ListIndex;
use crate::node::NodeWithScore;
use crate::query::{QueryBundle, QueryConfig};
use crate::service::{ServiceContext, SimilarityMode};

use super::vector::top_k_embeddings;
use super::Retriever;

/// Retriever over a list index: every node in index order, unscored.
pub struct ListRetriever<'a> {
    index: &'a ListIndex,
    docstore: &'a DocumentStore,
}

impl<'a> ListRetriever<'a> {
    pub fn new(index: &'a ListIndex, docstore: &'a DocumentStore) -> Self {
        Self { index, docstore }
    }
}

#[async_trait]
impl Retriever for ListRetriever<'_> {
    async fn retrieve(&self, _bundle: &mut QueryBundle) -> Result<Vec<NodeWithScore>> {
        let nodes = self.docstore.get_many(self.index.node_ids())?;
        Ok(nodes.into_iter().map(NodeWithScore::unscored).collect())
    }
}

/// Embedding-mode retriever over a list index: embeds nodes that lack
/// vectors (batched, order restored), then ranks top-K by similarity.
pub struct ListEmbeddingRetriever<'a> {
    index: &'a ListIndex,
    docstore: &'a DocumentStore,
    ctx: &'a ServiceContext,
    top_k: usize,
    mode: SimilarityMode,
}

impl<'a> ListEmbeddingRetriever<'a> {
    pub fn new(
        index: &'a ListIndex,
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
impl Retriever for ListEmbeddingRetriever<'_> {
    async fn retrieve(&self, bundle: &mut QueryBundle) -> Result<Vec<NodeWithScore>> {
        let query_embedding = bundle.resolve_embedding(self.ctx.embed.as_ref()).await?;
        let nodes = self.docstore.get_many(self.index.node_ids())?;

        // Fill in missing node embeddings, restoring order by position.
        let pending: Vec<(usize, String)> = nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.embedding.is_none())
            .map(|(idx, node)| (idx, node.effective_text()))
            .collect();

        let mut embeddings: Vec<Option<Vec<f32>>> =
            nodes.iter().map(|node| node.embedding.clone()).collect();
        let batch_size = self.ctx.embed.batch_size().max(1);
        for batch in pending.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
            let computed = self.ctx.embed.embed_batch(&texts).await?;
            for ((idx, _), embedding) in batch.iter().zip(computed) {
                embeddings[*idx] = Some(embedding);
            }
        }

        let owned: Vec<(usize, Vec<f32>)> = embeddings
            .into_iter()
            .enumerate()
            .filter_map(|(idx, emb)| emb.map(|e| (idx, e)))
            .collect();
        let candidates: Vec<(usize, &[f32])> = owned
            .iter()
            .map(|(idx, emb)| (*idx, emb.as_slice()))
            .collect();

        let ranked = top_k_embeddings(&query_embedding, &candidates, self.top_k, self.mode);

        let mut results = Vec::with_capacity(ranked.len());
        for (idx, score) in ranked {
            results.push(NodeWithScore::new(nodes[idx].clone(), Some(score)));
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use crate::service::{SimulatedEmbedding, SimulatedLlm};
    use crate::split::WhitespaceTokenizer;
    use std::sync::Arc;

    fn fixture() -> (ListIndex, DocumentStore, ServiceContext) {
        let mut list = ListIndex::new();
        let mut docstore = DocumentStore::new();
        let nodes = vec![
            Node::with_id("n1", "the quick brown fox"),
            Node::with_id("n2", "a completely different subject"),
            Node::with_id("n3", "yet another topic entirely"),
        ];
        for node in &nodes {
            list.add_node(node);
        }
        docstore.add_nodes(nodes, true).unwrap();
        let ctx = ServiceContext::new(
            Arc::new(SimulatedLlm::new()),
            Arc::new(SimulatedEmbedding::default()),
            Arc::new(WhitespaceTokenizer),
        );
        (list, docstore, ctx)
    }

    #[tokio::test]
    async fn test_list_retrieval_returns_all_in_order_unscored() {
        let (list, docstore, _ctx) = fixture();
        let retriever = ListRetriever::new(&list, &docstore);
        let mut bundle = QueryBundle::new("anything");
        let results = retriever.retrieve(&mut bundle).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.node.id.as_str()).collect();
        assert_eq!(ids, vec!["n1", "n2", "n3"]);
        assert!(results.iter().all(|r| r.score.is_none()));
    }

    #[tokio::test]
    async fn test_list_embedding_mode_ranks_by_similarity() {
        let (list, docstore, ctx) = fixture();
        let config = QueryConfig::new(
            crate::index::IndexKind::List,
            crate::query::QueryMode::Embedding,
        )
        .with_similarity_top_k(1);
        let retriever = ListEmbeddingRetriever::new(&list, &docstore, &ctx, &config);
        let mut bundle = QueryBundle::new("the quick brown fox");
        let results = retriever.retrieve(&mut bundle).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].node.id, "n1");
        assert!(results[0].score.unwrap() > 0.99);
    }
}
