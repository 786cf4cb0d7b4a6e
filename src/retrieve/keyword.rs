//! Keyword-table retrieval - match-count ranking

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::docstore::DocumentStore;
use crate::error::Result;
use crate::index::keywords::KeywordExtractor;
use crate::index::KeywordTable;
use crate::node::NodeWithScore;
use crate::query::QueryBundle;

use super::Retriever;

/// Retriever over a keyword-table index.
///
/// Extracts keywords from the query, intersects them with the table, and
/// ranks nodes by how many extracted keywords they matched. Ties keep
/// first-seen order.
pub struct KeywordTableRetriever<'a> {
    index: &'a KeywordTable,
    docstore: &'a DocumentStore,
    extractor: Box<dyn KeywordExtractor>,
    num_chunks: usize,
}

impl<'a> KeywordTableRetriever<'a> {
    pub fn new(
        index: &'a KeywordTable,
        docstore: &'a DocumentStore,
        extractor: Box<dyn KeywordExtractor>,
        num_chunks: usize,
    ) -> Self {
        Self {
            index,
            docstore,
            extractor,
            num_chunks,
        }
    }
}

#[async_trait]
impl Retriever for KeywordTableRetriever<'_> {
    async fn retrieve(&self, bundle: &mut QueryBundle) -> Result<Vec<NodeWithScore>> {
        let keywords = self.extractor.extract(&bundle.query_str).await?;
        let matched: Vec<&String> = keywords
            .iter()
            .filter(|k| self.index.has_keyword(k))
            .collect();
        debug!(query = %bundle.query_str, ?matched, "keyword retrieval");

        let mut counts: FxHashMap<&str, usize> = FxHashMap::default();
        let mut order: Vec<&str> = Vec::new();
        for keyword in matched {
            if let Some(node_ids) = self.index.node_ids_for(keyword) {
                for node_id in node_ids {
                    if !counts.contains_key(node_id.as_str()) {
                        order.push(node_id);
                    }
                    *counts.entry(node_id).or_insert(0) += 1;
                }
            }
        }

        // Stable sort: ties keep first-seen order.
        order.sort_by(|a, b| counts[b].cmp(&counts[a]));
        order.truncate(self.num_chunks);

        let ids: Vec<String> = order.iter().map(|id| id.to_string()).collect();
        let nodes = self.docstore.get_many(&ids)?;
        Ok(nodes
            .into_iter()
            .map(|node| {
                let count = counts[node.id.as_str()] as f32;
                NodeWithScore::new(node, Some(count))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::keywords::SimpleKeywordExtractor;
    use crate::node::Node;

    fn build_fixture() -> (KeywordTable, DocumentStore) {
        let mut table = KeywordTable::new();
        let mut docstore = DocumentStore::new();

        let n1 = Node::with_id("n1", "growing up in a small town");
        let n2 = Node::with_id("n2", "company founding and early hires");
        table.add_node(&["growing".to_string(), "town".to_string()], &n1);
        table.add_node(&["company".to_string(), "founding".to_string()], &n2);
        docstore.add_nodes(vec![n1, n2], true).unwrap();

        (table, docstore)
    }

    #[tokio::test]
    async fn test_only_matching_nodes_returned() {
        let (table, docstore) = build_fixture();
        let retriever = KeywordTableRetriever::new(
            &table,
            &docstore,
            Box::new(SimpleKeywordExtractor::default()),
            10,
        );
        let mut bundle = QueryBundle::new("What did the author do growing up?");
        let results = retriever.retrieve(&mut bundle).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].node.id, "n1");
    }

    #[tokio::test]
    async fn test_match_counts_non_increasing() {
        let (table, docstore) = build_fixture();
        let retriever = KeywordTableRetriever::new(
            &table,
            &docstore,
            Box::new(SimpleKeywordExtractor::default()),
            10,
        );
        let mut bundle = QueryBundle::new("growing up in a town near the company");
        let results = retriever.retrieve(&mut bundle).await.unwrap();
        assert!(!results.is_empty());
        // n1 matches both "growing" and "town", n2 only "company".
        assert_eq!(results[0].node.id, "n1");
        assert_eq!(results[0].score, Some(2.0));
        for pair in results.windows(2) {
            assert!(pair[0].score.unwrap() >= pair[1].score.unwrap());
        }
    }

    #[tokio::test]
    async fn test_no_keyword_overlap_returns_nothing() {
        let (table, docstore) = build_fixture();
        let retriever = KeywordTableRetriever::new(
            &table,
            &docstore,
            Box::new(SimpleKeywordExtractor::default()),
            10,
        );
        let mut bundle = QueryBundle::new("completely unrelated subject matter");
        let results = retriever.retrieve(&mut bundle).await.unwrap();
        assert!(results.is_empty());
    }
}
