//! Retrieval strategies
//!
//! One strategy per index variant, all behind the `Retriever` trait. The
//! (index kind, query mode) registry is validated eagerly when a retriever
//! is built, so unknown combinations fail before any retrieval work.

mod keyword;
mod list;
mod postprocess;
mod vector;

pub use keyword::KeywordTableRetriever;
pub use list::{ListEmbeddingRetriever, ListRetriever};
pub use postprocess::{apply_postprocessors, KeywordFilter, NodePostprocessor, SimilarityCutoff};
pub use vector::{top_k_embeddings, VectorRetriever};

use async_trait::async_trait;

use crate::docstore::DocumentStore;
use crate::error::{EngineError, Result};
use crate::index::keywords::{
    LlmKeywordExtractor, RakeKeywordExtractor, SimpleKeywordExtractor,
};
use crate::index::{IndexKind, IndexStruct};
use crate::node::NodeWithScore;
use crate::query::{QueryBundle, QueryConfig, QueryMode};
use crate::service::ServiceContext;

/// Ranks or selects candidate nodes for one query against one index.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, bundle: &mut QueryBundle) -> Result<Vec<NodeWithScore>>;
}

/// The supported (index kind, query mode) pairs.
const REGISTRY: &[(IndexKind, QueryMode)] = &[
    (IndexKind::VectorDict, QueryMode::Default),
    (IndexKind::List, QueryMode::Default),
    (IndexKind::List, QueryMode::Embedding),
    (IndexKind::KeywordTable, QueryMode::Default),
    (IndexKind::KeywordTable, QueryMode::Simple),
    (IndexKind::KeywordTable, QueryMode::Rake),
];

/// Fail fast on (kind, mode) pairs with no registered strategy.
pub fn validate_mode(kind: IndexKind, mode: QueryMode) -> Result<()> {
    if kind == IndexKind::Composite {
        return Err(EngineError::Configuration(
            "cannot build a retriever for a composite graph; resolve a member index first".into(),
        ));
    }
    if REGISTRY.contains(&(kind, mode)) {
        return Ok(());
    }
    Err(EngineError::Configuration(format!(
        "no retrieval strategy registered for index kind {} with mode {}",
        kind, mode
    )))
}

/// Build the retriever for an index under the resolved config.
pub fn build_retriever<'a>(
    index: &'a IndexStruct,
    docstore: &'a DocumentStore,
    ctx: &'a ServiceContext,
    config: &QueryConfig,
) -> Result<Box<dyn Retriever + 'a>> {
    validate_mode(index.kind(), config.query_mode)?;

    match index {
        IndexStruct::VectorDict(dict) => {
            Ok(Box::new(VectorRetriever::new(dict, docstore, ctx, config)))
        }
        IndexStruct::List(list) => match config.query_mode {
            QueryMode::Embedding => Ok(Box::new(ListEmbeddingRetriever::new(
                list, docstore, ctx, config,
            ))),
            _ => Ok(Box::new(ListRetriever::new(list, docstore))),
        },
        IndexStruct::KeywordTable(table) => {
            let max_keywords = config.max_keywords_per_query;
            let extractor: Box<dyn crate::index::keywords::KeywordExtractor> =
                match config.query_mode {
                    QueryMode::Simple => Box::new(SimpleKeywordExtractor::new(
                        Some(max_keywords),
                        crate::index::keywords::default_stopwords(),
                    )),
                    QueryMode::Rake => Box::new(RakeKeywordExtractor::new(
                        Some(max_keywords),
                        crate::index::keywords::default_stopwords(),
                    )),
                    _ => Box::new(LlmKeywordExtractor::new(ctx.llm.clone(), max_keywords)),
                };
            Ok(Box::new(KeywordTableRetriever::new(
                table,
                docstore,
                extractor,
                config.num_chunks_per_query,
            )))
        }
        IndexStruct::Composite(_) => unreachable!("rejected by validate_mode"),
    }
}

/// The post-processor chain implied by a query config.
pub fn postprocessors_for(config: &QueryConfig) -> Vec<Box<dyn NodePostprocessor>> {
    let mut chain: Vec<Box<dyn NodePostprocessor>> = Vec::new();
    if !config.required_keywords.is_empty() || !config.exclude_keywords.is_empty() {
        chain.push(Box::new(KeywordFilter::new(
            config.required_keywords.clone(),
            config.exclude_keywords.clone(),
        )));
    }
    if let Some(cutoff) = config.similarity_cutoff {
        chain.push(Box::new(SimilarityCutoff::new(cutoff)));
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_accepts_known_pairs() {
        assert!(validate_mode(IndexKind::VectorDict, QueryMode::Default).is_ok());
        assert!(validate_mode(IndexKind::List, QueryMode::Embedding).is_ok());
        assert!(validate_mode(IndexKind::KeywordTable, QueryMode::Rake).is_ok());
    }

    #[test]
    fn test_registry_rejects_unknown_pairs() {
        let err = validate_mode(IndexKind::VectorDict, QueryMode::Rake).unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
        let err = validate_mode(IndexKind::Composite, QueryMode::Default).unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[test]
    fn test_postprocessor_chain_from_config() {
        let config = QueryConfig::new(IndexKind::VectorDict, QueryMode::Default)
            .with_required_keywords(vec!["x".into()])
            .with_similarity_cutoff(0.5);
        assert_eq!(postprocessors_for(&config).len(), 2);

        let bare = QueryConfig::new(IndexKind::VectorDict, QueryMode::Default);
        assert!(postprocessors_for(&bare).is_empty());
    }
}
