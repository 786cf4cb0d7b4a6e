//! Query orchestration
//!
//! Resolves which retriever/synthesizer configuration applies to an index
//! (walking composite graphs by member id), executes retrieval + synthesis,
//! and re-enters itself at `level + 1` when a retrieved node points at a
//! sub-index. Also carries the index-maintenance surface (insert, delete,
//! refresh).

mod combine;
mod schema;
mod transform;

pub use combine::{MultiStepOptions, QueryCombiner};
pub use schema::{QueryBundle, QueryConfig, QueryConfigMap, QueryMode};
pub use transform::{IdentityTransform, QueryTransform, StepDecomposeTransform, TransformContext};

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info};

use crate::docstore::DocumentStore;
use crate::error::{EngineError, Result};
use crate::index::keywords::{KeywordExtractor, SimpleKeywordExtractor};
use crate::index::{IndexBuilder, IndexSnapshot, IndexStruct};
use crate::node::{Node, NodeVariant, NodeWithScore};
use crate::retrieve::{apply_postprocessors, build_retriever, postprocessors_for, NodePostprocessor};
use crate::service::ServiceContext;
use crate::synth::{Response, ResponseSynthesizer};

/// Executes queries against one index structure and its document store.
///
/// Reads share `&self`; index mutation takes `&mut self`, so the
/// single-writer rule is enforced by the borrow checker.
pub struct QueryOrchestrator {
    index: IndexStruct,
    docstore: DocumentStore,
    ctx: ServiceContext,
    configs: QueryConfigMap,
    transform: Arc<dyn QueryTransform>,
    combiner: QueryCombiner,
    recursive: bool,
    postprocessors: Vec<Box<dyn NodePostprocessor>>,
    keyword_extractor: Arc<dyn KeywordExtractor>,
}

impl QueryOrchestrator {
    pub fn new(index: IndexStruct, docstore: DocumentStore, ctx: ServiceContext) -> Self {
        Self {
            index,
            docstore,
            ctx,
            configs: QueryConfigMap::default(),
            transform: Arc::new(IdentityTransform),
            combiner: QueryCombiner::Single,
            recursive: false,
            postprocessors: Vec::new(),
            keyword_extractor: Arc::new(SimpleKeywordExtractor::default()),
        }
    }

    pub fn with_configs(mut self, configs: Vec<QueryConfig>) -> Self {
        self.configs = QueryConfigMap::from_configs(configs);
        self
    }

    pub fn with_transform(mut self, transform: Arc<dyn QueryTransform>) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_combiner(mut self, combiner: QueryCombiner) -> Self {
        self.combiner = combiner;
        self
    }

    /// Enable nested queries through index-reference nodes.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_postprocessors(mut self, postprocessors: Vec<Box<dyn NodePostprocessor>>) -> Self {
        self.postprocessors = postprocessors;
        self
    }

    /// Extractor used when inserting into a keyword-table index.
    pub fn with_keyword_extractor(mut self, extractor: Arc<dyn KeywordExtractor>) -> Self {
        self.keyword_extractor = extractor;
        self
    }

    pub fn index(&self) -> &IndexStruct {
        &self.index
    }

    pub fn docstore(&self) -> &DocumentStore {
        &self.docstore
    }

    pub(crate) fn transform(&self) -> &dyn QueryTransform {
        self.transform.as_ref()
    }

    pub(crate) fn service_context(&self) -> &ServiceContext {
        &self.ctx
    }

    /// A serializable snapshot of the current index and document store.
    pub fn snapshot(&self) -> IndexSnapshot {
        IndexSnapshot::new(self.index.clone(), self.docstore.clone())
    }

    /// Run a query against the root index (the designated root for a
    /// composite graph).
    pub async fn query(&self, input: impl Into<QueryBundle>) -> Result<Response> {
        let llm_before = self.ctx.llm.total_tokens_used();
        let embed_before = self.ctx.embed.total_tokens_used();

        let result = self.query_at(input.into(), None, 0).await;

        self.log_token_usage("query", llm_before, embed_before);
        result
    }

    /// Run a query against a named member of a composite graph.
    pub async fn query_index(
        &self,
        input: impl Into<QueryBundle>,
        index_id: &str,
    ) -> Result<Response> {
        let llm_before = self.ctx.llm.total_tokens_used();
        let embed_before = self.ctx.embed.total_tokens_used();

        let result = self
            .query_at(input.into(), Some(index_id.to_string()), 0)
            .await;

        self.log_token_usage("query", llm_before, embed_before);
        result
    }

    fn query_at(
        &self,
        bundle: QueryBundle,
        index_id: Option<String>,
        level: usize,
    ) -> BoxFuture<'_, Result<Response>> {
        Box::pin(async move {
            let index = self.resolve_index(index_id.as_deref())?;
            self.combiner.run(self, index, bundle, level).await
        })
    }

    /// Resolve the target index: composite graphs route through their
    /// member map (designated root when no id is named); naming an id on a
    /// non-composite index is a misuse.
    fn resolve_index(&self, index_id: Option<&str>) -> Result<&IndexStruct> {
        match &self.index {
            IndexStruct::Composite(graph) => {
                let id = index_id.unwrap_or_else(|| graph.root_id());
                graph.get(id)
            }
            other => {
                if let Some(id) = index_id {
                    if id != other.index_id() {
                        return Err(EngineError::Configuration(format!(
                            "index id {} may only be used with a composite graph",
                            id
                        )));
                    }
                }
                Ok(other)
            }
        }
    }

    /// One retrieval + synthesis cycle over an already-resolved index.
    pub(crate) async fn query_transformed(
        &self,
        mut bundle: QueryBundle,
        index: &IndexStruct,
        level: usize,
    ) -> Result<Response> {
        debug!(level, kind = %index.kind(), index_id = index.index_id(), "running query");

        let config = self.configs.resolve(index);
        let retriever = build_retriever(index, &self.docstore, &self.ctx, &config)?;
        let mut nodes = retriever.retrieve(&mut bundle).await?;

        let config_chain = postprocessors_for(&config);
        nodes = apply_postprocessors(nodes, &config_chain);
        nodes = apply_postprocessors(nodes, &self.postprocessors);

        let mut additional_sources: Vec<NodeWithScore> = Vec::new();
        if self.recursive {
            let mut resolved = Vec::with_capacity(nodes.len());
            for node_with_score in nodes {
                if let NodeVariant::IndexRef { index_id } = &node_with_score.node.variant {
                    let index_id = index_id.clone();
                    debug!(level, %index_id, "descending into referenced sub-index");
                    let nested = self
                        .query_at(bundle.clone(), Some(index_id), level + 1)
                        .await?;
                    let synthetic = Node::new(nested.to_string());
                    resolved.push(NodeWithScore::new(synthetic, node_with_score.score));
                    additional_sources.extend(nested.source_nodes);
                } else {
                    resolved.push(node_with_score);
                }
            }
            nodes = resolved;
        }

        let synthesizer =
            ResponseSynthesizer::new(self.ctx.clone()).with_mode(config.response_mode);
        synthesizer
            .synthesize(&bundle, nodes, additional_sources)
            .await
    }

    /// Insert nodes into the index and document store.
    pub async fn insert(&mut self, nodes: Vec<Node>) -> Result<()> {
        let llm_before = self.ctx.llm.total_tokens_used();
        let embed_before = self.ctx.embed.total_tokens_used();

        let builder = IndexBuilder::new(self.ctx.clone());
        builder
            .insert(
                &mut self.index,
                nodes,
                &mut self.docstore,
                self.keyword_extractor.as_ref(),
            )
            .await?;

        self.log_token_usage("insert", llm_before, embed_before);
        Ok(())
    }

    /// Delete a document and its nodes from the index and document store.
    pub fn delete(&mut self, doc_id: &str) -> Result<()> {
        let builder = IndexBuilder::new(self.ctx.clone());
        builder.delete(&mut self.index, doc_id, &mut self.docstore)
    }

    /// Re-insert documents whose content hash changed. Returns one flag per
    /// input document.
    pub async fn refresh(&mut self, documents: Vec<Node>) -> Result<Vec<bool>> {
        let llm_before = self.ctx.llm.total_tokens_used();
        let embed_before = self.ctx.embed.total_tokens_used();

        let builder = IndexBuilder::new(self.ctx.clone());
        let refreshed = builder
            .refresh(
                &mut self.index,
                documents,
                &mut self.docstore,
                self.keyword_extractor.as_ref(),
            )
            .await?;

        self.log_token_usage("refresh", llm_before, embed_before);
        Ok(refreshed)
    }

    fn log_token_usage(&self, operation: &str, llm_before: u64, embed_before: u64) {
        info!(
            operation,
            llm_tokens = self.ctx.llm.total_tokens_used().saturating_sub(llm_before),
            embed_tokens = self
                .ctx
                .embed
                .total_tokens_used()
                .saturating_sub(embed_before),
            "token usage"
        );
    }
}
