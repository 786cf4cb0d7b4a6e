//! Index builder - constructs and maintains index structures
//!
//! Builds each index variant from a node set, batch-embedding nodes that
//! lack vectors, and handles insert/delete/refresh against an existing
//! structure. All mutations assume a single writer.

use tracing::info;

use crate::docstore::DocumentStore;
use crate::error::{EngineError, Result};
use crate::node::Node;
use crate::service::ServiceContext;

use super::keywords::KeywordExtractor;
use super::{CompositeGraph, IndexStruct, KeywordTable, ListIndex, VectorDict};

/// Builds and mutates index structures against a document store.
pub struct IndexBuilder {
    ctx: ServiceContext,
}

impl IndexBuilder {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Build a vector index, embedding nodes that lack vectors in batches.
    pub async fn build_vector(
        &self,
        nodes: Vec<Node>,
        docstore: &mut DocumentStore,
    ) -> Result<IndexStruct> {
        let embed_before = self.ctx.embed.total_tokens_used();

        let mut dict = VectorDict::new();
        let embeddings = self.resolve_embeddings(&nodes).await?;
        for (node, embedding) in nodes.iter().zip(embeddings) {
            let key = dict.add_node(node, None);
            dict.set_embedding(&key, embedding)?;
        }
        docstore.add_nodes(nodes, true)?;

        info!(
            nodes = dict.len(),
            embed_tokens = self.ctx.embed.total_tokens_used() - embed_before,
            "built vector index"
        );
        Ok(IndexStruct::VectorDict(dict))
    }

    /// Build a list index preserving node order.
    pub fn build_list(&self, nodes: Vec<Node>, docstore: &mut DocumentStore) -> Result<IndexStruct> {
        let mut list = ListIndex::new();
        for node in &nodes {
            list.add_node(node);
        }
        docstore.add_nodes(nodes, true)?;
        Ok(IndexStruct::List(list))
    }

    /// Build a keyword table, extracting keywords from each node's
    /// effective text.
    pub async fn build_keyword_table(
        &self,
        nodes: Vec<Node>,
        docstore: &mut DocumentStore,
        extractor: &dyn KeywordExtractor,
    ) -> Result<IndexStruct> {
        let mut table = KeywordTable::new();
        for node in &nodes {
            let keywords = extractor.extract(&node.effective_text()).await?;
            table.add_node(&keywords, node);
        }
        docstore.add_nodes(nodes, true)?;

        info!(keywords = table.len(), "built keyword table index");
        Ok(IndexStruct::KeywordTable(table))
    }

    /// Compose previously built indices under a designated root.
    pub fn build_composite(
        &self,
        members: Vec<IndexStruct>,
        root_id: &str,
    ) -> Result<IndexStruct> {
        Ok(IndexStruct::Composite(CompositeGraph::new(
            members, root_id,
        )?))
    }

    /// Insert nodes into an existing structure.
    pub async fn insert(
        &self,
        index: &mut IndexStruct,
        nodes: Vec<Node>,
        docstore: &mut DocumentStore,
        extractor: &dyn KeywordExtractor,
    ) -> Result<()> {
        match index {
            IndexStruct::VectorDict(dict) => {
                let embeddings = self.resolve_embeddings(&nodes).await?;
                for (node, embedding) in nodes.iter().zip(embeddings) {
                    let key = dict.add_node(node, None);
                    dict.set_embedding(&key, embedding)?;
                }
                docstore.add_nodes(nodes, true)?;
            }
            IndexStruct::List(list) => {
                for node in &nodes {
                    list.add_node(node);
                }
                docstore.add_nodes(nodes, true)?;
            }
            IndexStruct::KeywordTable(table) => {
                for node in &nodes {
                    let keywords = extractor.extract(&node.effective_text()).await?;
                    table.add_node(&keywords, node);
                }
                docstore.add_nodes(nodes, true)?;
            }
            IndexStruct::Composite(_) => {
                return Err(EngineError::Configuration(
                    "insert is not supported on a composite graph; insert into a member index"
                        .into(),
                ));
            }
        }
        Ok(())
    }

    /// Delete a document (and the nodes derived from it) from a structure.
    pub fn delete(
        &self,
        index: &mut IndexStruct,
        doc_id: &str,
        docstore: &mut DocumentStore,
    ) -> Result<()> {
        tracing::debug!("deleting document {}", doc_id);
        match index {
            IndexStruct::VectorDict(dict) => {
                let removed = dict.delete_doc(doc_id)?;
                for node_id in removed {
                    if docstore.contains(&node_id) {
                        docstore.delete(&node_id)?;
                    }
                }
                if docstore.contains(doc_id) {
                    docstore.delete(doc_id)?;
                }
            }
            IndexStruct::List(list) => {
                let removed = nodes_from_doc(list.node_ids(), doc_id, docstore)?;
                if removed.is_empty() {
                    return Err(EngineError::DataIntegrity(format!(
                        "doc id {} not found in list index",
                        doc_id
                    )));
                }
                list.remove_node_ids(&removed);
                for node_id in &removed {
                    docstore.delete(node_id)?;
                }
            }
            IndexStruct::KeywordTable(table) => {
                let removed = nodes_from_doc(&table.node_ids(), doc_id, docstore)?;
                if removed.is_empty() {
                    return Err(EngineError::DataIntegrity(format!(
                        "doc id {} not found in keyword table index",
                        doc_id
                    )));
                }
                table.remove_node_ids(&removed);
                for node_id in &removed {
                    docstore.delete(node_id)?;
                }
            }
            IndexStruct::Composite(_) => {
                return Err(EngineError::Configuration(
                    "delete is not supported on a composite graph; delete from a member index"
                        .into(),
                ));
            }
        }
        Ok(())
    }

    /// Re-insert documents whose content hash changed since they were last
    /// seen. Returns one flag per input document.
    pub async fn refresh(
        &self,
        index: &mut IndexStruct,
        documents: Vec<Node>,
        docstore: &mut DocumentStore,
        extractor: &dyn KeywordExtractor,
    ) -> Result<Vec<bool>> {
        let mut refreshed = Vec::with_capacity(documents.len());
        for document in documents {
            match docstore.hash_of(&document.id).map(|h| h.to_string()) {
                Some(existing) if existing == document.content_hash() => {
                    refreshed.push(false);
                }
                Some(_) => {
                    self.delete(index, &document.id, docstore)?;
                    self.insert(index, vec![document], docstore, extractor).await?;
                    refreshed.push(true);
                }
                None => {
                    self.insert(index, vec![document], docstore, extractor).await?;
                    refreshed.push(true);
                }
            }
        }
        Ok(refreshed)
    }

    /// One embedding per node: precomputed vectors pass through, the rest
    /// are embedded in service-sized batches with order restored by
    /// position.
    async fn resolve_embeddings(&self, nodes: &[Node]) -> Result<Vec<Vec<f32>>> {
        let mut pending: Vec<(usize, String)> = Vec::new();
        for (idx, node) in nodes.iter().enumerate() {
            if node.embedding.is_none() {
                pending.push((idx, node.effective_text()));
            }
        }

        let mut computed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(pending.len());
        let batch_size = self.ctx.embed.batch_size().max(1);
        for batch in pending.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
            let embeddings = self.ctx.embed.embed_batch(&texts).await?;
            if embeddings.len() != batch.len() {
                return Err(EngineError::DataIntegrity(format!(
                    "embedding batch returned {} vectors for {} texts",
                    embeddings.len(),
                    batch.len()
                )));
            }
            for ((idx, _), embedding) in batch.iter().zip(embeddings) {
                computed.push((*idx, embedding));
            }
        }

        let mut by_index: rustc_hash::FxHashMap<usize, Vec<f32>> = computed.into_iter().collect();
        nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| match &node.embedding {
                Some(embedding) => Ok(embedding.clone()),
                None => by_index.remove(&idx).ok_or_else(|| {
                    EngineError::DataIntegrity(format!("no embedding produced for node {}", node.id))
                }),
            })
            .collect()
    }
}

/// Node ids in `candidates` whose source document is `doc_id`.
fn nodes_from_doc(
    candidates: &[String],
    doc_id: &str,
    docstore: &DocumentStore,
) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for node_id in candidates {
        let node = docstore.get(node_id)?;
        if node.source_doc_id() == Some(doc_id) || node.id == doc_id {
            out.push(node_id.clone());
        }
    }
    Ok(out)
}
