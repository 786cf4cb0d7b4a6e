//! Index structures - the persisted retrieval data model
//!
//! A closed set of tagged variants (vector-dict, list, keyword-table,
//! composite graph) built once from a node set and mutated via
//! insert/delete. Structures hold only node-id references; node content
//! lives in the document store.

mod builder;
pub mod keywords;
mod snapshot;

pub use builder::IndexBuilder;
pub use snapshot::IndexSnapshot;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::node::Node;

/// Discriminates the index structure variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    VectorDict,
    List,
    KeywordTable,
    Composite,
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IndexKind::VectorDict => "vector_dict",
            IndexKind::List => "list",
            IndexKind::KeywordTable => "keyword_table",
            IndexKind::Composite => "composite",
        };
        write!(f, "{}", name)
    }
}

/// Vector index: vector key -> node id, source doc -> vector keys, and the
/// in-memory embedding dictionary keyed by vector key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorDict {
    index_id: String,
    summary: Option<String>,
    nodes: FxHashMap<String, String>,
    doc_ids: FxHashMap<String, Vec<String>>,
    embeddings: FxHashMap<String, Vec<f32>>,
}

impl VectorDict {
    pub fn new() -> Self {
        Self {
            index_id: Uuid::new_v4().to_string(),
            ..Self::default()
        }
    }

    /// Register a node under a vector key (the node id by default), wiring
    /// up the reverse source-document map.
    pub fn add_node(&mut self, node: &Node, vector_id: Option<String>) -> String {
        let vector_id = vector_id.unwrap_or_else(|| node.id.clone());
        self.nodes.insert(vector_id.clone(), node.id.clone());
        if let Some(doc_id) = node.source_doc_id() {
            self.doc_ids
                .entry(doc_id.to_string())
                .or_default()
                .push(vector_id.clone());
        }
        vector_id
    }

    /// Attach an embedding to a registered vector key. Unknown keys are a
    /// data-integrity error, preserving the node/embedding pairing
    /// invariant.
    pub fn set_embedding(&mut self, vector_id: &str, embedding: Vec<f32>) -> Result<()> {
        if !self.nodes.contains_key(vector_id) {
            return Err(EngineError::DataIntegrity(format!(
                "vector key {} has no node entry",
                vector_id
            )));
        }
        self.embeddings.insert(vector_id.to_string(), embedding);
        Ok(())
    }

    /// Drop every vector key registered for a source document, returning
    /// the node ids that were removed.
    pub fn delete_doc(&mut self, doc_id: &str) -> Result<Vec<String>> {
        let vector_ids = self.doc_ids.remove(doc_id).ok_or_else(|| {
            EngineError::DataIntegrity(format!("doc id {} not found in vector index", doc_id))
        })?;
        let mut removed = Vec::with_capacity(vector_ids.len());
        for vector_id in vector_ids {
            self.embeddings.remove(&vector_id);
            if let Some(node_id) = self.nodes.remove(&vector_id) {
                removed.push(node_id);
            }
        }
        Ok(removed)
    }

    pub fn node_id_for(&self, vector_id: &str) -> Result<&str> {
        self.nodes
            .get(vector_id)
            .map(|s| s.as_str())
            .ok_or_else(|| {
                EngineError::DataIntegrity(format!("vector key {} has no node entry", vector_id))
            })
    }

    pub fn embedding_for(&self, vector_id: &str) -> Option<&[f32]> {
        self.embeddings.get(vector_id).map(|e| e.as_slice())
    }

    /// Vector keys with embeddings, sorted for a deterministic scan order.
    pub fn embedded_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.embeddings.keys().map(|k| k.as_str()).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// List index: an ordered sequence of node ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListIndex {
    index_id: String,
    summary: Option<String>,
    nodes: Vec<String>,
}

impl ListIndex {
    pub fn new() -> Self {
        Self {
            index_id: Uuid::new_v4().to_string(),
            ..Self::default()
        }
    }

    pub fn add_node(&mut self, node: &Node) {
        self.nodes.push(node.id.clone());
    }

    pub fn remove_node_ids(&mut self, ids: &[String]) {
        self.nodes.retain(|id| !ids.contains(id));
    }

    pub fn node_ids(&self) -> &[String] {
        &self.nodes
    }
}

/// Keyword table: keyword -> node ids, insertion-ordered per keyword.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeywordTable {
    index_id: String,
    summary: Option<String>,
    table: FxHashMap<String, Vec<String>>,
}

impl KeywordTable {
    pub fn new() -> Self {
        Self {
            index_id: Uuid::new_v4().to_string(),
            ..Self::default()
        }
    }

    /// File a node under each of its extracted keywords.
    pub fn add_node(&mut self, keywords: &[String], node: &Node) {
        for keyword in keywords {
            let entry = self.table.entry(keyword.clone()).or_default();
            if !entry.contains(&node.id) {
                entry.push(node.id.clone());
            }
        }
    }

    pub fn has_keyword(&self, keyword: &str) -> bool {
        self.table.contains_key(keyword)
    }

    pub fn node_ids_for(&self, keyword: &str) -> Option<&[String]> {
        self.table.get(keyword).map(|ids| ids.as_slice())
    }

    /// All participating node ids.
    pub fn node_ids(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for ids in self.table.values() {
            for id in ids {
                if !out.contains(id) {
                    out.push(id.clone());
                }
            }
        }
        out
    }

    /// All keywords present in the table.
    pub fn keywords(&self) -> Vec<&str> {
        self.table.keys().map(|k| k.as_str()).collect()
    }

    /// Remove node ids from every keyword entry, dropping emptied keywords.
    pub fn remove_node_ids(&mut self, ids: &[String]) {
        self.table.retain(|_, entry| {
            entry.retain(|id| !ids.contains(id));
            !entry.is_empty()
        });
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Composite graph: member indices keyed by id, plus a designated root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeGraph {
    index_id: String,
    summary: Option<String>,
    members: FxHashMap<String, IndexStruct>,
    root_id: String,
}

impl CompositeGraph {
    /// Build a graph from member indices. The root id must name a member.
    pub fn new(members: Vec<IndexStruct>, root_id: impl Into<String>) -> Result<Self> {
        let root_id = root_id.into();
        let members: FxHashMap<String, IndexStruct> = members
            .into_iter()
            .map(|m| (m.index_id().to_string(), m))
            .collect();
        if !members.contains_key(&root_id) {
            return Err(EngineError::Validation(format!(
                "root id {} is not a member of the composite graph",
                root_id
            )));
        }
        Ok(Self {
            index_id: Uuid::new_v4().to_string(),
            summary: None,
            members,
            root_id,
        })
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    /// Resolve a member index by id.
    pub fn get(&self, index_id: &str) -> Result<&IndexStruct> {
        self.members.get(index_id).ok_or_else(|| {
            EngineError::DataIntegrity(format!(
                "index id {} not found in composite graph",
                index_id
            ))
        })
    }

    pub fn member_ids(&self) -> Vec<&str> {
        self.members.keys().map(|k| k.as_str()).collect()
    }
}

/// The persisted retrieval data model, tagged for structural serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum IndexStruct {
    VectorDict(VectorDict),
    List(ListIndex),
    KeywordTable(KeywordTable),
    Composite(CompositeGraph),
}

impl IndexStruct {
    pub fn kind(&self) -> IndexKind {
        match self {
            IndexStruct::VectorDict(_) => IndexKind::VectorDict,
            IndexStruct::List(_) => IndexKind::List,
            IndexStruct::KeywordTable(_) => IndexKind::KeywordTable,
            IndexStruct::Composite(_) => IndexKind::Composite,
        }
    }

    pub fn index_id(&self) -> &str {
        match self {
            IndexStruct::VectorDict(s) => &s.index_id,
            IndexStruct::List(s) => &s.index_id,
            IndexStruct::KeywordTable(s) => &s.index_id,
            IndexStruct::Composite(s) => &s.index_id,
        }
    }

    pub fn summary(&self) -> Option<&str> {
        match self {
            IndexStruct::VectorDict(s) => s.summary.as_deref(),
            IndexStruct::List(s) => s.summary.as_deref(),
            IndexStruct::KeywordTable(s) => s.summary.as_deref(),
            IndexStruct::Composite(s) => s.summary.as_deref(),
        }
    }

    pub fn set_summary(&mut self, summary: impl Into<String>) {
        let summary = Some(summary.into());
        match self {
            IndexStruct::VectorDict(s) => s.summary = summary,
            IndexStruct::List(s) => s.summary = summary,
            IndexStruct::KeywordTable(s) => s.summary = summary,
            IndexStruct::Composite(s) => s.summary = summary,
        }
    }

    /// The summary, required for multi-step decomposition.
    pub fn require_summary(&self) -> Result<&str> {
        self.summary().ok_or_else(|| {
            EngineError::Configuration(format!(
                "summary not set on index {}; required for multi-step decomposition",
                self.index_id()
            ))
        })
    }
}
