//! In-memory document store
//!
//! Owns node content keyed by id; index structures only hold id references
//! into it. Also tracks a per-document content hash used by refresh to skip
//! unchanged documents.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::node::Node;

/// Bookkeeping for an original source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefDocInfo {
    pub doc_hash: String,
}

/// In-memory node store keyed by node id.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DocumentStore {
    docs: FxHashMap<String, Node>,
    ref_doc_info: FxHashMap<String, RefDocInfo>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from an initial node set, overwriting duplicates.
    pub fn from_nodes(nodes: Vec<Node>) -> Result<Self> {
        let mut store = Self::new();
        store.add_nodes(nodes, true)?;
        Ok(store)
    }

    /// Add nodes to the store.
    ///
    /// With `allow_update = false`, a duplicate id is a validation error.
    /// Every added node must carry text; the content hash is recorded either
    /// way so refresh can detect changed documents.
    pub fn add_nodes(&mut self, nodes: Vec<Node>, allow_update: bool) -> Result<()> {
        for node in nodes {
            if node.id.is_empty() {
                return Err(EngineError::Validation("node id not set".into()));
            }
            if node.text.is_empty() {
                return Err(EngineError::Validation(format!(
                    "text field not set for node {}",
                    node.id
                )));
            }
            if !allow_update && self.docs.contains_key(&node.id) {
                return Err(EngineError::Validation(format!(
                    "doc id {} already exists; set allow_update to overwrite",
                    node.id
                )));
            }
            self.ref_doc_info.insert(
                node.id.clone(),
                RefDocInfo {
                    doc_hash: node.content_hash(),
                },
            );
            self.docs.insert(node.id.clone(), node);
        }
        Ok(())
    }

    /// Fetch a node by id.
    pub fn get(&self, id: &str) -> Result<&Node> {
        self.docs
            .get(id)
            .ok_or_else(|| EngineError::DataIntegrity(format!("node id {} not found", id)))
    }

    /// Fetch several nodes, preserving the input id order.
    pub fn get_many(&self, ids: &[String]) -> Result<Vec<Node>> {
        ids.iter().map(|id| self.get(id).cloned()).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.docs.contains_key(id)
    }

    /// Remove a node, returning it. Unknown ids are a data-integrity error.
    pub fn delete(&mut self, id: &str) -> Result<Node> {
        self.ref_doc_info.remove(id);
        self.docs
            .remove(id)
            .ok_or_else(|| EngineError::DataIntegrity(format!("doc id {} not found", id)))
    }

    /// Last recorded content hash for a document id.
    pub fn hash_of(&self, id: &str) -> Option<&str> {
        self.ref_doc_info.get(id).map(|info| info.doc_hash.as_str())
    }

    pub fn set_hash(&mut self, id: &str, doc_hash: String) {
        self.ref_doc_info
            .insert(id.to_string(), RefDocInfo { doc_hash });
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// All node ids currently stored. Order is unspecified.
    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.docs.keys()
    }
}
