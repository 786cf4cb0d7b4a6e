//! Nodes - the smallest retrievable text units
//!
//! A node has a stable id, immutable text, an optional precomputed
//! embedding, and optional relationships to other nodes. Index-reference
//! nodes point at a sub-index and trigger nested queries in recursive mode.

use std::collections::BTreeMap;
use std::hash::Hasher;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Relationship of a node to another node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    /// The source document this node was split from.
    Source,
    /// The previous node in document order.
    Previous,
    /// The next node in document order.
    Next,
}

/// Node subtype discriminator, serialized alongside the node payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "node_type", rename_all = "snake_case")]
pub enum NodeVariant {
    /// Plain text node.
    #[default]
    Text,
    /// Image node; the text field holds a caption or OCR output.
    Image { image: Option<String> },
    /// Pointer to a sub-index; queried recursively by the orchestrator.
    IndexRef { index_id: String },
}

/// Smallest retrievable text unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_info: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "FxHashMap::is_empty")]
    pub relationships: FxHashMap<Relationship, String>,
    #[serde(flatten)]
    pub variant: NodeVariant,
}

impl Node {
    /// Create a text node with a generated id.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            embedding: None,
            extra_info: None,
            relationships: FxHashMap::default(),
            variant: NodeVariant::Text,
        }
    }

    /// Create a text node with an explicit id.
    pub fn with_id(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::new(text)
        }
    }

    /// Create an index-reference node pointing at `index_id`.
    pub fn index_ref(text: impl Into<String>, index_id: impl Into<String>) -> Self {
        Self {
            variant: NodeVariant::IndexRef {
                index_id: index_id.into(),
            },
            ..Self::new(text)
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_extra_info(mut self, extra_info: BTreeMap<String, String>) -> Self {
        self.extra_info = Some(extra_info);
        self
    }

    pub fn with_relationship(mut self, rel: Relationship, other_id: impl Into<String>) -> Self {
        self.relationships.insert(rel, other_id.into());
        self
    }

    /// The id of the source document this node was split from, if any.
    pub fn source_doc_id(&self) -> Option<&str> {
        self.relationships.get(&Relationship::Source).map(|s| s.as_str())
    }

    /// Rendered metadata string, one `key: value` line per entry.
    pub fn extra_info_str(&self) -> Option<String> {
        self.extra_info.as_ref().map(|info| {
            info.iter()
                .map(|(k, v)| format!("{}: {}", k, v))
                .collect::<Vec<_>>()
                .join("\n")
        })
    }

    /// Effective text: stored text prefixed by the rendered metadata string.
    pub fn effective_text(&self) -> String {
        match self.extra_info_str() {
            Some(info) => format!("{}\n\n{}", info, self.text),
            None => self.text.clone(),
        }
    }

    /// Stable content hash over the effective text, used for idempotent
    /// refresh. Not cryptographic.
    pub fn content_hash(&self) -> String {
        let mut hasher = rustc_hash::FxHasher::default();
        hasher.write(self.effective_text().as_bytes());
        format!("{:016x}", hasher.finish())
    }
}

/// A node paired with an optional retrieval score.
///
/// Vector retrieval fills in a similarity; keyword retrieval fills in the
/// match count; list retrieval leaves the score empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeWithScore {
    pub node: Node,
    pub score: Option<f32>,
}

impl NodeWithScore {
    pub fn new(node: Node, score: Option<f32>) -> Self {
        Self { node, score }
    }

    pub fn unscored(node: Node) -> Self {
        Self { node, score: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_text_prefixes_metadata() {
        let mut info = BTreeMap::new();
        info.insert("file".to_string(), "essay.txt".to_string());
        let node = Node::new("What I Worked On").with_extra_info(info);
        assert_eq!(node.effective_text(), "file: essay.txt\n\nWhat I Worked On");
    }

    #[test]
    fn test_effective_text_without_metadata() {
        let node = Node::new("plain");
        assert_eq!(node.effective_text(), "plain");
    }

    #[test]
    fn test_content_hash_tracks_text() {
        let a = Node::with_id("n1", "same text");
        let b = Node::with_id("n2", "same text");
        let c = Node::with_id("n3", "different text");
        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), c.content_hash());
    }

    #[test]
    fn test_index_ref_roundtrip() {
        let node = Node::index_ref("summary of sub-index", "idx-42");
        let json = serde_json::to_string(&node).unwrap();
        assert!(json.contains("index_ref"));
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(back.variant, NodeVariant::IndexRef { index_id: "idx-42".into() });
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(Node::new("a").id, Node::new("a").id);
    }
}
