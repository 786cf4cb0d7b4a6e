//! Structural index snapshots
//!
//! Bundles an index structure with its document store into one
//! JSON-serializable value: a type tag plus data payload per index variant,
//! node payloads with their subtype discriminator, and the ref-doc-info
//! hash section used by refresh.

use serde::{Deserialize, Serialize};

use crate::docstore::DocumentStore;
use crate::error::{EngineError, Result};

use super::IndexStruct;

/// A serializable snapshot of one index and its document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub index_struct: IndexStruct,
    pub docstore: DocumentStore,
}

impl IndexSnapshot {
    pub fn new(index_struct: IndexStruct, docstore: DocumentStore) -> Self {
        Self {
            index_struct,
            docstore,
        }
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| EngineError::Validation(format!("failed to serialize snapshot: {}", e)))
    }

    /// Deserialize from a JSON string.
    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data)
            .map_err(|e| EngineError::Validation(format!("invalid index snapshot: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexKind, ListIndex, VectorDict};
    use crate::node::Node;

    #[test]
    fn test_snapshot_round_trip() {
        let mut docstore = DocumentStore::new();
        let node = Node::with_id("n1", "hello");
        let mut dict = VectorDict::new();
        let key = dict.add_node(&node, None);
        dict.set_embedding(&key, vec![0.1, 0.2]).unwrap();
        docstore.add_nodes(vec![node], true).unwrap();

        let snapshot = IndexSnapshot::new(IndexStruct::VectorDict(dict), docstore);
        let json = snapshot.to_json().unwrap();
        let restored = IndexSnapshot::from_json(&json).unwrap();

        assert_eq!(restored.index_struct.kind(), IndexKind::VectorDict);
        assert_eq!(restored.docstore.get("n1").unwrap().text, "hello");
        assert!(restored.docstore.hash_of("n1").is_some());
    }

    #[test]
    fn test_snapshot_preserves_index_reference_nodes() {
        let mut docstore = DocumentStore::new();
        let pointer = Node::index_ref("points at a sub-index", "sub-1");
        let pointer_id = pointer.id.clone();
        let mut list = ListIndex::new();
        list.add_node(&pointer);
        docstore.add_nodes(vec![pointer], true).unwrap();

        let snapshot = IndexSnapshot::new(IndexStruct::List(list), docstore);
        let restored = IndexSnapshot::from_json(&snapshot.to_json().unwrap()).unwrap();
        let node = restored.docstore.get(&pointer_id).unwrap();
        assert_eq!(
            node.variant,
            crate::node::NodeVariant::IndexRef {
                index_id: "sub-1".into()
            }
        );
    }

    #[test]
    fn test_invalid_snapshot_is_validation_error() {
        let err = IndexSnapshot::from_json("not json").unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}
