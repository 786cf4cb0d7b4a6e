//! Node post-processors
//!
//! Applied as a chain between retrieval and synthesis. Processors may drop
//! nodes but never reorder the survivors.

use crate::node::NodeWithScore;

/// Filters or annotates retrieved nodes before synthesis.
pub trait NodePostprocessor: Send + Sync {
    fn postprocess(&self, nodes: Vec<NodeWithScore>) -> Vec<NodeWithScore>;
}

/// Run a chain of processors in order.
pub fn apply_postprocessors(
    mut nodes: Vec<NodeWithScore>,
    processors: &[Box<dyn NodePostprocessor>],
) -> Vec<NodeWithScore> {
    for processor in processors {
        nodes = processor.postprocess(nodes);
    }
    nodes
}

/// Keeps nodes containing every required keyword and none of the excluded
/// ones (case-insensitive substring match on the effective text).
pub struct KeywordFilter {
    required: Vec<String>,
    excluded: Vec<String>,
}

impl KeywordFilter {
    pub fn new(required: Vec<String>, excluded: Vec<String>) -> Self {
        Self {
            required: required.into_iter().map(|k| k.to_lowercase()).collect(),
            excluded: excluded.into_iter().map(|k| k.to_lowercase()).collect(),
        }
    }
}

impl NodePostprocessor for KeywordFilter {
    fn postprocess(&self, nodes: Vec<NodeWithScore>) -> Vec<NodeWithScore> {
        nodes
            .into_iter()
            .filter(|nws| {
                let text = nws.node.effective_text().to_lowercase();
                self.required.iter().all(|k| text.contains(k))
                    && !self.excluded.iter().any(|k| text.contains(k))
            })
            .collect()
    }
}

/// Drops scored nodes below a similarity cutoff; unscored nodes pass.
pub struct SimilarityCutoff {
    cutoff: f32,
}

impl SimilarityCutoff {
    pub fn new(cutoff: f32) -> Self {
        Self { cutoff }
    }
}

impl NodePostprocessor for SimilarityCutoff {
    fn postprocess(&self, nodes: Vec<NodeWithScore>) -> Vec<NodeWithScore> {
        nodes
            .into_iter()
            .filter(|nws| match nws.score {
                Some(score) => score >= self.cutoff,
                None => true,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    fn scored(id: &str, text: &str, score: Option<f32>) -> NodeWithScore {
        NodeWithScore::new(Node::with_id(id, text), score)
    }

    #[test]
    fn test_keyword_filter_requires_and_excludes() {
        let filter = KeywordFilter::new(vec!["Growing".into()], vec!["company".into()]);
        let nodes = vec![
            scored("a", "growing up in the city", Some(1.0)),
            scored("b", "growing a company from scratch", Some(0.9)),
            scored("c", "founding history", Some(0.8)),
        ];
        let kept = filter.postprocess(nodes);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].node.id, "a");
    }

    #[test]
    fn test_similarity_cutoff_keeps_unscored() {
        let filter = SimilarityCutoff::new(0.5);
        let nodes = vec![
            scored("a", "x", Some(0.9)),
            scored("b", "y", Some(0.2)),
            scored("c", "z", None),
        ];
        let kept = filter.postprocess(nodes);
        let ids: Vec<&str> = kept.iter().map(|n| n.node.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_chain_preserves_order_of_survivors() {
        let chain: Vec<Box<dyn NodePostprocessor>> = vec![
            Box::new(SimilarityCutoff::new(0.1)),
            Box::new(KeywordFilter::new(vec![], vec!["drop".into()])),
        ];
        let nodes = vec![
            scored("first", "keep this", Some(0.9)),
            scored("second", "drop this", Some(0.8)),
            scored("third", "keep this too", Some(0.7)),
        ];
        let kept = apply_postprocessors(nodes, &chain);
        let ids: Vec<&str> = kept.iter().map(|n| n.node.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "third"]);
    }
}
