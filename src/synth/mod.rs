//! Response synthesis - the get-then-refine loop
//!
//! The first context chunk produces an initial answer via the QA prompt;
//! every further chunk refines that answer via the refine prompt, re-split
//! per chunk so prompt + context always fit the model window. Refinement is
//! inherently sequential and is never parallelized.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::node::NodeWithScore;
use crate::prompt::{refine_prompt, text_qa_prompt, PromptTemplate};
use crate::query::QueryBundle;
use crate::service::ServiceContext;

/// How retrieved context is turned into an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// Initial answer from the first chunk, refined by each further chunk.
    #[default]
    Refine,
    /// Re-pack chunks into as few prompt-sized chunks as possible first,
    /// then refine. Fewer model calls, same contract.
    Compact,
    /// Retrieval only: return source nodes without synthesizing an answer.
    NoText,
}

/// A unit of context fed to the refine loop.
#[derive(Debug, Clone)]
pub struct TextChunk {
    pub text: String,
    /// Answer-bearing chunks (from multi-step sub-answers) are adopted as
    /// the running answer instead of being asked about.
    pub is_answer: bool,
}

impl TextChunk {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_answer: false,
        }
    }

    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_answer: true,
        }
    }
}

/// One recorded multi-step decomposition round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubQuestionAnswer {
    pub question: String,
    pub answer: String,
}

/// Final answer plus the provenance of every node consumed to produce it.
#[derive(Debug, Clone)]
pub struct Response {
    /// The synthesized answer; absent in no-text mode.
    pub response: Option<String>,
    pub source_nodes: Vec<NodeWithScore>,
    /// Sub-question/sub-answer trace from multi-step execution.
    pub sub_qa: Vec<SubQuestionAnswer>,
}

impl Response {
    /// Render `> Source (Doc id: ...)` attribution lines.
    pub fn formatted_sources(&self) -> String {
        self.source_nodes
            .iter()
            .map(|source| {
                format!(
                    "> Source (Doc id: {}): {}",
                    source.node.id,
                    truncate_text(&source.node.effective_text(), 100)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.response.as_deref().unwrap_or("None"))
    }
}

fn truncate_text(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        return text.to_string();
    }
    let prefix: String = text.chars().take(max_length.saturating_sub(3)).collect();
    format!("{}...", prefix)
}

/// Runs the get-then-refine protocol over ordered text chunks.
pub struct ResponseSynthesizer {
    ctx: ServiceContext,
    text_qa_template: PromptTemplate,
    refine_template: PromptTemplate,
    mode: ResponseMode,
}

impl ResponseSynthesizer {
    pub fn new(ctx: ServiceContext) -> Self {
        Self {
            ctx,
            text_qa_template: text_qa_prompt(),
            refine_template: refine_prompt(),
            mode: ResponseMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: ResponseMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_text_qa_template(mut self, template: PromptTemplate) -> Self {
        self.text_qa_template = template;
        self
    }

    pub fn with_refine_template(mut self, template: PromptTemplate) -> Self {
        self.refine_template = template;
        self
    }

    /// Synthesize an answer from retrieved nodes.
    ///
    /// Source attribution lists directly consumed nodes in synthesis order,
    /// then any carried sources from nested queries.
    pub async fn synthesize(
        &self,
        bundle: &QueryBundle,
        nodes: Vec<NodeWithScore>,
        additional_sources: Vec<NodeWithScore>,
    ) -> Result<Response> {
        let chunks: Vec<TextChunk> = nodes
            .iter()
            .map(|nws| {
                debug!(
                    "searching in chunk: {}",
                    truncate_text(&nws.node.effective_text(), 50)
                );
                TextChunk::new(nws.node.effective_text())
            })
            .collect();

        let mut source_nodes = nodes;
        source_nodes.extend(additional_sources);

        let response = match self.mode {
            ResponseMode::NoText => None,
            _ => Some(
                self.respond_over_chunks(&bundle.query_str, &chunks, None)
                    .await?,
            ),
        };

        Ok(Response {
            response,
            source_nodes,
            sub_qa: Vec::new(),
        })
    }

    /// Run the refine loop over prepared chunks, optionally seeded with a
    /// previous answer. An empty outcome yields the literal placeholder.
    pub async fn respond_over_chunks(
        &self,
        query_str: &str,
        chunks: &[TextChunk],
        prev_response: Option<String>,
    ) -> Result<String> {
        let chunks = match self.mode {
            ResponseMode::Compact => self.compact_chunks(chunks)?,
            _ => chunks.to_vec(),
        };

        let mut response: Option<String> = prev_response;
        for chunk in &chunks {
            response = match response {
                None if chunk.is_answer => Some(chunk.text.clone()),
                None => self.give_response_single(query_str, &chunk.text).await?,
                Some(existing) => Some(
                    self.refine_response_single(existing, query_str, &chunk.text)
                        .await?,
                ),
            };
        }

        Ok(match response {
            Some(text) if !text.is_empty() => text,
            _ => "Empty Response".to_string(),
        })
    }

    /// Initial answer for one chunk: split to the QA prompt's budget, ask
    /// once, then refine with the chunk's own remainder.
    async fn give_response_single(
        &self,
        query_str: &str,
        text_chunk: &str,
    ) -> Result<Option<String>> {
        let qa_template = self.text_qa_template.clone().partial("query_str", query_str);
        let splitter = self.ctx.prompt_helper.splitter_for(&qa_template, 1)?;

        let mut response: Option<String> = None;
        for sub_chunk in splitter.split(text_chunk)? {
            response = match response {
                None => {
                    let prediction = self
                        .ctx
                        .llm
                        .predict(
                            &qa_template,
                            &[("context_str", sub_chunk.as_str()), ("query_str", query_str)],
                        )
                        .await?;
                    debug!("initial response: {}", truncate_text(&prediction.text, 200));
                    Some(prediction.text)
                }
                Some(existing) => Some(
                    self.refine_response_single(existing, query_str, &sub_chunk)
                        .await?,
                ),
            };
        }
        Ok(response)
    }

    /// Refine an existing answer with one chunk of new context, re-split to
    /// the refine prompt's budget (which already carries the answer).
    async fn refine_response_single(
        &self,
        existing: String,
        query_str: &str,
        text_chunk: &str,
    ) -> Result<String> {
        debug!("refine context: {}", truncate_text(text_chunk, 50));

        let refine_template = self
            .refine_template
            .clone()
            .partial("query_str", query_str)
            .partial("existing_answer", existing.clone());
        let splitter = self.ctx.prompt_helper.splitter_for(&refine_template, 1)?;

        let mut response = existing;
        for sub_chunk in splitter.split(text_chunk)? {
            let prediction = self
                .ctx
                .llm
                .predict(
                    &refine_template,
                    &[
                        ("existing_answer", response.as_str()),
                        ("context_msg", sub_chunk.as_str()),
                    ],
                )
                .await?;
            debug!("refined response: {}", truncate_text(&prediction.text, 200));
            response = prediction.text;
        }
        Ok(response)
    }

    /// Re-pack chunks against the larger of the QA/refine templates.
    fn compact_chunks(&self, chunks: &[TextChunk]) -> Result<Vec<TextChunk>> {
        let biggest = self
            .ctx
            .prompt_helper
            .biggest_prompt(&[&self.text_qa_template, &self.refine_template]);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let compacted = self.ctx.prompt_helper.compact_text_chunks(biggest, &texts)?;
        Ok(compacted.into_iter().map(TextChunk::new).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use crate::service::{SimulatedEmbedding, SimulatedLlm, ServiceContext};
    use crate::split::WhitespaceTokenizer;
    use std::sync::Arc;

    fn test_ctx() -> ServiceContext {
        ServiceContext::new(
            Arc::new(SimulatedLlm::new()),
            Arc::new(SimulatedEmbedding::default()),
            Arc::new(WhitespaceTokenizer),
        )
    }

    fn scored(id: &str, text: &str, score: f32) -> NodeWithScore {
        NodeWithScore::new(Node::with_id(id, text), Some(score))
    }

    #[tokio::test]
    async fn test_empty_node_set_yields_placeholder() {
        let synth = ResponseSynthesizer::new(test_ctx());
        let bundle = QueryBundle::new("anything?");
        let response = synth.synthesize(&bundle, vec![], vec![]).await.unwrap();
        assert_eq!(response.response.as_deref(), Some("Empty Response"));
        assert!(response.source_nodes.is_empty());
    }

    #[tokio::test]
    async fn test_initial_answer_then_refine() {
        let synth = ResponseSynthesizer::new(test_ctx());
        let bundle = QueryBundle::new("what is this about?");
        let nodes = vec![
            scored("n1", "first context passage", 0.9),
            scored("n2", "second context passage", 0.7),
        ];
        let response = synth.synthesize(&bundle, nodes, vec![]).await.unwrap();
        // The simulated refine step keeps the initial answer.
        assert_eq!(
            response.response.as_deref(),
            Some("Based on the provided context: what is this about?")
        );
        assert_eq!(response.source_nodes.len(), 2);
        assert_eq!(response.source_nodes[0].node.id, "n1");
        assert_eq!(response.source_nodes[1].node.id, "n2");
    }

    #[tokio::test]
    async fn test_additional_sources_appended_after_direct_ones() {
        let synth = ResponseSynthesizer::new(test_ctx());
        let bundle = QueryBundle::new("q");
        let nodes = vec![scored("direct", "direct context", 1.0)];
        let carried = vec![scored("nested", "nested context", 0.5)];
        let response = synth.synthesize(&bundle, nodes, carried).await.unwrap();
        let ids: Vec<&str> = response
            .source_nodes
            .iter()
            .map(|s| s.node.id.as_str())
            .collect();
        assert_eq!(ids, vec!["direct", "nested"]);
    }

    #[tokio::test]
    async fn test_no_text_mode_skips_synthesis() {
        let synth = ResponseSynthesizer::new(test_ctx()).with_mode(ResponseMode::NoText);
        let bundle = QueryBundle::new("q");
        let response = synth
            .synthesize(&bundle, vec![scored("n1", "context", 1.0)], vec![])
            .await
            .unwrap();
        assert!(response.response.is_none());
        assert_eq!(response.to_string(), "None");
        assert_eq!(response.source_nodes.len(), 1);
    }

    #[tokio::test]
    async fn test_answer_chunks_are_adopted_not_asked() {
        let synth = ResponseSynthesizer::new(test_ctx());
        let chunks = vec![TextChunk::answer("a prior sub-answer")];
        let text = synth
            .respond_over_chunks("original query", &chunks, None)
            .await
            .unwrap();
        assert_eq!(text, "a prior sub-answer");
    }

    #[tokio::test]
    async fn test_compact_mode_produces_same_contract() {
        let synth = ResponseSynthesizer::new(test_ctx()).with_mode(ResponseMode::Compact);
        let bundle = QueryBundle::new("compact question");
        let nodes = vec![
            scored("n1", "tiny chunk one", 1.0),
            scored("n2", "tiny chunk two", 0.9),
        ];
        let response = synth.synthesize(&bundle, nodes, vec![]).await.unwrap();
        assert_eq!(
            response.response.as_deref(),
            Some("Based on the provided context: compact question")
        );
    }

    #[test]
    fn test_formatted_sources_name_doc_ids() {
        let response = Response {
            response: Some("answer".into()),
            source_nodes: vec![scored("doc-7", "some text", 0.5)],
            sub_qa: Vec::new(),
        };
        assert!(response.formatted_sources().contains("Doc id: doc-7"));
    }
}
