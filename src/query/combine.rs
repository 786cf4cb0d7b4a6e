//! Query combiners - single-pass and multi-step execution
//!
//! The single combiner applies the transform hook once and delegates. The
//! multi-step combiner iteratively rewrites the query from accumulated
//! reasoning, records every sub-question/sub-answer round, and synthesizes
//! a combined answer over the whole trace against the original query.

use tracing::debug;

use crate::error::{EngineError, Result};
use crate::index::IndexStruct;
use crate::synth::{Response, ResponseSynthesizer, SubQuestionAnswer, TextChunk};

use super::transform::TransformContext;
use super::{QueryBundle, QueryOrchestrator};

/// Multi-step execution parameters.
#[derive(Debug, Clone)]
pub struct MultiStepOptions {
    /// Maximum decomposition rounds; unbounded when absent.
    pub num_steps: Option<usize>,
    /// Whether the stop predicate may end the loop early.
    pub early_stopping: bool,
}

impl Default for MultiStepOptions {
    fn default() -> Self {
        Self {
            num_steps: Some(3),
            early_stopping: true,
        }
    }
}

impl MultiStepOptions {
    /// Unbounded steps with early stopping disabled would never terminate.
    pub fn validate(&self) -> Result<()> {
        if !self.early_stopping && self.num_steps.is_none() {
            return Err(EngineError::Configuration(
                "num_steps must be set when early_stopping is disabled".into(),
            ));
        }
        Ok(())
    }
}

/// Default stop predicate: the rewritten query contains the literal token
/// "none", case-insensitive.
fn default_stop(bundle: &QueryBundle) -> bool {
    bundle.query_str.to_lowercase().contains("none")
}

/// Execution strategy wrapped around the orchestrator.
pub enum QueryCombiner {
    Single,
    MultiStep(MultiStepOptions),
}

impl QueryCombiner {
    pub(crate) async fn run(
        &self,
        orchestrator: &QueryOrchestrator,
        index: &IndexStruct,
        bundle: QueryBundle,
        level: usize,
    ) -> Result<Response> {
        match self {
            QueryCombiner::Single => {
                let ctx = TransformContext {
                    index_summary: index.summary(),
                    prev_reasoning: None,
                };
                let updated = orchestrator.transform().transform(&bundle, ctx).await?;
                orchestrator.query_transformed(updated, index, level).await
            }
            QueryCombiner::MultiStep(options) => {
                self.run_multi_step(orchestrator, index, bundle, level, options)
                    .await
            }
        }
    }

    async fn run_multi_step(
        &self,
        orchestrator: &QueryOrchestrator,
        index: &IndexStruct,
        bundle: QueryBundle,
        level: usize,
        options: &MultiStepOptions,
    ) -> Result<Response> {
        options.validate()?;
        let summary = index.require_summary()?;

        let mut prev_reasoning = String::new();
        let mut chunks: Vec<TextChunk> = Vec::new();
        let mut source_nodes = Vec::new();
        let mut sub_qa: Vec<SubQuestionAnswer> = Vec::new();
        let mut steps = 0usize;

        loop {
            if let Some(limit) = options.num_steps {
                if steps >= limit {
                    break;
                }
            }

            let ctx = TransformContext {
                index_summary: Some(summary),
                prev_reasoning: Some(&prev_reasoning),
            };
            let updated = orchestrator.transform().transform(&bundle, ctx).await?;

            if options.early_stopping && default_stop(&updated) {
                debug!(step = steps, "multi-step stop predicate fired");
                break;
            }

            let sub_question = updated.query_str.clone();
            let response = orchestrator.query_transformed(updated, index, level).await?;
            let sub_answer = response.to_string();

            chunks.push(TextChunk::new(format!(
                "\nQuestion: {}\nAnswer: {}",
                sub_question, sub_answer
            )));
            source_nodes.extend(response.source_nodes);
            sub_qa.push(SubQuestionAnswer {
                question: sub_question.clone(),
                answer: sub_answer.clone(),
            });
            prev_reasoning.push_str(&format!("- {}\n- {}\n", sub_question, sub_answer));
            steps += 1;
        }

        // Combined answer over the accumulated trace, against the original
        // query.
        let synthesizer = ResponseSynthesizer::new(orchestrator.service_context().clone());
        let final_text = synthesizer
            .respond_over_chunks(&bundle.query_str, &chunks, None)
            .await?;

        Ok(Response {
            response: Some(final_text),
            source_nodes,
            sub_qa,
        })
    }
}
