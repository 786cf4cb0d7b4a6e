//! Query transforms
//!
//! Hooks that rewrite a query bundle before retrieval. The step-decompose
//! transform drives multi-step execution: it consults the target index's
//! summary and the reasoning accumulated so far to produce the next
//! sub-question, or the literal 'None' when the source is exhausted.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::prompt::{step_decompose_prompt, PromptTemplate};
use crate::service::LanguageModelService;

use super::QueryBundle;

/// Context available to a transform.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformContext<'a> {
    pub index_summary: Option<&'a str>,
    pub prev_reasoning: Option<&'a str>,
}

/// Rewrites a query bundle before retrieval.
#[async_trait]
pub trait QueryTransform: Send + Sync {
    async fn transform(
        &self,
        bundle: &QueryBundle,
        ctx: TransformContext<'_>,
    ) -> Result<QueryBundle>;
}

/// Passes the query through unchanged.
pub struct IdentityTransform;

#[async_trait]
impl QueryTransform for IdentityTransform {
    async fn transform(
        &self,
        bundle: &QueryBundle,
        _ctx: TransformContext<'_>,
    ) -> Result<QueryBundle> {
        Ok(bundle.clone())
    }
}

/// Produces the next sub-question for multi-step decomposition.
pub struct StepDecomposeTransform {
    llm: Arc<dyn LanguageModelService>,
    prompt: PromptTemplate,
}

impl StepDecomposeTransform {
    pub fn new(llm: Arc<dyn LanguageModelService>) -> Self {
        Self {
            llm,
            prompt: step_decompose_prompt(),
        }
    }

    pub fn with_prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompt = prompt;
        self
    }
}

#[async_trait]
impl QueryTransform for StepDecomposeTransform {
    async fn transform(
        &self,
        bundle: &QueryBundle,
        ctx: TransformContext<'_>,
    ) -> Result<QueryBundle> {
        let index_summary = ctx.index_summary.unwrap_or("None");
        let prev_reasoning = match ctx.prev_reasoning {
            Some(reasoning) if !reasoning.is_empty() => format!("\n{}", reasoning),
            _ => "None".to_string(),
        };

        let prediction = self
            .llm
            .predict(
                &self.prompt,
                &[
                    ("query_str", bundle.query_str.as_str()),
                    ("context_str", index_summary),
                    ("prev_reasoning", prev_reasoning.as_str()),
                ],
            )
            .await?;
        let new_query = prediction.text.trim().to_string();
        debug!(original = %bundle.query_str, rewritten = %new_query, "step decompose");

        Ok(QueryBundle {
            query_str: new_query,
            custom_embedding_strs: bundle.custom_embedding_strs.clone(),
            embedding: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::SimulatedLlm;

    #[tokio::test]
    async fn test_identity_transform_is_a_noop() {
        let bundle = QueryBundle::new("unchanged");
        let out = IdentityTransform
            .transform(&bundle, TransformContext::default())
            .await
            .unwrap();
        assert_eq!(out.query_str, "unchanged");
    }

    #[tokio::test]
    async fn test_step_decompose_consults_summary() {
        let transform = StepDecomposeTransform::new(Arc::new(SimulatedLlm::new()));
        let bundle = QueryBundle::new("what did the author do?");
        let ctx = TransformContext {
            index_summary: Some("an essay about the author's life"),
            prev_reasoning: None,
        };
        // The simulated model echoes the original question as the sub-question.
        let out = transform.transform(&bundle, ctx).await.unwrap();
        assert_eq!(out.query_str, "what did the author do?");
        assert!(out.embedding.is_none());
    }
}
