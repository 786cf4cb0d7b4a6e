//! Prompt sizing
//!
//! Computes how large a text chunk may be so that prompt + chunk(s) still
//! fit the model input window, and hands out splitters parameterized with
//! that budget.

use std::sync::Arc;

use crate::config::{DEFAULT_PADDING, MAX_CHUNK_OVERLAP};
use crate::error::{EngineError, Result};
use crate::node::Node;
use crate::prompt::PromptTemplate;
use crate::service::LlmMetadata;
use crate::split::{TokenTextSplitter, Tokenizer};

/// Budget calculator for fitting chunks into a model input window.
#[derive(Clone)]
pub struct PromptHelper {
    max_input_size: usize,
    num_output: usize,
    max_chunk_overlap: usize,
    embedding_limit: Option<usize>,
    chunk_size_limit: Option<usize>,
    tokenizer: Arc<dyn Tokenizer>,
    separator: String,
}

impl PromptHelper {
    pub fn new(
        max_input_size: usize,
        num_output: usize,
        max_chunk_overlap: usize,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Self {
        Self {
            max_input_size,
            num_output,
            max_chunk_overlap,
            embedding_limit: None,
            chunk_size_limit: None,
            tokenizer,
            separator: " ".to_string(),
        }
    }

    /// Derive a helper from the language model's reported window sizes.
    pub fn from_llm_metadata(
        metadata: LlmMetadata,
        tokenizer: Arc<dyn Tokenizer>,
        chunk_size_limit: Option<usize>,
    ) -> Self {
        let mut max_chunk_overlap = MAX_CHUNK_OVERLAP.min(metadata.max_input_size / 10);
        if let Some(limit) = chunk_size_limit {
            max_chunk_overlap = max_chunk_overlap.min(limit / 10);
        }
        Self {
            chunk_size_limit,
            ..Self::new(
                metadata.max_input_size,
                metadata.num_output,
                max_chunk_overlap,
                tokenizer,
            )
        }
    }

    pub fn with_embedding_limit(mut self, limit: usize) -> Self {
        self.embedding_limit = Some(limit);
        self
    }

    pub fn with_chunk_size_limit(mut self, limit: usize) -> Self {
        self.chunk_size_limit = Some(limit);
        self
    }

    /// Token budget for each of `num_chunks` chunks accompanying the given
    /// prompt text. Non-positive budgets are a configuration error, never
    /// silently clamped.
    pub fn chunk_size_for(&self, prompt_text: &str, num_chunks: usize) -> Result<usize> {
        let prompt_tokens = self.tokenizer.count_tokens(prompt_text);
        let available =
            self.max_input_size as isize - prompt_tokens as isize - self.num_output as isize;
        let mut result = available / num_chunks.max(1) as isize - DEFAULT_PADDING as isize;

        if let Some(limit) = self.embedding_limit {
            result = result.min(limit as isize);
        }
        if let Some(limit) = self.chunk_size_limit {
            result = result.min(limit as isize);
        }

        if result <= 0 {
            return Err(EngineError::Configuration(format!(
                "computed chunk size {} is non-positive: prompt uses {} of {} input tokens \
                 with {} reserved for output",
                result, prompt_tokens, self.max_input_size, self.num_output
            )));
        }
        Ok(result as usize)
    }

    /// A splitter sized so `num_chunks` chunks of the given prompt template
    /// fit the input window, with overlap scaled down accordingly.
    pub fn splitter_for(&self, prompt: &PromptTemplate, num_chunks: usize) -> Result<TokenTextSplitter> {
        let empty_prompt = prompt.empty_format();
        let chunk_size = self.chunk_size_for(&empty_prompt, num_chunks)?;
        let overlap = (self.max_chunk_overlap / num_chunks.max(1)).min(chunk_size.saturating_sub(1));
        TokenTextSplitter::new(chunk_size, overlap, self.tokenizer.clone())
            .map(|s| s.with_separator(self.separator.clone()))
    }

    /// Of several templates, the one with the largest fixed token cost.
    pub fn biggest_prompt<'a>(&self, prompts: &[&'a PromptTemplate]) -> &'a PromptTemplate {
        prompts
            .iter()
            .max_by_key(|p| self.tokenizer.count_tokens(&p.empty_format()))
            .expect("at least one prompt required")
    }

    /// Join node texts, each truncated to the per-node share of the prompt
    /// budget.
    pub fn truncated_text_from_nodes(
        &self,
        nodes: &[Node],
        prompt: &PromptTemplate,
    ) -> Result<String> {
        if nodes.is_empty() {
            return Ok(String::new());
        }
        let splitter = self.splitter_for(prompt, nodes.len())?;
        let texts: Result<Vec<String>> = nodes
            .iter()
            .map(|node| splitter.truncate(&node.effective_text()))
            .collect();
        Ok(texts?.join("\n"))
    }

    /// Re-pack text chunks into as few prompt-sized chunks as possible.
    pub fn compact_text_chunks(
        &self,
        prompt: &PromptTemplate,
        chunks: &[String],
    ) -> Result<Vec<String>> {
        let combined = chunks
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        let splitter = self.splitter_for(prompt, 1)?;
        splitter.split(&combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split::WhitespaceTokenizer;

    fn helper(max_input: usize, num_output: usize, overlap: usize) -> PromptHelper {
        PromptHelper::new(max_input, num_output, overlap, Arc::new(WhitespaceTokenizer))
    }

    #[test]
    fn test_chunk_size_subtracts_prompt_and_output() {
        let h = helper(100, 10, 20);
        // Prompt of 10 words: (100 - 10 - 10) / 2 - 1 = 39.
        let prompt = "p p p p p p p p p p";
        assert_eq!(h.chunk_size_for(prompt, 2).unwrap(), 39);
    }

    #[test]
    fn test_non_positive_budget_is_configuration_error() {
        let h = helper(10, 10, 2);
        let err = h.chunk_size_for("one two three", 1).unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[test]
    fn test_chunk_size_clamped_by_limits() {
        let h = helper(1000, 10, 20).with_chunk_size_limit(25);
        assert_eq!(h.chunk_size_for("p", 1).unwrap(), 25);
        let h = helper(1000, 10, 20).with_embedding_limit(12);
        assert_eq!(h.chunk_size_for("p", 1).unwrap(), 12);
    }

    #[test]
    fn test_splitter_overlap_scales_with_num_chunks() {
        let h = helper(1000, 10, 20);
        let prompt = PromptTemplate::new("ask: {query_str}");
        let splitter = h.splitter_for(&prompt, 4).unwrap();
        assert_eq!(splitter.chunk_overlap(), 5);
    }

    #[test]
    fn test_biggest_prompt_picks_longest_fixed_text() {
        let h = helper(1000, 10, 20);
        let short = PromptTemplate::new("{context_str}");
        let long = PromptTemplate::new("much longer fixed template text {context_str}");
        let picked = h.biggest_prompt(&[&short, &long]);
        assert_eq!(
            picked.empty_format(),
            "much longer fixed template text "
        );
    }

    #[test]
    fn test_compact_text_chunks_merges_small_chunks() {
        let h = helper(1000, 10, 2);
        let prompt = PromptTemplate::new("{context_str}");
        let chunks = vec!["a b".to_string(), "  ".to_string(), "c d".to_string()];
        let compacted = h.compact_text_chunks(&prompt, &chunks).unwrap();
        assert_eq!(compacted.len(), 1);
        assert!(compacted[0].contains("a b"));
        assert!(compacted[0].contains("c d"));
    }
}
