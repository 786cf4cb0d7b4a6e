//! Language model capability interface

use async_trait::async_trait;

use crate::error::Result;
use crate::prompt::PromptTemplate;

/// Window sizes reported by a language model, consumed by prompt sizing.
#[derive(Debug, Clone, Copy)]
pub struct LlmMetadata {
    /// Maximum input window in tokens.
    pub max_input_size: usize,
    /// Tokens reserved for model output.
    pub num_output: usize,
}

impl Default for LlmMetadata {
    fn default() -> Self {
        Self {
            max_input_size: crate::config::DEFAULT_MAX_INPUT_SIZE,
            num_output: crate::config::NUM_OUTPUTS,
        }
    }
}

/// A model completion together with the prompt that produced it.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub text: String,
    pub rendered_prompt: String,
}

/// Trait for language model providers.
#[async_trait]
pub trait LanguageModelService: Send + Sync {
    /// Render the template with the given variables and complete it.
    async fn predict(&self, prompt: &PromptTemplate, vars: &[(&str, &str)]) -> Result<Prediction>;

    /// Window sizes used for prompt budget arithmetic.
    fn metadata(&self) -> LlmMetadata;

    /// Cumulative token cost of all calls made through this service.
    fn total_tokens_used(&self) -> u64;
}
