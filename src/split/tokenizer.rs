//! Tokenizers for budget arithmetic
//!
//! Injected explicitly wherever token counts are needed; there is no
//! process-wide tokenizer state.

use std::sync::Arc;

use tiktoken_rs::{cl100k_base, CoreBPE};

use crate::error::{EngineError, Result};

/// Counts model tokens in a piece of text.
pub trait Tokenizer: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

/// Tiktoken-backed tokenizer (cl100k encoding).
pub struct TiktokenTokenizer {
    bpe: CoreBPE,
}

impl TiktokenTokenizer {
    pub fn new() -> Result<Self> {
        let bpe = cl100k_base().map_err(|e| {
            EngineError::Configuration(format!("failed to load cl100k tokenizer: {}", e))
        })?;
        Ok(Self { bpe })
    }

    /// Shared handle, the usual way to thread one tokenizer through the
    /// splitter, prompt helper, and services.
    pub fn shared() -> Result<Arc<dyn Tokenizer>> {
        Ok(Arc::new(Self::new()?))
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// Whitespace-word tokenizer with predictable counts. Used in tests and
/// wherever exact model tokenization does not matter.
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_counts_words() {
        let tok = WhitespaceTokenizer;
        assert_eq!(tok.count_tokens("one two  three"), 3);
        assert_eq!(tok.count_tokens(""), 0);
    }

    #[test]
    fn test_tiktoken_counts_nonzero() {
        let tok = TiktokenTokenizer::new().unwrap();
        assert!(tok.count_tokens("hello world") >= 2);
        assert_eq!(tok.count_tokens(""), 0);
    }
}
