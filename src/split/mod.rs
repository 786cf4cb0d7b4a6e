//! Token-aware text splitting
//!
//! Splits raw text into token-bounded chunks with configurable overlap.
//! Text is broken on a primary separator into atomic splits; any split that
//! exceeds the budget is re-split on backup separators and hard-sliced by
//! character count as a last resort. Splits are then greedily packed into
//! chunks, shrinking an overflowing window until it fits and retreating the
//! window start so consecutive chunks share roughly `chunk_overlap` tokens.

mod tokenizer;

pub use tokenizer::{TiktokenTokenizer, Tokenizer, WhitespaceTokenizer};

use std::sync::Arc;

use crate::error::{EngineError, Result};

/// A chunk plus the number of characters it shares with the prior chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSplit {
    pub chunk: String,
    pub overlap_chars: usize,
}

/// Splitter that packs whitespace-separated splits into token budgets.
pub struct TokenTextSplitter {
    separator: String,
    backup_separators: Vec<String>,
    chunk_size: usize,
    chunk_overlap: usize,
    tokenizer: Arc<dyn Tokenizer>,
}

impl std::fmt::Debug for TokenTextSplitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenTextSplitter")
            .field("separator", &self.separator)
            .field("backup_separators", &self.backup_separators)
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .finish_non_exhaustive()
    }
}

impl TokenTextSplitter {
    /// Create a splitter with the given token budget and overlap.
    ///
    /// An overlap at or above the chunk size is a configuration error.
    pub fn new(
        chunk_size: usize,
        chunk_overlap: usize,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Result<Self> {
        if chunk_overlap >= chunk_size {
            return Err(EngineError::Configuration(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            separator: " ".to_string(),
            backup_separators: vec!["\n".to_string()],
            chunk_size,
            chunk_overlap,
            tokenizer,
        })
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn with_backup_separators(mut self, separators: Vec<String>) -> Self {
        self.backup_separators = separators;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split text into chunks, discarding overlap bookkeeping.
    pub fn split(&self, text: &str) -> Result<Vec<String>> {
        Ok(self
            .split_with_overlaps(text, None)?
            .into_iter()
            .map(|s| s.chunk)
            .collect())
    }

    /// Split text into chunks annotated with the character overlap carried
    /// over from the previous chunk.
    ///
    /// When `header` is given (node metadata rendered as text), its token
    /// cost is subtracted from the budget first so header + chunk still fit
    /// the model window.
    pub fn split_with_overlaps(&self, text: &str, header: Option<&str>) -> Result<Vec<TextSplit>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let header_tokens = match header {
            Some(h) if !h.is_empty() => {
                self.tokenizer.count_tokens(&format!("{}\n\n", h)) + 1
            }
            _ => 0,
        };
        let effective_chunk_size = self.chunk_size.saturating_sub(header_tokens);
        if effective_chunk_size == 0 {
            return Err(EngineError::Configuration(format!(
                "effective chunk size is non-positive: header costs {} of {} budget tokens",
                header_tokens, self.chunk_size
            )));
        }

        let splits: Vec<String> = text.split(&self.separator).map(|s| s.to_string()).collect();
        let splits = self.preprocess_splits(splits, effective_chunk_size);

        let mut docs: Vec<TextSplit> = Vec::new();
        let mut start_idx = 0usize;
        let mut cur_idx = 0usize;
        let mut cur_total = 0usize;
        let mut prev_idx = 0usize;

        while cur_idx < splits.len() {
            let num_cur_tokens = self.tokenizer.count_tokens(&splits[cur_idx]).max(1);

            if num_cur_tokens > effective_chunk_size {
                return Err(EngineError::Configuration(format!(
                    "a single term of {} tokens exceeds the effective chunk size {} (chunk size {})",
                    num_cur_tokens, effective_chunk_size, self.chunk_size
                )));
            }

            if cur_total + num_cur_tokens > effective_chunk_size {
                cur_idx = self.reduce_chunk_size(start_idx, cur_idx, &splits, effective_chunk_size);

                let overlap = if prev_idx > 0 && prev_idx > start_idx {
                    self.joined_char_len(&splits[start_idx..prev_idx])
                } else {
                    0
                };
                docs.push(TextSplit {
                    chunk: splits[start_idx..cur_idx].join(&self.separator),
                    overlap_chars: overlap,
                });
                prev_idx = cur_idx;

                // Retreat the window start until the retained token total is
                // within the overlap budget.
                while cur_total > self.chunk_overlap && start_idx < cur_idx {
                    let tokens = self.tokenizer.count_tokens(&splits[start_idx]).max(1);
                    cur_total = cur_total.saturating_sub(tokens);
                    start_idx += 1;
                }
                if start_idx == cur_idx {
                    cur_total = 0;
                }
            }

            cur_total += num_cur_tokens;
            cur_idx += 1;
        }

        let overlap = if prev_idx > start_idx {
            self.joined_char_len(&splits[start_idx..prev_idx])
        } else {
            0
        };
        docs.push(TextSplit {
            chunk: splits[start_idx..cur_idx].join(&self.separator),
            overlap_chars: overlap,
        });

        Ok(docs
            .into_iter()
            .filter(|d| !d.chunk.trim().is_empty())
            .collect())
    }

    /// Truncate text to a single chunk within the token budget.
    pub fn truncate(&self, text: &str) -> Result<String> {
        if text.is_empty() {
            return Ok(String::new());
        }

        let splits: Vec<String> = text.split(&self.separator).map(|s| s.to_string()).collect();
        let splits = self.preprocess_splits(splits, self.chunk_size);

        let start_idx = 0usize;
        let mut cur_idx = 0usize;
        let mut cur_total = 0usize;

        while cur_idx < splits.len() {
            let num_cur_tokens = self.tokenizer.count_tokens(&splits[cur_idx]).max(1);
            if cur_total + num_cur_tokens > self.chunk_size {
                cur_idx = self.reduce_chunk_size(start_idx, cur_idx, &splits, self.chunk_size);
                break;
            }
            cur_total += num_cur_tokens;
            cur_idx += 1;
        }

        Ok(splits[start_idx..cur_idx].join(&self.separator))
    }

    /// Break oversized atomic splits down until each fits the budget: try
    /// backup separators in order until one is present, then hard-slice by
    /// character count.
    fn preprocess_splits(&self, splits: Vec<String>, chunk_size: usize) -> Vec<String> {
        let mut out = Vec::with_capacity(splits.len());
        for split in splits {
            if self.tokenizer.count_tokens(&split) <= chunk_size {
                out.push(split);
                continue;
            }

            let pieces: Vec<String> = match self
                .backup_separators
                .iter()
                .find(|sep| split.contains(sep.as_str()))
            {
                Some(sep) => split.split(sep.as_str()).map(|s| s.to_string()).collect(),
                None => vec![split],
            };

            for piece in pieces {
                if self.tokenizer.count_tokens(&piece) <= chunk_size {
                    out.push(piece);
                } else {
                    out.extend(slice_by_chars(&piece, chunk_size));
                }
            }
        }
        out
    }

    /// Shrink `[start_idx, cur_idx)` until the joined window fits `budget`,
    /// dropping a share of the window proportional to the overage each pass.
    fn reduce_chunk_size(
        &self,
        start_idx: usize,
        mut cur_idx: usize,
        splits: &[String],
        budget: usize,
    ) -> usize {
        let mut total = self
            .tokenizer
            .count_tokens(&splits[start_idx..cur_idx].join(&self.separator));
        while total > budget {
            let percent_to_reduce = (total - budget) as f64 / total as f64;
            let num_to_reduce = (percent_to_reduce * (cur_idx - start_idx) as f64) as usize + 1;
            cur_idx -= num_to_reduce.min(cur_idx - start_idx);
            total = self
                .tokenizer
                .count_tokens(&splits[start_idx..cur_idx].join(&self.separator));
        }
        cur_idx
    }

    fn joined_char_len(&self, splits: &[String]) -> usize {
        if splits.is_empty() {
            return 0;
        }
        let content: usize = splits.iter().map(|s| s.chars().count()).sum();
        content + self.separator.chars().count() * (splits.len() - 1)
    }
}

/// Slice a string into pieces of at most `max_chars` characters, respecting
/// UTF-8 boundaries.
fn slice_by_chars(text: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars.max(1))
        .map(|c| c.iter().collect())
        .collect()
}
