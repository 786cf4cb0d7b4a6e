//! Keyword extraction for the keyword-table index
//!
//! Three pluggable extractors: naive frequency counting, a RAKE-style
//! phrase scorer, and a language-model-assisted extractor that parses
//! `KEYWORDS: ...` responses. The stopword set is injected at construction
//! time; there is no process-wide stopword state.

use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::Result;
use crate::prompt::{query_keyword_extract_prompt, PromptTemplate};
use crate::service::LanguageModelService;

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "must", "shall",
    "can", "need", "dare", "ought", "used", "to", "of", "in", "for", "on", "with", "at", "by",
    "from", "as", "into", "through", "during", "before", "after", "above", "below", "between",
    "under", "again", "further", "then", "once", "here", "there", "when", "where", "why", "how",
    "all", "each", "few", "more", "most", "other", "some", "such", "no", "nor", "not", "only",
    "own", "same", "so", "than", "too", "very", "just", "and", "but", "if", "or", "because",
    "until", "while", "this", "that", "these", "those", "it", "its", "i", "me", "my", "myself",
    "we", "our", "ours", "ourselves", "you", "your", "yours", "yourself", "yourselves", "he",
    "him", "his", "himself", "she", "her", "hers", "herself", "they", "them", "their", "theirs",
    "themselves", "what", "which", "who", "whom", "any", "both", "also", "about", "like",
    "using", "based", "within", "without",
];

/// The default English stopword set, shared across extractors.
pub fn default_stopwords() -> Arc<FxHashSet<String>> {
    Arc::new(STOPWORDS.iter().map(|s| s.to_string()).collect())
}

/// Extracts keyword candidates from a piece of text.
#[async_trait]
pub trait KeywordExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> Result<Vec<String>>;
}

fn tokenize_words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// Split multi-word keywords into their words, dropping stopwords, while
/// keeping the original phrases.
fn expand_with_subtokens(keywords: Vec<String>, stopwords: &FxHashSet<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for keyword in keywords {
        for word in tokenize_words(&keyword) {
            if !stopwords.contains(&word) && !out.contains(&word) {
                out.push(word);
            }
        }
    }
    out
}

/// Parse a `KEYWORDS: a, b, c` model response into subtoken-expanded
/// keywords.
pub fn extract_keywords_from_response(
    response: &str,
    start_token: &str,
    stopwords: &FxHashSet<String>,
) -> Vec<String> {
    let mut response = response.trim();
    if let Some(stripped) = response.strip_prefix(start_token) {
        response = stripped;
    }
    let raw: Vec<String> = response
        .split(',')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    expand_with_subtokens(raw, stopwords)
}

/// Frequency-based extractor: non-stopword words ranked by occurrence count,
/// ties broken by first appearance.
pub struct SimpleKeywordExtractor {
    max_keywords: Option<usize>,
    stopwords: Arc<FxHashSet<String>>,
}

impl SimpleKeywordExtractor {
    pub fn new(max_keywords: Option<usize>, stopwords: Arc<FxHashSet<String>>) -> Self {
        Self {
            max_keywords,
            stopwords,
        }
    }
}

impl Default for SimpleKeywordExtractor {
    fn default() -> Self {
        Self::new(None, default_stopwords())
    }
}

#[async_trait]
impl KeywordExtractor for SimpleKeywordExtractor {
    async fn extract(&self, text: &str) -> Result<Vec<String>> {
        let mut counts: FxHashMap<String, usize> = FxHashMap::default();
        let mut order: Vec<String> = Vec::new();

        for word in tokenize_words(text) {
            if self.stopwords.contains(&word) {
                continue;
            }
            if !counts.contains_key(&word) {
                order.push(word.clone());
            }
            *counts.entry(word).or_insert(0) += 1;
        }

        order.sort_by(|a, b| counts[b].cmp(&counts[a]));
        if let Some(max) = self.max_keywords {
            order.truncate(max);
        }
        Ok(order)
    }
}

/// RAKE-style extractor: candidate phrases are maximal stopword-free word
/// runs; each word scores degree/frequency and a phrase scores the sum of
/// its word scores. Top phrases are expanded into subtokens.
pub struct RakeKeywordExtractor {
    max_keywords: Option<usize>,
    stopwords: Arc<FxHashSet<String>>,
}

impl RakeKeywordExtractor {
    pub fn new(max_keywords: Option<usize>, stopwords: Arc<FxHashSet<String>>) -> Self {
        Self {
            max_keywords,
            stopwords,
        }
    }
}

impl Default for RakeKeywordExtractor {
    fn default() -> Self {
        Self::new(None, default_stopwords())
    }
}

#[async_trait]
impl KeywordExtractor for RakeKeywordExtractor {
    async fn extract(&self, text: &str) -> Result<Vec<String>> {
        // Phrases are runs of non-stopword words between stopwords or
        // punctuation.
        let mut phrases: Vec<Vec<String>> = Vec::new();
        let mut current: Vec<String> = Vec::new();
        for segment in text.split(|c: char| !c.is_alphanumeric() && c != ' ') {
            for word in segment.split(' ').filter(|w| !w.is_empty()) {
                let word = word.to_lowercase();
                if self.stopwords.contains(&word) {
                    if !current.is_empty() {
                        phrases.push(std::mem::take(&mut current));
                    }
                } else {
                    current.push(word);
                }
            }
            if !current.is_empty() {
                phrases.push(std::mem::take(&mut current));
            }
        }

        let mut frequency: FxHashMap<String, f64> = FxHashMap::default();
        let mut degree: FxHashMap<String, f64> = FxHashMap::default();
        for phrase in &phrases {
            let degree_share = phrase.len() as f64 - 1.0;
            for word in phrase {
                *frequency.entry(word.clone()).or_insert(0.0) += 1.0;
                *degree.entry(word.clone()).or_insert(0.0) += degree_share;
            }
        }

        let word_score = |word: &str| -> f64 {
            let freq = frequency.get(word).copied().unwrap_or(0.0);
            if freq == 0.0 {
                return 0.0;
            }
            (degree.get(word).copied().unwrap_or(0.0) + freq) / freq
        };

        let mut scored: Vec<(String, f64)> = Vec::new();
        for phrase in phrases {
            let joined = phrase.join(" ");
            if scored.iter().any(|(p, _)| *p == joined) {
                continue;
            }
            let score = phrase.iter().map(|w| word_score(w)).sum();
            scored.push((joined, score));
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut top: Vec<String> = scored.into_iter().map(|(p, _)| p).collect();
        if let Some(max) = self.max_keywords {
            top.truncate(max);
        }
        Ok(expand_with_subtokens(top, &self.stopwords))
    }
}

/// Language-model-assisted extractor.
pub struct LlmKeywordExtractor {
    llm: Arc<dyn LanguageModelService>,
    prompt: PromptTemplate,
    max_keywords: usize,
    stopwords: Arc<FxHashSet<String>>,
}

impl LlmKeywordExtractor {
    pub fn new(llm: Arc<dyn LanguageModelService>, max_keywords: usize) -> Self {
        Self {
            llm,
            prompt: query_keyword_extract_prompt(),
            max_keywords,
            stopwords: default_stopwords(),
        }
    }

    pub fn with_prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompt = prompt;
        self
    }
}

#[async_trait]
impl KeywordExtractor for LlmKeywordExtractor {
    async fn extract(&self, text: &str) -> Result<Vec<String>> {
        let max_keywords = self.max_keywords.to_string();
        let prediction = self
            .llm
            .predict(
                &self.prompt,
                &[
                    ("max_keywords", max_keywords.as_str()),
                    ("question", text),
                    ("text", text),
                ],
            )
            .await?;
        Ok(extract_keywords_from_response(
            &prediction.text,
            "KEYWORDS:",
            &self.stopwords,
        ))
    }
}
