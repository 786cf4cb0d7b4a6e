//! Query-side data model: bundles, modes, and per-index configuration

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::index::{IndexKind, IndexStruct};
use crate::service::{agg_embedding_from_queries, EmbeddingService, SimilarityMode};
use crate::synth::ResponseMode;

/// Retrieval mode applied to an index structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// The index variant's natural strategy: embedding ranking for vector
    /// indices, LLM keyword extraction for keyword tables, full traversal
    /// for lists.
    #[default]
    Default,
    /// Embedding ranking over a list index.
    Embedding,
    /// Frequency-based keyword extraction.
    Simple,
    /// RAKE-style keyword extraction.
    Rake,
}

impl std::fmt::Display for QueryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            QueryMode::Default => "default",
            QueryMode::Embedding => "embedding",
            QueryMode::Simple => "simple",
            QueryMode::Rake => "rake",
        };
        write!(f, "{}", name)
    }
}

/// One query's text, embedding-string variants, and lazily computed
/// embedding. Owned by a single retrieval + synthesis cycle.
#[derive(Debug, Clone)]
pub struct QueryBundle {
    pub query_str: String,
    pub custom_embedding_strs: Option<Vec<String>>,
    pub embedding: Option<Vec<f32>>,
}

impl QueryBundle {
    pub fn new(query_str: impl Into<String>) -> Self {
        Self {
            query_str: query_str.into(),
            custom_embedding_strs: None,
            embedding: None,
        }
    }

    pub fn with_embedding_strs(mut self, strs: Vec<String>) -> Self {
        self.custom_embedding_strs = Some(strs);
        self
    }

    /// The strings actually embedded; defaults to the query itself.
    pub fn embedding_strs(&self) -> Vec<String> {
        match &self.custom_embedding_strs {
            Some(strs) => strs.clone(),
            None => vec![self.query_str.clone()],
        }
    }

    /// Compute the query embedding once (mean-aggregated over the
    /// embedding strings) and cache it on the bundle.
    pub async fn resolve_embedding(&mut self, embed: &dyn EmbeddingService) -> Result<Vec<f32>> {
        if let Some(embedding) = &self.embedding {
            return Ok(embedding.clone());
        }
        let strs = self.embedding_strs();
        let embedding = agg_embedding_from_queries(embed, &strs).await?;
        self.embedding = Some(embedding.clone());
        Ok(embedding)
    }
}

impl From<&str> for QueryBundle {
    fn from(query: &str) -> Self {
        QueryBundle::new(query)
    }
}

impl From<String> for QueryBundle {
    fn from(query: String) -> Self {
        QueryBundle::new(query)
    }
}

/// Retrieval and synthesis parameters for one index kind or one specific
/// index id.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub index_kind: IndexKind,
    pub query_mode: QueryMode,
    /// When set, this config only applies to the index with this id.
    pub index_id: Option<String>,
    pub similarity_top_k: usize,
    pub similarity_mode: SimilarityMode,
    pub similarity_cutoff: Option<f32>,
    pub num_chunks_per_query: usize,
    pub max_keywords_per_query: usize,
    pub required_keywords: Vec<String>,
    pub exclude_keywords: Vec<String>,
    pub response_mode: ResponseMode,
}

impl QueryConfig {
    pub fn new(index_kind: IndexKind, query_mode: QueryMode) -> Self {
        let defaults = RetrievalConfig::default();
        Self {
            index_kind,
            query_mode,
            index_id: None,
            similarity_top_k: defaults.similarity_top_k,
            similarity_mode: SimilarityMode::default(),
            similarity_cutoff: None,
            num_chunks_per_query: defaults.num_chunks_per_query,
            max_keywords_per_query: defaults.max_keywords_per_query,
            required_keywords: Vec::new(),
            exclude_keywords: Vec::new(),
            response_mode: ResponseMode::default(),
        }
    }

    pub fn for_index_id(mut self, index_id: impl Into<String>) -> Self {
        self.index_id = Some(index_id.into());
        self
    }

    pub fn with_similarity_top_k(mut self, top_k: usize) -> Self {
        self.similarity_top_k = top_k;
        self
    }

    pub fn with_similarity_mode(mut self, mode: SimilarityMode) -> Self {
        self.similarity_mode = mode;
        self
    }

    pub fn with_similarity_cutoff(mut self, cutoff: f32) -> Self {
        self.similarity_cutoff = Some(cutoff);
        self
    }

    pub fn with_num_chunks_per_query(mut self, n: usize) -> Self {
        self.num_chunks_per_query = n;
        self
    }

    pub fn with_max_keywords_per_query(mut self, n: usize) -> Self {
        self.max_keywords_per_query = n;
        self
    }

    pub fn with_required_keywords(mut self, keywords: Vec<String>) -> Self {
        self.required_keywords = keywords;
        self
    }

    pub fn with_exclude_keywords(mut self, keywords: Vec<String>) -> Self {
        self.exclude_keywords = keywords;
        self
    }

    pub fn with_response_mode(mut self, mode: ResponseMode) -> Self {
        self.response_mode = mode;
        self
    }
}

/// Resolves the config for an index: by id first, then by kind, then the
/// hard-coded default.
#[derive(Debug, Default, Clone)]
pub struct QueryConfigMap {
    by_id: FxHashMap<String, QueryConfig>,
    by_kind: FxHashMap<IndexKind, QueryConfig>,
}

impl QueryConfigMap {
    pub fn from_configs(configs: Vec<QueryConfig>) -> Self {
        let mut map = Self::default();
        for config in configs {
            if let Some(id) = config.index_id.clone() {
                map.by_id.insert(id, config);
            } else {
                map.by_kind.insert(config.index_kind, config);
            }
        }
        map
    }

    pub fn resolve(&self, index: &IndexStruct) -> QueryConfig {
        if let Some(config) = self.by_id.get(index.index_id()) {
            return config.clone();
        }
        if let Some(config) = self.by_kind.get(&index.kind()) {
            return config.clone();
        }
        QueryConfig::new(index.kind(), QueryMode::Default)
    }
}
