//! Configuration file support
//!
//! Config file location: ~/.config/lodestone/config.toml
//!
//! Example config:
//! ```toml
//! [model]
//! max_input_size = 4096
//! num_output = 256
//!
//! [splitter]
//! chunk_size = 3900
//! chunk_overlap = 200
//!
//! [retrieval]
//! similarity_top_k = 1
//! num_chunks_per_query = 10
//! max_keywords_per_query = 10
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Hard cap on chunk overlap, matching common model windows.
pub const MAX_CHUNK_OVERLAP: usize = 200;
/// Default token budget for a chunk when no prompt sizing applies.
pub const MAX_CHUNK_SIZE: usize = 3900;
/// Default tokens reserved for model output.
pub const NUM_OUTPUTS: usize = 256;
/// Default model input window when the provider reports none.
pub const DEFAULT_MAX_INPUT_SIZE: usize = 4096;
/// Safety padding subtracted from every computed chunk budget.
pub const DEFAULT_PADDING: usize = 1;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub splitter: SplitterConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

/// Model window configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Maximum input window in tokens.
    #[serde(default = "default_max_input_size")]
    pub max_input_size: usize,

    /// Tokens reserved for model output.
    #[serde(default = "default_num_output")]
    pub num_output: usize,

    /// Optional chunk-size ceiling applied on top of prompt sizing.
    pub chunk_size_limit: Option<usize>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            max_input_size: default_max_input_size(),
            num_output: default_num_output(),
            chunk_size_limit: None,
        }
    }
}

fn default_max_input_size() -> usize {
    DEFAULT_MAX_INPUT_SIZE
}

fn default_num_output() -> usize {
    NUM_OUTPUTS
}

/// Text splitter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitterConfig {
    /// Chunk size in tokens.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Chunk overlap in tokens.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    MAX_CHUNK_SIZE
}

fn default_chunk_overlap() -> usize {
    MAX_CHUNK_OVERLAP
}

/// Retrieval defaults applied when a query config does not override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Top-K for vector retrieval.
    #[serde(default = "default_similarity_top_k")]
    pub similarity_top_k: usize,

    /// Top-N node count for keyword retrieval.
    #[serde(default = "default_num_chunks_per_query")]
    pub num_chunks_per_query: usize,

    /// Maximum keywords extracted from a query.
    #[serde(default = "default_max_keywords_per_query")]
    pub max_keywords_per_query: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_top_k: default_similarity_top_k(),
            num_chunks_per_query: default_num_chunks_per_query(),
            max_keywords_per_query: default_max_keywords_per_query(),
        }
    }
}

fn default_similarity_top_k() -> usize {
    1
}

fn default_num_chunks_per_query() -> usize {
    10
}

fn default_max_keywords_per_query() -> usize {
    10
}

impl EngineConfig {
    /// Get the config file path.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lodestone")
            .join("config.toml")
    }

    /// Load config from file, returning defaults if not found.
    pub fn load() -> Self {
        let path = Self::config_path();
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => {
                        tracing::debug!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file: {}", e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config file: {}", e);
                }
            }
        }
        Self::default()
    }

    /// Save config to file.
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.model.max_input_size, 4096);
        assert_eq!(config.splitter.chunk_size, 3900);
        assert_eq!(config.retrieval.similarity_top_k, 1);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[model]
max_input_size = 8192

[splitter]
chunk_size = 512
chunk_overlap = 64
"#;
        let config: EngineConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.model.max_input_size, 8192);
        assert_eq!(config.model.num_output, 256);
        assert_eq!(config.splitter.chunk_size, 512);
        assert_eq!(config.splitter.chunk_overlap, 64);
    }
}
