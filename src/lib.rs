//! Lodestone - retrieval-augmented query engine
//!
//! Builds retrieval indexes over text nodes, retrieves the nodes most
//! relevant to a natural-language query, and synthesizes an answer by
//! iteratively feeding retrieved text through a language model under a
//! strict token budget.
//!
//! The pipeline, leaves first: a token-aware [`split::TokenTextSplitter`]
//! and the [`prompt::PromptHelper`] budget arithmetic; the
//! [`index::IndexStruct`] variants (vector, list, keyword table, composite
//! graph); one [`retrieve::Retriever`] strategy per variant; the
//! get-then-refine [`synth::ResponseSynthesizer`]; and the
//! [`query::QueryOrchestrator`], which ties them together and recurses
//! through composite graphs. Model backends plug in through the
//! [`service::LanguageModelService`] and [`service::EmbeddingService`]
//! traits.

pub mod config;
pub mod docstore;
pub mod error;
pub mod index;
pub mod node;
pub mod prompt;
pub mod query;
pub mod retrieve;
pub mod service;
pub mod split;
pub mod synth;

pub use config::EngineConfig;
pub use docstore::DocumentStore;
pub use error::{CapabilityErrorKind, EngineError, Result};
pub use index::{IndexBuilder, IndexKind, IndexSnapshot, IndexStruct};
pub use node::{Node, NodeVariant, NodeWithScore, Relationship};
pub use query::{
    MultiStepOptions, QueryBundle, QueryCombiner, QueryConfig, QueryMode, QueryOrchestrator,
    StepDecomposeTransform,
};
pub use service::{EmbeddingService, LanguageModelService, ServiceContext, SimilarityMode};
pub use synth::{Response, ResponseMode, ResponseSynthesizer};
