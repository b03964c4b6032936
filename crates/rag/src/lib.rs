//! Hybrid retrieval and confidence pipeline
//!
//! Features:
//! - Query normalization, tokenization and Jaccard overlap
//! - Keyword category detection and an in/out-of-scope domain gate
//! - Dense vector search via Qdrant, lexical match via Qdrant full-text or Tantivy
//! - Reciprocal Rank Fusion of the two candidate lists
//! - Tiered acceptance (dense score, corroborated by lexical overlap)
//! - Relevance validation with a single reformulation retry
//! - Knowledge sync (add/update/delete/bulk) fanned out to every index
//!
//! Advisory stages (semantic gate, relevance validator) fail open; mandatory
//! stages (embedding, dense search) surface as errors.

pub mod classifier;
pub mod confidence;
pub mod domain_gate;
pub mod embeddings;
pub mod fusion;
pub mod knowledge_loader;
pub mod memory_index;
pub mod normalizer;
pub mod ollama_embeddings;
pub mod pipeline;
pub mod response;
pub mod retriever;
pub mod sparse_search;
pub mod sync;
pub mod validator;
pub mod vector_store;
pub mod verdict;

pub use classifier::CategoryClassifier;
pub use confidence::{AcceptanceNote, Candidate, ConfidenceGate, GateOutcome};
pub use domain_gate::{DomainGate, DomainGateConfig, GateDecision, GateSource};
#[cfg(feature = "onnx")]
pub use embeddings::OnnxEmbedder;
pub use embeddings::{EmbeddingConfig, HashEmbedder};
pub use fusion::{FusedCandidate, FusionRanker};
pub use knowledge_loader::{KnowledgeFile, KnowledgeLoader};
pub use memory_index::InMemoryIndex;
pub use normalizer::{truncate_for_log, QueryNormalizer};
pub use ollama_embeddings::{OllamaEmbedder, OllamaEmbeddingConfig};
pub use pipeline::{PipelineConfig, QueryContext, SearchPipeline, SearchRequest};
pub use response::{
    AiDebug, RejectedCandidate, ResultItem, SearchData, SearchMetadata, SearchOutcome,
    StageTimings, Thresholds,
};
pub use retriever::{CandidateRetriever, RetrievalOutcome, RetrieverConfig};
pub use sparse_search::{SparseConfig, SparseIndex};
pub use sync::KnowledgeSync;
pub use validator::{RelevanceValidator, ValidationVerdict, ValidatorSettings};
pub use vector_store::{VectorDistance, VectorStore, VectorStoreConfig};

use thiserror::Error;

/// RAG errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RagError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Judge error: {0}")]
    Judge(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RagError {
    /// Stable snake_case kind reported in error envelopes
    pub fn kind(&self) -> &'static str {
        match self {
            RagError::Embedding(_) => "embedding",
            RagError::VectorStore(_) => "vector_store",
            RagError::Search(_) => "search",
            RagError::Model(_) => "model",
            RagError::Index(_) => "index",
            RagError::Timeout(_) => "timeout",
            RagError::InvalidInput(_) => "invalid_input",
            RagError::Judge(_) => "judge",
            RagError::Connection(_) => "connection",
            RagError::Config(_) => "config",
        }
    }
}

impl From<RagError> for civic_qa_core::Error {
    fn from(err: RagError) -> Self {
        use civic_qa_core::Error;
        match err {
            RagError::Embedding(m) | RagError::Model(m) => Error::Embedding(m),
            RagError::VectorStore(m)
            | RagError::Search(m)
            | RagError::Index(m)
            | RagError::Connection(m) => Error::Index(m),
            RagError::Timeout(m) => Error::Timeout(m),
            RagError::InvalidInput(m) => Error::InvalidInput(m),
            RagError::Judge(m) => Error::Llm(m),
            RagError::Config(m) => Error::Config(m),
        }
    }
}

impl From<civic_qa_config::ConfigError> for RagError {
    fn from(err: civic_qa_config::ConfigError) -> Self {
        RagError::Config(err.to_string())
    }
}
