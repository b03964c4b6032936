//! Centralized constants for the assistant
//!
//! Single source of truth for default values. Settings defaults, component
//! configs and tests all read from here instead of repeating literals.

/// Service endpoints (defaults for local development)
pub mod endpoints {
    /// Ollama endpoint (embeddings and local judge model)
    pub const OLLAMA_DEFAULT: &str = "http://localhost:11434";

    /// Qdrant vector store endpoint
    pub const QDRANT_DEFAULT: &str = "http://127.0.0.1:6334";

    /// OpenAI API endpoint
    pub const OPENAI_DEFAULT: &str = "https://api.openai.com/v1";
}

/// Timeouts (in milliseconds)
pub mod timeouts {
    /// Embedding call timeout
    pub const EMBEDDING_MS: u64 = 5_000;

    /// Dense / lexical index call timeout
    pub const INDEX_MS: u64 = 5_000;

    /// Pre-filter (domain gate) judge call timeout
    pub const GATE_JUDGE_MS: u64 = 4_000;

    /// Post-check (relevance validator) judge call timeout
    pub const VALIDATOR_JUDGE_MS: u64 = 4_000;

    /// Readiness probe timeout
    pub const READINESS_PROBE_MS: u64 = 2_000;
}

/// Acceptance policy defaults
///
/// These were tuned repeatedly and are deployment configuration, not a
/// behavioural contract.
pub mod acceptance {
    /// Dense similarity at or above which a candidate is accepted outright
    pub const HIGH: f32 = 0.90;

    /// Lower bound of the band where lexical overlap must corroborate
    pub const MID: f32 = 0.80;

    /// Minimum Jaccard overlap required inside the corroboration band
    pub const OVERLAP_MIN: f32 = 0.25;
}

/// Retrieval defaults
pub mod retrieval {
    /// Candidates requested from the dense path
    pub const DENSE_LIMIT: usize = 10;

    /// Candidates requested from the lexical path
    pub const LEXICAL_LIMIT: usize = 10;

    /// Candidates kept after fusion (K)
    pub const FUSION_TOP_K: usize = 3;

    /// RRF offset; 0 gives a contribution of exactly 1/(rank+1)
    pub const RRF_K: f32 = 0.0;

    /// Payload field used for lexical matching
    pub const LEXICAL_FIELD: &str = "question";

    /// Default vector dimension (MiniLM-class sentence encoders)
    pub const VECTOR_DIM: usize = 384;

    /// Default collection name
    pub const COLLECTION: &str = "knowledge_bank";
}

/// Domain gate defaults
pub mod gate {
    /// Queries with at most this many tokens are rejected
    pub const MIN_TOKENS: usize = 2;
}

/// Relevance validator defaults
pub mod validator {
    /// Reformulated questions are cut to this many words
    pub const MAX_REFORMULATED_WORDS: usize = 12;
}
