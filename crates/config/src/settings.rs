//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{acceptance, endpoints, gate, retrieval, timeouts, validator};
use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation, warnings only
    #[default]
    Development,
    /// Staging mode - stricter validation
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if strict validation should be applied
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Runtime environment (development, staging, production)
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Candidate retrieval and fusion
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Acceptance thresholds
    #[serde(default)]
    pub acceptance: AcceptanceConfig,

    /// Domain gate
    #[serde(default)]
    pub gate: GateConfig,

    /// Relevance validator and reformulation retry
    #[serde(default)]
    pub validator: ValidatorConfig,

    /// Embedding capability
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// External judge (LLM) used by the gate and the validator
    #[serde(default)]
    pub judge: JudgeConfig,

    /// Knowledge index
    #[serde(default)]
    pub index: IndexConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Path to the lexicon file (YAML or TOML); built-in defaults when unset
    #[serde(default)]
    pub lexicon_path: Option<String>,
}

impl Settings {
    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_acceptance()?;
        self.validate_retrieval()?;
        self.validate_stages()?;
        self.validate_server()?;

        Ok(())
    }

    fn validate_acceptance(&self) -> Result<(), ConfigError> {
        let acc = &self.acceptance;

        for (field, value) in [
            ("acceptance.high", acc.high),
            ("acceptance.mid", acc.mid),
            ("acceptance.overlap_min", acc.overlap_min),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("Must be between 0.0 and 1.0, got {}", value),
                });
            }
        }

        if acc.mid > acc.high {
            return Err(ConfigError::InvalidValue {
                field: "acceptance.mid".to_string(),
                message: format!(
                    "mid ({}) must not exceed high ({})",
                    acc.mid, acc.high
                ),
            });
        }

        Ok(())
    }

    fn validate_retrieval(&self) -> Result<(), ConfigError> {
        let r = &self.retrieval;

        if r.fusion_top_k == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.fusion_top_k".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if r.dense_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.dense_limit".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if r.rrf_k < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.rrf_k".to_string(),
                message: format!("Must be non-negative, got {}", r.rrf_k),
            });
        }

        if r.lexical_field.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "retrieval.lexical_field".to_string(),
                message: "Cannot be empty".to_string(),
            });
        }

        if self.embedding.dimension == 0 {
            return Err(ConfigError::InvalidValue {
                field: "embedding.dimension".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if r.dense_limit < r.fusion_top_k {
            tracing::warn!(
                dense_limit = r.dense_limit,
                fusion_top_k = r.fusion_top_k,
                "dense_limit is below fusion_top_k; fewer candidates than K may be fused"
            );
        }

        Ok(())
    }

    fn validate_stages(&self) -> Result<(), ConfigError> {
        let timeouts = [
            ("gate.timeout_ms", self.gate.timeout_ms),
            ("validator.timeout_ms", self.validator.timeout_ms),
            ("embedding.timeout_ms", self.embedding.timeout_ms),
            ("judge.timeout_ms", self.judge.timeout_ms),
            ("index.timeout_ms", self.index.timeout_ms),
        ];

        for (field, value) in timeouts {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: "Timeout must be at least 1ms".to_string(),
                });
            }
        }

        if self.validator.max_reformulated_words == 0 {
            return Err(ConfigError::InvalidValue {
                field: "validator.max_reformulated_words".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if self.environment.is_strict() && self.index.in_memory {
            tracing::warn!("index.in_memory is enabled outside development; entries are lost on restart");
        }

        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        let server = &self.server;

        if server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }

        if server.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.timeout_seconds".to_string(),
                message: "Timeout must be at least 1 second".to_string(),
            });
        }

        if self.environment.is_production() && server.cors_enabled && server.cors_origins.is_empty()
        {
            tracing::warn!(
                "CORS is enabled in production but no origins are configured. \
                 This may block legitimate requests."
            );
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_seconds: default_timeout(),
            cors_enabled: default_true(),
            // Empty by default; list origins explicitly for production
            cors_origins: Vec::new(),
        }
    }
}

/// Which backend answers lexical `text_match` queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LexicalBackend {
    /// The knowledge index itself (payload full-text match)
    #[default]
    Index,
    /// In-process Tantivy index kept in sync by the write path
    Tantivy,
}

/// Candidate retrieval and fusion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Candidates requested from the dense path
    #[serde(default = "default_dense_limit")]
    pub dense_limit: usize,

    /// Candidates requested from the lexical path
    #[serde(default = "default_lexical_limit")]
    pub lexical_limit: usize,

    /// Candidates kept after fusion
    #[serde(default = "default_fusion_top_k")]
    pub fusion_top_k: usize,

    /// RRF offset (0 → contribution is exactly 1/(rank+1))
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,

    /// Payload field used for lexical matching
    #[serde(default = "default_lexical_field")]
    pub lexical_field: String,

    /// Lexical backend
    #[serde(default)]
    pub lexical_backend: LexicalBackend,

    /// Restrict dense retrieval to the detected category
    #[serde(default = "default_true")]
    pub category_filter_enabled: bool,
}

fn default_dense_limit() -> usize {
    retrieval::DENSE_LIMIT
}
fn default_lexical_limit() -> usize {
    retrieval::LEXICAL_LIMIT
}
fn default_fusion_top_k() -> usize {
    retrieval::FUSION_TOP_K
}
fn default_rrf_k() -> f32 {
    retrieval::RRF_K
}
fn default_lexical_field() -> String {
    retrieval::LEXICAL_FIELD.to_string()
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            dense_limit: default_dense_limit(),
            lexical_limit: default_lexical_limit(),
            fusion_top_k: default_fusion_top_k(),
            rrf_k: default_rrf_k(),
            lexical_field: default_lexical_field(),
            lexical_backend: LexicalBackend::default(),
            category_filter_enabled: true,
        }
    }
}

/// Acceptance thresholds for the confidence gate
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AcceptanceConfig {
    /// Dense score at or above which a candidate is accepted outright
    #[serde(default = "default_high")]
    pub high: f32,

    /// Lower bound of the overlap-corroboration band
    #[serde(default = "default_mid")]
    pub mid: f32,

    /// Minimum Jaccard overlap inside the band
    #[serde(default = "default_overlap_min")]
    pub overlap_min: f32,
}

fn default_high() -> f32 {
    acceptance::HIGH
}
fn default_mid() -> f32 {
    acceptance::MID
}
fn default_overlap_min() -> f32 {
    acceptance::OVERLAP_MIN
}

impl Default for AcceptanceConfig {
    fn default() -> Self {
        Self {
            high: default_high(),
            mid: default_mid(),
            overlap_min: default_overlap_min(),
        }
    }
}

/// Domain gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Call the judge when the deterministic rules are inconclusive
    #[serde(default = "default_true")]
    pub semantic_enabled: bool,

    /// Queries with at most this many tokens are rejected
    #[serde(default = "default_min_tokens")]
    pub min_tokens: usize,

    /// Judge call timeout
    #[serde(default = "default_gate_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_min_tokens() -> usize {
    gate::MIN_TOKENS
}
fn default_gate_timeout_ms() -> u64 {
    timeouts::GATE_JUDGE_MS
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            semantic_enabled: true,
            min_tokens: default_min_tokens(),
            timeout_ms: default_gate_timeout_ms(),
        }
    }
}

/// Relevance validator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Ask the judge whether the top candidate answers the question
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Retry once with the judge's reformulated question
    #[serde(default = "default_true")]
    pub reformulation_enabled: bool,

    /// Judge call timeout
    #[serde(default = "default_validator_timeout_ms")]
    pub timeout_ms: u64,

    /// Reformulated questions are truncated to this many words
    #[serde(default = "default_max_reformulated_words")]
    pub max_reformulated_words: usize,
}

fn default_validator_timeout_ms() -> u64 {
    timeouts::VALIDATOR_JUDGE_MS
}
fn default_max_reformulated_words() -> usize {
    validator::MAX_REFORMULATED_WORDS
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reformulation_enabled: true,
            timeout_ms: default_validator_timeout_ms(),
            max_reformulated_words: default_max_reformulated_words(),
        }
    }
}

/// Embedding provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Ollama `/api/embed`
    #[default]
    Ollama,
    /// Deterministic hash embedder (no model; development and tests)
    Hash,
    /// Local ONNX sentence encoder (requires the `onnx` feature)
    Onnx,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    /// Service endpoint (Ollama)
    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,

    /// Model name
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Output vector dimension
    #[serde(default = "default_vector_dim")]
    pub dimension: usize,

    /// Per-call timeout
    #[serde(default = "default_embedding_timeout_ms")]
    pub timeout_ms: u64,

    /// ONNX model file (onnx provider)
    #[serde(default)]
    pub model_path: Option<String>,

    /// tokenizer.json (onnx provider)
    #[serde(default)]
    pub tokenizer_path: Option<String>,
}

fn default_ollama_endpoint() -> String {
    endpoints::OLLAMA_DEFAULT.to_string()
}
fn default_embedding_model() -> String {
    "all-minilm".to_string()
}
fn default_vector_dim() -> usize {
    retrieval::VECTOR_DIM
}
fn default_embedding_timeout_ms() -> u64 {
    timeouts::EMBEDDING_MS
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            endpoint: default_ollama_endpoint(),
            model: default_embedding_model(),
            dimension: default_vector_dim(),
            timeout_ms: default_embedding_timeout_ms(),
            model_path: None,
            tokenizer_path: None,
        }
    }
}

/// External judge (LLM) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    /// Provider name: "ollama", "openai" or "azure"
    #[serde(default = "default_judge_provider")]
    pub provider: String,

    /// API endpoint (Ollama / Azure resource URL)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Model name (deployment name for Azure)
    #[serde(default = "default_judge_model")]
    pub model: String,

    /// API key (OpenAI / Azure)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Azure API version
    #[serde(default)]
    pub api_version: Option<String>,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_judge_max_tokens")]
    pub max_tokens: usize,

    /// HTTP timeout for one judge request
    #[serde(default = "default_judge_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_judge_provider() -> String {
    "ollama".to_string()
}
fn default_judge_model() -> String {
    "qwen2.5:7b".to_string()
}
fn default_judge_max_tokens() -> usize {
    256
}
fn default_judge_timeout_ms() -> u64 {
    timeouts::GATE_JUDGE_MS.max(timeouts::VALIDATOR_JUDGE_MS)
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            provider: default_judge_provider(),
            endpoint: None,
            model: default_judge_model(),
            api_key: None,
            api_version: None,
            temperature: 0.0,
            max_tokens: default_judge_max_tokens(),
            timeout_ms: default_judge_timeout_ms(),
        }
    }
}

/// Knowledge index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Qdrant endpoint
    #[serde(default = "default_qdrant_endpoint")]
    pub endpoint: String,

    /// Collection name
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Qdrant API key
    #[serde(default)]
    pub api_key: Option<String>,

    /// Use the in-process brute-force index instead of Qdrant
    #[serde(default)]
    pub in_memory: bool,

    /// Per-call timeout for search and text match
    #[serde(default = "default_index_timeout_ms")]
    pub timeout_ms: u64,

    /// Directory for the Tantivy lexical index (in RAM when unset)
    #[serde(default)]
    pub lexical_index_path: Option<String>,

    /// Knowledge file (YAML/JSON) loaded into the index at startup
    #[serde(default)]
    pub seed_path: Option<String>,
}

fn default_qdrant_endpoint() -> String {
    endpoints::QDRANT_DEFAULT.to_string()
}
fn default_collection() -> String {
    retrieval::COLLECTION.to_string()
}
fn default_index_timeout_ms() -> u64 {
    timeouts::INDEX_MS
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            endpoint: default_qdrant_endpoint(),
            collection: default_collection(),
            api_key: None,
            in_memory: false,
            timeout_ms: default_index_timeout_ms(),
            lexical_index_path: None,
            seed_path: None,
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Load settings from files and environment
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    // Load default config
    builder = builder.add_source(File::with_name("config/default").required(false));

    // Load environment-specific config
    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    // Load from environment variables
    builder = builder.add_source(
        Environment::with_prefix("CIVIC_QA")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 5000);
        assert_eq!(settings.retrieval.fusion_top_k, 3);
        assert_eq!(settings.retrieval.rrf_k, 0.0);
        assert!((settings.acceptance.high - 0.90).abs() < f32::EPSILON);
        assert!(settings.gate.semantic_enabled);
        assert!(settings.validator.reformulation_enabled);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_acceptance_validation() {
        let mut settings = Settings::default();
        settings.acceptance.high = 1.5;
        assert!(settings.validate().is_err());

        settings.acceptance.high = 0.85;
        settings.acceptance.mid = 0.88;
        assert!(settings.validate().is_err());

        settings.acceptance.mid = 0.80;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_retrieval_validation() {
        let mut settings = Settings::default();
        settings.retrieval.fusion_top_k = 0;
        assert!(settings.validate().is_err());

        settings.retrieval.fusion_top_k = 5;
        settings.retrieval.rrf_k = -1.0;
        assert!(settings.validate().is_err());

        settings.retrieval.rrf_k = 60.0;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_timeout_validation() {
        let mut settings = Settings::default();
        settings.gate.timeout_ms = 0;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("gate.timeout_ms"));
    }

    #[test]
    fn test_reformulation_cap_validation() {
        let mut settings = Settings::default();
        settings.validator.max_reformulated_words = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_server_validation() {
        let mut settings = Settings::default();
        settings.server.port = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial_yaml() {
        let yaml = r#"
acceptance:
  high: 0.88
retrieval:
  lexical_backend: tantivy
embedding:
  provider: hash
  dimension: 64
"#;
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        assert!((settings.acceptance.high - 0.88).abs() < f32::EPSILON);
        assert!((settings.acceptance.mid - 0.80).abs() < f32::EPSILON);
        assert_eq!(settings.retrieval.lexical_backend, LexicalBackend::Tantivy);
        assert_eq!(settings.embedding.provider, EmbeddingProvider::Hash);
        assert_eq!(settings.embedding.dimension, 64);
        assert_eq!(settings.retrieval.fusion_top_k, 3);
    }
}
