//! Configuration management for the civic knowledge-base assistant
//!
//! Supports loading configuration from:
//! - YAML/TOML files (`config/default`, `config/{env}`)
//! - Environment variables (CIVIC_QA_ prefix, `__` separator)
//!
//! The lexicon (categories, stopwords, boilerplate phrases, gate word lists)
//! is static reference data loaded once at startup via [`Lexicon::load`].

pub mod constants;
pub mod lexicon;
pub mod settings;

pub use lexicon::Lexicon;
pub use settings::{
    load_settings, AcceptanceConfig, EmbeddingConfig, EmbeddingProvider, GateConfig, IndexConfig,
    JudgeConfig, LexicalBackend, ObservabilityConfig, RetrievalConfig, RuntimeEnvironment,
    ServerConfig, Settings, ValidatorConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for civic_qa_core::Error {
    fn from(err: ConfigError) -> Self {
        civic_qa_core::Error::Config(err.to_string())
    }
}
