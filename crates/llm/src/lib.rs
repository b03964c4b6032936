//! LLM integration for the external judge
//!
//! Features:
//! - Ollama and OpenAI-compatible (incl. Azure) backends
//! - Retry with exponential backoff on transient network failures
//! - `JudgeAdapter` exposing any backend through the core `Judge` trait

pub mod adapter;
pub mod backend;
pub mod factory;
pub mod prompt;

pub use adapter::JudgeAdapter;
pub use backend::{
    FinishReason, GenerationResult, LlmBackend, LlmConfig, OllamaBackend, OpenAIBackend,
    OpenAIConfig,
};
pub use factory::{LlmFactory, LlmProvider, LlmProviderConfig};
pub use prompt::{Message, Role};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for civic_qa_core::Error {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout => civic_qa_core::Error::Timeout("LLM request".to_string()),
            other => civic_qa_core::Error::Llm(other.to_string()),
        }
    }
}
