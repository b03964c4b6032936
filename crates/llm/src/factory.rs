//! LLM Factory - Provider Abstraction Layer
//!
//! Creates judge backends from configuration.
//!
//! ## Supported Providers
//! - **Ollama**: local models (default)
//! - **OpenAI**: OpenAI API or any OpenAI-compatible server
//! - **Azure OpenAI**: Azure-hosted deployments
//!
//! ## Example
//! ```ignore
//! let config = LlmProviderConfig::from_judge_config(&settings.judge)?;
//! let judge = LlmFactory::create(&config)?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use civic_qa_config::JudgeConfig;
use civic_qa_core::Judge;

use crate::{
    adapter::JudgeAdapter,
    backend::{LlmBackend, LlmConfig, OllamaBackend, OpenAIBackend, OpenAIConfig},
    LlmError,
};

const DEFAULT_AZURE_API_VERSION: &str = "2024-02-01";

/// LLM provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    /// Ollama - local models
    #[default]
    Ollama,
    /// OpenAI or OpenAI-compatible server
    OpenAI,
    /// Azure OpenAI - Azure-hosted GPT models
    AzureOpenAI,
}

impl LlmProvider {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ollama" | "local" => Some(LlmProvider::Ollama),
            "openai" | "gpt" => Some(LlmProvider::OpenAI),
            "azure" | "azure-openai" => Some(LlmProvider::AzureOpenAI),
            _ => None,
        }
    }
}

/// Unified LLM provider configuration
#[derive(Debug, Clone)]
pub struct LlmProviderConfig {
    /// Provider type
    pub provider: LlmProvider,
    /// API key (OpenAI/Azure)
    pub api_key: Option<String>,
    /// API endpoint (Ollama/Azure, or a custom OpenAI-compatible server)
    pub endpoint: Option<String>,
    /// Model name or deployment
    pub model: String,
    /// Maximum tokens to generate
    pub max_tokens: usize,
    /// Temperature
    pub temperature: f32,
    /// HTTP timeout for a single request
    pub timeout: Duration,
    /// Azure API version (Azure OpenAI only)
    pub azure_api_version: Option<String>,
}

impl Default for LlmProviderConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Ollama,
            api_key: None,
            endpoint: None,
            model: "qwen2.5:7b".to_string(),
            max_tokens: 256,
            temperature: 0.0,
            timeout: Duration::from_secs(10),
            azure_api_version: None,
        }
    }
}

impl LlmProviderConfig {
    /// Build from the `judge` settings section
    pub fn from_judge_config(judge: &JudgeConfig) -> Result<Self, LlmError> {
        let provider = LlmProvider::parse(&judge.provider).ok_or_else(|| {
            LlmError::Configuration(format!("Unknown judge provider '{}'", judge.provider))
        })?;

        Ok(Self {
            provider,
            api_key: judge.api_key.clone(),
            endpoint: judge.endpoint.clone(),
            model: judge.model.clone(),
            max_tokens: judge.max_tokens,
            temperature: judge.temperature,
            timeout: Duration::from_millis(judge.timeout_ms),
            azure_api_version: judge.api_version.clone(),
        })
    }

    /// Create Ollama config
    pub fn ollama(model: impl Into<String>) -> Self {
        Self {
            provider: LlmProvider::Ollama,
            endpoint: Some("http://localhost:11434".to_string()),
            model: model.into(),
            ..Default::default()
        }
    }

    /// Create OpenAI config
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            api_key: Some(api_key.into()),
            model: model.into(),
            ..Default::default()
        }
    }

    /// Create Azure OpenAI config
    pub fn azure(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        deployment: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            provider: LlmProvider::AzureOpenAI,
            api_key: Some(api_key.into()),
            endpoint: Some(endpoint.into()),
            model: deployment.into(),
            azure_api_version: Some(api_version.into()),
            ..Default::default()
        }
    }

    /// Set endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Factory for creating LLM backends
pub struct LlmFactory;

impl LlmFactory {
    /// Create a Judge from config (implements core trait)
    pub fn create(config: &LlmProviderConfig) -> Result<Arc<dyn Judge>, LlmError> {
        let backend = Self::create_backend(config)?;
        Ok(Arc::new(JudgeAdapter::from_arc(backend)))
    }

    /// Create a raw LlmBackend
    pub fn create_backend(config: &LlmProviderConfig) -> Result<Arc<dyn LlmBackend>, LlmError> {
        match config.provider {
            LlmProvider::Ollama => {
                let endpoint = config
                    .endpoint
                    .clone()
                    .unwrap_or_else(|| "http://localhost:11434".to_string());

                let ollama_config = LlmConfig {
                    model: config.model.clone(),
                    endpoint,
                    max_tokens: config.max_tokens,
                    temperature: config.temperature,
                    timeout: config.timeout,
                    ..Default::default()
                };

                Ok(Arc::new(OllamaBackend::new(ollama_config)?))
            }

            LlmProvider::OpenAI => {
                let api_key = config
                    .api_key
                    .clone()
                    .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                    .ok_or_else(|| {
                        LlmError::Configuration("OpenAI requires OPENAI_API_KEY".to_string())
                    })?;

                let mut openai_config = OpenAIConfig::openai(api_key, &config.model);
                if let Some(endpoint) = &config.endpoint {
                    openai_config.endpoint = endpoint.clone();
                }
                openai_config.max_tokens = config.max_tokens;
                openai_config.temperature = config.temperature;
                openai_config.timeout = config.timeout;

                Ok(Arc::new(OpenAIBackend::new(openai_config)?))
            }

            LlmProvider::AzureOpenAI => {
                let endpoint = config.endpoint.clone().ok_or_else(|| {
                    LlmError::Configuration("Azure OpenAI requires endpoint".to_string())
                })?;
                let api_key = config.api_key.clone().ok_or_else(|| {
                    LlmError::Configuration("Azure OpenAI requires api_key".to_string())
                })?;
                let api_version = config
                    .azure_api_version
                    .clone()
                    .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string());

                let mut azure_config =
                    OpenAIConfig::azure(endpoint, api_key, &config.model, api_version);
                azure_config.max_tokens = config.max_tokens;
                azure_config.temperature = config.temperature;
                azure_config.timeout = config.timeout;

                Ok(Arc::new(OpenAIBackend::new(azure_config)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse() {
        assert_eq!(LlmProvider::parse("Ollama"), Some(LlmProvider::Ollama));
        assert_eq!(LlmProvider::parse("openai"), Some(LlmProvider::OpenAI));
        assert_eq!(LlmProvider::parse("azure"), Some(LlmProvider::AzureOpenAI));
        assert_eq!(LlmProvider::parse("claude"), None);
    }

    #[test]
    fn test_from_judge_config() {
        let judge = JudgeConfig {
            provider: "azure".to_string(),
            endpoint: Some("https://r.openai.azure.com".to_string()),
            api_key: Some("k".to_string()),
            timeout_ms: 1500,
            ..JudgeConfig::default()
        };
        let config = LlmProviderConfig::from_judge_config(&judge).unwrap();
        assert_eq!(config.provider, LlmProvider::AzureOpenAI);
        assert_eq!(config.timeout, Duration::from_millis(1500));

        let judge = JudgeConfig {
            provider: "bard".to_string(),
            ..JudgeConfig::default()
        };
        assert!(matches!(
            LlmProviderConfig::from_judge_config(&judge),
            Err(LlmError::Configuration(_))
        ));
    }

    #[test]
    fn test_create_ollama_judge() {
        let config = LlmProviderConfig::ollama("qwen2.5:7b").with_endpoint("http://custom:11434");
        let judge = LlmFactory::create(&config).unwrap();
        assert_eq!(judge.name(), "llm:qwen2.5:7b");
    }

    #[test]
    fn test_azure_requires_endpoint() {
        let config = LlmProviderConfig {
            provider: LlmProvider::AzureOpenAI,
            api_key: Some("k".to_string()),
            ..Default::default()
        };
        assert!(LlmFactory::create_backend(&config).is_err());

        let config = LlmProviderConfig::azure("https://r.openai.azure.com", "k", "gpt", "2024-02-01");
        assert!(LlmFactory::create_backend(&config).is_ok());
    }
}
