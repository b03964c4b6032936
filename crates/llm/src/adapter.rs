//! Judge adapter
//!
//! Bridges the LlmBackend trait to the core `Judge` trait so any backend
//! can serve as the external classifier used by the domain gate and the
//! relevance validator.

use std::sync::Arc;

use async_trait::async_trait;
use civic_qa_core::{Error, Judge, Result};

use crate::backend::{FinishReason, LlmBackend};
use crate::prompt::Message;

/// Adapter that wraps an LlmBackend to implement the core Judge trait.
///
/// Instructions go out as the system message, the input as the user message.
///
/// # Example
///
/// ```ignore
/// let backend = OllamaBackend::new(config)?;
/// let judge: Arc<dyn Judge> = Arc::new(JudgeAdapter::new(backend));
/// ```
pub struct JudgeAdapter {
    backend: Arc<dyn LlmBackend>,
    name: String,
}

impl JudgeAdapter {
    /// Create a new adapter wrapping an LlmBackend
    pub fn new<B: LlmBackend + 'static>(backend: B) -> Self {
        Self::from_arc(Arc::new(backend))
    }

    /// Create from an Arc'd backend
    pub fn from_arc(backend: Arc<dyn LlmBackend>) -> Self {
        let name = format!("llm:{}", backend.model_name());
        Self { backend, name }
    }

    fn build_messages(instructions: &str, input: &str) -> Vec<Message> {
        vec![Message::system(instructions), Message::user(input)]
    }
}

#[async_trait]
impl Judge for JudgeAdapter {
    async fn complete(&self, instructions: &str, input: &str) -> Result<String> {
        let messages = Self::build_messages(instructions, input);

        let result = self
            .backend
            .generate(&messages)
            .await
            .map_err(|e| Error::Llm(format!("judge generation failed: {}", e)))?;

        if result.finish_reason == FinishReason::Length {
            tracing::debug!(
                model = self.backend.model_name(),
                tokens = result.tokens,
                "Judge response truncated at max_tokens"
            );
        }

        Ok(result.text)
    }

    async fn is_available(&self) -> bool {
        self.backend.is_available().await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
