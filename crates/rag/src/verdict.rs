//! Judge call plumbing
//!
//! The external judge answers in free text that should contain one JSON
//! object. Everything here either yields a parsed verdict or an error the
//! caller turns into its permissive default.

use std::time::Duration;

use civic_qa_core::Judge;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::RagError;

/// The outermost `{...}` span: first `{` through last `}`
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Extract and deserialize the JSON object embedded in `text`
pub fn parse_verdict<T: DeserializeOwned>(text: &str) -> Result<T, RagError> {
    let json = extract_json_object(text)
        .ok_or_else(|| RagError::Judge("no JSON object in judge response".to_string()))?;
    serde_json::from_str(json)
        .map_err(|e| RagError::Judge(format!("failed to parse judge response: {}", e)))
}

/// One judge call bounded by `timeout`
pub async fn call_judge(
    judge: &dyn Judge,
    instructions: &str,
    input: &str,
    timeout: Duration,
) -> Result<String, RagError> {
    match tokio::time::timeout(timeout, judge.complete(instructions, input)).await {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(RagError::Judge(e.to_string())),
        Err(_) => Err(RagError::Timeout(format!(
            "judge '{}' after {}ms",
            judge.name(),
            timeout.as_millis()
        ))),
    }
}

/// Pre-filter answer: is the question in scope?
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GateVerdict {
    pub valid: bool,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub suggestion: String,
    #[serde(default)]
    pub clean_question: String,
}

/// Post-check answer: does the top candidate answer the question?
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RelevanceVerdict {
    pub relevant: bool,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub reformulated_question: Option<String>,
}
