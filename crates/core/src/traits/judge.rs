//! External judge / text-classification capability

use async_trait::async_trait;

use crate::Result;

/// A text-classification service driven by natural-language instructions.
///
/// The response is free-form text that is expected to contain a JSON
/// object somewhere inside it. Callers extract and parse that object
/// themselves; this trait only moves text.
#[async_trait]
pub trait Judge: Send + Sync + 'static {
    /// Run `instructions` against `input` and return the raw response text
    async fn complete(&self, instructions: &str, input: &str) -> Result<String>;

    /// Check whether the backing service is reachable
    async fn is_available(&self) -> bool {
        true
    }

    /// Judge name for logging
    fn name(&self) -> &str;
}
