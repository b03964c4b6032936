//! Embedding capability

use async_trait::async_trait;

use crate::Result;

/// Text embedding interface
///
/// Implementations must be deterministic for a fixed model version and
/// input, and always return vectors of `dim()` length.
///
/// # Example
///
/// ```ignore
/// let embedder: Arc<dyn TextEmbedder> = Arc::new(OllamaEmbedder::new(config)?);
/// let vector = embedder.embed("Bagaimana cara membuat KTP?").await?;
/// assert_eq!(vector.len(), embedder.dim());
/// ```
#[async_trait]
pub trait TextEmbedder: Send + Sync + 'static {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, preserving order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    /// Output dimension
    fn dim(&self) -> usize;

    /// Model name for logging
    fn model_name(&self) -> &str;
}
