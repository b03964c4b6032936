//! Text Embeddings
//!
//! Local embedders behind the core `TextEmbedder` trait:
//! - `HashEmbedder`: deterministic, model-free; development and tests
//! - `OnnxEmbedder` (feature `onnx`): sentence encoder with mean pooling

#[cfg(feature = "onnx")]
use std::path::Path;
#[cfg(feature = "onnx")]
use std::sync::Arc;

use async_trait::async_trait;
use civic_qa_core::{Result as CoreResult, TextEmbedder};
#[cfg(feature = "onnx")]
use ndarray::Array2;
#[cfg(feature = "onnx")]
use ort::{session::builder::GraphOptimizationLevel, session::Session, value::Tensor};
#[cfg(feature = "onnx")]
use parking_lot::Mutex;
#[cfg(feature = "onnx")]
use tokenizers::Tokenizer;

#[cfg(feature = "onnx")]
use crate::RagError;

/// Embedding configuration
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Maximum sequence length
    pub max_seq_len: usize,
    /// Embedding dimension
    pub embedding_dim: usize,
    /// L2-normalize embeddings
    pub normalize: bool,
    /// Batch size for bulk embedding
    pub batch_size: usize,
    /// ONNX output tensor holding token embeddings
    pub output_name: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            max_seq_len: 256,
            embedding_dim: civic_qa_config::constants::retrieval::VECTOR_DIM,
            normalize: true,
            batch_size: 32,
            output_name: "last_hidden_state".to_string(),
        }
    }
}

fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Hash-based bag-of-words embedder (no model required)
///
/// Each lowercased word is hashed (FNV-1a) into a bucket, so texts sharing
/// words get a positive cosine similarity. Deterministic across processes.
pub struct HashEmbedder {
    config: EmbeddingConfig,
    name: String,
}

impl HashEmbedder {
    pub fn new(config: EmbeddingConfig) -> Self {
        let name = format!("hash-{}", config.embedding_dim);
        Self { config, name }
    }

    pub fn with_dim(dim: usize) -> Self {
        Self::new(EmbeddingConfig {
            embedding_dim: dim,
            ..EmbeddingConfig::default()
        })
    }

    fn fnv1a(word: &str) -> u64 {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in word.as_bytes() {
            hash ^= *byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        hash
    }

    /// Generate the embedding synchronously
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let dim = self.config.embedding_dim.max(1);
        let mut embedding = vec![0.0f32; dim];

        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let idx = (Self::fnv1a(word) % dim as u64) as usize;
            embedding[idx] += 1.0;
        }

        if self.config.normalize {
            l2_normalize(&mut embedding);
        }

        embedding
    }
}

#[async_trait]
impl TextEmbedder for HashEmbedder {
    async fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dim(&self) -> usize {
        self.config.embedding_dim
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

/// Sentence encoder running an ONNX model
#[cfg(feature = "onnx")]
pub struct OnnxEmbedder {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    config: EmbeddingConfig,
    name: String,
}

#[cfg(feature = "onnx")]
impl OnnxEmbedder {
    /// Load model and tokenizer
    pub fn new(
        model_path: impl AsRef<Path>,
        tokenizer_path: impl AsRef<Path>,
        config: EmbeddingConfig,
    ) -> Result<Self, RagError> {
        let name = model_path
            .as_ref()
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("onnx")
            .to_string();

        let session = Session::builder()
            .map_err(|e| RagError::Model(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| RagError::Model(e.to_string()))?
            .with_intra_threads(2)
            .map_err(|e| RagError::Model(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| RagError::Model(e.to_string()))?;

        let tokenizer =
            Tokenizer::from_file(tokenizer_path).map_err(|e| RagError::Model(e.to_string()))?;

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            config,
            name,
        })
    }

    fn embed_blocking(
        session: &Mutex<Session>,
        tokenizer: &Tokenizer,
        config: &EmbeddingConfig,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, RagError> {
        let mut all = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(config.batch_size.max(1)) {
            all.extend(Self::embed_chunk(session, tokenizer, config, chunk)?);
        }
        Ok(all)
    }

    fn embed_chunk(
        session: &Mutex<Session>,
        tokenizer: &Tokenizer,
        config: &EmbeddingConfig,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>, RagError> {
        let batch_size = texts.len();
        let seq = config.max_seq_len;

        let encodings = tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| RagError::Embedding(e.to_string()))?;

        let mut input_ids = vec![0i64; batch_size * seq];
        let mut attention_mask = vec![0i64; batch_size * seq];
        let mut token_type_ids = vec![0i64; batch_size * seq];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let types = encoding.get_type_ids();
            let len = ids.len().min(seq);
            let offset = i * seq;

            for j in 0..len {
                input_ids[offset + j] = ids[j] as i64;
                attention_mask[offset + j] = mask[j] as i64;
                token_type_ids[offset + j] = types[j] as i64;
            }
        }

        let to_tensor = |data: Vec<i64>| -> Result<Tensor<i64>, RagError> {
            let array = Array2::from_shape_vec((batch_size, seq), data)
                .map_err(|e| RagError::Embedding(e.to_string()))?;
            Tensor::from_array(array).map_err(|e| RagError::Model(e.to_string()))
        };

        let input_ids = to_tensor(input_ids)?;
        let attention = to_tensor(attention_mask)?;
        let token_types = to_tensor(token_type_ids)?;

        let mut session = session.lock();
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention,
                "token_type_ids" => token_types,
            ])
            .map_err(|e| RagError::Model(e.to_string()))?;

        let (shape, hidden) = outputs
            .get(&config.output_name)
            .ok_or_else(|| {
                RagError::Model(format!("Missing output tensor: {}", config.output_name))
            })?
            .try_extract_tensor::<f32>()
            .map_err(|e| RagError::Model(e.to_string()))?;

        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        let (tensor_batch, tensor_seq, tensor_hidden) = match dims.as_slice() {
            [b, s, h] => (*b, *s, *h),
            _ => return Err(RagError::Model(format!("Unexpected tensor shape: {:?}", dims))),
        };

        let mut embeddings = Vec::with_capacity(batch_size);
        for (i, encoding) in encodings.iter().enumerate().take(tensor_batch) {
            let len = encoding.get_ids().len().min(seq).min(tensor_seq);
            let mut embedding = vec![0.0f32; config.embedding_dim];

            // Mean pooling over real tokens
            for j in 0..len {
                for (k, slot) in embedding.iter_mut().enumerate().take(tensor_hidden) {
                    let idx = i * tensor_seq * tensor_hidden + j * tensor_hidden + k;
                    if let Some(v) = hidden.get(idx) {
                        *slot += *v;
                    }
                }
            }
            if len > 0 {
                for v in &mut embedding {
                    *v /= len as f32;
                }
            }
            if config.normalize {
                l2_normalize(&mut embedding);
            }
            embeddings.push(embedding);
        }

        Ok(embeddings)
    }
}

#[cfg(feature = "onnx")]
#[async_trait]
impl TextEmbedder for OnnxEmbedder {
    async fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| civic_qa_core::Error::Embedding("empty model output".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        let session = self.session.clone();
        let tokenizer = self.tokenizer.clone();
        let config = self.config.clone();
        let texts = texts.to_vec();

        // CPU-bound inference off the async runtime
        let result = tokio::task::spawn_blocking(move || {
            Self::embed_blocking(&session, &tokenizer, &config, &texts)
        })
        .await
        .map_err(|e| civic_qa_core::Error::Internal(format!("embedding task failed: {}", e)))?;

        Ok(result?)
    }

    fn dim(&self) -> usize {
        self.config.embedding_dim
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_hash_embedder_shape_and_norm() {
        let embedder = HashEmbedder::new(EmbeddingConfig::default());
        let embedding = embedder.embed("Bagaimana cara membuat KTP?").await.unwrap();

        assert_eq!(embedding.len(), 384);
        assert_eq!(embedder.dim(), 384);
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_hash_embedder_is_deterministic_and_case_insensitive() {
        let embedder = HashEmbedder::with_dim(64);
        assert_eq!(embedder.embed_sync("KTP baru"), embedder.embed_sync("ktp BARU"));
    }

    #[test]
    fn test_shared_words_score_higher() {
        let embedder = HashEmbedder::with_dim(1024);
        let q = embedder.embed_sync("cara membuat ktp baru");
        let near = embedder.embed_sync("cara mengurus ktp baru");
        let far = embedder.embed_sync("jadwal pengangkutan sampah");
        assert!(cosine(&q, &near) > cosine(&q, &far));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashEmbedder::with_dim(8);
        assert!(embedder.embed_sync("?!").iter().all(|v| *v == 0.0));
    }
}
