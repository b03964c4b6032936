//! Candidate Retriever
//!
//! Issues the dense and lexical queries concurrently, each under its own
//! timeout. Dense is mandatory: its failure fails the request. Lexical is
//! best-effort: its failure degrades to an empty list.

use std::sync::Arc;
use std::time::Duration;

use civic_qa_config::{constants::retrieval, constants::timeouts, Settings};
use civic_qa_core::{DenseIndex, IndexHit, LexicalIndex};

use crate::normalizer::truncate_for_log;
use crate::RagError;

/// Retriever configuration
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Number of candidates from dense search
    pub dense_limit: usize,
    /// Number of candidates from lexical match
    pub lexical_limit: usize,
    /// Payload field the lexical match runs against
    pub lexical_field: String,
    /// Per-call timeout for each index query
    pub timeout: Duration,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            dense_limit: retrieval::DENSE_LIMIT,
            lexical_limit: retrieval::LEXICAL_LIMIT,
            lexical_field: retrieval::LEXICAL_FIELD.to_string(),
            timeout: Duration::from_millis(timeouts::INDEX_MS),
        }
    }
}

impl From<&Settings> for RetrieverConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            dense_limit: settings.retrieval.dense_limit,
            lexical_limit: settings.retrieval.lexical_limit,
            lexical_field: settings.retrieval.lexical_field.clone(),
            timeout: Duration::from_millis(settings.index.timeout_ms),
        }
    }
}

/// Both candidate lists for one query
#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    /// Dense hits, best first
    pub dense: Vec<IndexHit>,
    /// Lexical hits, unranked
    pub lexical: Vec<IndexHit>,
    /// Set when the lexical path failed and was replaced by an empty list
    pub lexical_error: Option<String>,
}

/// Dense + lexical retriever over the knowledge index
pub struct CandidateRetriever {
    dense: Arc<dyn DenseIndex>,
    lexical: Arc<dyn LexicalIndex>,
    config: RetrieverConfig,
}

impl CandidateRetriever {
    pub fn new(
        dense: Arc<dyn DenseIndex>,
        lexical: Arc<dyn LexicalIndex>,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            dense,
            lexical,
            config,
        }
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Dense query, optionally restricted to one category
    pub async fn retrieve_dense(
        &self,
        vector: &[f32],
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<IndexHit>, RagError> {
        match tokio::time::timeout(self.config.timeout, self.dense.search(vector, limit, category))
            .await
        {
            Ok(Ok(hits)) => Ok(hits),
            Ok(Err(e)) => Err(RagError::Search(format!("{}: {}", self.dense.name(), e))),
            Err(_) => Err(RagError::Timeout(format!(
                "dense search on '{}' after {}ms",
                self.dense.name(),
                self.config.timeout.as_millis()
            ))),
        }
    }

    /// Lexical text match against the configured field
    pub async fn retrieve_lexical(
        &self,
        text: &str,
        limit: usize,
    ) -> Result<Vec<IndexHit>, RagError> {
        let call = self
            .lexical
            .text_match(&self.config.lexical_field, text, limit);
        match tokio::time::timeout(self.config.timeout, call).await {
            Ok(Ok(hits)) => Ok(hits),
            Ok(Err(e)) => Err(RagError::Search(format!("{}: {}", self.lexical.name(), e))),
            Err(_) => Err(RagError::Timeout(format!(
                "lexical match on '{}' after {}ms",
                self.lexical.name(),
                self.config.timeout.as_millis()
            ))),
        }
    }

    /// Run both queries concurrently and wait for both
    pub async fn retrieve(
        &self,
        vector: &[f32],
        text: &str,
        category: Option<&str>,
    ) -> Result<RetrievalOutcome, RagError> {
        let (dense_result, lexical_result) = tokio::join!(
            self.retrieve_dense(vector, category, self.config.dense_limit),
            self.retrieve_lexical(text, self.config.lexical_limit)
        );

        let dense = dense_result?;

        let (lexical, lexical_error) = match lexical_result {
            Ok(hits) => (hits, None),
            Err(e) => {
                tracing::warn!(
                    stage = "lexical_retrieval",
                    error = %e,
                    query = %truncate_for_log(text, 80),
                    "Lexical retrieval failed, continuing with dense hits only"
                );
                (Vec::new(), Some(e.to_string()))
            }
        };

        tracing::debug!(
            dense = dense.len(),
            lexical = lexical.len(),
            category = category.unwrap_or("-"),
            "Retrieved candidates"
        );

        Ok(RetrievalOutcome {
            dense,
            lexical,
            lexical_error,
        })
    }
}
