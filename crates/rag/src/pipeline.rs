//! Search pipeline
//!
//! One request flows through:
//! normalize → detect category → domain gate → embed → retrieve (dense ∥
//! lexical) → fuse → confidence gate → relevance validator, with at most one
//! reformulated retry of embed → retrieve → fuse → confidence gate.
//!
//! Every optional stage is switched by configuration so one pipeline covers
//! all deployed policy variants.

use std::sync::Arc;
use std::time::{Duration, Instant};

use civic_qa_config::{constants, Lexicon, Settings};
use civic_qa_core::{normalize_category, DenseIndex, Judge, LexicalIndex, TextEmbedder};
use serde::Deserialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::classifier::CategoryClassifier;
use crate::confidence::{Candidate, ConfidenceGate, GateOutcome};
use crate::domain_gate::{DomainGate, DomainGateConfig};
use crate::fusion::FusionRanker;
use crate::normalizer::{truncate_for_log, QueryNormalizer};
use crate::response::{
    AiDebug, RejectedCandidate, ResultItem, SearchData, SearchMetadata, SearchOutcome,
    StageTimings, Thresholds,
};
use crate::retriever::{CandidateRetriever, RetrieverConfig};
use crate::validator::{RelevanceValidator, ValidationVerdict, ValidatorSettings};
use crate::RagError;

const LOW_CONFIDENCE_MESSAGE: &str =
    "Maaf, belum ditemukan jawaban yang cukup sesuai untuk pertanyaan Anda";

/// Pipeline-level toggles
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Restrict dense search to the detected category
    pub category_filter_enabled: bool,
    /// Allow the single reformulated retry
    pub retry_enabled: bool,
    /// Embedding call timeout
    pub embedding_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            category_filter_enabled: true,
            retry_enabled: true,
            embedding_timeout: Duration::from_millis(constants::timeouts::EMBEDDING_MS),
        }
    }
}

impl From<&Settings> for PipelineConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            category_filter_enabled: settings.retrieval.category_filter_enabled,
            retry_enabled: settings.validator.enabled && settings.validator.reformulation_enabled,
            embedding_timeout: Duration::from_millis(settings.embedding.timeout_ms),
        }
    }
}

/// Incoming search request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub wa_number: Option<String>,
    /// Overrides keyword category detection
    #[serde(default)]
    pub category_id: Option<String>,
}

impl SearchRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }
}

/// Per-request state; never shared between requests
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub request_id: Uuid,
    pub raw_question: String,
    pub normalized_question: String,
    /// Detected or requested category id
    pub category: Option<String>,
    pub timings: StageTimings,
    started: Instant,
}

impl QueryContext {
    fn new(raw_question: &str) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            raw_question: raw_question.to_string(),
            normalized_question: String::new(),
            category: None,
            timings: StageTimings::default(),
            started: Instant::now(),
        }
    }

    fn finish(&mut self) -> StageTimings {
        self.timings.total = self.started.elapsed();
        self.timings
    }
}

/// Result of one embed → retrieve → fuse → assess pass
struct PassResult {
    query: String,
    outcome: GateOutcome,
}

impl PassResult {
    /// Top accepted candidate, else the top fused one
    fn validation_target(&self) -> Option<&Candidate> {
        self.outcome
            .accepted
            .first()
            .or_else(|| self.outcome.rejected.first())
    }
}

/// The hybrid retrieval and confidence pipeline
pub struct SearchPipeline {
    normalizer: Arc<QueryNormalizer>,
    classifier: CategoryClassifier,
    gate: DomainGate,
    embedder: Arc<dyn TextEmbedder>,
    retriever: CandidateRetriever,
    fusion: FusionRanker,
    confidence: ConfidenceGate,
    validator: RelevanceValidator,
    config: PipelineConfig,
}

impl SearchPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        normalizer: Arc<QueryNormalizer>,
        classifier: CategoryClassifier,
        gate: DomainGate,
        embedder: Arc<dyn TextEmbedder>,
        retriever: CandidateRetriever,
        fusion: FusionRanker,
        confidence: ConfidenceGate,
        validator: RelevanceValidator,
        config: PipelineConfig,
    ) -> Self {
        Self {
            normalizer,
            classifier,
            gate,
            embedder,
            retriever,
            fusion,
            confidence,
            validator,
            config,
        }
    }

    /// Wire every stage from settings
    pub fn from_settings(
        settings: &Settings,
        lexicon: Arc<Lexicon>,
        embedder: Arc<dyn TextEmbedder>,
        dense: Arc<dyn DenseIndex>,
        lexical: Arc<dyn LexicalIndex>,
        judge: Option<Arc<dyn Judge>>,
    ) -> Result<Self, RagError> {
        let normalizer = Arc::new(QueryNormalizer::new(lexicon.clone())?);

        Ok(Self::new(
            normalizer.clone(),
            CategoryClassifier::new(lexicon),
            DomainGate::new(
                normalizer.clone(),
                judge.clone(),
                DomainGateConfig::from(&settings.gate),
            ),
            embedder,
            CandidateRetriever::new(dense, lexical, RetrieverConfig::from(settings)),
            FusionRanker::from(&settings.retrieval),
            ConfidenceGate::new(settings.acceptance, normalizer),
            RelevanceValidator::new(judge, ValidatorSettings::from(&settings.validator)),
            PipelineConfig::from(settings),
        ))
    }

    pub fn normalizer(&self) -> &QueryNormalizer {
        &self.normalizer
    }

    pub fn embedder(&self) -> &Arc<dyn TextEmbedder> {
        &self.embedder
    }

    /// Answer one question
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchOutcome, RagError> {
        let raw = request.question.trim();
        if raw.is_empty() {
            return Err(RagError::InvalidInput("question is required".to_string()));
        }

        let mut ctx = QueryContext::new(raw);
        let span = tracing::info_span!("search", request_id = %ctx.request_id);

        async move {
            let outcome = self.run(request, &mut ctx).await;
            match &outcome {
                Ok(o) => tracing::info!(
                    status = o.status(),
                    found = o.results().len(),
                    total_ms = ctx.timings.total.as_millis() as u64,
                    "Search complete"
                ),
                Err(e) => tracing::error!(
                    kind = e.kind(),
                    error = %e,
                    question = %truncate_for_log(&ctx.raw_question, 80),
                    "Search failed"
                ),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        request: &SearchRequest,
        ctx: &mut QueryContext,
    ) -> Result<SearchOutcome, RagError> {
        ctx.normalized_question = self.normalizer.normalize(&ctx.raw_question);
        ctx.category = self.resolve_category(request, &ctx.normalized_question);

        tracing::debug!(
            normalized = %ctx.normalized_question,
            category = ctx.category.as_deref().unwrap_or("-"),
            "Normalized question"
        );

        let gate_start = Instant::now();
        let decision = self
            .gate
            .evaluate(&ctx.raw_question, &ctx.normalized_question)
            .await;
        ctx.timings.gate = gate_start.elapsed();
        tracing::debug!(
            valid = decision.valid,
            source = ?decision.source,
            judge_called = decision.judge_called(),
            judge_ms = decision.judge_elapsed.as_millis() as u64,
            "Domain gate decided"
        );

        if !decision.valid {
            return Ok(SearchOutcome::LowConfidence {
                message: decision.reason.clone(),
                ai_debug: AiDebug {
                    reason: decision.reason,
                    suggestion: decision.suggestion,
                    reformulated_question: None,
                },
                debug_rejected: Vec::new(),
                thresholds: Thresholds::from(self.confidence.thresholds()),
                timing: ctx.finish(),
            });
        }

        let category = ctx.category.clone();
        let mut pass = self
            .run_pass(ctx, decision.clean_question, category)
            .await?;

        let mut verdict: Option<ValidationVerdict> = None;
        if self.validator.is_active() {
            if let Some(target) = pass.validation_target() {
                let v = self
                    .validator
                    .validate(&ctx.raw_question, &target.entry.question)
                    .await;
                ctx.timings.validation += v.elapsed;
                verdict = Some(v);
            }
        }

        let retry_query = verdict
            .as_ref()
            .filter(|v| !v.relevant && self.config.retry_enabled)
            .and_then(|v| v.reformulated_question.clone());

        if let Some(reformulated) = retry_query {
            let normalized = self.normalizer.normalize(&reformulated);
            if normalized.is_empty() {
                tracing::debug!("Reformulation normalized to nothing, keeping first pass");
            } else {
                let category = self.resolve_category(request, &normalized);
                tracing::debug!(
                    query = %normalized,
                    category = category.as_deref().unwrap_or("-"),
                    "Retrying with reformulated question"
                );
                // Single retry: its result replaces the first pass, whatever it holds
                pass = self.run_pass(ctx, normalized, category).await?;
            }
        }

        Ok(self.assemble(request, ctx, pass, verdict))
    }

    /// Requested category wins; otherwise keyword detection
    fn resolve_category(&self, request: &SearchRequest, normalized: &str) -> Option<String> {
        request
            .category_id
            .as_deref()
            .and_then(normalize_category)
            .or_else(|| self.classifier.detect(normalized).map(|c| c.id.clone()))
    }

    async fn run_pass(
        &self,
        ctx: &mut QueryContext,
        query: String,
        category: Option<String>,
    ) -> Result<PassResult, RagError> {
        let embed_start = Instant::now();
        let vector = match tokio::time::timeout(
            self.config.embedding_timeout,
            self.embedder.embed(&query),
        )
        .await
        {
            Ok(Ok(vector)) => vector,
            Ok(Err(e)) => return Err(RagError::Embedding(e.to_string())),
            Err(_) => {
                return Err(RagError::Timeout(format!(
                    "embedding with '{}' after {}ms",
                    self.embedder.model_name(),
                    self.config.embedding_timeout.as_millis()
                )))
            }
        };
        ctx.timings.embedding += embed_start.elapsed();

        let filter = if self.config.category_filter_enabled {
            category.as_deref()
        } else {
            None
        };

        let retrieve_start = Instant::now();
        let retrieved = self.retriever.retrieve(&vector, &query, filter).await?;
        ctx.timings.retrieval += retrieve_start.elapsed();

        let fused = self.fusion.fuse(&retrieved.dense, &retrieved.lexical);
        let outcome = self.confidence.assess(&query, &fused);

        tracing::debug!(
            fused = fused.len(),
            accepted = outcome.accepted.len(),
            rejected = outcome.rejected.len(),
            "Pass complete"
        );

        Ok(PassResult { query, outcome })
    }

    fn assemble(
        &self,
        request: &SearchRequest,
        ctx: &mut QueryContext,
        pass: PassResult,
        verdict: Option<ValidationVerdict>,
    ) -> SearchOutcome {
        let (ai_reason, ai_reformulated) = verdict
            .map(|v| (v.reason, v.reformulated_question))
            .unwrap_or_default();
        let timing = ctx.finish();

        if pass.outcome.accepted.is_empty() {
            return SearchOutcome::LowConfidence {
                message: LOW_CONFIDENCE_MESSAGE.to_string(),
                ai_debug: AiDebug {
                    reason: ai_reason,
                    suggestion: String::new(),
                    reformulated_question: ai_reformulated,
                },
                debug_rejected: pass
                    .outcome
                    .rejected
                    .iter()
                    .map(RejectedCandidate::from)
                    .collect(),
                thresholds: Thresholds::from(self.confidence.thresholds()),
                timing,
            };
        }

        let similar_questions: Vec<ResultItem> = pass
            .outcome
            .accepted
            .iter()
            .filter_map(ResultItem::from_candidate)
            .collect();

        SearchOutcome::Success {
            data: SearchData {
                metadata: SearchMetadata {
                    original_question: ctx.raw_question.clone(),
                    normalized_question: ctx.normalized_question.clone(),
                    final_question: pass.query,
                    category: ctx.category.clone(),
                    ai_reason,
                    ai_reformulated,
                    total_found: similar_questions.len(),
                    wa_number: request.wa_number.clone(),
                },
                similar_questions,
            },
            timing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;
    use crate::memory_index::InMemoryIndex;
    use crate::sync::KnowledgeSync;
    use civic_qa_core::{KnowledgeEntry, KnowledgeWriter};

    async fn pipeline(settings: &Settings) -> SearchPipeline {
        let embedder = Arc::new(HashEmbedder::with_dim(256));
        let index = Arc::new(InMemoryIndex::new());
        let entries = vec![
            KnowledgeEntry::new(1, "Bagaimana cara mengurus KTP baru?", "ans-ktp")
                .with_category("kependudukan"),
            KnowledgeEntry::new(2, "Kapan batas pembayaran PBB?", "ans-pbb").with_category("pajak"),
        ];
        let texts: Vec<String> = entries.iter().map(|e| e.question.clone()).collect();
        let vectors = embedder.embed_batch(&texts).await.unwrap();
        index.upsert(&entries, &vectors).await.unwrap();

        SearchPipeline::from_settings(
            settings,
            Arc::new(Lexicon::default()),
            embedder,
            index.clone(),
            index,
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_blank_question_is_invalid_input() {
        let p = pipeline(&Settings::default()).await;
        let err = p.search(&SearchRequest::new("   ")).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[tokio::test]
    async fn test_exact_question_succeeds() {
        let p = pipeline(&Settings::default()).await;
        let outcome = p
            .search(&SearchRequest::new("Bagaimana cara mengurus KTP baru?"))
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.results()[0].id, 1);
        if let SearchOutcome::Success { data, .. } = outcome {
            assert_eq!(data.metadata.category.as_deref(), Some("kependudukan"));
            assert_eq!(data.metadata.final_question, "Bagaimana cara mengurus KTP baru");
        }
    }

    #[tokio::test]
    async fn test_requested_category_overrides_detection() {
        let p = pipeline(&Settings::default()).await;
        // Filtered to pajak, the KTP entry is never retrieved
        let outcome = p
            .search(&SearchRequest::new("Bagaimana cara mengurus KTP baru?").with_category("pajak"))
            .await
            .unwrap();
        assert!(outcome.results().iter().all(|r| r.id != 1));
    }

    #[tokio::test]
    async fn test_category_filter_toggle() {
        let mut settings = Settings::default();
        settings.retrieval.category_filter_enabled = false;
        let p = pipeline(&settings).await;
        let outcome = p
            .search(&SearchRequest::new("Bagaimana cara mengurus KTP baru?").with_category("pajak"))
            .await
            .unwrap();
        assert_eq!(outcome.results()[0].id, 1);
    }

    #[tokio::test]
    async fn test_gate_reject_zero_fills_timings() {
        let p = pipeline(&Settings::default()).await;
        let outcome = p.search(&SearchRequest::new("Jakarta")).await.unwrap();

        assert!(!outcome.is_success());
        let timing = outcome.timing();
        assert_eq!(timing.embedding, Duration::ZERO);
        assert_eq!(timing.retrieval, Duration::ZERO);
        assert_eq!(timing.validation, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_mixed_case_stored_category_is_reachable() {
        let embedder = Arc::new(HashEmbedder::with_dim(256));
        let index = Arc::new(InMemoryIndex::new());
        let sync = KnowledgeSync::new(embedder.clone(), index.clone(), Duration::from_secs(1));
        let question = "Bagaimana cara mengurus KTP baru?";
        sync.add(&KnowledgeEntry {
            category: Some("Kependudukan".to_string()),
            ..KnowledgeEntry::new(1, question, "ans-ktp")
        })
        .await
        .unwrap();

        let p = SearchPipeline::from_settings(
            &Settings::default(),
            Arc::new(Lexicon::default()),
            embedder,
            index.clone(),
            index,
            None,
        )
        .unwrap();

        for request in [
            SearchRequest::new(question).with_category("Kependudukan"),
            SearchRequest::new(question),
        ] {
            let outcome = p.search(&request).await.unwrap();
            assert!(outcome.is_success(), "category {:?}", request.category_id);
            assert_eq!(outcome.results()[0].id, 1);
        }
    }
}
