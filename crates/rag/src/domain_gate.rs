//! Domain gate: is this question something the assistant should answer?
//!
//! Layer 1 is a deterministic rule filter (too short, out-of-scope place,
//! opinion request). Layer 2 asks the external judge and runs only when
//! layer 1 is inconclusive. Layer 2 fails open.

use std::sync::Arc;
use std::time::{Duration, Instant};

use civic_qa_config::{constants, GateConfig, Lexicon};
use civic_qa_core::Judge;
use serde::Serialize;

use crate::normalizer::{truncate_for_log, QueryNormalizer};
use crate::verdict::{call_judge, parse_verdict, GateVerdict};

const GATE_INSTRUCTIONS: &str = "Anda adalah penyaring pertanyaan untuk asisten layanan publik \
pemerintah kota. Tentukan apakah pertanyaan pengguna berkaitan dengan layanan, prosedur, atau \
informasi pemerintah kota. Tolak pertanyaan tentang daerah lain, permintaan opini, atau topik di \
luar layanan publik. Jika valid, tulis ulang pertanyaan secara ringkas dan baku. Jawab HANYA \
dengan objek JSON: {\"valid\": true|false, \"reason\": \"...\", \"suggestion\": \"...\", \
\"clean_question\": \"...\"}";

/// Gate settings
#[derive(Debug, Clone)]
pub struct DomainGateConfig {
    /// Consult the judge when the rules pass
    pub semantic_enabled: bool,
    /// Reject queries with at most this many tokens
    pub min_tokens: usize,
    /// Judge call timeout
    pub timeout: Duration,
}

impl Default for DomainGateConfig {
    fn default() -> Self {
        Self {
            semantic_enabled: true,
            min_tokens: constants::gate::MIN_TOKENS,
            timeout: Duration::from_millis(constants::timeouts::GATE_JUDGE_MS),
        }
    }
}

impl From<&GateConfig> for DomainGateConfig {
    fn from(config: &GateConfig) -> Self {
        Self {
            semantic_enabled: config.semantic_enabled,
            min_tokens: config.min_tokens,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

/// Which layer produced the decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateSource {
    Rules,
    Judge,
    /// Judge failed (timeout, error, unparsable); defaulted to valid
    FailOpen,
    /// Rules passed and the semantic layer is disabled
    RulesOnly,
}

/// Outcome of the gate
#[derive(Debug, Clone)]
pub struct GateDecision {
    pub valid: bool,
    pub reason: String,
    pub suggestion: String,
    /// Normalized question to retrieve with
    pub clean_question: String,
    pub source: GateSource,
    /// Time spent in the judge call (zero when it was not made)
    pub judge_elapsed: Duration,
}

impl GateDecision {
    /// Whether the external judge was called
    pub fn judge_called(&self) -> bool {
        matches!(self.source, GateSource::Judge | GateSource::FailOpen)
    }
}

/// Two-layer in/out-of-scope filter
pub struct DomainGate {
    normalizer: Arc<QueryNormalizer>,
    judge: Option<Arc<dyn Judge>>,
    config: DomainGateConfig,
}

impl DomainGate {
    pub fn new(
        normalizer: Arc<QueryNormalizer>,
        judge: Option<Arc<dyn Judge>>,
        config: DomainGateConfig,
    ) -> Self {
        Self {
            normalizer,
            judge,
            config,
        }
    }

    fn lexicon(&self) -> &Lexicon {
        self.normalizer.lexicon()
    }

    /// Deterministic layer. Returns the rejection reason and suggestion, or
    /// `None` when no rule fires.
    pub fn check_rules(&self, normalized: &str) -> Option<(String, String)> {
        let padded = format!(" {} ", normalized.to_lowercase());

        if let Some(place) = self
            .lexicon()
            .blacklisted_places
            .iter()
            .find(|p| padded.contains(&format!(" {} ", p)))
        {
            return Some((
                format!("Pertanyaan menyebut wilayah di luar layanan ({})", place),
                "Ajukan pertanyaan tentang layanan di kota ini".to_string(),
            ));
        }

        if let Some(term) = self
            .lexicon()
            .opinion_terms
            .iter()
            .find(|t| padded.contains(&format!(" {} ", t)))
        {
            return Some((
                format!("Pertanyaan meminta opini atau penilaian subjektif ({})", term),
                "Ajukan pertanyaan tentang prosedur atau informasi layanan".to_string(),
            ));
        }

        let tokens = normalized.split_whitespace().count();
        if tokens <= self.config.min_tokens {
            return Some((
                "Pertanyaan terlalu singkat".to_string(),
                "Tuliskan pertanyaan lengkap, misalnya: Bagaimana cara membuat KTP baru?"
                    .to_string(),
            ));
        }

        None
    }

    /// Run both layers for one request
    pub async fn evaluate(&self, raw: &str, normalized: &str) -> GateDecision {
        if let Some((reason, suggestion)) = self.check_rules(normalized) {
            tracing::debug!(
                stage = "domain_gate",
                reason = %reason,
                question = %truncate_for_log(raw, 80),
                "Rejected by rules"
            );
            return GateDecision {
                valid: false,
                reason,
                suggestion,
                clean_question: normalized.to_string(),
                source: GateSource::Rules,
                judge_elapsed: Duration::ZERO,
            };
        }

        let judge = match (&self.judge, self.config.semantic_enabled) {
            (Some(judge), true) => judge,
            _ => {
                return GateDecision {
                    valid: true,
                    reason: String::new(),
                    suggestion: String::new(),
                    clean_question: normalized.to_string(),
                    source: GateSource::RulesOnly,
                    judge_elapsed: Duration::ZERO,
                }
            }
        };

        let start = Instant::now();
        let verdict = match call_judge(judge.as_ref(), GATE_INSTRUCTIONS, raw, self.config.timeout)
            .await
        {
            Ok(text) => parse_verdict::<GateVerdict>(&text),
            Err(e) => Err(e),
        };
        let judge_elapsed = start.elapsed();

        match verdict {
            Ok(v) => {
                let cleaned = self.normalizer.normalize(&v.clean_question);
                let clean_question = if cleaned.is_empty() {
                    normalized.to_string()
                } else {
                    cleaned
                };
                tracing::debug!(
                    stage = "domain_gate",
                    valid = v.valid,
                    reason = %v.reason,
                    elapsed_ms = judge_elapsed.as_millis() as u64,
                    "Judge verdict"
                );
                GateDecision {
                    valid: v.valid,
                    reason: v.reason,
                    suggestion: v.suggestion,
                    clean_question,
                    source: GateSource::Judge,
                    judge_elapsed,
                }
            }
            Err(e) => {
                tracing::warn!(
                    stage = "domain_gate",
                    error = %e,
                    question = %truncate_for_log(raw, 80),
                    "Semantic gate failed, defaulting to valid"
                );
                GateDecision {
                    valid: true,
                    reason: String::new(),
                    suggestion: String::new(),
                    clean_question: normalized.to_string(),
                    source: GateSource::FailOpen,
                    judge_elapsed,
                }
            }
        }
    }
}
