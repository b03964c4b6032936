//! Relevance validator
//!
//! Asks the judge whether the top candidate actually answers the user's
//! question and, when it does not, for a rewritten query. Advisory only:
//! any failure yields `relevant = true`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use civic_qa_config::{constants, ValidatorConfig};
use civic_qa_core::Judge;

use crate::normalizer::truncate_for_log;
use crate::verdict::{call_judge, parse_verdict, RelevanceVerdict};

const VALIDATOR_INSTRUCTIONS: &str = "Anda menilai hasil pencarian untuk asisten layanan publik \
pemerintah kota. Diberikan pertanyaan pengguna dan pertanyaan kandidat dari basis pengetahuan, \
tentukan apakah jawaban untuk pertanyaan kandidat akan menjawab pertanyaan pengguna. Jika tidak, \
tulis ulang pertanyaan pengguna agar lebih mudah dicocokkan. Jawab HANYA dengan objek JSON: \
{\"relevant\": true|false, \"reason\": \"...\", \"reformulated_question\": \"...\" atau null}";

/// Validator settings
#[derive(Debug, Clone)]
pub struct ValidatorSettings {
    pub enabled: bool,
    /// Pass the judge's reformulation on for a retry
    pub reformulation_enabled: bool,
    pub timeout: Duration,
    /// Reformulations are cut to this many words
    pub max_reformulated_words: usize,
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            reformulation_enabled: true,
            timeout: Duration::from_millis(constants::timeouts::VALIDATOR_JUDGE_MS),
            max_reformulated_words: constants::validator::MAX_REFORMULATED_WORDS,
        }
    }
}

impl From<&ValidatorConfig> for ValidatorSettings {
    fn from(config: &ValidatorConfig) -> Self {
        Self {
            enabled: config.enabled,
            reformulation_enabled: config.reformulation_enabled,
            timeout: Duration::from_millis(config.timeout_ms),
            max_reformulated_words: config.max_reformulated_words,
        }
    }
}

/// Validator result
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationVerdict {
    pub relevant: bool,
    pub reason: String,
    /// Word-capped rewrite, present only when `relevant` is false
    pub reformulated_question: Option<String>,
    /// The judge failed and the verdict was defaulted
    pub failed_open: bool,
    /// Time spent in the judge call
    pub elapsed: Duration,
}

impl ValidationVerdict {
    fn permissive(elapsed: Duration, failed_open: bool) -> Self {
        Self {
            relevant: true,
            reason: String::new(),
            reformulated_question: None,
            failed_open,
            elapsed,
        }
    }
}

/// Keep at most `max_words` whitespace-separated words
pub fn truncate_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Post-retrieval relevance check
pub struct RelevanceValidator {
    judge: Option<Arc<dyn Judge>>,
    settings: ValidatorSettings,
}

impl RelevanceValidator {
    pub fn new(judge: Option<Arc<dyn Judge>>, settings: ValidatorSettings) -> Self {
        Self { judge, settings }
    }

    /// Whether a judge call will be made
    pub fn is_active(&self) -> bool {
        self.settings.enabled && self.judge.is_some()
    }

    /// Judge `candidate_question` against `user_question`
    pub async fn validate(&self, user_question: &str, candidate_question: &str) -> ValidationVerdict {
        let judge = match (&self.judge, self.settings.enabled) {
            (Some(judge), true) => judge,
            _ => return ValidationVerdict::permissive(Duration::ZERO, false),
        };

        let input = format!(
            "Pertanyaan pengguna: {}\nPertanyaan kandidat: {}",
            user_question, candidate_question
        );

        let start = Instant::now();
        let verdict = match call_judge(
            judge.as_ref(),
            VALIDATOR_INSTRUCTIONS,
            &input,
            self.settings.timeout,
        )
        .await
        {
            Ok(text) => parse_verdict::<RelevanceVerdict>(&text),
            Err(e) => Err(e),
        };
        let elapsed = start.elapsed();

        match verdict {
            Ok(v) => {
                let reformulated_question = if v.relevant || !self.settings.reformulation_enabled {
                    None
                } else {
                    v.reformulated_question
                        .map(|q| truncate_words(&q, self.settings.max_reformulated_words))
                        .filter(|q| !q.is_empty())
                };

                tracing::debug!(
                    stage = "relevance_validator",
                    relevant = v.relevant,
                    reason = %v.reason,
                    reformulated = reformulated_question.as_deref().unwrap_or("-"),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Relevance verdict"
                );

                ValidationVerdict {
                    relevant: v.relevant,
                    reason: v.reason,
                    reformulated_question,
                    failed_open: false,
                    elapsed,
                }
            }
            Err(e) => {
                tracing::warn!(
                    stage = "relevance_validator",
                    error = %e,
                    question = %truncate_for_log(user_question, 80),
                    "Relevance validation failed, defaulting to relevant"
                );
                ValidationVerdict::permissive(elapsed, true)
            }
        }
    }
}
