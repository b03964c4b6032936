//! Response envelope
//!
//! Serialized shape of a search outcome. Field names are the wire names the
//! chat client already consumes.

use std::time::Duration;

use civic_qa_config::AcceptanceConfig;
use serde::{Serialize, Serializer};

use crate::confidence::{AcceptanceNote, Candidate};

fn as_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    // Millisecond resolution is enough for the dashboard
    s.serialize_f64((d.as_secs_f64() * 1000.0).round() / 1000.0)
}

/// Per-stage wall time; zero for stages that did not run
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StageTimings {
    #[serde(rename = "ai_domain_sec", serialize_with = "as_secs")]
    pub gate: Duration,
    #[serde(rename = "embedding_sec", serialize_with = "as_secs")]
    pub embedding: Duration,
    #[serde(rename = "qdrant_sec", serialize_with = "as_secs")]
    pub retrieval: Duration,
    #[serde(rename = "ai_relevance_sec", serialize_with = "as_secs")]
    pub validation: Duration,
    #[serde(rename = "total_sec", serialize_with = "as_secs")]
    pub total: Duration,
}

/// One accepted answer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultItem {
    pub id: u64,
    pub question: String,
    pub answer: String,
    pub category: Option<String>,
    pub dense_score: f32,
    pub overlap_score: f32,
    pub note: AcceptanceNote,
}

impl ResultItem {
    /// `None` for candidates that were not accepted
    pub fn from_candidate(candidate: &Candidate) -> Option<Self> {
        let note = candidate.note?;
        Some(Self {
            id: candidate.entry.id,
            question: candidate.entry.question.clone(),
            answer: candidate.entry.answer.clone(),
            category: candidate.entry.category.clone(),
            dense_score: candidate.dense_score,
            overlap_score: candidate.overlap_score,
            note,
        })
    }
}

/// Diagnostic entry for a candidate that failed the acceptance policy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedCandidate {
    pub id: u64,
    pub question: String,
    pub dense_score: f32,
    pub overlap_score: f32,
    pub fusion_score: f32,
}

impl From<&Candidate> for RejectedCandidate {
    fn from(candidate: &Candidate) -> Self {
        Self {
            id: candidate.entry.id,
            question: candidate.entry.question.clone(),
            dense_score: candidate.dense_score,
            overlap_score: candidate.overlap_score,
            fusion_score: candidate.fusion_score,
        }
    }
}

/// Request echo plus what the advisory stages decided
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchMetadata {
    pub original_question: String,
    pub normalized_question: String,
    /// Query the returned answers were retrieved with
    pub final_question: String,
    pub category: Option<String>,
    pub ai_reason: String,
    pub ai_reformulated: Option<String>,
    pub total_found: usize,
    pub wa_number: Option<String>,
}

/// Accepted answers and metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchData {
    pub similar_questions: Vec<ResultItem>,
    pub metadata: SearchMetadata,
}

/// Judge commentary shown with a low-confidence outcome
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AiDebug {
    pub reason: String,
    pub suggestion: String,
    pub reformulated_question: Option<String>,
}

/// Thresholds in force for this request
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    pub high: f32,
    pub mid: f32,
    pub overlap_min: f32,
}

impl From<AcceptanceConfig> for Thresholds {
    fn from(config: AcceptanceConfig) -> Self {
        Self {
            high: config.high,
            mid: config.mid,
            overlap_min: config.overlap_min,
        }
    }
}

/// Final result of one search
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SearchOutcome {
    Success {
        data: SearchData,
        timing: StageTimings,
    },
    LowConfidence {
        message: String,
        ai_debug: AiDebug,
        debug_rejected: Vec<RejectedCandidate>,
        thresholds: Thresholds,
        timing: StageTimings,
    },
}

impl SearchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SearchOutcome::Success { .. })
    }

    pub fn status(&self) -> &'static str {
        match self {
            SearchOutcome::Success { .. } => "success",
            SearchOutcome::LowConfidence { .. } => "low_confidence",
        }
    }

    pub fn timing(&self) -> &StageTimings {
        match self {
            SearchOutcome::Success { timing, .. } | SearchOutcome::LowConfidence { timing, .. } => {
                timing
            }
        }
    }

    /// Accepted answers, empty for low confidence
    pub fn results(&self) -> &[ResultItem] {
        match self {
            SearchOutcome::Success { data, .. } => &data.similar_questions,
            SearchOutcome::LowConfidence { .. } => &[],
        }
    }
}
