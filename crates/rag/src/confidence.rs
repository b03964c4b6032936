//! Confidence Gate
//!
//! Tiered acceptance over fused candidates:
//! - `dense >= high` is accepted on the dense score alone
//! - `mid <= dense < high` is accepted only when lexical overlap corroborates it
//! - everything else is rejected and kept for diagnostics
//!
//! Overlap is measured between the normalized query and the normalized
//! candidate question, so punctuation and city boilerplate on stored
//! questions do not dilute it.

use std::sync::Arc;

use civic_qa_config::AcceptanceConfig;
use civic_qa_core::KnowledgeEntry;
use serde::Serialize;

use crate::fusion::FusedCandidate;
use crate::normalizer::QueryNormalizer;

/// Why a candidate was accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptanceNote {
    AutoAcceptedByDense,
    AcceptedByOverlap,
}

impl AcceptanceNote {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcceptanceNote::AutoAcceptedByDense => "auto_accepted_by_dense",
            AcceptanceNote::AcceptedByOverlap => "accepted_by_overlap",
        }
    }
}

impl std::fmt::Display for AcceptanceNote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scored candidate, accepted or rejected
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub entry: KnowledgeEntry,
    /// Dense similarity, 0 for lexical-only candidates
    pub dense_score: f32,
    pub overlap_score: f32,
    pub fusion_score: f32,
    /// Zero-indexed position in the fused list
    pub rank: usize,
    /// Set when accepted
    pub note: Option<AcceptanceNote>,
}

impl Candidate {
    pub fn is_accepted(&self) -> bool {
        self.note.is_some()
    }
}

/// Candidates split by the acceptance policy, each list in fused order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GateOutcome {
    pub accepted: Vec<Candidate>,
    pub rejected: Vec<Candidate>,
}

impl GateOutcome {
    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }
}

/// Per-candidate accept/reject policy
pub struct ConfidenceGate {
    thresholds: AcceptanceConfig,
    normalizer: Arc<QueryNormalizer>,
}

impl ConfidenceGate {
    pub fn new(thresholds: AcceptanceConfig, normalizer: Arc<QueryNormalizer>) -> Self {
        Self {
            thresholds,
            normalizer,
        }
    }

    pub fn thresholds(&self) -> AcceptanceConfig {
        self.thresholds
    }

    /// The acceptance rule on its own
    pub fn decide(&self, dense_score: f32, overlap_score: f32) -> Option<AcceptanceNote> {
        let t = &self.thresholds;
        if dense_score >= t.high {
            Some(AcceptanceNote::AutoAcceptedByDense)
        } else if dense_score >= t.mid && overlap_score >= t.overlap_min {
            Some(AcceptanceNote::AcceptedByOverlap)
        } else {
            None
        }
    }

    /// Score and split the fused candidates for `normalized_query`
    pub fn assess(&self, normalized_query: &str, fused: &[FusedCandidate]) -> GateOutcome {
        let mut outcome = GateOutcome::default();

        for (rank, fc) in fused.iter().enumerate() {
            let dense_score = fc.dense_score.unwrap_or(0.0);
            let candidate_question = self.normalizer.normalize(&fc.entry.question);
            let overlap_score = self
                .normalizer
                .jaccard_overlap(normalized_query, &candidate_question);
            let note = self.decide(dense_score, overlap_score);

            tracing::debug!(
                id = fc.entry.id,
                dense_score,
                overlap_score,
                note = note.map(|n| n.as_str()).unwrap_or("rejected"),
                "Assessed candidate"
            );

            let candidate = Candidate {
                entry: fc.entry.clone(),
                dense_score,
                overlap_score,
                fusion_score: fc.fusion_score,
                rank,
                note,
            };

            if candidate.is_accepted() {
                outcome.accepted.push(candidate);
            } else {
                outcome.rejected.push(candidate);
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_qa_config::Lexicon;

    fn gate() -> ConfidenceGate {
        let normalizer = QueryNormalizer::new(Arc::new(Lexicon::default())).unwrap();
        ConfidenceGate::new(
            AcceptanceConfig {
                high: 0.90,
                mid: 0.80,
                overlap_min: 0.25,
            },
            Arc::new(normalizer),
        )
    }

    fn fused(id: u64, question: &str, dense: Option<f32>) -> FusedCandidate {
        FusedCandidate {
            entry: KnowledgeEntry::new(id, question, format!("a{}", id)),
            dense_score: dense,
            dense_rank: dense.map(|_| 0),
            lexical_rank: None,
            fusion_score: 1.0,
        }
    }

    #[test]
    fn test_high_dense_auto_accepts() {
        let outcome = gate().assess(
            "Bagaimana cara membuat KTP",
            &[fused(1, "Bagaimana cara mengurus KTP baru?", Some(0.92))],
        );
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(
            outcome.accepted[0].note,
            Some(AcceptanceNote::AutoAcceptedByDense)
        );
    }

    #[test]
    fn test_mid_band_needs_overlap() {
        let gate = gate();
        assert_eq!(gate.decide(0.84, 0.35), Some(AcceptanceNote::AcceptedByOverlap));
        assert_eq!(gate.decide(0.84, 0.10), None);
        assert_eq!(gate.decide(0.84, 0.25), Some(AcceptanceNote::AcceptedByOverlap));
        assert_eq!(gate.decide(0.79, 1.0), None);
    }

    #[test]
    fn test_rejected_kept_for_diagnostics() {
        let outcome = gate().assess(
            "jadwal posyandu",
            &[
                fused(1, "Syarat izin usaha", Some(0.84)),
                fused(2, "Jadwal posyandu balita", None),
            ],
        );
        assert!(outcome.is_empty());
        assert_eq!(outcome.rejected.len(), 2);
        assert_eq!(outcome.rejected[1].dense_score, 0.0);
        assert_eq!(outcome.rejected[1].rank, 1);
        assert!(outcome.rejected[1].overlap_score > 0.0);
    }

    #[test]
    fn test_overlap_uses_normalized_candidate_question() {
        let outcome = gate().assess(
            "syarat perpanjangan paspor",
            &[fused(1, "Syarat perpanjangan paspor?", Some(0.82))],
        );
        assert_eq!(outcome.accepted.len(), 1);
        assert!((outcome.accepted[0].overlap_score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_monotone_in_dense_score() {
        let gate = gate();
        for overlap in [0.0, 0.1, 0.25, 0.5, 1.0] {
            let mut was_accepted = false;
            for step in 0..=100 {
                let dense = step as f32 / 100.0;
                let accepted = gate.decide(dense, overlap).is_some();
                assert!(!(was_accepted && !accepted), "flip at {} / {}", dense, overlap);
                was_accepted = accepted;
            }
        }
    }

    #[test]
    fn test_note_wire_names() {
        assert_eq!(
            serde_json::to_value(AcceptanceNote::AcceptedByOverlap).unwrap(),
            "accepted_by_overlap"
        );
        assert_eq!(AcceptanceNote::AutoAcceptedByDense.to_string(), "auto_accepted_by_dense");
    }
}
