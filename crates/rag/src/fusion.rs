//! Reciprocal Rank Fusion
//!
//! An entry at zero-indexed rank `i` in a list contributes
//! `1 / (rrf_k + i + 1)`; contributions from the dense and lexical lists are
//! summed per entry id. Output order is fully deterministic: fused score
//! descending, then dense rank ascending (entries missing from the dense list
//! sort after those present), then entry id ascending.

use std::cmp::Ordering;
use std::collections::HashMap;

use civic_qa_config::{constants::retrieval, RetrievalConfig};
use civic_qa_core::{EntryId, IndexHit, KnowledgeEntry};

/// One fused candidate
#[derive(Debug, Clone, PartialEq)]
pub struct FusedCandidate {
    pub entry: KnowledgeEntry,
    /// Native similarity from the dense hit
    pub dense_score: Option<f32>,
    /// Zero-indexed rank in the dense list
    pub dense_rank: Option<usize>,
    /// Zero-indexed rank in the lexical list
    pub lexical_rank: Option<usize>,
    /// Summed RRF contribution
    pub fusion_score: f32,
}

impl FusedCandidate {
    pub fn id(&self) -> EntryId {
        self.entry.id
    }
}

/// RRF ranker
#[derive(Debug, Clone, Copy)]
pub struct FusionRanker {
    rrf_k: f32,
    top_k: usize,
}

impl Default for FusionRanker {
    fn default() -> Self {
        Self::new(retrieval::RRF_K, retrieval::FUSION_TOP_K)
    }
}

impl From<&RetrievalConfig> for FusionRanker {
    fn from(config: &RetrievalConfig) -> Self {
        Self::new(config.rrf_k, config.fusion_top_k)
    }
}

impl FusionRanker {
    pub fn new(rrf_k: f32, top_k: usize) -> Self {
        Self { rrf_k, top_k }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    fn contribution(&self, rank: usize) -> f32 {
        1.0 / (self.rrf_k + rank as f32 + 1.0)
    }

    /// Merge both lists and keep the best `top_k`
    pub fn fuse(&self, dense: &[IndexHit], lexical: &[IndexHit]) -> Vec<FusedCandidate> {
        let mut fused: HashMap<EntryId, FusedCandidate> = HashMap::new();

        for (rank, hit) in dense.iter().enumerate() {
            // Repeats inside one list count once, at their best rank
            if fused.contains_key(&hit.id()) {
                continue;
            }
            fused.insert(
                hit.id(),
                FusedCandidate {
                    entry: hit.entry.clone(),
                    dense_score: hit.score,
                    dense_rank: Some(rank),
                    lexical_rank: None,
                    fusion_score: self.contribution(rank),
                },
            );
        }

        for (rank, hit) in lexical.iter().enumerate() {
            let contribution = self.contribution(rank);
            match fused.get_mut(&hit.id()) {
                Some(candidate) if candidate.lexical_rank.is_some() => {}
                Some(candidate) => {
                    candidate.lexical_rank = Some(rank);
                    candidate.fusion_score += contribution;
                }
                None => {
                    fused.insert(
                        hit.id(),
                        FusedCandidate {
                            entry: hit.entry.clone(),
                            dense_score: None,
                            dense_rank: None,
                            lexical_rank: Some(rank),
                            fusion_score: contribution,
                        },
                    );
                }
            }
        }

        let mut ranked: Vec<FusedCandidate> = fused.into_values().collect();
        ranked.sort_by(Self::order);
        ranked.truncate(self.top_k);
        ranked
    }

    fn order(a: &FusedCandidate, b: &FusedCandidate) -> Ordering {
        b.fusion_score
            .partial_cmp(&a.fusion_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| match (a.dense_rank, b.dense_rank) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
            .then_with(|| a.id().cmp(&b.id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: EntryId) -> KnowledgeEntry {
        KnowledgeEntry::new(id, format!("q{}", id), format!("a{}", id))
    }

    fn dense(ids: &[EntryId]) -> Vec<IndexHit> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| IndexHit::dense(entry(*id), 0.9 - i as f32 * 0.05))
            .collect()
    }

    fn lexical(ids: &[EntryId]) -> Vec<IndexHit> {
        ids.iter().map(|id| IndexHit::lexical(entry(*id))).collect()
    }

    fn ids(fused: &[FusedCandidate]) -> Vec<EntryId> {
        fused.iter().map(|c| c.id()).collect()
    }

    #[test]
    fn test_entry_in_both_lists_ranks_first() {
        let ranker = FusionRanker::new(0.0, 3);
        let fused = ranker.fuse(&dense(&[1, 2]), &lexical(&[2, 3]));

        // 2: 1/2 + 1/1 = 1.5, 1: 1.0, 3: 0.5
        assert_eq!(ids(&fused), vec![2, 1, 3]);
        assert!((fused[0].fusion_score - 1.5).abs() < 1e-6);
        assert_eq!(fused[0].dense_rank, Some(1));
        assert_eq!(fused[0].lexical_rank, Some(0));
        assert_eq!(fused[2].dense_score, None);
    }

    #[test]
    fn test_truncates_to_top_k() {
        let ranker = FusionRanker::default();
        let fused = ranker.fuse(&dense(&[1, 2, 3, 4, 5]), &[]);
        assert_eq!(ids(&fused), vec![1, 2, 3]);
    }

    #[test]
    fn test_ties_break_by_dense_rank_then_id() {
        let ranker = FusionRanker::new(0.0, 10);
        // 7 (dense rank 0) and 9 (lexical rank 0) both score 1.0
        let fused = ranker.fuse(&dense(&[7]), &lexical(&[9]));
        assert_eq!(ids(&fused), vec![7, 9]);

        // Lexical-only ties fall back to id
        let fused = ranker.fuse(&[], &lexical(&[5]));
        let fused_other = ranker.fuse(&[], &lexical(&[5]));
        assert_eq!(fused, fused_other);
    }

    #[test]
    fn test_duplicates_within_a_list_count_once() {
        let ranker = FusionRanker::new(0.0, 10);
        let fused = ranker.fuse(&dense(&[1, 1]), &lexical(&[2, 2]));
        assert_eq!(fused.len(), 2);
        assert!((fused[0].fusion_score - 1.0).abs() < 1e-6);
        assert!((fused[1].fusion_score - 1.0).abs() < 1e-6);
        assert_eq!(ids(&fused), vec![1, 2]);
    }

    #[test]
    fn test_fuse_is_deterministic() {
        let ranker = FusionRanker::new(0.0, 5);
        let d = dense(&[4, 8, 15, 16, 23]);
        let l = lexical(&[42, 16, 8, 4]);
        let first = ranker.fuse(&d, &l);
        for _ in 0..20 {
            assert_eq!(ranker.fuse(&d, &l), first);
        }
    }

    #[test]
    fn test_empty_inputs() {
        assert!(FusionRanker::default().fuse(&[], &[]).is_empty());
    }
}
