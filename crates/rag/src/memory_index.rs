//! In-memory knowledge index
//!
//! Brute-force cosine search plus case-insensitive substring matching over a
//! `RwLock`ed map. Used for local development (`index.in_memory = true`) and
//! as the index double in tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use civic_qa_core::{
    DenseIndex, EntryId, IndexHit, KnowledgeEntry, KnowledgeWriter, LexicalIndex,
    Result as CoreResult,
};
use parking_lot::RwLock;

use crate::RagError;

struct StoredEntry {
    entry: KnowledgeEntry,
    vector: Vec<f32>,
}

/// Knowledge index held entirely in process memory
#[derive(Default)]
pub struct InMemoryIndex {
    // BTreeMap keeps scans in id order, so equal scores come out stable
    entries: RwLock<BTreeMap<EntryId, StoredEntry>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if na == 0.0 || nb == 0.0 {
            0.0
        } else {
            dot / (na * nb)
        }
    }
}

#[async_trait]
impl DenseIndex for InMemoryIndex {
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        category: Option<&str>,
    ) -> CoreResult<Vec<IndexHit>> {
        let entries = self.entries.read();
        let mut scored: Vec<(f32, &StoredEntry)> = entries
            .values()
            .filter(|s| category.map_or(true, |c| s.entry.category.as_deref() == Some(c)))
            .map(|s| (Self::cosine(vector, &s.vector), s))
            .collect();

        // Stable sort: ties keep id order
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(score, s)| IndexHit::dense(s.entry.clone(), score))
            .collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl LexicalIndex for InMemoryIndex {
    async fn text_match(&self, field: &str, text: &str, limit: usize) -> CoreResult<Vec<IndexHit>> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let entries = self.entries.read();
        let mut hits = Vec::new();
        for stored in entries.values() {
            let haystack = match field {
                "question" => stored.entry.question.to_lowercase(),
                "answer" => stored.entry.answer.to_lowercase(),
                other => {
                    return Err(RagError::InvalidInput(format!("unknown field '{}'", other)).into())
                }
            };
            if haystack.contains(&needle) {
                hits.push(IndexHit::lexical(stored.entry.clone()));
                if hits.len() >= limit {
                    break;
                }
            }
        }

        Ok(hits)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl KnowledgeWriter for InMemoryIndex {
    async fn upsert(&self, entries: &[KnowledgeEntry], vectors: &[Vec<f32>]) -> CoreResult<()> {
        if entries.len() != vectors.len() {
            return Err(RagError::Index("Entry and embedding count mismatch".to_string()).into());
        }

        let mut map = self.entries.write();
        for (entry, vector) in entries.iter().zip(vectors) {
            map.insert(
                entry.id,
                StoredEntry {
                    entry: entry.clone(),
                    vector: vector.clone(),
                },
            );
        }
        Ok(())
    }

    async fn delete(&self, ids: &[EntryId]) -> CoreResult<()> {
        let mut map = self.entries.write();
        for id in ids {
            map.remove(id);
        }
        Ok(())
    }

    async fn count(&self) -> CoreResult<u64> {
        Ok(self.entries.read().len() as u64)
    }

    async fn entries(&self) -> CoreResult<Vec<KnowledgeEntry>> {
        Ok(self.entries.read().values().map(|s| s.entry.clone()).collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> InMemoryIndex {
        let index = InMemoryIndex::new();
        index
            .upsert(
                &[
                    KnowledgeEntry::new(1, "Cara mengurus KTP baru", "a1").with_category("kependudukan"),
                    KnowledgeEntry::new(2, "Syarat akta kelahiran", "a2").with_category("kependudukan"),
                    KnowledgeEntry::new(3, "Cara bayar PBB", "a3").with_category("pajak"),
                ],
                &[vec![1.0, 0.0], vec![0.6, 0.8], vec![0.0, 1.0]],
            )
            .await
            .unwrap();
        index
    }

    #[tokio::test]
    async fn test_dense_search_orders_by_cosine() {
        let index = seeded().await;
        let hits = DenseIndex::search(&index, &[1.0, 0.0], 10, None).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!((hits[0].score.unwrap() - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_category_filter_and_limit() {
        let index = seeded().await;
        let hits = DenseIndex::search(&index, &[0.0, 1.0], 10, Some("pajak"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id(), 3);

        let hits = DenseIndex::search(&index, &[0.0, 1.0], 1, None).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_text_match_is_case_insensitive_substring() {
        let index = seeded().await;
        let hits = index.text_match("question", "cara", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.score.is_none()));

        assert!(index.text_match("question", "  ", 10).await.unwrap().is_empty());
        assert!(index.text_match("bogus", "cara", 10).await.is_err());
    }

    #[tokio::test]
    async fn test_upsert_delete_count() {
        let index = seeded().await;
        index.delete(&[2, 99]).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 2);

        let err = index
            .upsert(&[KnowledgeEntry::new(4, "q", "a")], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, civic_qa_core::Error::Index(_)));
    }
}
