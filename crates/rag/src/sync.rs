//! Knowledge sync
//!
//! The write path driven by the content-management backend. Every add or
//! update re-embeds the entry's question before it is written. The primary
//! writer is the index of record and must accept every write; the others
//! (the Tantivy lexical index) are best effort and are rebuilt from the
//! primary by [`KnowledgeSync::backfill`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use civic_qa_core::{EntryId, KnowledgeEntry, KnowledgeWriter, TextEmbedder};

use crate::RagError;

/// Entries embedded per call while backfilling
const BACKFILL_BATCH: usize = 64;

/// Fan-out writer for knowledge entries
pub struct KnowledgeSync {
    embedder: Arc<dyn TextEmbedder>,
    primary: Arc<dyn KnowledgeWriter>,
    secondaries: Vec<Arc<dyn KnowledgeWriter>>,
    embedding_timeout: Duration,
}

impl KnowledgeSync {
    /// `primary` is the index of record; it answers `count`
    pub fn new(
        embedder: Arc<dyn TextEmbedder>,
        primary: Arc<dyn KnowledgeWriter>,
        embedding_timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            primary,
            secondaries: Vec::new(),
            embedding_timeout,
        }
    }

    /// Also write to `writer`
    pub fn with_writer(mut self, writer: Arc<dyn KnowledgeWriter>) -> Self {
        self.secondaries.push(writer);
        self
    }

    pub fn writer_names(&self) -> Vec<&str> {
        std::iter::once(self.primary.name())
            .chain(self.secondaries.iter().map(|w| w.name()))
            .collect()
    }

    fn check(entry: &KnowledgeEntry) -> Result<(), RagError> {
        if entry.is_valid() {
            Ok(())
        } else {
            Err(RagError::InvalidInput(format!(
                "entry {} has an empty question",
                entry.id
            )))
        }
    }

    fn index_error(writer: &dyn KnowledgeWriter, err: impl std::fmt::Display) -> RagError {
        RagError::Index(format!("{}: {}", writer.name(), err))
    }

    async fn embed_all(&self, entries: &[KnowledgeEntry]) -> Result<Vec<Vec<f32>>, RagError> {
        // Much bigger batches than one search query; scale the budget
        let budget = self.embedding_timeout * (entries.len().max(1) as u32);
        let texts: Vec<String> = entries.iter().map(|e| e.question.clone()).collect();

        match tokio::time::timeout(budget, self.embedder.embed_batch(&texts)).await {
            Ok(Ok(vectors)) if vectors.len() == entries.len() => Ok(vectors),
            Ok(Ok(vectors)) => Err(RagError::Embedding(format!(
                "expected {} embeddings, got {}",
                entries.len(),
                vectors.len()
            ))),
            Ok(Err(e)) => Err(RagError::Embedding(e.to_string())),
            Err(_) => Err(RagError::Timeout(format!(
                "embedding {} entries after {}ms",
                entries.len(),
                budget.as_millis()
            ))),
        }
    }

    async fn write(&self, entries: &[KnowledgeEntry]) -> Result<(), RagError> {
        for entry in entries {
            Self::check(entry)?;
        }
        let entries: Vec<KnowledgeEntry> =
            entries.iter().cloned().map(KnowledgeEntry::normalized).collect();
        let vectors = self.embed_all(&entries).await?;

        self.primary
            .upsert(&entries, &vectors)
            .await
            .map_err(|e| Self::index_error(self.primary.as_ref(), e))?;

        for writer in &self.secondaries {
            if let Err(e) = writer.upsert(&entries, &vectors).await {
                tracing::warn!(
                    writer = writer.name(),
                    entries = entries.len(),
                    error = %e,
                    "Secondary index write failed; it lags until the next backfill"
                );
            }
        }
        Ok(())
    }

    /// Insert a new entry
    pub async fn add(&self, entry: &KnowledgeEntry) -> Result<EntryId, RagError> {
        self.write(std::slice::from_ref(entry)).await?;
        tracing::info!(id = entry.id, "Knowledge entry added");
        Ok(entry.id)
    }

    /// Replace an existing entry (upsert by id)
    pub async fn update(&self, entry: &KnowledgeEntry) -> Result<(), RagError> {
        self.write(std::slice::from_ref(entry)).await?;
        tracing::info!(id = entry.id, "Knowledge entry updated");
        Ok(())
    }

    /// Remove an entry from every writer
    pub async fn delete(&self, id: EntryId) -> Result<(), RagError> {
        self.primary
            .delete(&[id])
            .await
            .map_err(|e| Self::index_error(self.primary.as_ref(), e))?;

        for writer in &self.secondaries {
            if let Err(e) = writer.delete(&[id]).await {
                tracing::warn!(
                    writer = writer.name(),
                    id,
                    error = %e,
                    "Secondary index delete failed; it lags until the next backfill"
                );
            }
        }
        tracing::info!(id, "Knowledge entry deleted");
        Ok(())
    }

    /// Embed and upsert a batch; nothing is written if any entry is invalid
    pub async fn bulk_sync(&self, entries: &[KnowledgeEntry]) -> Result<usize, RagError> {
        if entries.is_empty() {
            return Ok(0);
        }
        self.write(entries).await?;
        tracing::info!(count = entries.len(), "Bulk sync completed");
        Ok(entries.len())
    }

    /// Entries held by the index of record
    pub async fn count(&self) -> Result<u64, RagError> {
        self.primary
            .count()
            .await
            .map_err(|e| Self::index_error(self.primary.as_ref(), e))
    }

    /// Rebuild every secondary writer from the index of record.
    ///
    /// Entries the primary no longer holds are removed, everything else is
    /// re-embedded and upserted. Returns the number of entries copied.
    pub async fn backfill(&self) -> Result<usize, RagError> {
        if self.secondaries.is_empty() {
            return Ok(0);
        }

        let entries = self
            .primary
            .entries()
            .await
            .map_err(|e| Self::index_error(self.primary.as_ref(), e))?;
        let live: HashSet<EntryId> = entries.iter().map(|e| e.id).collect();

        for writer in &self.secondaries {
            let stale: Vec<EntryId> = writer
                .entries()
                .await
                .map_err(|e| Self::index_error(writer.as_ref(), e))?
                .into_iter()
                .map(|e| e.id)
                .filter(|id| !live.contains(id))
                .collect();
            if !stale.is_empty() {
                writer
                    .delete(&stale)
                    .await
                    .map_err(|e| Self::index_error(writer.as_ref(), e))?;
            }
        }

        for chunk in entries.chunks(BACKFILL_BATCH) {
            let vectors = self.embed_all(chunk).await?;
            for writer in &self.secondaries {
                writer
                    .upsert(chunk, &vectors)
                    .await
                    .map_err(|e| Self::index_error(writer.as_ref(), e))?;
            }
        }

        tracing::info!(
            entries = entries.len(),
            writers = self.secondaries.len(),
            "Secondary indexes backfilled"
        );
        Ok(entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;
    use crate::memory_index::InMemoryIndex;
    use crate::sparse_search::{SparseConfig, SparseIndex};
    use async_trait::async_trait;
    use civic_qa_core::{LexicalIndex, Result as CoreResult};

    /// Writer that rejects every call
    struct BrokenWriter;

    #[async_trait]
    impl KnowledgeWriter for BrokenWriter {
        async fn upsert(&self, _: &[KnowledgeEntry], _: &[Vec<f32>]) -> CoreResult<()> {
            Err(RagError::Index("disk full".to_string()).into())
        }

        async fn delete(&self, _: &[EntryId]) -> CoreResult<()> {
            Err(RagError::Index("disk full".to_string()).into())
        }

        async fn count(&self) -> CoreResult<u64> {
            Ok(0)
        }

        async fn entries(&self) -> CoreResult<Vec<KnowledgeEntry>> {
            Ok(Vec::new())
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    fn sync() -> (KnowledgeSync, Arc<InMemoryIndex>, Arc<SparseIndex>) {
        let memory = Arc::new(InMemoryIndex::new());
        let sparse = Arc::new(SparseIndex::new(SparseConfig::default()).unwrap());
        let sync = KnowledgeSync::new(
            Arc::new(HashEmbedder::with_dim(32)),
            memory.clone(),
            Duration::from_secs(1),
        )
        .with_writer(sparse.clone());
        (sync, memory, sparse)
    }

    #[tokio::test]
    async fn test_add_update_delete_fan_out() {
        let (sync, memory, sparse) = sync();
        assert_eq!(sync.writer_names(), vec!["memory", "tantivy"]);

        let entry = KnowledgeEntry::new(10, "Syarat membuat akta kelahiran", "ans-10");
        assert_eq!(sync.add(&entry).await.unwrap(), 10);
        assert_eq!(memory.len(), 1);
        assert_eq!(sparse.doc_count(), 1);

        let updated = KnowledgeEntry::new(10, "Syarat membuat akta kematian", "ans-10b");
        sync.update(&updated).await.unwrap();
        assert_eq!(sync.count().await.unwrap(), 1);
        let hits = sparse.text_match("question", "kematian", 5).await.unwrap();
        assert_eq!(hits[0].entry.answer, "ans-10b");

        sync.delete(10).await.unwrap();
        assert!(memory.is_empty());
        assert_eq!(sparse.doc_count(), 0);
    }

    #[tokio::test]
    async fn test_blank_question_rejected_before_any_write() {
        let (sync, memory, _) = sync();
        let entries = vec![
            KnowledgeEntry::new(1, "Jam buka kantor kecamatan", "a1"),
            KnowledgeEntry::new(2, "   ", "a2"),
        ];
        let err = sync.bulk_sync(&entries).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn test_bulk_sync_counts() {
        let (sync, memory, _) = sync();
        let entries: Vec<_> = (1..=5)
            .map(|i| KnowledgeEntry::new(i, format!("Pertanyaan layanan nomor {}", i), "a"))
            .collect();
        assert_eq!(sync.bulk_sync(&entries).await.unwrap(), 5);
        assert_eq!(memory.len(), 5);
        assert_eq!(sync.bulk_sync(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_write_stores_canonical_category() {
        let (sync, memory, _) = sync();
        let entry = KnowledgeEntry {
            category: Some(" Kependudukan".to_string()),
            ..KnowledgeEntry::new(4, "Syarat membuat kartu keluarga", "a4")
        };
        sync.add(&entry).await.unwrap();

        let stored = memory.entries().await.unwrap();
        assert_eq!(stored[0].category.as_deref(), Some("kependudukan"));
    }

    #[tokio::test]
    async fn test_secondary_failure_keeps_primary_write() {
        let memory = Arc::new(InMemoryIndex::new());
        let sync = KnowledgeSync::new(
            Arc::new(HashEmbedder::with_dim(32)),
            memory.clone(),
            Duration::from_secs(1),
        )
        .with_writer(Arc::new(BrokenWriter));

        let entry = KnowledgeEntry::new(1, "Jam buka kantor kecamatan", "a1");
        assert_eq!(sync.add(&entry).await.unwrap(), 1);
        assert_eq!(memory.len(), 1);

        sync.delete(1).await.unwrap();
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn test_primary_failure_is_an_error() {
        let sync = KnowledgeSync::new(
            Arc::new(HashEmbedder::with_dim(32)),
            Arc::new(BrokenWriter),
            Duration::from_secs(1),
        );
        let err = sync
            .add(&KnowledgeEntry::new(1, "Jam buka kantor kecamatan", "a1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "index");
        assert!(err.to_string().contains("broken"));
    }

    #[tokio::test]
    async fn test_backfill_rebuilds_lexical_index_from_primary() {
        let (sync, memory, sparse) = sync();
        let entries = vec![
            KnowledgeEntry::new(1, "Syarat membuat akta kelahiran", "a1"),
            KnowledgeEntry::new(2, "Cara bayar retribusi sampah", "a2"),
        ];
        // Written to the primary only, as if Qdrant already held them at startup
        memory
            .upsert(&entries, &[vec![1.0; 32], vec![0.5; 32]])
            .await
            .unwrap();
        sparse
            .index_entries(&[KnowledgeEntry::new(99, "Entri yang sudah dihapus", "x")])
            .unwrap();

        assert_eq!(sync.backfill().await.unwrap(), 2);
        assert_eq!(sparse.doc_count(), 2);
        let hits = sparse.text_match("question", "retribusi", 5).await.unwrap();
        assert_eq!(hits[0].id(), 2);
        assert!(sparse.text_match("question", "dihapus", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backfill_without_secondaries_is_noop() {
        let memory = Arc::new(InMemoryIndex::new());
        let sync = KnowledgeSync::new(
            Arc::new(HashEmbedder::with_dim(32)),
            memory,
            Duration::from_secs(1),
        );
        assert_eq!(sync.backfill().await.unwrap(), 0);
    }
}
