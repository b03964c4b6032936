//! Knowledge index capabilities

use async_trait::async_trait;

use crate::{EntryId, IndexHit, KnowledgeEntry, Result};

/// Dense (vector) search over the knowledge index
#[async_trait]
pub trait DenseIndex: Send + Sync + 'static {
    /// Nearest entries to `vector`, best first.
    ///
    /// When `category` is set only entries filed under that category are
    /// considered. An empty result is not an error.
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        category: Option<&str>,
    ) -> Result<Vec<IndexHit>>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Lexical match over a payload field of the knowledge index
#[async_trait]
pub trait LexicalIndex: Send + Sync + 'static {
    /// Entries whose `field` matches `text`. Hits are unranked unless the
    /// backend happens to rank them; callers must not rely on `score`.
    async fn text_match(&self, field: &str, text: &str, limit: usize) -> Result<Vec<IndexHit>>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Write path of the knowledge index
#[async_trait]
pub trait KnowledgeWriter: Send + Sync + 'static {
    /// Insert or replace entries by id. `vectors[i]` belongs to `entries[i]`.
    async fn upsert(&self, entries: &[KnowledgeEntry], vectors: &[Vec<f32>]) -> Result<()>;

    /// Remove entries by id; unknown ids are ignored
    async fn delete(&self, ids: &[EntryId]) -> Result<()>;

    /// Number of stored entries
    async fn count(&self) -> Result<u64>;

    /// Every stored entry, in no particular order
    async fn entries(&self) -> Result<Vec<KnowledgeEntry>>;

    /// Backend name for logging
    fn name(&self) -> &str;
}
