//! Sparse Search using Tantivy (BM25)
//!
//! In-process lexical backend for `text_match`. Holds one document per
//! knowledge entry and is kept current by the sync path alongside Qdrant.

use std::path::Path;

use async_trait::async_trait;
use civic_qa_core::{
    EntryId, IndexHit, KnowledgeEntry, KnowledgeWriter, LexicalIndex, Result as CoreResult,
};
use parking_lot::RwLock;
use tantivy::{
    collector::TopDocs,
    query::{AllQuery, QueryParser},
    schema::{
        Field, IndexRecordOption, OwnedValue, Schema, TextFieldIndexing, TextOptions, INDEXED,
        STORED, STRING,
    },
    tokenizer::{LowerCaser, RemoveLongFilter, SimpleTokenizer, TextAnalyzer},
    Index, IndexReader, IndexWriter, TantivyDocument, Term,
};

use crate::RagError;

const TOKENIZER: &str = "civic";

/// Sparse search configuration
#[derive(Debug, Clone)]
pub struct SparseConfig {
    /// Index path (use RAM if None)
    pub index_path: Option<String>,
    /// Writer heap budget in bytes
    pub writer_heap_bytes: usize,
}

impl Default for SparseConfig {
    fn default() -> Self {
        Self {
            index_path: None,
            writer_heap_bytes: 50_000_000,
        }
    }
}

/// Sparse index for BM25 search
pub struct SparseIndex {
    index: Index,
    reader: IndexReader,
    writer: RwLock<Option<IndexWriter>>,
    id_field: Field,
    question_field: Field,
    answer_field: Field,
    category_field: Field,
}

impl SparseIndex {
    /// Create a new sparse index
    pub fn new(config: SparseConfig) -> Result<Self, RagError> {
        let mut schema_builder = Schema::builder();

        let text_options = TextOptions::default()
            .set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer(TOKENIZER)
                    .set_index_option(IndexRecordOption::WithFreqsAndPositions),
            )
            .set_stored();

        let id_field = schema_builder.add_u64_field("id", INDEXED | STORED);
        let question_field = schema_builder.add_text_field("question", text_options);
        let answer_field = schema_builder.add_text_field("answer", STORED);
        let category_field = schema_builder.add_text_field("category", STRING | STORED);

        let schema = schema_builder.build();

        let index = if let Some(ref path) = config.index_path {
            std::fs::create_dir_all(path).map_err(|e| RagError::Index(e.to_string()))?;
            let dir = tantivy::directory::MmapDirectory::open(Path::new(path))
                .map_err(|e| RagError::Index(e.to_string()))?;
            Index::open_or_create(dir, schema).map_err(|e| RagError::Index(e.to_string()))?
        } else {
            Index::create_in_ram(schema)
        };

        // Unicode-aware split, no stemming: Indonesian has no stemmer in tantivy
        let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(100))
            .filter(LowerCaser)
            .build();
        index.tokenizers().register(TOKENIZER, tokenizer);

        let reader = index.reader().map_err(|e| RagError::Index(e.to_string()))?;

        let writer = index
            .writer(config.writer_heap_bytes)
            .map_err(|e| RagError::Index(e.to_string()))?;

        tracing::info!(
            path = config.index_path.as_deref().unwrap_or("<ram>"),
            "Sparse index opened"
        );

        Ok(Self {
            index,
            reader,
            writer: RwLock::new(Some(writer)),
            id_field,
            question_field,
            answer_field,
            category_field,
        })
    }

    /// Add or replace entries, keyed by id
    pub fn index_entries(&self, entries: &[KnowledgeEntry]) -> Result<(), RagError> {
        let mut writer = self.writer.write();
        let writer = writer
            .as_mut()
            .ok_or_else(|| RagError::Index("Writer not available".to_string()))?;

        for entry in entries {
            writer.delete_term(Term::from_field_u64(self.id_field, entry.id));

            let mut doc = TantivyDocument::default();
            doc.add_u64(self.id_field, entry.id);
            doc.add_text(self.question_field, &entry.question);
            doc.add_text(self.answer_field, &entry.answer);
            if let Some(ref category) = entry.category {
                doc.add_text(self.category_field, category);
            }

            writer
                .add_document(doc)
                .map_err(|e| RagError::Index(e.to_string()))?;
        }

        writer
            .commit()
            .map_err(|e| RagError::Index(e.to_string()))?;

        self.reader
            .reload()
            .map_err(|e| RagError::Index(e.to_string()))?;

        Ok(())
    }

    /// BM25 search over the question field
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<KnowledgeEntry>, RagError> {
        // Lowercased so words like AND/OR/NOT stay terms rather than operators
        let query = query.to_lowercase();
        if query.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let query_parser = QueryParser::for_index(&self.index, vec![self.question_field]);
        let (parsed, errors) = query_parser.parse_query_lenient(&query);
        if !errors.is_empty() {
            tracing::debug!(errors = errors.len(), "Lenient query parse dropped clauses");
        }

        let top_docs = searcher
            .search(&parsed, &TopDocs::with_limit(limit))
            .map_err(|e| RagError::Search(e.to_string()))?;

        self.load_entries(&searcher, top_docs)
    }

    /// Every indexed entry
    pub fn all_entries(&self) -> Result<Vec<KnowledgeEntry>, RagError> {
        let searcher = self.reader.searcher();
        let total = searcher.num_docs() as usize;
        if total == 0 {
            return Ok(Vec::new());
        }

        let docs = searcher
            .search(&AllQuery, &TopDocs::with_limit(total))
            .map_err(|e| RagError::Search(e.to_string()))?;

        self.load_entries(&searcher, docs)
    }

    fn load_entries(
        &self,
        searcher: &tantivy::Searcher,
        docs: Vec<(f32, tantivy::DocAddress)>,
    ) -> Result<Vec<KnowledgeEntry>, RagError> {
        let mut results = Vec::with_capacity(docs.len());
        for (_score, doc_address) in docs {
            let doc: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| RagError::Search(e.to_string()))?;
            if let Some(entry) = self.entry_from_doc(&doc) {
                results.push(entry);
            }
        }
        Ok(results)
    }

    fn entry_from_doc(&self, doc: &TantivyDocument) -> Option<KnowledgeEntry> {
        let text = |field: Field| match doc.get_first(field) {
            Some(OwnedValue::Str(s)) => Some(s.to_string()),
            _ => None,
        };

        let id = match doc.get_first(self.id_field) {
            Some(OwnedValue::U64(n)) => *n,
            _ => return None,
        };

        Some(KnowledgeEntry {
            id,
            question: text(self.question_field)?,
            answer: text(self.answer_field).unwrap_or_default(),
            category: text(self.category_field),
        })
    }

    /// Delete entries by id
    pub fn remove(&self, ids: &[EntryId]) -> Result<(), RagError> {
        let mut writer = self.writer.write();
        let writer = writer
            .as_mut()
            .ok_or_else(|| RagError::Index("Writer not available".to_string()))?;

        for id in ids {
            writer.delete_term(Term::from_field_u64(self.id_field, *id));
        }

        writer
            .commit()
            .map_err(|e| RagError::Index(e.to_string()))?;

        self.reader
            .reload()
            .map_err(|e| RagError::Index(e.to_string()))?;

        Ok(())
    }

    /// Get document count
    pub fn doc_count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }
}

#[async_trait]
impl LexicalIndex for SparseIndex {
    async fn text_match(&self, field: &str, text: &str, limit: usize) -> CoreResult<Vec<IndexHit>> {
        if field != "question" {
            return Err(
                RagError::InvalidInput(format!("field '{}' is not text-indexed", field)).into(),
            );
        }
        Ok(self
            .search(text, limit)?
            .into_iter()
            .map(IndexHit::lexical)
            .collect())
    }

    fn name(&self) -> &str {
        "tantivy"
    }
}

#[async_trait]
impl KnowledgeWriter for SparseIndex {
    async fn upsert(&self, entries: &[KnowledgeEntry], _vectors: &[Vec<f32>]) -> CoreResult<()> {
        Ok(self.index_entries(entries)?)
    }

    async fn delete(&self, ids: &[EntryId]) -> CoreResult<()> {
        Ok(self.remove(ids)?)
    }

    async fn count(&self) -> CoreResult<u64> {
        Ok(self.doc_count())
    }

    async fn entries(&self) -> CoreResult<Vec<KnowledgeEntry>> {
        Ok(self.all_entries()?)
    }

    fn name(&self) -> &str {
        "tantivy"
    }
}
