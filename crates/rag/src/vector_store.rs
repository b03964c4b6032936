//! Vector Store using Qdrant
//!
//! The knowledge index of record. Each point is one knowledge entry: the
//! point id is the entry id, the vector embeds the entry's question, and the
//! payload carries `question`, `answer` and `category`.

use std::collections::HashMap;

use async_trait::async_trait;
use civic_qa_config::{constants::endpoints, constants::retrieval, IndexConfig};
use civic_qa_core::{
    normalize_category, DenseIndex, EntryId, IndexHit, KnowledgeEntry, KnowledgeWriter,
    LexicalIndex, Result as CoreResult,
};
use qdrant_client::{
    qdrant::{
        point_id::PointIdOptions, r#match::MatchValue, value::Kind, Condition,
        CountPointsBuilder, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
        DeletePointsBuilder, Distance, FieldCondition, FieldType, Filter, Match, PointId,
        PointStruct, PointsIdsList, ScrollPointsBuilder, SearchPointsBuilder,
        UpsertPointsBuilder, Value, VectorParamsBuilder,
    },
    Qdrant,
};

use crate::RagError;

const FIELD_QUESTION: &str = "question";
const FIELD_ANSWER: &str = "answer";
const FIELD_CATEGORY: &str = "category";
/// Points fetched per scroll page when listing the collection
const SCROLL_PAGE: u32 = 256;

/// Vector store configuration
#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    /// Qdrant endpoint
    pub endpoint: String,
    /// Collection name
    pub collection: String,
    /// Vector dimension
    pub vector_dim: usize,
    /// Distance metric
    pub distance: VectorDistance,
    /// API key (optional)
    pub api_key: Option<String>,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: endpoints::QDRANT_DEFAULT.to_string(),
            collection: retrieval::COLLECTION.to_string(),
            vector_dim: retrieval::VECTOR_DIM,
            distance: VectorDistance::Cosine,
            api_key: None,
        }
    }
}

impl VectorStoreConfig {
    pub fn from_settings(index: &IndexConfig, vector_dim: usize) -> Self {
        Self {
            endpoint: index.endpoint.clone(),
            collection: index.collection.clone(),
            vector_dim,
            distance: VectorDistance::Cosine,
            api_key: index.api_key.clone(),
        }
    }
}

/// Distance metric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorDistance {
    Cosine,
    Euclidean,
    DotProduct,
}

impl From<VectorDistance> for Distance {
    fn from(d: VectorDistance) -> Self {
        match d {
            VectorDistance::Cosine => Distance::Cosine,
            VectorDistance::Euclidean => Distance::Euclid,
            VectorDistance::DotProduct => Distance::Dot,
        }
    }
}

/// Vector store client
pub struct VectorStore {
    client: Qdrant,
    config: VectorStoreConfig,
}

impl VectorStore {
    /// Create a new vector store connection
    pub fn new(config: VectorStoreConfig) -> Result<Self, RagError> {
        let mut builder = Qdrant::from_url(&config.endpoint);

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
            tracing::info!("Qdrant connection using API key authentication");
        }

        let client = builder
            .build()
            .map_err(|e| RagError::Connection(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn collection(&self) -> &str {
        &self.config.collection
    }

    /// Create the collection and its payload indexes if missing
    pub async fn ensure_collection(&self) -> Result<(), RagError> {
        let exists = self
            .client
            .collection_exists(&self.config.collection)
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        if exists {
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.config.collection).vectors_config(
                    VectorParamsBuilder::new(
                        self.config.vector_dim as u64,
                        Distance::from(self.config.distance),
                    ),
                ),
            )
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        // Full-text index backs `text_match`; keyword index backs the category filter
        for (field, kind) in [
            (FIELD_QUESTION, FieldType::Text),
            (FIELD_CATEGORY, FieldType::Keyword),
        ] {
            if let Err(e) = self
                .client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    &self.config.collection,
                    field,
                    kind,
                ))
                .await
            {
                tracing::warn!(field, error = %e, "Failed to create payload index");
            }
        }

        tracing::info!(
            collection = %self.config.collection,
            dim = self.config.vector_dim,
            "Created Qdrant collection"
        );

        Ok(())
    }

    fn payload(entry: &KnowledgeEntry) -> HashMap<String, Value> {
        let mut payload: HashMap<String, Value> = HashMap::new();
        payload.insert(FIELD_QUESTION.to_string(), entry.question.clone().into());
        payload.insert(FIELD_ANSWER.to_string(), entry.answer.clone().into());
        if let Some(ref category) = entry.category {
            payload.insert(FIELD_CATEGORY.to_string(), category.clone().into());
        }
        payload
    }

    /// Rebuild an entry from a point; `None` for points missing required fields
    fn entry_from_point(
        id: Option<PointId>,
        payload: HashMap<String, Value>,
    ) -> Option<KnowledgeEntry> {
        let id: EntryId = match id.and_then(|p| p.point_id_options) {
            Some(PointIdOptions::Num(n)) => n,
            Some(PointIdOptions::Uuid(u)) => {
                tracing::warn!(point = %u, "Skipping point with non-numeric id");
                return None;
            }
            None => return None,
        };

        let mut question = None;
        let mut answer = None;
        let mut category = None;

        for (key, value) in payload {
            let text = match value.kind {
                Some(Kind::StringValue(s)) => s,
                Some(Kind::IntegerValue(i)) => i.to_string(),
                _ => continue,
            };
            match key.as_str() {
                FIELD_QUESTION => question = Some(text),
                FIELD_ANSWER => answer = Some(text),
                FIELD_CATEGORY => category = Some(text),
                _ => {}
            }
        }

        Some(KnowledgeEntry {
            id,
            question: question?,
            answer: answer.unwrap_or_default(),
            category: category.as_deref().and_then(normalize_category),
        })
    }

    fn field_match(key: &str, value: MatchValue) -> Condition {
        Condition {
            condition_one_of: Some(qdrant_client::qdrant::condition::ConditionOneOf::Field(
                FieldCondition {
                    key: key.to_string(),
                    r#match: Some(Match {
                        match_value: Some(value),
                    }),
                    ..Default::default()
                },
            )),
        }
    }

    fn category_filter(category: &str) -> Filter {
        Filter {
            must: vec![Self::field_match(
                FIELD_CATEGORY,
                MatchValue::Keyword(category.to_string()),
            )],
            ..Default::default()
        }
    }

    fn text_filter(field: &str, text: &str) -> Filter {
        Filter {
            must: vec![Self::field_match(field, MatchValue::Text(text.to_string()))],
            ..Default::default()
        }
    }
}

#[async_trait]
impl DenseIndex for VectorStore {
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        category: Option<&str>,
    ) -> CoreResult<Vec<IndexHit>> {
        let mut search_builder =
            SearchPointsBuilder::new(&self.config.collection, vector.to_vec(), limit as u64)
                .with_payload(true);

        if let Some(category) = category {
            search_builder = search_builder.filter(Self::category_filter(category));
        }

        let results = self
            .client
            .search_points(search_builder)
            .await
            .map_err(|e| RagError::Search(e.to_string()))?;

        Ok(results
            .result
            .into_iter()
            .filter_map(|point| {
                let score = point.score;
                Self::entry_from_point(point.id, point.payload)
                    .map(|entry| IndexHit::dense(entry, score))
            })
            .collect())
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}

#[async_trait]
impl LexicalIndex for VectorStore {
    async fn text_match(&self, field: &str, text: &str, limit: usize) -> CoreResult<Vec<IndexHit>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .scroll(
                ScrollPointsBuilder::new(&self.config.collection)
                    .filter(Self::text_filter(field, text))
                    .limit(limit as u32)
                    .with_payload(true)
                    .with_vectors(false),
            )
            .await
            .map_err(|e| RagError::Search(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|point| Self::entry_from_point(point.id, point.payload))
            .map(IndexHit::lexical)
            .collect())
    }

    fn name(&self) -> &str {
        "qdrant-text"
    }
}

#[async_trait]
impl KnowledgeWriter for VectorStore {
    async fn upsert(&self, entries: &[KnowledgeEntry], vectors: &[Vec<f32>]) -> CoreResult<()> {
        if entries.len() != vectors.len() {
            return Err(RagError::VectorStore(
                "Entry and embedding count mismatch".to_string(),
            )
            .into());
        }
        if entries.is_empty() {
            return Ok(());
        }

        let points: Vec<PointStruct> = entries
            .iter()
            .zip(vectors.iter())
            .map(|(entry, vector)| PointStruct::new(entry.id, vector.clone(), Self::payload(entry)))
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.config.collection, points).wait(true))
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, ids: &[EntryId]) -> CoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let points: Vec<PointId> = ids.iter().map(|id| PointId::from(*id)).collect();

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.config.collection)
                    .points(PointsIdsList { ids: points })
                    .wait(true),
            )
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        Ok(())
    }

    async fn count(&self) -> CoreResult<u64> {
        let response = self
            .client
            .count(CountPointsBuilder::new(&self.config.collection).exact(true))
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }

    async fn entries(&self) -> CoreResult<Vec<KnowledgeEntry>> {
        let mut entries = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(&self.config.collection)
                .limit(SCROLL_PAGE)
                .with_payload(true)
                .with_vectors(false);
            if let Some(next) = offset.take() {
                builder = builder.offset(next);
            }

            let response = self
                .client
                .scroll(builder)
                .await
                .map_err(|e| RagError::VectorStore(e.to_string()))?;

            entries.extend(
                response
                    .result
                    .into_iter()
                    .filter_map(|point| Self::entry_from_point(point.id, point.payload)),
            );

            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(entries)
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}
