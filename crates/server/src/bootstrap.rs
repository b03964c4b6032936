//! Startup wiring
//!
//! Turns validated settings into the embedder, indexes, judge, read
//! pipeline and write path held by [`AppState`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use civic_qa_config::{EmbeddingProvider, LexicalBackend, Lexicon, Settings};
use civic_qa_core::{DenseIndex, Judge, KnowledgeWriter, LexicalIndex, TextEmbedder};
use civic_qa_llm::{LlmFactory, LlmProviderConfig};
use civic_qa_rag::{
    EmbeddingConfig, HashEmbedder, InMemoryIndex, KnowledgeLoader, KnowledgeSync,
    OllamaEmbedder, OllamaEmbeddingConfig, SearchPipeline, SparseConfig, SparseIndex,
    VectorStore, VectorStoreConfig,
};

use crate::{AppState, ServerError};

/// Index handles resolved from settings
pub struct Indexes {
    pub dense: Arc<dyn DenseIndex>,
    pub lexical: Arc<dyn LexicalIndex>,
    /// First entry is the index of record
    pub writers: Vec<Arc<dyn KnowledgeWriter>>,
}

/// Build the embedding capability for the configured provider
pub fn build_embedder(settings: &Settings) -> Result<Arc<dyn TextEmbedder>, ServerError> {
    let cfg = &settings.embedding;
    match cfg.provider {
        EmbeddingProvider::Ollama => {
            let embedder = OllamaEmbedder::new(OllamaEmbeddingConfig::from(cfg))?;
            tracing::info!(endpoint = %cfg.endpoint, model = %cfg.model, "Using Ollama embedder");
            Ok(Arc::new(embedder))
        },
        EmbeddingProvider::Hash => {
            tracing::warn!(dim = cfg.dimension, "Using hash embedder; not for production");
            Ok(Arc::new(HashEmbedder::new(EmbeddingConfig {
                embedding_dim: cfg.dimension,
                ..EmbeddingConfig::default()
            })))
        },
        EmbeddingProvider::Onnx => build_onnx_embedder(settings),
    }
}

#[cfg(feature = "onnx")]
fn build_onnx_embedder(settings: &Settings) -> Result<Arc<dyn TextEmbedder>, ServerError> {
    let cfg = &settings.embedding;
    let (Some(model), Some(tokenizer)) = (&cfg.model_path, &cfg.tokenizer_path) else {
        return Err(ServerError::Config(
            "embedding.model_path and embedding.tokenizer_path are required for onnx".to_string(),
        ));
    };
    let embedder = civic_qa_rag::OnnxEmbedder::new(
        model,
        tokenizer,
        EmbeddingConfig {
            embedding_dim: cfg.dimension,
            ..EmbeddingConfig::default()
        },
    )?;
    tracing::info!(model = %model, "Using ONNX embedder");
    Ok(Arc::new(embedder))
}

#[cfg(not(feature = "onnx"))]
fn build_onnx_embedder(_settings: &Settings) -> Result<Arc<dyn TextEmbedder>, ServerError> {
    Err(ServerError::Config(
        "embedding.provider = onnx requires building with the `onnx` feature".to_string(),
    ))
}

type IndexHandles = (
    Arc<dyn DenseIndex>,
    Arc<dyn LexicalIndex>,
    Arc<dyn KnowledgeWriter>,
);

fn index_handles<I>(index: Arc<I>) -> IndexHandles
where
    I: DenseIndex + LexicalIndex + KnowledgeWriter,
{
    let dense: Arc<dyn DenseIndex> = index.clone();
    let lexical: Arc<dyn LexicalIndex> = index.clone();
    let writer: Arc<dyn KnowledgeWriter> = index;
    (dense, lexical, writer)
}

/// Resolve dense, lexical and writer handles
pub async fn build_indexes(settings: &Settings) -> Result<Indexes, ServerError> {
    let (dense, primary_lexical, primary_writer) = if settings.index.in_memory {
        tracing::info!("Using in-memory knowledge index");
        let index = Arc::new(InMemoryIndex::new());
        index_handles(index)
    } else {
        let store = Arc::new(VectorStore::new(VectorStoreConfig::from_settings(
            &settings.index,
            settings.embedding.dimension,
        ))?);
        store.ensure_collection().await?;
        tracing::info!(
            endpoint = %settings.index.endpoint,
            collection = %store.collection(),
            "Qdrant knowledge index ready"
        );
        index_handles(store)
    };

    let mut writers = vec![primary_writer];
    let lexical: Arc<dyn LexicalIndex> = match settings.retrieval.lexical_backend {
        LexicalBackend::Index => primary_lexical,
        LexicalBackend::Tantivy => {
            let sparse = Arc::new(SparseIndex::new(SparseConfig {
                index_path: settings.index.lexical_index_path.clone(),
                ..SparseConfig::default()
            })?);
            tracing::info!(
                path = settings.index.lexical_index_path.as_deref().unwrap_or("<ram>"),
                docs = sparse.doc_count(),
                "Using Tantivy lexical index"
            );
            writers.push(sparse.clone());
            sparse
        },
    };

    Ok(Indexes {
        dense,
        lexical,
        writers,
    })
}

/// Build the judge when any stage needs one; a bad config disables it
pub fn build_judge(settings: &Settings) -> Option<Arc<dyn Judge>> {
    if !settings.gate.semantic_enabled && !settings.validator.enabled {
        tracing::info!("Judge stages disabled");
        return None;
    }

    match LlmProviderConfig::from_judge_config(&settings.judge)
        .and_then(|cfg| LlmFactory::create(&cfg))
    {
        Ok(judge) => {
            tracing::info!(judge = judge.name(), model = %settings.judge.model, "Judge ready");
            Some(judge)
        },
        Err(e) => {
            tracing::warn!(error = %e, "Judge unavailable; advisory stages will pass through");
            None
        },
    }
}

/// Build the write path over `writers` (primary first), bring the other
/// writers in line with the primary, then load the optional seed
pub async fn build_sync(
    settings: &Settings,
    embedder: Arc<dyn TextEmbedder>,
    writers: Vec<Arc<dyn KnowledgeWriter>>,
) -> Result<KnowledgeSync, ServerError> {
    let mut writers = writers.into_iter();
    let primary = writers
        .next()
        .ok_or_else(|| ServerError::Internal("no knowledge writer configured".to_string()))?;
    let sync = writers.fold(
        KnowledgeSync::new(
            embedder,
            primary,
            Duration::from_millis(settings.embedding.timeout_ms),
        ),
        |sync, writer| sync.with_writer(writer),
    );

    // A fresh or stale lexical index next to a populated primary
    match sync.backfill().await {
        Ok(0) => {},
        Ok(count) => tracing::info!(entries = count, "Lexical index backfilled from primary"),
        Err(e) => tracing::warn!(error = %e, "Lexical backfill failed (non-fatal)"),
    }

    if let Some(seed) = settings.index.seed_path.as_deref() {
        match KnowledgeLoader::load_path(Path::new(seed), &sync).await {
            Ok(count) => tracing::info!(path = seed, entries = count, "Knowledge seed loaded"),
            Err(e) => tracing::warn!(path = seed, error = %e, "Knowledge seed failed (non-fatal)"),
        }
    }

    Ok(sync)
}

/// Assemble the full application state from settings
pub async fn build_state(settings: Settings) -> Result<AppState, ServerError> {
    let lexicon = Arc::new(Lexicon::load_or_default(settings.lexicon_path.as_deref())?);
    let embedder = build_embedder(&settings)?;
    let indexes = build_indexes(&settings).await?;
    let judge = build_judge(&settings);

    let pipeline = SearchPipeline::from_settings(
        &settings,
        lexicon,
        embedder.clone(),
        indexes.dense,
        indexes.lexical,
        judge.clone(),
    )?;

    let sync = build_sync(&settings, embedder, indexes.writers).await?;

    Ok(AppState::new(
        settings,
        Arc::new(pipeline),
        Arc::new(sync),
        judge,
    ))
}
