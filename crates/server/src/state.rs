//! Application State
//!
//! Shared state across all handlers.

use std::sync::Arc;

use civic_qa_config::Settings;
use civic_qa_core::Judge;
use civic_qa_rag::{KnowledgeSync, SearchPipeline};

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Settings the pipeline was built from; fixed after startup
    pub config: Arc<Settings>,
    /// Read path
    pub pipeline: Arc<SearchPipeline>,
    /// Write path
    pub sync: Arc<KnowledgeSync>,
    /// External judge, when one is configured (readiness probe)
    pub judge: Option<Arc<dyn Judge>>,
}

impl AppState {
    pub fn new(
        config: Settings,
        pipeline: Arc<SearchPipeline>,
        sync: Arc<KnowledgeSync>,
        judge: Option<Arc<dyn Judge>>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            pipeline,
            sync,
            judge,
        }
    }

    pub fn config(&self) -> &Settings {
        &self.config
    }
}
