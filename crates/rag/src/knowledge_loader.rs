//! Knowledge Base Loader
//!
//! Seeds the index from YAML/JSON exports of the content-management
//! database. Each file holds an `entries` array of knowledge entries.

use std::path::Path;

use civic_qa_core::KnowledgeEntry;
use serde::{Deserialize, Serialize};

use crate::sync::KnowledgeSync;
use crate::RagError;

/// Knowledge base file format
#[derive(Debug, Serialize, Deserialize)]
pub struct KnowledgeFile {
    /// Version for format compatibility
    #[serde(default)]
    pub version: Option<String>,
    pub entries: Vec<KnowledgeEntry>,
}

/// Loader feeding files through the sync path
pub struct KnowledgeLoader;

impl KnowledgeLoader {
    /// Parse one file without writing anything
    pub fn read_file(path: &Path) -> Result<Vec<KnowledgeEntry>, RagError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RagError::Index(format!("Failed to read {}: {}", path.display(), e)))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let file: KnowledgeFile = match extension {
            "yaml" | "yml" => serde_yaml::from_str(&content)
                .map_err(|e| RagError::Index(format!("Failed to parse YAML: {}", e)))?,
            "json" => serde_json::from_str(&content)
                .map_err(|e| RagError::Index(format!("Failed to parse JSON: {}", e)))?,
            other => {
                return Err(RagError::Index(format!(
                    "Unsupported knowledge file extension: '{}'",
                    other
                )))
            }
        };

        Ok(file.entries)
    }

    /// Parse a file and bulk-sync its entries; returns the count written
    pub async fn load_file(path: &Path, sync: &KnowledgeSync) -> Result<usize, RagError> {
        let entries = Self::read_file(path)?;
        let count = sync.bulk_sync(&entries).await?;
        tracing::info!(file = %path.display(), entries = count, "Loaded knowledge file");
        Ok(count)
    }

    /// Load every YAML/JSON file in a directory; a bad file is logged and skipped
    pub async fn load_directory(dir: &Path, sync: &KnowledgeSync) -> Result<usize, RagError> {
        if !dir.exists() {
            tracing::warn!(path = %dir.display(), "Knowledge directory does not exist");
            return Ok(0);
        }

        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .map_err(|e| RagError::Index(format!("Failed to read directory: {}", e)))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("yaml" | "yml" | "json")
                )
            })
            .collect();
        paths.sort();

        let mut total = 0;
        for path in paths {
            match Self::load_file(&path, sync).await {
                Ok(count) => total += count,
                Err(e) => tracing::error!(
                    file = %path.display(),
                    error = %e,
                    "Failed to load knowledge file"
                ),
            }
        }

        tracing::info!(directory = %dir.display(), total, "Knowledge base loading complete");
        Ok(total)
    }

    /// Load a path that may be a file or a directory
    pub async fn load_path(path: &Path, sync: &KnowledgeSync) -> Result<usize, RagError> {
        if path.is_dir() {
            Self::load_directory(path, sync).await
        } else {
            Self::load_file(path, sync).await
        }
    }
}
