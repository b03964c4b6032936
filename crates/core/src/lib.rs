//! Core traits and types for the civic knowledge-base assistant
//!
//! This crate provides foundational types used across all other crates:
//! - Knowledge base data model (entries, categories, index hits)
//! - Capability traits for pluggable backends (embedding, index, judge)
//! - Error types

pub mod error;
pub mod knowledge;
pub mod traits;

pub use error::{Error, Result};
pub use knowledge::{
    deserialize_entry_id, normalize_category, Category, EntryId, IndexHit, KnowledgeEntry,
};

// Trait re-exports
pub use traits::{DenseIndex, Judge, KnowledgeWriter, LexicalIndex, TextEmbedder};
