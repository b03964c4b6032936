//! Core traits for the knowledge-base assistant
//!
//! Every external collaborator the pipeline talks to sits behind one of
//! these traits so that backends can be swapped by configuration and
//! replaced with mocks in tests.
//!
//! # Trait Hierarchy
//!
//! ```text
//! Embedding:
//!   - TextEmbedder: Text → fixed-length vector
//!
//! Index:
//!   - DenseIndex: vector similarity search (optionally category-filtered)
//!   - LexicalIndex: substring/keyword match on a payload field
//!   - KnowledgeWriter: upsert/delete path driven by the sync subsystem
//!
//! Judge:
//!   - Judge: instructions + input → free-form text (expected to embed JSON)
//! ```

mod embedder;
mod index;
mod judge;

pub use embedder::TextEmbedder;
pub use index::{DenseIndex, KnowledgeWriter, LexicalIndex};
pub use judge::Judge;
