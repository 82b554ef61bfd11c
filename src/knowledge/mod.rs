//! Knowledge base
//!
//! Document loading, chunking, the persistent vector index, the one-shot
//! index builder and the news-driven updater.

pub mod builder;
pub mod chunk;
pub mod index;
pub mod loader;
pub mod news;
pub mod updater;

use serde::{Deserialize, Serialize};

pub use builder::{build_vector_store, embed_chunks, BuildOutcome};
pub use chunk::TextSplitter;
pub use index::{IndexManifest, IndexedChunk, KnowledgeIndex, SearchHit};
pub use loader::load_documents;
pub use news::{NewsScraper, NewsSource};
pub use updater::{describe_update, KnowledgeBaseUpdater, UpdateReport};

/// A loaded document (or a single page of one) before chunking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceDocument {
    pub content: String,
    pub source: String,
    pub page: Option<u32>,
}

impl SourceDocument {
    pub fn new(content: impl Into<String>, source: impl Into<String>, page: Option<u32>) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
            page,
        }
    }
}

/// A bounded slice of a document, ready to embed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentChunk {
    pub id: String,
    pub text: String,
    pub source: String,
    pub page: Option<u32>,
}
