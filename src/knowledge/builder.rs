//! One-shot index builder

use std::path::Path;

use tracing::info;

use super::chunk::TextSplitter;
use super::index::{IndexedChunk, KnowledgeIndex};
use super::loader::load_documents;
use super::DocumentChunk;
use crate::error::AdvisorError;
use crate::llm::Embedder;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// An index already existed; nothing was touched
    Skipped,
    Built { documents: usize, chunks: usize },
}

/// Build the vector index from the documents in `data_dir`.
///
/// A no-op when `index_path` already exists.
pub async fn build_vector_store(
    data_dir: &Path,
    index_path: &Path,
    embedder: &dyn Embedder,
    splitter: &TextSplitter,
) -> Result<BuildOutcome> {
    if KnowledgeIndex::exists(index_path) {
        info!(
            "Index at '{}' already exists. Skipping creation.",
            index_path.display()
        );
        return Ok(BuildOutcome::Skipped);
    }

    info!("Creating new index from documents in '{}'...", data_dir.display());

    let documents = load_documents(data_dir).await?;
    let chunks = splitter.split_documents(&documents);
    let chunk_count = chunks.len();

    let indexed = embed_chunks(embedder, chunks).await?;
    KnowledgeIndex::create(index_path, embedder.model_name(), indexed).await?;

    info!(
        "Index created and saved at '{}' ({} documents, {} chunks)",
        index_path.display(),
        documents.len(),
        chunk_count
    );

    Ok(BuildOutcome::Built {
        documents: documents.len(),
        chunks: chunk_count,
    })
}

/// Attach embeddings to chunks.
pub async fn embed_chunks(
    embedder: &dyn Embedder,
    chunks: Vec<DocumentChunk>,
) -> Result<Vec<IndexedChunk>> {
    if chunks.is_empty() {
        return Ok(Vec::new());
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = embedder.embed(&texts).await?;

    if embeddings.len() != chunks.len() {
        return Err(AdvisorError::LlmError(format!(
            "Embedder returned {} vectors for {} chunks",
            embeddings.len(),
            chunks.len()
        )));
    }

    Ok(chunks
        .into_iter()
        .zip(embeddings)
        .map(|(chunk, embedding)| IndexedChunk {
            id: chunk.id,
            text: chunk.text,
            source: chunk.source,
            page: chunk.page,
            embedding,
        })
        .collect())
}
