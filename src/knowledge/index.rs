//! Directory-backed vector index.
//!
//! Layout on disk:
//!
//! ```text
//! <index_path>/
//!   manifest.json   embedding model, dimensions, timestamps
//!   chunks.jsonl    one IndexedChunk per line, append-only
//! ```
//!
//! The whole index is held in memory behind a `RwLock`; search is
//! brute-force cosine similarity. Appends go to disk first, then become
//! visible to readers.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::AdvisorError;
use crate::models::RetrievedPassage;
use crate::Result;

const MANIFEST_FILE: &str = "manifest.json";
const CHUNKS_FILE: &str = "chunks.jsonl";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedChunk {
    pub id: String,
    pub text: String,
    pub source: String,
    pub page: Option<u32>,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexManifest {
    pub format_version: u32,
    pub embedding_model: String,
    pub dimensions: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub passage: RetrievedPassage,
    pub score: f32,
}

pub struct KnowledgeIndex {
    path: PathBuf,
    manifest: IndexManifest,
    chunks: RwLock<Vec<IndexedChunk>>,
}

impl KnowledgeIndex {
    /// Whether an index directory is present at `path`.
    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    /// Open an existing index. Fails with `IndexNotFound` when it has not
    /// been built yet.
    pub async fn open(path: &Path) -> Result<Self> {
        let manifest_path = path.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(AdvisorError::IndexNotFound(path.to_path_buf()));
        }

        let manifest: IndexManifest =
            serde_json::from_slice(&tokio::fs::read(&manifest_path).await?)?;

        let chunks_path = path.join(CHUNKS_FILE);
        let raw = match tokio::fs::read_to_string(&chunks_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let mut chunks = Vec::new();
        for (line_no, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let chunk: IndexedChunk = serde_json::from_str(line).map_err(|e| {
                AdvisorError::IndexCorrupted(format!(
                    "{} line {}: {}",
                    chunks_path.display(),
                    line_no + 1,
                    e
                ))
            })?;
            chunks.push(chunk);
        }

        info!(
            "Opened knowledge index at '{}' ({} chunks, model {})",
            path.display(),
            chunks.len(),
            manifest.embedding_model
        );

        Ok(Self {
            path: path.to_path_buf(),
            manifest,
            chunks: RwLock::new(chunks),
        })
    }

    /// Write a new index. The files are staged in a sibling directory and
    /// renamed into place so an interrupted build leaves nothing behind.
    pub async fn create(path: &Path, embedding_model: &str, chunks: Vec<IndexedChunk>) -> Result<Self> {
        if path.exists() {
            return Err(AdvisorError::ValidationError(format!(
                "An index already exists at '{}'",
                path.display()
            )));
        }

        let dimensions = chunks.first().map(|c| c.embedding.len()).unwrap_or(0);
        ensure_dimensions(&chunks, dimensions)?;

        let manifest = IndexManifest {
            format_version: FORMAT_VERSION,
            embedding_model: embedding_model.to_string(),
            dimensions,
            created_at: Utc::now(),
        };

        let staging = staging_path(path);
        if staging.exists() {
            tokio::fs::remove_dir_all(&staging).await?;
        }
        tokio::fs::create_dir_all(&staging).await?;

        tokio::fs::write(staging.join(CHUNKS_FILE), encode_lines(&chunks)?).await?;
        tokio::fs::write(
            staging.join(MANIFEST_FILE),
            serde_json::to_vec_pretty(&manifest)?,
        )
        .await?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&staging, path).await?;

        info!(
            "Created knowledge index at '{}' with {} chunks",
            path.display(),
            chunks.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            manifest,
            chunks: RwLock::new(chunks),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    /// Every distinct source identifier currently indexed.
    pub async fn sources(&self) -> HashSet<String> {
        self.chunks
            .read()
            .await
            .iter()
            .map(|c| c.source.clone())
            .collect()
    }

    /// Append chunks to disk and memory. Returns the new chunk count.
    pub async fn append(&self, new_chunks: Vec<IndexedChunk>) -> Result<usize> {
        if !self.path.join(MANIFEST_FILE).exists() {
            return Err(AdvisorError::IndexNotFound(self.path.clone()));
        }
        ensure_dimensions(&new_chunks, self.manifest.dimensions)?;

        let mut chunks = self.chunks.write().await;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.join(CHUNKS_FILE))
            .await?;
        file.write_all(&encode_lines(&new_chunks)?).await?;
        file.flush().await?;

        debug!("Appended {} chunks to '{}'", new_chunks.len(), self.path.display());
        chunks.extend(new_chunks);
        Ok(chunks.len())
    }

    /// Top-k chunks by cosine similarity, best first.
    ///
    /// The query vector must have the index's dimensions; an empty index
    /// accepts any query and returns nothing.
    pub async fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if self.manifest.dimensions > 0 && query_embedding.len() != self.manifest.dimensions {
            return Err(AdvisorError::ConfigError(format!(
                "Query embedding has {} dimensions, index '{}' was built with {} ({})",
                query_embedding.len(),
                self.path.display(),
                self.manifest.dimensions,
                self.manifest.embedding_model
            )));
        }

        let chunks = self.chunks.read().await;

        let mut scored: Vec<(f32, &IndexedChunk)> = chunks
            .iter()
            .map(|chunk| (cosine_similarity(query_embedding, &chunk.embedding), chunk))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, chunk)| SearchHit {
                passage: RetrievedPassage {
                    content: chunk.text.clone(),
                    source: chunk.source.clone(),
                    page: chunk.page,
                },
                score,
            })
            .collect())
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "index".into());
    name.push(".building");
    path.with_file_name(name)
}

fn ensure_dimensions(chunks: &[IndexedChunk], dimensions: usize) -> Result<()> {
    if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != dimensions) {
        return Err(AdvisorError::ValidationError(format!(
            "Chunk {} has {} dimensions, index expects {}",
            bad.id,
            bad.embedding.len(),
            dimensions
        )));
    }
    Ok(())
}

fn encode_lines(chunks: &[IndexedChunk]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    for chunk in chunks {
        serde_json::to_writer(&mut buf, chunk)?;
        buf.push(b'\n');
    }
    Ok(buf)
}

/// Cosine similarity; 0.0 for mismatched or zero-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, text: &str, embedding: Vec<f32>) -> IndexedChunk {
        IndexedChunk {
            id: id.to_string(),
            text: text.to_string(),
            source: format!("knowledge_base/{}.pdf", id),
            page: Some(1),
            embedding,
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn test_open_missing_index() {
        let dir = tempfile::tempdir().unwrap();
        let result = KnowledgeIndex::open(&dir.path().join("vector_index")).await;
        assert!(matches!(result, Err(AdvisorError::IndexNotFound(_))));
    }

    #[tokio::test]
    async fn test_create_search_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vector_index");

        let index = KnowledgeIndex::create(
            &path,
            "test-embedder",
            vec![
                chunk("bonds", "Bonds pay fixed coupons.", vec![1.0, 0.0, 0.0]),
                chunk("stocks", "Stocks are equity.", vec![0.0, 1.0, 0.0]),
                chunk("cash", "Cash is liquid.", vec![0.0, 0.0, 1.0]),
            ],
        )
        .await
        .unwrap();

        assert!(!staging_path(&path).exists());

        let hits = index.search(&[0.9, 0.1, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].passage.content, "Bonds pay fixed coupons.");
        assert_eq!(hits[1].passage.content, "Stocks are equity.");

        let reopened = KnowledgeIndex::open(&path).await.unwrap();
        assert_eq!(reopened.len().await, 3);
        assert_eq!(reopened.manifest().dimensions, 3);
        assert_eq!(reopened.manifest().embedding_model, "test-embedder");
    }

    #[tokio::test]
    async fn test_search_rejects_foreign_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let index = KnowledgeIndex::create(
            &dir.path().join("vector_index"),
            "m",
            vec![
                chunk("a", "A", vec![1.0, 0.0, 0.0]),
                chunk("z", "Z", vec![0.0, 0.0, 1.0]),
            ],
        )
        .await
        .unwrap();

        let result = index.search(&[1.0, 0.0], 2).await;
        assert!(matches!(result, Err(AdvisorError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_append_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vector_index");
        let index = KnowledgeIndex::create(&path, "m", vec![chunk("a", "A", vec![1.0, 0.0])])
            .await
            .unwrap();

        let total = index
            .append(vec![chunk("b", "B", vec![0.0, 1.0])])
            .await
            .unwrap();
        assert_eq!(total, 2);

        let reopened = KnowledgeIndex::open(&path).await.unwrap();
        assert_eq!(reopened.len().await, 2);
        assert!(reopened.sources().await.contains("knowledge_base/b.pdf"));
    }

    #[tokio::test]
    async fn test_append_rejects_wrong_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vector_index");
        let index = KnowledgeIndex::create(&path, "m", vec![chunk("a", "A", vec![1.0, 0.0])])
            .await
            .unwrap();

        let result = index.append(vec![chunk("b", "B", vec![1.0, 0.0, 0.0])]).await;
        assert!(matches!(result, Err(AdvisorError::ValidationError(_))));
        assert_eq!(index.len().await, 1);
    }

    #[tokio::test]
    async fn test_append_after_index_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vector_index");
        let index = KnowledgeIndex::create(&path, "m", vec![chunk("a", "A", vec![1.0])])
            .await
            .unwrap();

        std::fs::remove_dir_all(&path).unwrap();
        let result = index.append(vec![chunk("b", "B", vec![1.0])]).await;
        assert!(matches!(result, Err(AdvisorError::IndexNotFound(_))));
    }

    #[tokio::test]
    async fn test_create_refuses_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        let result = KnowledgeIndex::create(dir.path(), "m", vec![]).await;
        assert!(result.is_err());
    }
}
