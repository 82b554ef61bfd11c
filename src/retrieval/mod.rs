//! Retrieval strategies over the knowledge index
//!
//! A `RetrieverSelector` owns the shared index handle and hands out a
//! `Retriever` for whichever strategy a session was assigned. Strategies are
//! a closed set, so the retriever is an enum rather than a trait object.

mod compression;
mod multi_query;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AdvisorError;
use crate::knowledge::KnowledgeIndex;
use crate::llm::{ChatModel, Embedder};
use crate::models::RetrievedPassage;
use crate::Result;

pub use compression::extraction_prompt;
pub use multi_query::paraphrase_prompt;

pub const DEFAULT_TOP_K: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    Standard,
    Compressed,
    MultiQuery,
}

impl RetrievalStrategy {
    pub const ALL: [RetrievalStrategy; 3] = [
        RetrievalStrategy::Standard,
        RetrievalStrategy::Compressed,
        RetrievalStrategy::MultiQuery,
    ];

    /// Uniformly random strategy.
    pub fn random() -> Self {
        Self::ALL
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(RetrievalStrategy::Standard)
    }

    pub fn tag(&self) -> &'static str {
        match self {
            RetrievalStrategy::Standard => "standard",
            RetrievalStrategy::Compressed => "compressed",
            RetrievalStrategy::MultiQuery => "multi_query",
        }
    }

    /// Human-readable name shown alongside a session.
    pub fn label(&self) -> &'static str {
        match self {
            RetrievalStrategy::Standard => "Standard (Fast)",
            RetrievalStrategy::Compressed => "Compressed (Precise)",
            RetrievalStrategy::MultiQuery => "Multi-Query (Robust)",
        }
    }
}

impl fmt::Display for RetrievalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for RetrievalStrategy {
    type Err = AdvisorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(RetrievalStrategy::Standard),
            "compressed" => Ok(RetrievalStrategy::Compressed),
            "multi_query" => Ok(RetrievalStrategy::MultiQuery),
            other => Err(AdvisorError::ConfigError(format!(
                "Unknown retrieval strategy '{}'. Expected one of: standard, compressed, multi_query",
                other
            ))),
        }
    }
}

/// Plain top-k nearest-neighbour search.
#[derive(Clone)]
pub struct VectorRetriever {
    index: Arc<KnowledgeIndex>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl VectorRetriever {
    pub async fn query(&self, text: &str) -> Result<Vec<RetrievedPassage>> {
        let embedding = self.embedder.embed_query(text).await?;
        let hits = self.index.search(&embedding, self.top_k).await?;
        debug!(query = %text, hits = hits.len(), "Vector search");
        Ok(hits.into_iter().map(|hit| hit.passage).collect())
    }
}

#[derive(Clone)]
pub enum Retriever {
    Standard(VectorRetriever),
    /// Passages are narrowed to their query-relevant text by the model
    Compressed {
        base: VectorRetriever,
        model: Arc<dyn ChatModel>,
    },
    /// The query is paraphrased by the model and the results unioned
    MultiQuery {
        base: VectorRetriever,
        model: Arc<dyn ChatModel>,
    },
}

impl Retriever {
    pub fn strategy(&self) -> RetrievalStrategy {
        match self {
            Retriever::Standard(_) => RetrievalStrategy::Standard,
            Retriever::Compressed { .. } => RetrievalStrategy::Compressed,
            Retriever::MultiQuery { .. } => RetrievalStrategy::MultiQuery,
        }
    }

    pub async fn query(&self, text: &str) -> Result<Vec<RetrievedPassage>> {
        match self {
            Retriever::Standard(base) => base.query(text).await,
            Retriever::Compressed { base, model } => {
                let passages = base.query(text).await?;
                compression::compress(model.as_ref(), text, passages).await
            }
            Retriever::MultiQuery { base, model } => {
                multi_query::retrieve(base, model.as_ref(), text).await
            }
        }
    }
}

/// Builds retrievers over one shared index.
#[derive(Clone)]
pub struct RetrieverSelector {
    index: Arc<KnowledgeIndex>,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn ChatModel>,
    top_k: usize,
}

impl RetrieverSelector {
    /// Open the index at `index_path`. Fails with `IndexNotFound` when the
    /// index has not been built, and with `ConfigError` when it was built
    /// by a different embedding model than `embedder`.
    pub async fn open(
        index_path: &Path,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn ChatModel>,
        top_k: usize,
    ) -> Result<Self> {
        let index = KnowledgeIndex::open(index_path).await?;

        let built_with = &index.manifest().embedding_model;
        if built_with != embedder.model_name() {
            return Err(AdvisorError::ConfigError(format!(
                "Index at '{}' was built with embedding model '{}' but '{}' is configured. \
                 Rebuild the index or restore the original model.",
                index_path.display(),
                built_with,
                embedder.model_name()
            )));
        }

        Ok(Self::from_index(Arc::new(index), embedder, model, top_k))
    }

    fn from_index(
        index: Arc<KnowledgeIndex>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn ChatModel>,
        top_k: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            model,
            top_k: top_k.max(1),
        }
    }

    pub fn index(&self) -> Arc<KnowledgeIndex> {
        self.index.clone()
    }

    pub fn select(&self, strategy: RetrievalStrategy) -> Retriever {
        let base = VectorRetriever {
            index: self.index.clone(),
            embedder: self.embedder.clone(),
            top_k: self.top_k,
        };

        match strategy {
            RetrievalStrategy::Standard => Retriever::Standard(base),
            RetrievalStrategy::Compressed => Retriever::Compressed {
                base,
                model: self.model.clone(),
            },
            RetrievalStrategy::MultiQuery => Retriever::MultiQuery {
                base,
                model: self.model.clone(),
            },
        }
    }
}
