//! Knowledge base updater
//!
//! Pulls recent articles from a news source and appends them to the live
//! index. Retrievers share the same `KnowledgeIndex`, so new chunks are
//! searchable as soon as `update` returns.

use std::sync::Arc;

use tracing::{info, warn};

use super::builder::embed_chunks;
use super::chunk::TextSplitter;
use super::index::KnowledgeIndex;
use super::news::NewsSource;
use crate::error::AdvisorError;
use crate::llm::Embedder;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateReport {
    pub articles_added: usize,
    pub chunks_added: usize,
    /// Articles dropped because their URL was already indexed
    pub articles_skipped: usize,
}

pub struct KnowledgeBaseUpdater {
    index: Arc<KnowledgeIndex>,
    news: Arc<dyn NewsSource>,
    embedder: Arc<dyn Embedder>,
    splitter: TextSplitter,
    article_limit: usize,
    skip_known_sources: bool,
}

impl KnowledgeBaseUpdater {
    pub fn new(
        index: Arc<KnowledgeIndex>,
        news: Arc<dyn NewsSource>,
        embedder: Arc<dyn Embedder>,
        splitter: TextSplitter,
        article_limit: usize,
    ) -> Self {
        Self {
            index,
            news,
            embedder,
            splitter,
            article_limit,
            skip_known_sources: false,
        }
    }

    /// Drop articles whose URL is already a source in the index.
    pub fn skip_known_sources(mut self, skip: bool) -> Self {
        self.skip_known_sources = skip;
        self
    }

    pub async fn update(&self) -> Result<UpdateReport> {
        if !KnowledgeIndex::exists(self.index.path()) {
            return Err(AdvisorError::IndexNotFound(self.index.path().to_path_buf()));
        }

        let mut articles = self.news.fetch_articles(self.article_limit).await;
        let mut report = UpdateReport::default();

        if self.skip_known_sources && !articles.is_empty() {
            let known = self.index.sources().await;
            let before = articles.len();
            articles.retain(|article| !known.contains(&article.source));
            report.articles_skipped = before - articles.len();
        }

        if articles.is_empty() {
            info!("No new articles to add to the knowledge base");
            return Ok(report);
        }

        let chunks = self.splitter.split_documents(&articles);
        let indexed = embed_chunks(self.embedder.as_ref(), chunks).await?;
        let chunks_added = indexed.len();
        self.index.append(indexed).await?;

        report.articles_added = articles.len();
        report.chunks_added = chunks_added;

        info!(
            "Added {} article(s) ({} chunks) to the knowledge base",
            report.articles_added, report.chunks_added
        );
        Ok(report)
    }
}

/// User-facing message for an update outcome.
pub fn describe_update(outcome: &Result<UpdateReport>) -> String {
    match outcome {
        Ok(report) if report.articles_added > 0 => format!(
            "Successfully added {} new articles to the knowledge base.",
            report.articles_added
        ),
        Ok(_) => "No new articles found or failed to scrape.".to_string(),
        Err(AdvisorError::IndexNotFound(_)) => "Error: knowledge base index not found.".to_string(),
        Err(e) => {
            warn!("Knowledge base update failed: {}", e);
            format!("An error occurred while updating the knowledge base: {}", e)
        }
    }
}
