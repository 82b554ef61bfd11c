//! Knowledge base search tool

use serde_json::{json, Value};
use tracing::info;

use super::{require_str, Tool};
use crate::error::AdvisorError;
use crate::models::{RetrievedPassage, ToolInput, ToolOutput};
use crate::retrieval::Retriever;
use crate::Result;

pub struct KnowledgeSearchTool {
    retriever: Retriever,
}

impl KnowledgeSearchTool {
    pub fn new(retriever: Retriever) -> Self {
        Self { retriever }
    }
}

/// Passages in the citation format the system prompt asks the model to use.
pub fn format_passages(passages: &[RetrievedPassage]) -> String {
    passages
        .iter()
        .map(|p| {
            format!(
                "Source: {}, Page: {}\nContent: {}",
                p.source_name(),
                p.page_label(),
                p.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait::async_trait]
impl Tool for KnowledgeSearchTool {
    fn name(&self) -> &'static str {
        "financial_knowledge_search"
    }

    fn description(&self) -> &'static str {
        "Search for financial concepts, investment strategies, and market analysis from the \
         knowledge base. Provides content and sources."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "What to look up in the knowledge base"}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let query = require_str(input, "query")?;
        if query.is_empty() {
            return Err(AdvisorError::InvalidToolInput(
                "The search query cannot be empty.".to_string(),
            ));
        }

        let passages = self.retriever.query(&query).await?;
        info!(
            strategy = %self.retriever.strategy(),
            passages = passages.len(),
            "Knowledge base search"
        );

        if passages.is_empty() {
            return Err(AdvisorError::NotFound(
                "No information found in the knowledge base for this query.".to_string(),
            ));
        }

        Ok(ToolOutput {
            data: serde_json::to_value(&passages)?,
            text: format_passages(&passages),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::knowledge::{embed_chunks, KnowledgeIndex, SourceDocument, TextSplitter};
    use crate::retrieval::{RetrievalStrategy, RetrieverSelector};
    use crate::test_support::{LetterEmbedder, ScriptedChatModel};

    #[test]
    fn test_passage_formatting() {
        let passages = vec![
            RetrievedPassage {
                content: "Dollar-cost averaging spreads purchases over time.".to_string(),
                source: "knowledge_base/investing_basics.pdf".to_string(),
                page: Some(4),
            },
            RetrievedPassage {
                content: "Rates were held.".to_string(),
                source: "https://www.reuters.com/markets/fed/".to_string(),
                page: None,
            },
        ];

        assert_eq!(
            format_passages(&passages),
            "Source: investing_basics.pdf, Page: 4\nContent: Dollar-cost averaging spreads purchases over time.\n\n\
             Source: https://www.reuters.com/markets/fed/, Page: N/A\nContent: Rates were held."
        );
    }

    #[tokio::test]
    async fn test_no_relevant_passages_reports_no_information() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vector_index");
        let embedder = Arc::new(LetterEmbedder::new());
        let chunks = embed_chunks(
            embedder.as_ref(),
            TextSplitter::default().split_documents(&[SourceDocument::new(
                "Emergency funds cover six months.",
                "knowledge_base/savings.pdf",
                Some(2),
            )]),
        )
        .await
        .unwrap();
        KnowledgeIndex::create(&path, "letter-embedder", chunks)
            .await
            .unwrap();

        // The compressed retriever drops every passage the model marks irrelevant
        let model = Arc::new(ScriptedChatModel::new().with_text("NO_OUTPUT"));
        let selector = RetrieverSelector::open(&path, embedder, model, 4).await.unwrap();
        let tool = KnowledgeSearchTool::new(selector.select(RetrievalStrategy::Compressed));

        let input = ToolInput {
            tool_name: "financial_knowledge_search".to_string(),
            parameters: json!({"query": "emergency fund"}),
        };
        let err = tool.execute(&input).await.unwrap_err();
        assert_eq!(
            err.to_tool_message(),
            "No information found in the knowledge base for this query."
        );
    }

    #[tokio::test]
    async fn test_search_returns_cited_passages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vector_index");
        let embedder = Arc::new(LetterEmbedder::new());
        let chunks = embed_chunks(
            embedder.as_ref(),
            TextSplitter::default().split_documents(&[SourceDocument::new(
                "Emergency funds cover six months.",
                "knowledge_base/savings.pdf",
                Some(2),
            )]),
        )
        .await
        .unwrap();
        KnowledgeIndex::create(&path, "letter-embedder", chunks)
            .await
            .unwrap();

        let selector =
            RetrieverSelector::open(&path, embedder, Arc::new(ScriptedChatModel::new()), 4)
                .await
                .unwrap();
        let tool = KnowledgeSearchTool::new(selector.select(RetrievalStrategy::Standard));

        let output = tool
            .execute(&ToolInput {
                tool_name: "financial_knowledge_search".to_string(),
                parameters: json!("emergency fund"),
            })
            .await
            .unwrap();

        assert_eq!(
            output.text,
            "Source: savings.pdf, Page: 2\nContent: Emergency funds cover six months."
        );
        assert_eq!(output.data[0]["page"], 2);
    }
}
