//! Contextual compression: keep only the query-relevant text of each passage.

use tracing::debug;

use crate::llm::{ChatModel, PromptMessage};
use crate::models::RetrievedPassage;
use crate::Result;

const NO_OUTPUT: &str = "NO_OUTPUT";

pub fn extraction_prompt(question: &str, context: &str) -> String {
    format!(
        "Given the following question and context, extract any part of the context *AS IS* \
         that is relevant to answer the question. If none of the context is relevant return {}.\n\n\
         Remember, *DO NOT* edit the extracted parts of the context.\n\n\
         > Question: {}\n> Context:\n>>>\n{}\n>>>\nExtracted relevant parts:",
        NO_OUTPUT, question, context
    )
}

/// One model call per passage. Passages with nothing relevant are dropped.
pub(super) async fn compress(
    model: &dyn ChatModel,
    question: &str,
    passages: Vec<RetrievedPassage>,
) -> Result<Vec<RetrievedPassage>> {
    let total = passages.len();
    let mut kept = Vec::with_capacity(total);

    for passage in passages {
        let prompt = extraction_prompt(question, &passage.content);
        let reply = model.complete(&[PromptMessage::user(prompt)], &[]).await?;
        let extracted = reply.content.unwrap_or_default();
        let extracted = extracted.trim();

        if extracted.is_empty() || extracted == NO_OUTPUT {
            continue;
        }

        kept.push(RetrievedPassage {
            content: extracted.to_string(),
            ..passage
        });
    }

    debug!(kept = kept.len(), total, "Compressed retrieved passages");
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::tests::{library, selector_with};
    use super::*;
    use crate::retrieval::RetrievalStrategy;
    use crate::test_support::ScriptedChatModel;

    #[test]
    fn test_prompt_includes_question_and_context() {
        let prompt = extraction_prompt("What is an ETF?", "An ETF is a fund.");
        assert!(prompt.contains("> Question: What is an ETF?"));
        assert!(prompt.contains(">>>\nAn ETF is a fund.\n>>>"));
        assert!(prompt.contains("return NO_OUTPUT"));
    }

    #[tokio::test]
    async fn test_irrelevant_passages_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(
            ScriptedChatModel::new()
                .with_text("  aaaa  ")
                .with_text("NO_OUTPUT")
                .with_text(""),
        );
        let selector = selector_with(dir.path(), library(), model.clone(), 3).await;

        let passages = selector
            .select(RetrievalStrategy::Compressed)
            .query("aaa")
            .await
            .unwrap();

        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].content, "aaaa");
        assert_eq!(passages[0].source, "knowledge_base/a.pdf");
        assert_eq!(model.prompt_count(), 3);
    }

    #[tokio::test]
    async fn test_model_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(ScriptedChatModel::new().with_error("timeout"));
        let selector = selector_with(dir.path(), library(), model, 1).await;

        let result = selector
            .select(RetrievalStrategy::Compressed)
            .query("aaa")
            .await;
        assert!(result.is_err());
    }
}
