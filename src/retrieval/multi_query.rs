//! Multi-query retrieval: paraphrase, search each variant, union the results.

use std::collections::HashSet;

use tracing::{debug, warn};

use super::VectorRetriever;
use crate::llm::{ChatModel, PromptMessage};
use crate::models::RetrievedPassage;
use crate::Result;

const QUERY_VARIANTS: usize = 3;

pub fn paraphrase_prompt(question: &str) -> String {
    format!(
        "You are an AI language model assistant. Your task is to generate {} different \
         versions of the given user question to retrieve relevant documents from a vector \
         database. By generating multiple perspectives on the user question, your goal is to \
         help the user overcome some of the limitations of the distance-based similarity search. \
         Provide these alternative questions separated by newlines.\nOriginal question: {}",
        QUERY_VARIANTS, question
    )
}

fn parse_queries(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub(super) async fn retrieve(
    base: &VectorRetriever,
    model: &dyn ChatModel,
    question: &str,
) -> Result<Vec<RetrievedPassage>> {
    let reply = model
        .complete(&[PromptMessage::user(paraphrase_prompt(question))], &[])
        .await?;

    let mut queries = parse_queries(reply.content.as_deref().unwrap_or_default());
    if queries.is_empty() {
        warn!("Model produced no query variants; using the original question");
        queries.push(question.to_string());
    }
    debug!(?queries, "Generated query variants");

    let mut seen: HashSet<(String, String, Option<u32>)> = HashSet::new();
    let mut passages = Vec::new();

    for query in &queries {
        for passage in base.query(query).await? {
            let key = (passage.content.clone(), passage.source.clone(), passage.page);
            if seen.insert(key) {
                passages.push(passage);
            }
        }
    }

    Ok(passages)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::tests::{library, selector_with};
    use super::*;
    use crate::llm::PromptRole;
    use crate::retrieval::RetrievalStrategy;
    use crate::test_support::ScriptedChatModel;

    #[test]
    fn test_parse_queries_skips_blank_lines() {
        let queries = parse_queries("  first?\n\n second? \n");
        assert_eq!(queries, vec!["first?", "second?"]);
    }

    #[tokio::test]
    async fn test_results_are_unioned_without_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(ScriptedChatModel::new().with_text("aaa\nbbb\naaaa"));
        let selector = selector_with(dir.path(), library(), model.clone(), 1).await;

        let passages = selector
            .select(RetrievalStrategy::MultiQuery)
            .query("letters")
            .await
            .unwrap();

        let sources: Vec<&str> = passages.iter().map(|p| p.source.as_str()).collect();
        assert_eq!(sources, vec!["knowledge_base/a.pdf", "knowledge_base/b.pdf"]);

        let prompt = model.last_prompt();
        assert_eq!(prompt[0].role, PromptRole::User);
        assert!(prompt[0]
            .content
            .as_deref()
            .unwrap()
            .ends_with("Original question: letters"));
    }

    #[tokio::test]
    async fn test_empty_variants_fall_back_to_original_question() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(ScriptedChatModel::new().with_text("  \n"));
        let selector = selector_with(dir.path(), library(), model, 1).await;

        let passages = selector
            .select(RetrievalStrategy::MultiQuery)
            .query("ccc")
            .await
            .unwrap();

        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].source, "knowledge_base/c.pdf");
    }
}
