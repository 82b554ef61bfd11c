//! Session and chat orchestration
//!
//! Sessions live in a registry behind an `RwLock`. Turns within a session
//! run one at a time under the session's turn lock, while reads such as
//! session info and chat listings never wait on a running turn.

pub mod context;
pub mod history;
pub mod store;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{error, info};
use uuid::Uuid;

use crate::agent::ReasoningAgent;
use crate::error::AdvisorError;
use crate::llm::ChatModel;
use crate::models::{ToolInvocation, UserProfile};
use crate::retrieval::{RetrievalStrategy, RetrieverSelector};
use crate::tools::{create_session_registry, MarketDataProvider};
use crate::Result;

pub use context::{SessionContext, SessionInfo};
pub use history::{ChatMessage, Conversation, ConversationSummary, MessageRole};
pub use store::ConversationStore;

/// Reply to one user message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub conversation_id: Uuid,
    pub message: ChatMessage,
    pub intermediate_steps: Vec<ToolInvocation>,
}

pub struct SessionManager {
    sessions: RwLock<HashMap<Uuid, Arc<SessionContext>>>,
    selector: RetrieverSelector,
    model: Arc<dyn ChatModel>,
    market: Arc<dyn MarketDataProvider>,
    conversations: Arc<ConversationStore>,
    forced_strategy: Option<RetrievalStrategy>,
    max_iterations: usize,
}

impl SessionManager {
    pub fn new(
        selector: RetrieverSelector,
        model: Arc<dyn ChatModel>,
        market: Arc<dyn MarketDataProvider>,
        conversations: Arc<ConversationStore>,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            selector,
            model,
            market,
            conversations,
            forced_strategy: None,
            max_iterations: crate::agent::DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Pin every new session to `strategy` instead of a random pick.
    pub fn with_forced_strategy(mut self, strategy: Option<RetrievalStrategy>) -> Self {
        self.forced_strategy = strategy;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    // =============================
    // Lifecycle
    // =============================

    pub async fn open_session(&self, user: UserProfile) -> SessionInfo {
        let strategy = self.forced_strategy.unwrap_or_else(RetrievalStrategy::random);
        let registry = create_session_registry(self.selector.select(strategy), self.market.clone());
        let agent = ReasoningAgent::new(self.model.clone(), Arc::new(registry))
            .with_max_iterations(self.max_iterations);

        let context = SessionContext::new(user, strategy, agent);
        let info = context.info().await;

        info!(
            session_id = %info.session_id,
            user_id = %info.user_id,
            strategy = %strategy,
            "Session assigned to retrieval strategy {}",
            strategy.tag().to_uppercase()
        );

        self.sessions
            .write()
            .await
            .insert(info.session_id, Arc::new(context));
        info
    }

    pub async fn close_session(&self, session_id: Uuid) -> Result<()> {
        match self.sessions.write().await.remove(&session_id) {
            Some(_) => {
                info!(session_id = %session_id, "Session closed");
                Ok(())
            }
            None => Err(AdvisorError::SessionNotFound(session_id.to_string())),
        }
    }

    async fn session(&self, session_id: Uuid) -> Result<Arc<SessionContext>> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or_else(|| AdvisorError::SessionNotFound(session_id.to_string()))
    }

    pub async fn info(&self, session_id: Uuid) -> Result<SessionInfo> {
        let session = self.session(session_id).await?;
        Ok(session.info().await)
    }

    // =============================
    // Conversations
    // =============================

    /// Start an empty conversation and make it active.
    pub async fn new_chat(&self, session_id: Uuid) -> Result<Conversation> {
        let session = self.session(session_id).await?;

        let conversation = Conversation::new(session.user().user_id.clone());
        self.conversations.save(&conversation).await?;
        session
            .set_active_conversation(conversation.conversation_id)
            .await;

        Ok(conversation)
    }

    pub async fn list_conversations(&self, session_id: Uuid) -> Result<Vec<ConversationSummary>> {
        let user_id = self.user_id(session_id).await?;
        self.conversations.list(&user_id).await
    }

    /// Make an existing conversation active and return it.
    pub async fn select_conversation(
        &self,
        session_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Conversation> {
        let session = self.session(session_id).await?;

        let conversation = self
            .load_conversation(&session.user().user_id, conversation_id)
            .await?;
        session.set_active_conversation(conversation_id).await;
        Ok(conversation)
    }

    pub async fn history(&self, session_id: Uuid, conversation_id: Uuid) -> Result<Conversation> {
        let user_id = self.user_id(session_id).await?;
        self.load_conversation(&user_id, conversation_id).await
    }

    async fn user_id(&self, session_id: Uuid) -> Result<String> {
        let session = self.session(session_id).await?;
        Ok(session.user().user_id.clone())
    }

    async fn load_conversation(&self, user_id: &str, conversation_id: Uuid) -> Result<Conversation> {
        self.conversations
            .load(user_id, conversation_id)
            .await?
            .ok_or_else(|| {
                AdvisorError::NotFound(format!("Conversation {} not found", conversation_id))
            })
    }

    // =============================
    // Turns
    // =============================

    /// Run one user turn. Without `conversation_id` the active conversation
    /// is used, or a new one is created.
    ///
    /// Reasoning failures are not returned as errors: they become the
    /// assistant message `Sorry, an error occurred: ...`.
    pub async fn send(
        &self,
        session_id: Uuid,
        conversation_id: Option<Uuid>,
        text: &str,
    ) -> Result<ChatReply> {
        if text.trim().is_empty() {
            return Err(AdvisorError::ValidationError(
                "Message cannot be empty.".to_string(),
            ));
        }

        let session = self.session(session_id).await?;
        let _turn = session.begin_turn().await;
        let user_id = session.user().user_id.clone();

        let active = match conversation_id {
            Some(id) => Some(id),
            None => session.active_conversation().await,
        };
        let mut conversation = match active {
            Some(id) => self.load_conversation(&user_id, id).await?,
            None => Conversation::new(user_id.clone()),
        };

        let prior: Vec<ChatMessage> = conversation.messages().to_vec();
        conversation.add_message(ChatMessage::new(MessageRole::User, text));

        let agent = session.agent();
        let (answer, steps) = match agent.run(&session.user().name, &prior, text).await {
            Ok(turn) => (turn.output, turn.intermediate_steps),
            Err(e) => {
                error!(session_id = %session_id, error = %e, "Reasoning turn failed");
                (format!("Sorry, an error occurred: {}", e), Vec::new())
            }
        };

        let message = ChatMessage::new(MessageRole::Assistant, answer);
        conversation.add_message(message.clone());
        self.conversations.save(&conversation).await?;
        session
            .set_active_conversation(conversation.conversation_id)
            .await;

        Ok(ChatReply {
            conversation_id: conversation.conversation_id,
            message,
            intermediate_steps: steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{embed_chunks, KnowledgeIndex, SourceDocument, TextSplitter};
    use crate::test_support::{LetterEmbedder, MockMarketData, ScriptedChatModel};
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn manager(
        dir: &std::path::Path,
        model: Arc<ScriptedChatModel>,
        strategy: Option<RetrievalStrategy>,
    ) -> SessionManager {
        let embedder = Arc::new(LetterEmbedder::new());
        let docs = vec![SourceDocument::new(
            "Dollar-cost averaging invests a fixed amount on a schedule.",
            "knowledge_base/investing.pdf",
            Some(7),
        )];
        let chunks = embed_chunks(embedder.as_ref(), TextSplitter::default().split_documents(&docs))
            .await
            .unwrap();
        let path = dir.join("vector_index");
        KnowledgeIndex::create(&path, "letter-embedder", chunks)
            .await
            .unwrap();
        let selector = RetrieverSelector::open(&path, embedder, model.clone(), 4)
            .await
            .unwrap();

        SessionManager::new(
            selector,
            model,
            Arc::new(MockMarketData::default().with_price("AAPL", 189.5)),
            Arc::new(ConversationStore::in_memory()),
        )
        .with_forced_strategy(strategy)
    }

    #[tokio::test]
    async fn test_forced_strategy_is_pinned() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(ScriptedChatModel::new());
        let sessions = manager(dir.path(), model, Some(RetrievalStrategy::Compressed)).await;

        let info = sessions.open_session(UserProfile::new("uid-1", "Ada")).await;
        assert_eq!(info.strategy, RetrievalStrategy::Compressed);
        assert_eq!(info.strategy_label, "Compressed (Precise)");
    }

    #[tokio::test]
    async fn test_strategy_constant_across_turns() {
        let dir = tempfile::tempdir().unwrap();
        let extracted = "Dollar-cost averaging invests a fixed amount";
        let search = json!({"query": "dollar-cost averaging"});
        let model = Arc::new(
            ScriptedChatModel::new()
                .with_tool_call("financial_knowledge_search", search.clone())
                .with_text(extracted)
                .with_text("First answer.")
                .with_tool_call("financial_knowledge_search", search)
                .with_text(extracted)
                .with_text("Second answer."),
        );
        let sessions = manager(dir.path(), model.clone(), Some(RetrievalStrategy::Compressed)).await;
        let info = sessions.open_session(UserProfile::new("uid-1", "Ada")).await;

        for expected in ["First answer.", "Second answer."] {
            let reply = sessions
                .send(info.session_id, None, "What is DCA?")
                .await
                .unwrap();
            assert_eq!(reply.message.content, expected);
            assert!(reply.intermediate_steps[0].output.ends_with(extracted));
        }

        // Every search in the session went through the extraction step
        let extraction_calls = model
            .prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|prompt| {
                prompt[0].content.as_deref().is_some_and(|text| {
                    text.starts_with("Given the following question and context")
                        && text.contains("> Question: dollar-cost averaging")
                })
            })
            .count();
        assert_eq!(extraction_calls, 2);
    }

    #[tokio::test]
    async fn test_reads_do_not_wait_for_a_running_turn() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(
            ScriptedChatModel::new()
                .with_text("Slow answer.")
                .with_delay(Duration::from_secs(2)),
        );
        let sessions = Arc::new(manager(dir.path(), model, None).await);
        let info = sessions.open_session(UserProfile::new("uid-1", "Ada")).await;
        let session_id = info.session_id;
        let chat = sessions.new_chat(session_id).await.unwrap();

        let turn = tokio::spawn({
            let sessions = sessions.clone();
            async move { sessions.send(session_id, None, "hello").await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let limit = Duration::from_millis(500);
        let current = timeout(limit, sessions.info(session_id))
            .await
            .expect("session info waited for the turn")
            .unwrap();
        assert_eq!(current.active_conversation, Some(chat.conversation_id));
        timeout(limit, sessions.list_conversations(session_id))
            .await
            .expect("chat listing waited for the turn")
            .unwrap();
        timeout(limit, sessions.select_conversation(session_id, chat.conversation_id))
            .await
            .expect("chat selection waited for the turn")
            .unwrap();

        let reply = turn.await.unwrap().unwrap();
        assert_eq!(reply.message.content, "Slow answer.");
        assert_eq!(reply.conversation_id, chat.conversation_id);
    }

    #[tokio::test]
    async fn test_send_creates_and_reuses_conversation() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(
            ScriptedChatModel::new()
                .with_text("An ETF is a pooled fund.")
                .with_text("Usually, yes."),
        );
        let sessions = manager(dir.path(), model.clone(), None).await;
        let info = sessions.open_session(UserProfile::new("uid-1", "Ada")).await;

        let first = sessions
            .send(info.session_id, None, "What is an ETF?")
            .await
            .unwrap();
        let second = sessions
            .send(info.session_id, None, "Are they cheap?")
            .await
            .unwrap();

        assert_eq!(first.conversation_id, second.conversation_id);
        assert_eq!(second.message.content, "Usually, yes.");

        let conversation = sessions
            .history(info.session_id, first.conversation_id)
            .await
            .unwrap();
        assert_eq!(conversation.message_count(), 4);
        assert_eq!(conversation.title(), "What is an ETF?");

        // Prior turns are sent as history; the new question comes last
        let prompt = model.last_prompt();
        assert_eq!(prompt.len(), 4);
        assert_eq!(prompt[3].content.as_deref(), Some("Are they cheap?"));
    }

    #[tokio::test]
    async fn test_loop_failure_becomes_assistant_message() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(ScriptedChatModel::new().with_error("upstream timeout"));
        let sessions = manager(dir.path(), model, None).await;
        let info = sessions.open_session(UserProfile::new("uid-1", "Ada")).await;

        let reply = sessions.send(info.session_id, None, "hello").await.unwrap();
        assert_eq!(
            reply.message.content,
            "Sorry, an error occurred: LLM error: upstream timeout"
        );

        let conversation = sessions
            .history(info.session_id, reply.conversation_id)
            .await
            .unwrap();
        assert_eq!(conversation.messages()[1].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn test_tool_turn_reaches_market_data() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(
            ScriptedChatModel::new()
                .with_tool_call("get_current_stock_price", json!({"ticker": "AAPL"}))
                .with_text("AAPL is at $189.50."),
        );
        let sessions = manager(dir.path(), model, Some(RetrievalStrategy::Standard)).await;
        let info = sessions.open_session(UserProfile::new("uid-1", "Ada")).await;

        let reply = sessions
            .send(info.session_id, None, "Apple price?")
            .await
            .unwrap();
        assert_eq!(
            reply.intermediate_steps[0].output,
            "The current price of AAPL is $189.50."
        );
    }

    #[tokio::test]
    async fn test_new_chat_listing_and_selection() {
        let dir = tempfile::tempdir().unwrap();
        let model = Arc::new(ScriptedChatModel::new().with_text("Hi!"));
        let sessions = manager(dir.path(), model, None).await;
        let info = sessions.open_session(UserProfile::new("uid-1", "Ada")).await;

        let first = sessions.new_chat(info.session_id).await.unwrap();
        sessions.send(info.session_id, None, "hello").await.unwrap();
        let empty = sessions.new_chat(info.session_id).await.unwrap();

        let listed = sessions.list_conversations(info.session_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].conversation_id, first.conversation_id);

        sessions
            .select_conversation(info.session_id, first.conversation_id)
            .await
            .unwrap();
        let current = sessions.info(info.session_id).await.unwrap();
        assert_eq!(current.active_conversation, Some(first.conversation_id));
        assert_ne!(current.active_conversation, Some(empty.conversation_id));
    }

    #[tokio::test]
    async fn test_closed_session_is_gone() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = manager(dir.path(), Arc::new(ScriptedChatModel::new()), None).await;
        let info = sessions.open_session(UserProfile::new("uid-1", "Ada")).await;

        sessions.close_session(info.session_id).await.unwrap();

        assert!(matches!(
            sessions.info(info.session_id).await,
            Err(AdvisorError::SessionNotFound(_))
        ));
        assert!(sessions.close_session(info.session_id).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = manager(dir.path(), Arc::new(ScriptedChatModel::new()), None).await;
        let info = sessions.open_session(UserProfile::new("uid-1", "Ada")).await;

        tokio_test::assert_err!(sessions.send(info.session_id, None, "   ").await);
    }
}
