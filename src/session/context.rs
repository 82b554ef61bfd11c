//! Per-session state
//!
//! A session starts at sign-in and ends at logout. Its retrieval strategy is
//! chosen once at creation and never changes; the tool registry and agent
//! are built around the retriever for that strategy.
//!
//! Everything except the active conversation is immutable. Turns are
//! serialized by `turn_lock`, which readers never take.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard, RwLock};
use uuid::Uuid;

use crate::agent::ReasoningAgent;
use crate::models::UserProfile;
use crate::retrieval::RetrievalStrategy;

pub struct SessionContext {
    session_id: Uuid,
    user: UserProfile,
    strategy: RetrievalStrategy,
    created_at: DateTime<Utc>,
    active_conversation: RwLock<Option<Uuid>>,
    turn_lock: Mutex<()>,
    agent: Arc<ReasoningAgent>,
}

/// Public view of a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub user_id: String,
    pub user_name: String,
    pub strategy: RetrievalStrategy,
    pub strategy_label: String,
    pub active_conversation: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl SessionContext {
    pub fn new(user: UserProfile, strategy: RetrievalStrategy, agent: ReasoningAgent) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            user,
            strategy,
            created_at: Utc::now(),
            active_conversation: RwLock::new(None),
            turn_lock: Mutex::new(()),
            agent: Arc::new(agent),
        }
    }

    pub fn user(&self) -> &UserProfile {
        &self.user
    }

    pub fn agent(&self) -> Arc<ReasoningAgent> {
        self.agent.clone()
    }

    pub async fn active_conversation(&self) -> Option<Uuid> {
        *self.active_conversation.read().await
    }

    pub async fn set_active_conversation(&self, conversation_id: Uuid) {
        *self.active_conversation.write().await = Some(conversation_id);
    }

    /// Held for the length of one user turn.
    pub async fn begin_turn(&self) -> MutexGuard<'_, ()> {
        self.turn_lock.lock().await
    }

    pub async fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.session_id,
            user_id: self.user.user_id.clone(),
            user_name: self.user.name.clone(),
            strategy: self.strategy,
            strategy_label: self.strategy.label().to_string(),
            active_conversation: self.active_conversation().await,
            created_at: self.created_at,
        }
    }
}
