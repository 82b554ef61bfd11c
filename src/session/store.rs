//! Conversation persistence
//!
//! Conversations are kept per user, either in process memory or in Postgres
//! when `DATABASE_URL` is configured. Saving replaces the stored message list
//! of the conversation in one transaction.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::history::{ChatMessage, Conversation, ConversationSummary, MessageRole};
use crate::error::AdvisorError;
use crate::Result;

enum StoreBackend {
    InMemory {
        conversations: Arc<RwLock<HashMap<(String, Uuid), Conversation>>>,
    },
    Postgres {
        pool: PgPool,
        schema_ready: Arc<OnceCell<()>>,
    },
}

pub struct ConversationStore {
    backend: StoreBackend,
}

fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> AdvisorError {
    move |e| AdvisorError::DatabaseError(format!("{}: {}", context, e))
}

impl ConversationStore {
    pub fn in_memory() -> Self {
        Self {
            backend: StoreBackend::InMemory {
                conversations: Arc::new(RwLock::new(HashMap::new())),
            },
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self {
            backend: StoreBackend::Postgres {
                pool,
                schema_ready: Arc::new(OnceCell::new()),
            },
        }
    }

    /// Postgres when a database URL is given and usable, in-memory otherwise.
    pub fn from_database_url(database_url: Option<&str>) -> Self {
        if let Some(url) = database_url {
            match PgPoolOptions::new().max_connections(5).connect_lazy(url) {
                Ok(pool) => {
                    info!("Conversation store backend: postgres");
                    return Self::postgres(pool);
                }
                Err(error) => {
                    warn!(
                        "Failed to initialize postgres conversation store, falling back to in-memory: {}",
                        error
                    );
                }
            }
        }

        info!("Conversation store backend: in-memory");
        Self::in_memory()
    }

    async fn ensure_schema_if_needed(&self) -> Result<()> {
        let StoreBackend::Postgres { pool, schema_ready } = &self.backend else {
            return Ok(());
        };

        schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS conversations (
                      conversation_id UUID PRIMARY KEY,
                      user_id TEXT NOT NULL,
                      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS chat_messages (
                      message_id UUID PRIMARY KEY,
                      conversation_id UUID NOT NULL REFERENCES conversations (conversation_id) ON DELETE CASCADE,
                      user_id TEXT NOT NULL,
                      role TEXT NOT NULL,
                      content TEXT NOT NULL,
                      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_chat_messages_scope_time
                    ON chat_messages (user_id, conversation_id, created_at);
                    "#,
                )
                .execute(pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(db_error("Failed to initialize conversation schema"))?;

        Ok(())
    }

    pub async fn load(&self, user_id: &str, conversation_id: Uuid) -> Result<Option<Conversation>> {
        match &self.backend {
            StoreBackend::InMemory { conversations } => Ok(conversations
                .read()
                .await
                .get(&(user_id.to_string(), conversation_id))
                .cloned()),
            StoreBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let header = sqlx::query(
                    "SELECT created_at FROM conversations WHERE conversation_id = $1 AND user_id = $2",
                )
                .bind(conversation_id)
                .bind(user_id)
                .fetch_optional(pool)
                .await
                .map_err(db_error("Failed to load conversation"))?;

                let Some(header) = header else {
                    return Ok(None);
                };
                let created_at: DateTime<Utc> =
                    header.try_get("created_at").unwrap_or_else(|_| Utc::now());

                let rows = sqlx::query(
                    r#"
                    SELECT message_id, role, content, created_at
                    FROM chat_messages
                    WHERE user_id = $1 AND conversation_id = $2
                    ORDER BY created_at ASC
                    "#,
                )
                .bind(user_id)
                .bind(conversation_id)
                .fetch_all(pool)
                .await
                .map_err(db_error("Failed to load conversation messages"))?;

                let messages = rows.iter().map(message_from_row).collect();
                Ok(Some(Conversation::restore(
                    conversation_id,
                    user_id,
                    created_at,
                    messages,
                )))
            }
        }
    }

    pub async fn save(&self, conversation: &Conversation) -> Result<()> {
        match &self.backend {
            StoreBackend::InMemory { conversations } => {
                let key = (conversation.user_id.clone(), conversation.conversation_id);
                conversations.write().await.insert(key, conversation.clone());
                Ok(())
            }
            StoreBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let mut tx = pool
                    .begin()
                    .await
                    .map_err(db_error("Failed to begin conversation transaction"))?;

                sqlx::query(
                    r#"
                    INSERT INTO conversations (conversation_id, user_id, created_at)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (conversation_id) DO NOTHING
                    "#,
                )
                .bind(conversation.conversation_id)
                .bind(&conversation.user_id)
                .bind(conversation.created_at)
                .execute(&mut *tx)
                .await
                .map_err(db_error("Failed to save conversation"))?;

                sqlx::query("DELETE FROM chat_messages WHERE conversation_id = $1")
                    .bind(conversation.conversation_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_error("Failed to clear old conversation messages"))?;

                for msg in conversation.messages() {
                    sqlx::query(
                        r#"
                        INSERT INTO chat_messages
                          (message_id, conversation_id, user_id, role, content, created_at)
                        VALUES
                          ($1, $2, $3, $4, $5, $6)
                        "#,
                    )
                    .bind(msg.message_id)
                    .bind(conversation.conversation_id)
                    .bind(&conversation.user_id)
                    .bind(msg.role.as_str())
                    .bind(&msg.content)
                    .bind(msg.timestamp)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_error("Failed to insert conversation message"))?;
                }

                tx.commit()
                    .await
                    .map_err(db_error("Failed to commit conversation transaction"))?;

                debug!(
                    conversation_id = %conversation.conversation_id,
                    messages = conversation.message_count(),
                    "Saved conversation"
                );
                Ok(())
            }
        }
    }

    /// Non-empty conversations of a user, newest first.
    pub async fn list(&self, user_id: &str) -> Result<Vec<ConversationSummary>> {
        let conversations: Vec<Conversation> = match &self.backend {
            StoreBackend::InMemory { conversations } => conversations
                .read()
                .await
                .values()
                .filter(|c| c.user_id == user_id)
                .cloned()
                .collect(),
            StoreBackend::Postgres { pool, .. } => {
                self.ensure_schema_if_needed().await?;

                let headers = sqlx::query(
                    "SELECT conversation_id, created_at FROM conversations WHERE user_id = $1",
                )
                .bind(user_id)
                .fetch_all(pool)
                .await
                .map_err(db_error("Failed to list conversations"))?;

                let rows = sqlx::query(
                    r#"
                    SELECT conversation_id, message_id, role, content, created_at
                    FROM chat_messages
                    WHERE user_id = $1
                    ORDER BY created_at ASC
                    "#,
                )
                .bind(user_id)
                .fetch_all(pool)
                .await
                .map_err(db_error("Failed to list conversation messages"))?;

                let mut grouped: HashMap<Uuid, Vec<ChatMessage>> = HashMap::new();
                for row in &rows {
                    if let Ok(conversation_id) = row.try_get::<Uuid, _>("conversation_id") {
                        grouped
                            .entry(conversation_id)
                            .or_default()
                            .push(message_from_row(row));
                    }
                }

                headers
                    .iter()
                    .filter_map(|row| {
                        let conversation_id: Uuid = row.try_get("conversation_id").ok()?;
                        let created_at: DateTime<Utc> =
                            row.try_get("created_at").unwrap_or_else(|_| Utc::now());
                        let messages = grouped.remove(&conversation_id).unwrap_or_default();
                        Some(Conversation::restore(
                            conversation_id,
                            user_id,
                            created_at,
                            messages,
                        ))
                    })
                    .collect()
            }
        };

        let mut summaries: Vec<ConversationSummary> = conversations
            .iter()
            .filter(|c| !c.is_empty())
            .map(Conversation::summary)
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }
}

fn message_from_row(row: &sqlx::postgres::PgRow) -> ChatMessage {
    let role: String = row.try_get("role").unwrap_or_else(|_| "user".to_string());
    ChatMessage {
        message_id: row.try_get("message_id").unwrap_or_else(|_| Uuid::new_v4()),
        timestamp: row.try_get("created_at").unwrap_or_else(|_| Utc::now()),
        role: MessageRole::parse(&role),
        content: row.try_get("content").unwrap_or_default(),
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::in_memory()
    }
}
