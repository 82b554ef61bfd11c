//! User profile storage

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tokio::sync::{OnceCell, RwLock};

use crate::error::AdvisorError;
use crate::models::UserProfile;
use crate::Result;

pub const DEFAULT_USER_NAME: &str = "User";

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn save(&self, profile: &UserProfile) -> Result<()>;
    async fn load(&self, user_id: &str) -> Result<Option<UserProfile>>;
}

#[derive(Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<String, UserProfile>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn save(&self, profile: &UserProfile) -> Result<()> {
        self.profiles
            .write()
            .await
            .insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }

    async fn load(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Ok(self.profiles.read().await.get(user_id).cloned())
    }
}

pub struct PostgresProfileStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PostgresProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS user_profiles (
                      user_id TEXT PRIMARY KEY,
                      name TEXT,
                      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(&self.pool)
                .await
                .map(|_| ())
            })
            .await
            .map_err(|e| {
                AdvisorError::DatabaseError(format!(
                    "Failed to initialize profile schema: {}",
                    e
                ))
            })?;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for PostgresProfileStore {
    async fn save(&self, profile: &UserProfile) -> Result<()> {
        self.ensure_schema().await?;

        sqlx::query(
            r#"
            INSERT INTO user_profiles (user_id, name, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(&profile.user_id)
        .bind(&profile.name)
        .bind(profile.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AdvisorError::DatabaseError(format!("Failed to save profile: {}", e)))?;

        Ok(())
    }

    async fn load(&self, user_id: &str) -> Result<Option<UserProfile>> {
        self.ensure_schema().await?;

        let row = sqlx::query("SELECT name, created_at FROM user_profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AdvisorError::DatabaseError(format!("Failed to load profile: {}", e)))?;

        Ok(row.map(|row| {
            let name: Option<String> = row.try_get("name").ok().flatten();
            let created_at: DateTime<Utc> = row.try_get("created_at").unwrap_or_else(|_| Utc::now());
            UserProfile {
                user_id: user_id.to_string(),
                name: name
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_USER_NAME.to_string()),
                created_at,
            }
        }))
    }
}
