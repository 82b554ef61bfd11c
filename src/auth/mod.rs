//! Identity and user profiles
//!
//! Credentials are checked by an [`IdentityProvider`]; display names live in
//! a [`ProfileStore`]. [`AuthService`] ties the two together for sign-up and
//! sign-in.

pub mod firebase;
pub mod profile;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AdvisorError;
use crate::models::UserProfile;
use crate::Result;

pub use firebase::FirebaseIdentity;
pub use profile::{InMemoryProfileStore, PostgresProfileStore, ProfileStore, DEFAULT_USER_NAME};

/// External account system. Returns the provider's user id.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<String>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<String>;
    async fn send_password_reset(&self, email: &str) -> Result<()>;
}

// =============================
// In-memory provider
// =============================

struct Account {
    user_id: String,
    password_digest: String,
}

/// Local accounts for development and tests. Passwords are stored as
/// SHA-256 digests.
#[derive(Default)]
pub struct InMemoryIdentityProvider {
    accounts: RwLock<HashMap<String, Account>>,
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

fn digest(email: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str) -> Result<String> {
        let email = normalize_email(email);
        if password.len() < 6 {
            return Err(AdvisorError::AuthError(
                "WEAK_PASSWORD : Password should be at least 6 characters".to_string(),
            ));
        }

        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&email) {
            return Err(AdvisorError::AuthError("EMAIL_EXISTS".to_string()));
        }

        let user_id = Uuid::new_v4().simple().to_string();
        accounts.insert(
            email.clone(),
            Account {
                user_id: user_id.clone(),
                password_digest: digest(&email, password),
            },
        );
        Ok(user_id)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<String> {
        let email = normalize_email(email);
        let accounts = self.accounts.read().await;

        match accounts.get(&email) {
            Some(account) if account.password_digest == digest(&email, password) => {
                Ok(account.user_id.clone())
            }
            _ => Err(AdvisorError::AuthError("INVALID_LOGIN_CREDENTIALS".to_string())),
        }
    }

    async fn send_password_reset(&self, email: &str) -> Result<()> {
        let email = normalize_email(email);
        if !self.accounts.read().await.contains_key(&email) {
            return Err(AdvisorError::AuthError("EMAIL_NOT_FOUND".to_string()));
        }
        info!("Password reset requested for a local account");
        Ok(())
    }
}

// =============================
// Auth service
// =============================

pub struct AuthService {
    identity: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
}

impl AuthService {
    pub fn new(identity: Arc<dyn IdentityProvider>, profiles: Arc<dyn ProfileStore>) -> Self {
        Self { identity, profiles }
    }

    /// Create an account and store its display name.
    pub async fn sign_up(&self, name: &str, email: &str, password: &str) -> Result<UserProfile> {
        if name.trim().is_empty() || email.trim().is_empty() || password.is_empty() {
            return Err(AdvisorError::ValidationError(
                "Please fill in all fields.".to_string(),
            ));
        }

        let user_id = self.identity.sign_up(email.trim(), password).await?;
        let profile = UserProfile::new(user_id, name.trim());
        self.profiles.save(&profile).await?;

        info!(user_id = %profile.user_id, "Account created");
        Ok(profile)
    }

    /// Verify credentials and load the profile; a missing profile gets the
    /// default name.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserProfile> {
        let user_id = self.identity.sign_in(email.trim(), password).await?;

        let profile = match self.profiles.load(&user_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => UserProfile::new(user_id, DEFAULT_USER_NAME),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Profile lookup failed, using default name");
                UserProfile::new(user_id, DEFAULT_USER_NAME)
            }
        };

        Ok(profile)
    }

    pub async fn send_password_reset(&self, email: &str) -> Result<()> {
        if email.trim().is_empty() {
            return Err(AdvisorError::ValidationError(
                "Please enter your email address.".to_string(),
            ));
        }
        self.identity.send_password_reset(email.trim()).await
    }
}
