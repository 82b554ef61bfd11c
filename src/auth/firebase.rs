//! Firebase Identity Toolkit REST client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use super::IdentityProvider;
use crate::error::AdvisorError;
use crate::Result;

const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";

pub struct FirebaseIdentity {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OobRequest<'a> {
    request_type: &'static str,
    email: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
}

impl FirebaseIdentity {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, IDENTITY_TOOLKIT_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn call<B: Serialize + Sync>(&self, method: &str, body: &B) -> Result<Value> {
        let url = format!("{}/accounts:{}?key={}", self.base_url, method, self.api_key);

        let response = self.client.post(&url).json(body).send().await.map_err(|e| {
            error!("Identity toolkit request {} failed: {}", method, e);
            AdvisorError::NetworkError(format!("Identity service unreachable: {}", e))
        })?;

        let status = response.status();
        let payload: Value = response.json().await?;

        if !status.is_success() {
            return Err(AdvisorError::AuthError(provider_error_message(&payload)));
        }
        Ok(payload)
    }
}

/// The provider's error code, e.g. `EMAIL_EXISTS`.
fn provider_error_message(payload: &Value) -> String {
    payload
        .pointer("/error/message")
        .and_then(Value::as_str)
        .unwrap_or("UNKNOWN_ERROR")
        .to_string()
}

#[async_trait]
impl IdentityProvider for FirebaseIdentity {
    async fn sign_up(&self, email: &str, password: &str) -> Result<String> {
        let payload = self
            .call(
                "signUp",
                &PasswordRequest {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;
        let account: AccountResponse = serde_json::from_value(payload)?;
        info!(user_id = %account.local_id, "Created identity account");
        Ok(account.local_id)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<String> {
        let payload = self
            .call(
                "signInWithPassword",
                &PasswordRequest {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;
        let account: AccountResponse = serde_json::from_value(payload)?;
        Ok(account.local_id)
    }

    async fn send_password_reset(&self, email: &str) -> Result<()> {
        self.call(
            "sendOobCode",
            &OobRequest {
                request_type: "PASSWORD_RESET",
                email,
            },
        )
        .await?;
        Ok(())
    }
}
