//! REST API server for the financial advisor assistant
//!
//! Exposes sign-up/sign-in, per-session chat and the knowledge base update
//! action over HTTP. Every endpoint except `/health` answers with the
//! [`ApiResponse`] envelope.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::AuthService;
use crate::error::AdvisorError;
use crate::knowledge::{describe_update, KnowledgeBaseUpdater};
use crate::session::SessionManager;

pub const ACCOUNT_CREATED_MESSAGE: &str = "Account created successfully! Please go to the Login tab.";
pub const LOGIN_FAILED_MESSAGE: &str = "Login failed. Please check your email and password.";
pub const RESET_SENT_MESSAGE: &str = "A password reset link has been sent to your email address.";

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub session_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct KnowledgeBaseUpdateRequest {
    pub session_id: Uuid,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

type ApiResult = (StatusCode, Json<ApiResponse>);

fn ok<T: Serialize>(data: T) -> ApiResult {
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

fn fail(status: StatusCode, message: impl Into<String>) -> ApiResult {
    (status, Json(ApiResponse::error(message.into())))
}

fn status_for(error: &AdvisorError) -> StatusCode {
    match error {
        AdvisorError::ValidationError(_) | AdvisorError::InvalidToolInput(_) => {
            StatusCode::BAD_REQUEST
        }
        AdvisorError::AuthError(_) => StatusCode::UNAUTHORIZED,
        AdvisorError::SessionNotFound(_) | AdvisorError::NotFound(_) => StatusCode::NOT_FOUND,
        AdvisorError::IndexNotFound(_) => StatusCode::SERVICE_UNAVAILABLE,
        AdvisorError::NetworkError(_) | AdvisorError::LlmError(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn from_error(error: AdvisorError) -> ApiResult {
    fail(status_for(&error), error.to_string())
}

/// Validation errors carry a message meant for the user as-is.
fn user_message(error: &AdvisorError) -> Option<&str> {
    match error {
        AdvisorError::ValidationError(message) => Some(message.as_str()),
        _ => None,
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub sessions: Arc<SessionManager>,
    pub auth: Arc<AuthService>,
    pub updater: Arc<KnowledgeBaseUpdater>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Auth Endpoints
/// =============================

async fn sign_up(State(state): State<ApiState>, Json(req): Json<SignUpRequest>) -> ApiResult {
    match state.auth.sign_up(&req.name, &req.email, &req.password).await {
        Ok(profile) => ok(serde_json::json!({
            "message": ACCOUNT_CREATED_MESSAGE,
            "user_id": profile.user_id,
            "name": profile.name,
        })),
        Err(e) => match user_message(&e) {
            Some(message) => fail(StatusCode::BAD_REQUEST, message),
            None => fail(status_for(&e), format!("Could not create account: {}", e)),
        },
    }
}

/// Signing in opens a new session with its own retrieval strategy.
async fn login(State(state): State<ApiState>, Json(req): Json<LoginRequest>) -> ApiResult {
    match state.auth.sign_in(&req.email, &req.password).await {
        Ok(profile) => {
            let session = state.sessions.open_session(profile).await;
            ok(session)
        }
        Err(e) => {
            warn!("Login failed: {}", e);
            fail(StatusCode::UNAUTHORIZED, LOGIN_FAILED_MESSAGE)
        }
    }
}

async fn logout(State(state): State<ApiState>, Json(req): Json<LogoutRequest>) -> ApiResult {
    match state.sessions.close_session(req.session_id).await {
        Ok(()) => ok(serde_json::json!({ "session_id": req.session_id })),
        Err(e) => from_error(e),
    }
}

async fn password_reset(
    State(state): State<ApiState>,
    Json(req): Json<PasswordResetRequest>,
) -> ApiResult {
    match state.auth.send_password_reset(&req.email).await {
        Ok(()) => ok(serde_json::json!({ "message": RESET_SENT_MESSAGE })),
        Err(e) => match user_message(&e) {
            Some(message) => fail(StatusCode::BAD_REQUEST, message),
            None => fail(status_for(&e), format!("Could not send reset email: {}", e)),
        },
    }
}

/// =============================
/// Session & Chat Endpoints
/// =============================

async fn session_info(State(state): State<ApiState>, Path(session_id): Path<Uuid>) -> ApiResult {
    match state.sessions.info(session_id).await {
        Ok(info) => ok(info),
        Err(e) => from_error(e),
    }
}

async fn new_chat(State(state): State<ApiState>, Path(session_id): Path<Uuid>) -> ApiResult {
    match state.sessions.new_chat(session_id).await {
        Ok(conversation) => ok(conversation.summary()),
        Err(e) => from_error(e),
    }
}

async fn list_chats(State(state): State<ApiState>, Path(session_id): Path<Uuid>) -> ApiResult {
    match state.sessions.list_conversations(session_id).await {
        Ok(chats) => ok(chats),
        Err(e) => from_error(e),
    }
}

/// Opening a chat makes it the session's active conversation.
async fn open_chat(
    State(state): State<ApiState>,
    Path((session_id, chat_id)): Path<(Uuid, Uuid)>,
) -> ApiResult {
    match state.sessions.select_conversation(session_id, chat_id).await {
        Ok(conversation) => ok(serde_json::json!({
            "conversation_id": conversation.conversation_id,
            "title": conversation.title(),
            "messages": conversation.messages(),
        })),
        Err(e) => from_error(e),
    }
}

async fn send_message(
    State(state): State<ApiState>,
    Path((session_id, chat_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<MessageRequest>,
) -> ApiResult {
    info!(session_id = %session_id, chat_id = %chat_id, "Received chat message");

    match state
        .sessions
        .send(session_id, Some(chat_id), &req.message)
        .await
    {
        Ok(reply) => ok(reply),
        Err(e) => from_error(e),
    }
}

/// =============================
/// Knowledge Base Endpoint
/// =============================

/// Only signed-in sessions may trigger a scrape.
async fn update_knowledge_base(
    State(state): State<ApiState>,
    Json(req): Json<KnowledgeBaseUpdateRequest>,
) -> ApiResult {
    if let Err(e) = state.sessions.info(req.session_id).await {
        warn!(session_id = %req.session_id, "Knowledge base update refused: {}", e);
        return from_error(e);
    }
    info!(session_id = %req.session_id, "Knowledge base update requested");

    let outcome = state.updater.update().await;
    let message = describe_update(&outcome);

    match outcome {
        Ok(report) => ok(serde_json::json!({
            "message": message,
            "articles_added": report.articles_added,
            "chunks_added": report.chunks_added,
            "articles_skipped": report.articles_skipped,
        })),
        Err(e) => fail(status_for(&e), message),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/auth/signup", post(sign_up))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/password-reset", post(password_reset))
        .route("/api/sessions/:session_id", get(session_info))
        .route(
            "/api/sessions/:session_id/chats",
            post(new_chat).get(list_chats),
        )
        .route("/api/sessions/:session_id/chats/:chat_id", get(open_chat))
        .route(
            "/api/sessions/:session_id/chats/:chat_id/messages",
            post(send_message),
        )
        .route("/api/knowledge-base/update", post(update_knowledge_base))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
