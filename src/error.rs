//! Error types for the financial advisor assistant

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for advisor operations
pub type Result<T> = std::result::Result<T, AdvisorError>;

#[derive(Error, Debug)]
pub enum AdvisorError {

    // =============================
    // Domain Errors
    // =============================

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Knowledge base index not found at '{}'", .0.display())]
    IndexNotFound(PathBuf),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Tool execution error: {0}")]
    ToolExecutionError(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Index corrupted: {0}")]
    IndexCorrupted(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AdvisorError {
    /// Render the error as an observation the reasoning loop can read and
    /// explain back to the user.
    pub fn to_tool_message(&self) -> String {
        match self {
            AdvisorError::ValidationError(msg) => format!("Error: {}", msg),
            AdvisorError::NotFound(msg)
            | AdvisorError::NetworkError(msg)
            | AdvisorError::ToolExecutionError(msg) => msg.clone(),
            AdvisorError::InvalidToolInput(msg) => format!("Error: invalid tool input. {}", msg),
            AdvisorError::IndexNotFound(_) => {
                "Error: the knowledge base is not available right now.".to_string()
            }
            other => format!("Error: {}", other),
        }
    }
}
