//! Core data models for the advisor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

//
// ================= Knowledge Base =================
//

/// A passage returned by a retriever, carrying citation metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedPassage {
    pub content: String,
    pub source: String,
    /// 1-based page number for paginated sources
    pub page: Option<u32>,
}

impl RetrievedPassage {
    /// File name (or URL) used when citing the passage.
    pub fn source_name(&self) -> &str {
        if self.source.starts_with("http://") || self.source.starts_with("https://") {
            return &self.source;
        }
        Path::new(&self.source)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.source)
    }

    pub fn page_label(&self) -> String {
        self.page
            .map(|p| p.to_string())
            .unwrap_or_else(|| "N/A".to_string())
    }
}

//
// ================= Projection =================
//

/// Output of the investment projection calculator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ProjectionResult {
    pub principal: f64,
    pub monthly_contribution: f64,
    pub years: u32,
    pub annual_rate: f64,
    pub future_value_principal: f64,
    pub future_value_contributions: f64,
    pub future_value: f64,
}

//
// ================= Tool I/O =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub tool_name: String,
    pub parameters: serde_json::Value,
}

/// Successful tool result: structured data plus the text shown to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub data: serde_json::Value,
    pub text: String,
}


/// Function-call request emitted by the reasoning model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Record of one tool invocation inside a reasoning turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub output: String,
    pub succeeded: bool,
    pub execution_time_ms: u64,
}

//
// ================= Users =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub user_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}
