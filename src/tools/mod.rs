//! Tool trait and registry
//!
//! Tools return structured results. Failures stay typed until the reasoning
//! loop renders them with [`AdvisorError::to_tool_message`], so a bad ticker
//! or an unreachable quote service becomes an observation the model can
//! explain instead of aborting the turn.

pub mod knowledge;
pub mod market;
pub mod projection;

use std::collections::HashMap;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::error::AdvisorError;
use crate::llm::ToolSpec;
use crate::models::{ToolInput, ToolOutput};
use crate::retrieval::Retriever;
use crate::Result;

pub use knowledge::KnowledgeSearchTool;
pub use market::{
    CompanyInfoTool, CompanyProfile, MarketDataProvider, StockPriceTool, YahooFinanceClient,
};
pub use projection::{calculate_investment_projection, InvestmentProjectionTool};

/// Trait for a single tool
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON schema of the arguments object
    fn parameters(&self) -> Value;
    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput>;
}

/// Tool registry for looking up and executing tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Tool names in registration order.
    pub fn list(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    /// Function declarations advertised to the reasoning model.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    pub async fn execute(&self, name: &str, arguments: &Value) -> Result<ToolOutput> {
        let tool = self
            .get(name)
            .ok_or_else(|| AdvisorError::ToolNotFound(name.to_string()))?;

        let input = ToolInput {
            tool_name: name.to_string(),
            parameters: arguments.clone(),
        };
        tool.execute(&input).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry for one session: knowledge search over the session's retriever
/// plus the market data and projection tools.
pub fn create_session_registry(
    retriever: Retriever,
    market: Arc<dyn MarketDataProvider>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(KnowledgeSearchTool::new(retriever)));
    registry.register(Arc::new(StockPriceTool::new(market.clone())));
    registry.register(Arc::new(CompanyInfoTool::new(market)));
    registry.register(Arc::new(InvestmentProjectionTool));
    registry
}

// =============================
// Argument helpers
// =============================

lazy_static! {
    static ref TICKER_RE: Regex = Regex::new(r"^[A-Z]{1,5}$").unwrap();
}

pub(crate) const INVALID_TICKER: &str =
    "Invalid ticker symbol format. Please use 1-5 uppercase letters (e.g., 'AAPL').";

pub(crate) fn validate_ticker(ticker: &str) -> Result<()> {
    if TICKER_RE.is_match(ticker) {
        Ok(())
    } else {
        Err(AdvisorError::ValidationError(INVALID_TICKER.to_string()))
    }
}

/// String argument `key`. A bare string (unparseable model output) is
/// accepted as the value of a single-argument tool.
pub(crate) fn require_str(input: &ToolInput, key: &str) -> Result<String> {
    match &input.parameters {
        Value::String(raw) => Ok(raw.trim().to_string()),
        Value::Object(map) => map
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| {
                AdvisorError::InvalidToolInput(format!(
                    "Expected '{}' in the arguments of {}",
                    key, input.tool_name
                ))
            }),
        _ => Err(AdvisorError::InvalidToolInput(format!(
            "Arguments of {} must be a JSON object",
            input.tool_name
        ))),
    }
}

/// Numeric argument `key`, accepting numbers or numeric strings.
pub(crate) fn require_f64(input: &ToolInput, key: &str) -> Result<f64> {
    let value = input
        .parameters
        .as_object()
        .and_then(|map| map.get(key))
        .ok_or_else(|| {
            AdvisorError::InvalidToolInput(format!(
                "Expected numeric '{}' in the arguments of {}",
                key, input.tool_name
            ))
        })?;

    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| {
        AdvisorError::InvalidToolInput(format!("'{}' must be a number, got {}", key, value))
    })
}

/// `$1,234.56`
pub(crate) fn format_usd(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let fixed = format!("{:.2}", value.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    format!("{}${}.{}", sign, group_thousands(whole), cents)
}

/// `2,950,000,000`
pub(crate) fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}
