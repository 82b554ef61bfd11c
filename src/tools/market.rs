//! Market data provider and the quote tools built on it

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use super::{group_thousands, require_str, validate_ticker, Tool};
use crate::error::AdvisorError;
use crate::models::{ToolInput, ToolOutput};
use crate::Result;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; financial-advisor-assistant/0.1)";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CompanyProfile {
    pub name: Option<String>,
    pub sector: Option<String>,
    pub market_cap: Option<u64>,
    pub summary: Option<String>,
}

/// Live quote lookups. `Ok(None)` means the service answered but had no data.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn current_price(&self, ticker: &str) -> Result<Option<f64>>;
    async fn company_profile(&self, ticker: &str) -> Result<Option<CompanyProfile>>;
}

// =============================
// Yahoo Finance HTTP client
// =============================

#[derive(Clone)]
pub struct YahooFinanceClient {
    client: Client,
    base_url: String,
}

impl YahooFinanceClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// GET a JSON document; 404 maps to `None`.
    async fn get_json(&self, path: &str) -> Result<Option<Value>> {
        let url = format!("{}{}", self.base_url, path);

        let response = self.client.get(&url).send().await.map_err(|e| {
            error!("Market data request to {} failed: {}", path, e);
            AdvisorError::NetworkError(format!("Market data request failed: {}", e))
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(AdvisorError::NetworkError(format!(
                "Market data service returned {} for {}",
                status, path
            )));
        }

        Ok(Some(response.json::<Value>().await?))
    }
}

#[async_trait]
impl MarketDataProvider for YahooFinanceClient {
    async fn current_price(&self, ticker: &str) -> Result<Option<f64>> {
        let path = format!("/v8/finance/chart/{}?interval=1d&range=1d", ticker);
        Ok(self.get_json(&path).await?.and_then(|body| parse_chart_price(&body)))
    }

    async fn company_profile(&self, ticker: &str) -> Result<Option<CompanyProfile>> {
        let path = format!(
            "/v10/finance/quoteSummary/{}?modules=assetProfile,price",
            ticker
        );
        Ok(self.get_json(&path).await?.and_then(|body| parse_quote_summary(&body)))
    }
}

fn parse_chart_price(body: &Value) -> Option<f64> {
    body.pointer("/chart/result/0/meta/regularMarketPrice")
        .and_then(Value::as_f64)
}

fn parse_quote_summary(body: &Value) -> Option<CompanyProfile> {
    let result = body.pointer("/quoteSummary/result/0")?;
    let text = |pointer: &str| {
        result
            .pointer(pointer)
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    Some(CompanyProfile {
        name: text("/price/longName").or_else(|| text("/price/shortName")),
        sector: text("/assetProfile/sector"),
        market_cap: result
            .pointer("/price/marketCap/raw")
            .or_else(|| result.pointer("/price/marketCap"))
            .and_then(Value::as_u64),
        summary: text("/assetProfile/longBusinessSummary"),
    })
}

// =============================
// Tools
// =============================

fn ticker_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "ticker": {"type": "string", "description": "Stock ticker symbol, e.g. AAPL"}
        },
        "required": ["ticker"]
    })
}

pub struct StockPriceTool {
    market: Arc<dyn MarketDataProvider>,
}

impl StockPriceTool {
    pub fn new(market: Arc<dyn MarketDataProvider>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl Tool for StockPriceTool {
    fn name(&self) -> &'static str {
        "get_current_stock_price"
    }

    fn description(&self) -> &'static str {
        "Fetches the current stock price for a given ticker symbol."
    }

    fn parameters(&self) -> Value {
        ticker_schema()
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let ticker = require_str(input, "ticker")?;
        validate_ticker(&ticker)?;

        let price = self.market.current_price(&ticker).await.map_err(|e| {
            warn!(ticker = %ticker, error = %e, "Stock price lookup failed");
            AdvisorError::NetworkError(format!("Error fetching stock price for {}.", ticker))
        })?;

        match price {
            Some(price) if price > 0.0 => Ok(ToolOutput {
                data: json!({"ticker": ticker, "price": price}),
                text: format!("The current price of {} is ${:.2}.", ticker, price),
            }),
            _ => Err(AdvisorError::NotFound(format!(
                "Could not retrieve the current price for {}.",
                ticker
            ))),
        }
    }
}

pub struct CompanyInfoTool {
    market: Arc<dyn MarketDataProvider>,
}

impl CompanyInfoTool {
    pub fn new(market: Arc<dyn MarketDataProvider>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl Tool for CompanyInfoTool {
    fn name(&self) -> &'static str {
        "get_company_info"
    }

    fn description(&self) -> &'static str {
        "Provides a summary of a company's business for a given ticker symbol."
    }

    fn parameters(&self) -> Value {
        ticker_schema()
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let ticker = require_str(input, "ticker")?;
        validate_ticker(&ticker)?;

        let profile = self.market.company_profile(&ticker).await.map_err(|e| {
            warn!(ticker = %ticker, error = %e, "Company profile lookup failed");
            AdvisorError::NetworkError(format!("Error fetching company info for {}.", ticker))
        })?;

        let Some(profile) = profile.filter(|p| {
            p.summary
                .as_deref()
                .is_some_and(|summary| !summary.trim().is_empty())
        }) else {
            return Err(AdvisorError::NotFound(format!(
                "No detailed information for ticker {}.",
                ticker
            )));
        };

        debug!(ticker = %ticker, "Fetched company profile");
        let text = render_profile(&ticker, &profile);

        Ok(ToolOutput {
            data: serde_json::to_value(&profile)?,
            text,
        })
    }
}

fn render_profile(ticker: &str, profile: &CompanyProfile) -> String {
    format!(
        "**{} ({})**\n**Sector:** {}\n**Market Cap:** ${}\n\n**Business Summary:**\n{}",
        profile.name.as_deref().unwrap_or(ticker),
        ticker,
        profile.sector.as_deref().unwrap_or("N/A"),
        group_thousands(&profile.market_cap.unwrap_or(0).to_string()),
        profile.summary.as_deref().unwrap_or("N/A"),
    )
}
