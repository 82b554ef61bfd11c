//! Deterministic stand-ins for the network-backed traits, shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AdvisorError;
use crate::knowledge::{NewsSource, SourceDocument};
use crate::llm::{ChatModel, Embedder, ModelReply, PromptMessage, ToolSpec};
use crate::models::ToolCall;
use crate::tools::market::{CompanyProfile, MarketDataProvider};
use crate::Result;

/// Embeds text as a 26-dimensional letter histogram.
pub struct LetterEmbedder {
    pub calls: AtomicUsize,
}

impl LetterEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut counts = vec![0.0f32; 26];
        for c in text.chars().filter(|c| c.is_ascii_alphabetic()) {
            counts[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
        }
        counts
    }
}

#[async_trait]
impl Embedder for LetterEmbedder {
    fn model_name(&self) -> &str {
        "letter-embedder"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// Chat model that replays queued replies and records every prompt it saw.
pub struct ScriptedChatModel {
    replies: Mutex<VecDeque<Result<ModelReply>>>,
    delay: Option<Duration>,
    pub prompts: Mutex<Vec<Vec<PromptMessage>>>,
    pub tool_specs: Mutex<Vec<Vec<String>>>,
}

impl ScriptedChatModel {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            delay: None,
            prompts: Mutex::new(Vec::new()),
            tool_specs: Mutex::new(Vec::new()),
        }
    }

    pub fn with_text(self, text: &str) -> Self {
        self.push(Ok(ModelReply {
            content: Some(text.to_string()),
            tool_calls: Vec::new(),
            finish_reason: Some("stop".to_string()),
        }))
    }

    pub fn with_tool_call(self, name: &str, arguments: serde_json::Value) -> Self {
        let id = format!("call_{}", self.replies.lock().unwrap().len());
        self.with_tool_calls(vec![ToolCall {
            id,
            name: name.to_string(),
            arguments,
        }])
    }

    pub fn with_tool_calls(self, calls: Vec<ToolCall>) -> Self {
        self.push(Ok(ModelReply {
            content: None,
            tool_calls: calls,
            finish_reason: Some("tool_calls".to_string()),
        }))
    }

    /// Sleep this long before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_error(self, message: &str) -> Self {
        self.push(Err(AdvisorError::LlmError(message.to_string())))
    }

    fn push(self, reply: Result<ModelReply>) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Vec<PromptMessage> {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn complete(&self, messages: &[PromptMessage], tools: &[ToolSpec]) -> Result<ModelReply> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.prompts.lock().unwrap().push(messages.to_vec());
        self.tool_specs
            .lock()
            .unwrap()
            .push(tools.iter().map(|t| t.name.clone()).collect());

        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AdvisorError::LlmError("script exhausted".to_string())))
    }
}

/// News source returning a fixed article list.
pub struct StaticNews {
    articles: Vec<SourceDocument>,
    pub requests: AtomicUsize,
}

impl StaticNews {
    pub fn new(articles: Vec<SourceDocument>) -> Self {
        Self {
            articles,
            requests: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl NewsSource for StaticNews {
    async fn fetch_articles(&self, limit: usize) -> Vec<SourceDocument> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.articles.iter().take(limit).cloned().collect()
    }
}

/// In-memory quotes; `failing` makes every lookup a network error.
#[derive(Default)]
pub struct MockMarketData {
    pub prices: HashMap<String, f64>,
    pub profiles: HashMap<String, CompanyProfile>,
    pub failing: bool,
}

impl MockMarketData {
    pub fn with_price(mut self, ticker: &str, price: f64) -> Self {
        self.prices.insert(ticker.to_string(), price);
        self
    }

    pub fn with_profile(mut self, ticker: &str, profile: CompanyProfile) -> Self {
        self.profiles.insert(ticker.to_string(), profile);
        self
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl MarketDataProvider for MockMarketData {
    async fn current_price(&self, ticker: &str) -> Result<Option<f64>> {
        if self.failing {
            return Err(AdvisorError::NetworkError("quote service unreachable".to_string()));
        }
        Ok(self.prices.get(ticker).copied())
    }

    async fn company_profile(&self, ticker: &str) -> Result<Option<CompanyProfile>> {
        if self.failing {
            return Err(AdvisorError::NetworkError("quote service unreachable".to_string()));
        }
        Ok(self.profiles.get(ticker).cloned())
    }
}
