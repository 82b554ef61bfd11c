//! Runtime configuration
//!
//! Values come from the process environment (after `.env` is loaded by the
//! binaries). Every setting has a default except the API keys.

use crate::error::AdvisorError;
use crate::retrieval::RetrievalStrategy;
use crate::Result;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MARKET_DATA_BASE_URL: &str = "https://query1.finance.yahoo.com";
pub const DEFAULT_NEWS_URL: &str = "https://www.reuters.com/business/finance/";
pub const MAX_NEWS_ARTICLES: usize = 50;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub temperature: f32,
    pub embedding_model: String,
}

#[derive(Debug, Clone)]
pub struct KnowledgeConfig {
    pub data_dir: PathBuf,
    pub index_path: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
}

#[derive(Debug, Clone)]
pub struct NewsConfig {
    pub listing_url: String,
    pub article_limit: usize,
    /// Skip articles whose URL is already a source in the index
    pub skip_known_sources: bool,
}

#[derive(Debug, Clone)]
pub struct AdvisorConfig {
    pub llm: LlmConfig,
    pub knowledge: KnowledgeConfig,
    pub news: NewsConfig,
    pub market_data_base_url: String,
    pub max_agent_iterations: usize,
    /// Forces every session onto one strategy instead of a random pick
    pub forced_strategy: Option<RetrievalStrategy>,
    pub firebase_api_key: Option<String>,
    pub database_url: Option<String>,
    pub port: u16,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                api_key: String::new(),
                base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
                chat_model: "gpt-4o".to_string(),
                temperature: 0.3,
                embedding_model: "text-embedding-3-small".to_string(),
            },
            knowledge: KnowledgeConfig {
                data_dir: PathBuf::from("knowledge_base"),
                index_path: PathBuf::from("vector_index"),
                chunk_size: 1000,
                chunk_overlap: 150,
                top_k: 4,
            },
            news: NewsConfig {
                listing_url: DEFAULT_NEWS_URL.to_string(),
                article_limit: 5,
                skip_known_sources: false,
            },
            market_data_base_url: DEFAULT_MARKET_DATA_BASE_URL.to_string(),
            max_agent_iterations: 15,
            forced_strategy: None,
            firebase_api_key: None,
            database_url: None,
            port: 8080,
        }
    }
}

impl AdvisorConfig {
    /// Read configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let forced_strategy = match optional_var("RAG_STRATEGY") {
            Some(tag) => Some(tag.parse::<RetrievalStrategy>()?),
            None => None,
        };

        let config = Self {
            llm: LlmConfig {
                api_key: optional_var("OPENAI_API_KEY").unwrap_or_default(),
                base_url: optional_var("OPENAI_BASE_URL")
                    .unwrap_or(defaults.llm.base_url)
                    .trim_end_matches('/')
                    .to_string(),
                chat_model: optional_var("CHAT_MODEL").unwrap_or(defaults.llm.chat_model),
                temperature: parsed_var("CHAT_TEMPERATURE", defaults.llm.temperature)?,
                embedding_model: optional_var("EMBEDDING_MODEL")
                    .unwrap_or(defaults.llm.embedding_model),
            },
            knowledge: KnowledgeConfig {
                data_dir: optional_var("KNOWLEDGE_BASE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.knowledge.data_dir),
                index_path: optional_var("INDEX_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.knowledge.index_path),
                chunk_size: parsed_var("CHUNK_SIZE", defaults.knowledge.chunk_size)?,
                chunk_overlap: parsed_var("CHUNK_OVERLAP", defaults.knowledge.chunk_overlap)?,
                top_k: parsed_var("RETRIEVAL_TOP_K", defaults.knowledge.top_k)?,
            },
            news: NewsConfig {
                listing_url: optional_var("NEWS_URL").unwrap_or(defaults.news.listing_url),
                article_limit: parsed_var("NEWS_ARTICLE_LIMIT", defaults.news.article_limit)?,
                skip_known_sources: parsed_var(
                    "KB_UPDATE_SKIP_KNOWN_SOURCES",
                    defaults.news.skip_known_sources,
                )?,
            },
            market_data_base_url: optional_var("MARKET_DATA_BASE_URL")
                .unwrap_or(defaults.market_data_base_url)
                .trim_end_matches('/')
                .to_string(),
            max_agent_iterations: parsed_var("MAX_AGENT_ITERATIONS", defaults.max_agent_iterations)?,
            forced_strategy,
            firebase_api_key: optional_var("FIREBASE_API_KEY"),
            database_url: optional_var("DATABASE_URL").or_else(|| optional_var("POSTGRES_URL")),
            port: match optional_var("PORT").or_else(|| optional_var("API_PORT")) {
                Some(raw) => raw.parse().map_err(|_| {
                    AdvisorError::ConfigError(format!("PORT must be a port number, got '{}'", raw))
                })?,
                None => defaults.port,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.knowledge.chunk_size == 0 {
            return Err(AdvisorError::ConfigError(
                "CHUNK_SIZE must be greater than zero".to_string(),
            ));
        }
        if self.knowledge.chunk_overlap >= self.knowledge.chunk_size {
            return Err(AdvisorError::ConfigError(format!(
                "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
                self.knowledge.chunk_overlap, self.knowledge.chunk_size
            )));
        }
        if self.knowledge.top_k == 0 {
            return Err(AdvisorError::ConfigError(
                "RETRIEVAL_TOP_K must be greater than zero".to_string(),
            ));
        }
        if self.news.article_limit == 0 || self.news.article_limit > MAX_NEWS_ARTICLES {
            return Err(AdvisorError::ConfigError(format!(
                "NEWS_ARTICLE_LIMIT must be between 1 and {}, got {}",
                MAX_NEWS_ARTICLES, self.news.article_limit
            )));
        }
        if self.max_agent_iterations == 0 {
            return Err(AdvisorError::ConfigError(
                "MAX_AGENT_ITERATIONS must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match optional_var(name) {
        Some(raw) => raw.trim().parse::<T>().map_err(|_| {
            AdvisorError::ConfigError(format!("{} has an invalid value: '{}'", name, raw))
        }),
        None => Ok(default),
    }
}
