//! Financial Advisor Assistant
//!
//! A conversational assistant for personal-finance questions that:
//! - Answers from a local knowledge base of documents (retrieval-augmented)
//! - Looks up live stock prices and company profiles
//! - Projects investment growth with a deterministic calculator
//! - Refreshes the knowledge base from recent news on demand
//!
//! Each signed-in session is pinned to one retrieval strategy (standard,
//! compressed or multi-query) for its whole lifetime.
//!
//! TURN LOOP:
//! QUESTION → MODEL → TOOL CALLS → OBSERVATIONS → MODEL → ... → ANSWER

pub mod agent;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod models;
pub mod retrieval;
pub mod session;
pub mod tools;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{AdvisorError, Result};

// Re-export common types
pub use config::AdvisorConfig;
pub use models::*;
pub use retrieval::{RetrievalStrategy, Retriever, RetrieverSelector};
pub use session::SessionManager;
