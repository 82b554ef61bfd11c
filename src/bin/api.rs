use financial_advisor_assistant::{
    api::{start_server, ApiState},
    auth::{
        AuthService, FirebaseIdentity, IdentityProvider, InMemoryIdentityProvider,
        InMemoryProfileStore, PostgresProfileStore, ProfileStore,
    },
    config::AdvisorConfig,
    knowledge::{build_vector_store, BuildOutcome, KnowledgeBaseUpdater, NewsScraper, TextSplitter},
    llm::OpenAiClient,
    retrieval::RetrieverSelector,
    session::{ConversationStore, SessionManager},
    tools::YahooFinanceClient,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AdvisorConfig::from_env()?;

    info!("Financial Advisor Assistant - API Server");
    info!("Port: {}", config.port);

    if config.llm.api_key.is_empty() {
        warn!("OPENAI_API_KEY not set; chat and embedding requests will fail");
    }

    let openai = Arc::new(OpenAiClient::new(&config.llm)?);
    let splitter = TextSplitter::new(config.knowledge.chunk_size, config.knowledge.chunk_overlap);

    // The index must exist before any session can retrieve from it
    match build_vector_store(
        &config.knowledge.data_dir,
        &config.knowledge.index_path,
        openai.as_ref(),
        &splitter,
    )
    .await
    {
        Ok(BuildOutcome::Built { documents, chunks }) => {
            info!(documents, chunks, "Knowledge base index built");
        }
        Ok(BuildOutcome::Skipped) => {}
        Err(e) => {
            error!("Failed to build the knowledge base index: {}", e);
            return Err(e.into());
        }
    }

    let selector = RetrieverSelector::open(
        &config.knowledge.index_path,
        openai.clone(),
        openai.clone(),
        config.knowledge.top_k,
    )
    .await?;

    // Identity and storage backends
    let identity: Arc<dyn IdentityProvider> = match &config.firebase_api_key {
        Some(key) => {
            info!("Identity provider: firebase");
            Arc::new(FirebaseIdentity::new(key.clone())?)
        }
        None => {
            warn!("FIREBASE_API_KEY not set; using local in-memory accounts");
            Arc::new(InMemoryIdentityProvider::new())
        }
    };

    let profiles: Arc<dyn ProfileStore> = match &config.database_url {
        Some(url) => Arc::new(PostgresProfileStore::new(
            PgPoolOptions::new().max_connections(5).connect_lazy(url)?,
        )),
        None => Arc::new(InMemoryProfileStore::new()),
    };
    let conversations = Arc::new(ConversationStore::from_database_url(
        config.database_url.as_deref(),
    ));

    let market = Arc::new(YahooFinanceClient::new(&config.market_data_base_url)?);
    let news = Arc::new(NewsScraper::new(config.news.listing_url.clone())?);

    let updater = KnowledgeBaseUpdater::new(
        selector.index(),
        news,
        openai.clone(),
        splitter,
        config.news.article_limit,
    )
    .skip_known_sources(config.news.skip_known_sources);

    let sessions = SessionManager::new(selector, openai, market, conversations)
        .with_forced_strategy(config.forced_strategy)
        .with_max_iterations(config.max_agent_iterations);

    if let Some(strategy) = config.forced_strategy {
        info!("All sessions pinned to the {} retrieval strategy", strategy);
    }

    let state = ApiState {
        sessions: Arc::new(sessions),
        auth: Arc::new(AuthService::new(identity, profiles)),
        updater: Arc::new(updater),
    };

    info!("Starting API server...");
    start_server(state, config.port).await?;

    Ok(())
}
