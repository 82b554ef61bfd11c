use financial_advisor_assistant::{
    config::AdvisorConfig,
    knowledge::{build_vector_store, BuildOutcome, KnowledgeIndex, TextSplitter},
    llm::OpenAiClient,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AdvisorConfig::from_env()?;
    let embedder = OpenAiClient::new(&config.llm)?;
    let splitter = TextSplitter::new(config.knowledge.chunk_size, config.knowledge.chunk_overlap);

    info!(
        data_dir = %config.knowledge.data_dir.display(),
        index_path = %config.knowledge.index_path.display(),
        "Building knowledge base index"
    );

    match build_vector_store(
        &config.knowledge.data_dir,
        &config.knowledge.index_path,
        &embedder,
        &splitter,
    )
    .await
    {
        Ok(BuildOutcome::Built { documents, chunks }) => {
            println!(
                "Indexed {} documents into {} chunks at '{}'.",
                documents,
                chunks,
                config.knowledge.index_path.display()
            );
            Ok(())
        }
        Ok(BuildOutcome::Skipped) => {
            let index = KnowledgeIndex::open(&config.knowledge.index_path).await?;
            println!(
                "Index at '{}' already exists ({} chunks). Delete it to rebuild.",
                config.knowledge.index_path.display(),
                index.len().await
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("Index build failed: {}", e);
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}
