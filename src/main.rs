use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use log::{info, warn};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use findocs_rag::config::{Config, StoreConfig};
use findocs_rag::database::QdrantStore;
use findocs_rag::memory::MemoryStore;
use findocs_rag::openai::OpenAiClient;
use findocs_rag::rag::RagEngine;
use findocs_rag::server;
use findocs_rag::store::VectorStore;

/// Question answering over financial documents using OpenAI models and a vector store
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load, chunk, embed and store every PDF and text file in a directory
    Ingest {
        /// Directory containing the source documents
        dir: PathBuf,
        /// Delete the collection before ingesting
        #[arg(long)]
        recreate: bool,
    },
    /// Answer a single question and print the sources used
    Ask {
        question: String,
    },
    /// Interactive question loop
    Chat,
    /// Serve the question endpoint over HTTP
    Serve {
        /// Address to bind, overrides BIND_ADDR
        #[arg(long)]
        bind: Option<String>,
    },
}

async fn open_store(config: &StoreConfig) -> Result<Arc<dyn VectorStore>> {
    let store: Arc<dyn VectorStore> = match config {
        StoreConfig::Qdrant { url, api_key } => {
            info!("Using Qdrant at {}", url);
            Arc::new(QdrantStore::new(url, api_key.clone()).context("Failed to initialize Qdrant client")?)
        }
        StoreConfig::Memory { path: Some(path) } => Arc::new(
            MemoryStore::open(path)
                .await
                .context("Failed to open vector store snapshot")?,
        ),
        StoreConfig::Memory { path: None } => {
            warn!("Using a non-persistent in-memory vector store");
            Arc::new(MemoryStore::new())
        }
    };
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    // Load configuration from environment
    let config = Config::from_env().context("Invalid configuration")?;

    let store = open_store(&config.store).await?;
    let openai = Arc::new(OpenAiClient::new(config.openai.clone()));
    let engine = RagEngine::new(
        store,
        openai.clone(),
        openai,
        config.rag.clone(),
        config.retry.clone(),
    );

    match args.command {
        Command::Ingest { dir, recreate } => {
            if recreate {
                engine
                    .reset_collection()
                    .await
                    .context("Failed to delete collection")?;
            }

            let report = engine
                .ingest_dir(&dir)
                .await
                .with_context(|| format!("Failed to ingest {}", dir.display()))?;

            info!(
                "Ingested {} files ({} failed): {} pages, {} chunks",
                report.files_loaded, report.files_failed, report.pages, report.chunks
            );
            if report.files_failed > 0 {
                warn!("{} files could not be read, see log above", report.files_failed);
            }
        }
        Command::Ask { question } => {
            let answer = engine.ask(&question).await.context("Failed to answer question")?;
            println!("{}", answer.text);
            for source in &answer.sources {
                println!(
                    "  [{:.3}] {} p.{} @{}",
                    source.score,
                    source.chunk.source_id,
                    source.chunk.page_number,
                    source.chunk.start_offset
                );
            }
        }
        Command::Chat => {
            if !engine.collection_exists().await? {
                warn!(
                    "Collection {} does not exist yet, run `ingest` first",
                    engine.config().collection
                );
            }

            // Enter interactive Q&A loop
            engine
                .run_query_loop(io::stdin().lock(), io::stdout())
                .await
                .context("Error in query loop")?;
        }
        Command::Serve { bind } => {
            let bind_addr = bind.unwrap_or_else(|| config.bind_addr.clone());
            server::serve(Arc::new(engine), &bind_addr)
                .await
                .context("Server error")?;
        }
    }

    Ok(())
}
