//! Command line: `serve` (the default) and the offline corpus jobs.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use clarity_core::Analyzer;
use clarity_core::embedding::{Embedder, HashingEmbedder, OpenAiEmbedder};
use clarity_core::generation::ResponseGenerator;
use clarity_core::llm::OpenAiChat;
use clarity_core::topics::TopicModel;
use clarity_core::vector_store::LocalVectorStore;
use tracing::{info, warn};

use crate::config::Config;
use crate::entities::{AnyStore, TopicStore};
use crate::services::{PipelineSettings, TherapyService};

/// Clarity therapy assistant backend.
#[derive(Debug, Parser)]
#[command(name = "clarity-server", version, about = "Clarity therapy assistant backend")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Command {
    /// Run the HTTP and WebSocket server.
    Serve,
    /// Import a counseling dataset (JSON array or JSON lines).
    Import {
        file: PathBuf,
        /// Rebuild the vector store once the import is done.
        #[arg(long)]
        reindex: bool,
    },
    /// Fit the topic model on the imported corpus.
    Train,
    /// Rebuild the vector store from the imported corpus.
    Reindex,
    /// Delete every row from every table.
    ResetDb {
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
}

/// Wires the pipeline from configuration: OpenAI embeddings when a key is
/// set, local hashing embeddings otherwise.
pub async fn build_service(cfg: &Config, store: AnyStore) -> anyhow::Result<TherapyService> {
    let embedder: Arc<dyn Embedder> = if cfg.openai_api_key.is_some() {
        Arc::new(OpenAiEmbedder::new(cfg.openai(), cfg.openai_embedding_model.clone()))
    } else {
        warn!("OPENAI_API_KEY not set; using local hashing embeddings and fallback replies");
        Arc::new(HashingEmbedder::default())
    };
    let vectors = LocalVectorStore::open(&cfg.vector_store_dir, embedder)
        .await
        .with_context(|| format!("opening vector store at {}", cfg.vector_store_dir.display()))?
        .with_session_cap(cfg.vector_session_cap);

    let topics = TopicModel::from_topics(store.list_topics().await?);
    info!(topics = topics.topics().len(), "topic model loaded");

    let llm = Arc::new(OpenAiChat::new(cfg.openai(), cfg.openai_model.clone()));
    let generator = ResponseGenerator::new(llm, cfg.generation());
    let settings = PipelineSettings {
        history_window: cfg.history_window,
        max_retrieved_documents: cfg.max_retrieved_documents,
    };
    Ok(TherapyService::new(store, Analyzer::new()?, topics, Arc::new(vectors), generator, settings))
}

/// Runs one offline job. `Serve` is handled by the caller.
pub async fn run(command: Command, service: &TherapyService) -> anyhow::Result<()> {
    match command {
        Command::Serve => {}
        Command::Import { file, reindex } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let report = service.import_dataset(&raw).await?;
            println!(
                "Imported {} of {} records ({} usable after cleaning)",
                report.inserted, report.records, report.cleaned
            );
            if reindex {
                let n = service.reindex().await?;
                println!("Reindexed {n} conversations");
            }
        }
        Command::Train => {
            let report = service.train_topics().await?;
            println!(
                "Trained {} topics on {} documents ({} assigned)",
                report.topics, report.documents, report.assigned
            );
        }
        Command::Reindex => {
            let n = service.reindex().await?;
            println!("Reindexed {n} conversations");
        }
        Command::ResetDb { yes } => {
            if !yes {
                anyhow::bail!("reset-db deletes every row; pass --yes to confirm");
            }
            service.store().reset().await?;
            let vectors = service.vectors();
            vectors
                .reindex_conversations(&[])
                .await
                .context("clearing the vector store")?;
            warn!("database and vector store reset");
            println!("Database and vector store reset");
        }
    }
    Ok(())
}
