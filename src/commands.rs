use anyhow::{Context, Result};
use console::style;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::index::{IndexBuilder, IndexManifest, LanceIndex, Retriever, VectorIndex};
use crate::mcp::{McpServer, ToolContext, register_tools};
use crate::provider::Embedder;
use crate::provider::openai::OpenAiClient;
use crate::rag::RagService;

const SERVER_INSTRUCTIONS: &str = "Use retrieve_codes with one candidate ICD-10-CM code per line to look up \
     matching corpus records. summarize_note and generate_codes run the clinical note through the \
     configured language model.";

fn load_config() -> Result<Config> {
    Config::load_default().context("Failed to load configuration")
}

fn provider_client(config: &Config) -> Result<Arc<OpenAiClient>> {
    let client = OpenAiClient::new(&config.provider).context(
        "Failed to create provider client. Use 'icd-rag config' to update connection settings.",
    )?;
    Ok(Arc::new(client))
}

/// Build the vector index from the corpus, replacing any existing index
#[inline]
pub async fn build_index(corpus: Option<PathBuf>, storage: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let corpus = corpus.unwrap_or_else(|| config.corpus_path());
    let storage = storage.unwrap_or_else(|| config.storage_path());

    info!(
        "Building index from {} into {}",
        corpus.display(),
        storage.display()
    );

    let client = provider_client(&config)?;
    let builder = IndexBuilder::new(client, config.provider.batch_size as usize);

    let manifest = builder
        .build_from_corpus(&corpus, &storage)
        .await
        .context("Index build failed")?;

    eprintln!("{}", style("✓ Index built successfully").green());
    eprintln!("  Records: {}", style(manifest.record_count).cyan());
    eprintln!(
        "  Embedding model: {} ({} dimensions)",
        style(&manifest.embedding_model).cyan(),
        manifest.dimension
    );
    eprintln!("  Storage: {}", style(storage.display()).cyan());

    Ok(())
}

/// Retrieve records for a block of candidate codes and print them as JSON
#[inline]
pub async fn query_codes(query_text: &str) -> Result<()> {
    let config = load_config()?;
    let client = provider_client(&config)?;

    let retriever = Retriever::open(&config, client)
        .await
        .context("Failed to open the index. Run 'icd-rag build' first.")?;
    let service = RagService::new(
        Arc::new(retriever),
        config.retrieval.missing_parent_policy,
    );

    let records = service.retrieve_codes(query_text).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({ "rag_documents": records }))?
    );

    Ok(())
}

/// Start the MCP server on stdio.
///
/// Everything user-facing goes to stderr; stdout carries the protocol.
#[inline]
pub async fn serve_mcp() -> Result<()> {
    let config = load_config()?;
    let client = provider_client(&config)?;

    // Fail fast: a server without an index cannot answer anything
    let retriever = Arc::new(
        Retriever::open(&config, Arc::clone(&client) as Arc<dyn Embedder>)
            .await
            .context("Failed to open the index. Run 'icd-rag build' first.")?,
    );

    let health_client = Arc::clone(&client);
    match tokio::task::spawn_blocking(move || health_client.health_check()).await? {
        Ok(()) => info!("Provider reachable at {}", config.provider.base_url),
        Err(e) => {
            warn!("Provider health check failed: {:#}", e);
            eprintln!(
                "{}",
                style("⚠ Provider may not be ready. Requests may fail.").yellow()
            );
        }
    }

    let service = Arc::new(RagService::new(
        Arc::clone(&retriever),
        config.retrieval.missing_parent_policy,
    ));

    let server = McpServer::new(
        "icd-rag".to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    )
    .with_instructions(SERVER_INSTRUCTIONS);
    register_tools(
        &server,
        ToolContext {
            service,
            retriever: Arc::clone(&retriever),
            completer: client,
            expose_provider_errors: config.server.expose_provider_errors,
        },
    )
    .await;
    let server = Arc::new(server);

    eprintln!(
        "{}",
        style("✓ MCP server ready with tools: retrieve_codes, summarize_note, generate_codes, health")
            .green()
    );
    eprintln!(
        "  Serving {} records (top_k = {})",
        retriever.document_count().await?,
        retriever.top_k()
    );
    eprintln!("Press Ctrl+C to stop the server");

    tokio::select! {
        result = Arc::clone(&server).serve_stdio() => {
            if let Err(e) = result {
                error!("MCP server error: {}", e);
                return Err(e);
            }
            info!("MCP server stopped normally");
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nReceived interrupt signal, shutting down...");
        }
    }

    Ok(())
}

/// Show where the corpus and index live and what the index contains
#[inline]
pub async fn show_status() -> Result<()> {
    let config = load_config()?;
    let corpus = config.corpus_path();
    let storage = config.storage_path();

    eprintln!("{}", style("📊 ICD RAG Status").bold().cyan());
    eprintln!();
    eprintln!("  Config directory: {}", config.get_base_dir().display());

    let corpus_state = if corpus.is_file() {
        style("present").green()
    } else {
        style("missing").red()
    };
    eprintln!("  Corpus: {} ({})", corpus.display(), corpus_state);
    eprintln!("  Index: {}", storage.display());
    eprintln!();

    match IndexManifest::read(&storage) {
        Ok(manifest) => {
            eprintln!("{}", style("Index Manifest:").bold().yellow());
            eprintln!("  Records: {}", manifest.record_count);
            eprintln!(
                "  Embedding model: {} ({} dimensions)",
                manifest.embedding_model, manifest.dimension
            );
            eprintln!(
                "  Built at: {}",
                manifest.built_at.format("%Y-%m-%d %H:%M:%S UTC")
            );

            if manifest.embedding_model != config.provider.embedding_model
                || manifest.dimension != config.provider.embedding_dimension as usize
            {
                eprintln!(
                    "  {}",
                    style("⚠ Configured embedding model differs; rebuild the index").yellow()
                );
            }

            match LanceIndex::open(&storage).await {
                Ok(index) => match index.count().await {
                    Ok(rows) => eprintln!("  Stored rows: {}", rows),
                    Err(e) => eprintln!("  Stored rows: {} ({})", style("unknown").red(), e),
                },
                Err(e) => eprintln!("  {} {}", style("✗ Index unreadable:").red(), e),
            }
        }
        Err(e) => {
            eprintln!("{} {}", style("✗ No usable index:").red(), e);
        }
    }

    eprintln!();
    eprintln!("💡 Next Steps:");
    eprintln!("   • Use 'icd-rag build' to (re)build the index from the corpus");
    eprintln!("   • Use 'icd-rag query <text>' to try a lookup");
    eprintln!("   • Use 'icd-rag serve' to start the MCP server");

    Ok(())
}
