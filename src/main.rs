use anyhow::Result;
use clap::{Parser, Subcommand};
use icd_rag::commands::{build_index, query_codes, serve_mcp, show_status};
use icd_rag::config::{run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "icd-rag")]
#[command(about = "ICD-10-CM code retrieval over a vector index, with an MCP server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the provider connection and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Build the vector index from the JSON-lines corpus
    Build {
        /// Corpus file, overriding the configured path
        #[arg(long)]
        corpus: Option<PathBuf>,
        /// Index directory, overriding the configured path
        #[arg(long)]
        storage: Option<PathBuf>,
    },
    /// Look up records for candidate codes, one per line
    Query {
        /// Query text; use '\n'-separated lines for several codes
        text: String,
    },
    /// Start MCP server on stdio
    Serve,
    /// Show the state of the corpus and index
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // stdout belongs to the MCP transport
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Build { corpus, storage } => {
            build_index(corpus, storage).await?;
        }
        Commands::Query { text } => {
            query_codes(&text).await?;
        }
        Commands::Serve => {
            serve_mcp().await?;
        }
        Commands::Status => {
            show_status().await?;
        }
    }

    Ok(())
}
