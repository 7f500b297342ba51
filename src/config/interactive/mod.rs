
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};

use super::{Config, ConfigError, ProviderConfig};
use crate::rag::MissingParentPolicy;

#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 ICD RAG Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config()?;

    eprintln!("{}", style("Provider Configuration").bold().yellow());
    eprintln!("Configure the OpenAI-compatible API used for embeddings and chat completions.");
    eprintln!();

    configure_provider(&mut config.provider)?;

    eprintln!();
    eprintln!("{}", style("Retrieval Configuration").bold().yellow());
    configure_retrieval(&mut config)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    match test_provider_connection(&config.provider) {
        Ok(()) => eprintln!("{}", style("✓ Provider connection successful!").green()),
        Err(e) => {
            eprintln!(
                "{}",
                style(format!("⚠ Warning: Could not reach provider: {e:#}")).yellow()
            );
            eprintln!("You can continue, but the provider must be reachable before building.");
        }
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Provider Settings:").bold().yellow());
    match config.provider.provider_url() {
        Ok(url) => eprintln!("  Base URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Base URL: {} ({})", style("Invalid").red(), e),
    }
    let key_state = if config.provider.api_key().is_ok() {
        style("set").green()
    } else {
        style("missing").red()
    };
    eprintln!(
        "  API Key: ${} ({})",
        style(&config.provider.api_key_env).cyan(),
        key_state
    );
    eprintln!(
        "  Embedding Model: {} ({} dimensions)",
        style(&config.provider.embedding_model).cyan(),
        config.provider.embedding_dimension
    );
    eprintln!("  Chat Model: {}", style(&config.provider.chat_model).cyan());
    eprintln!("  Batch Size: {}", style(config.provider.batch_size).cyan());
    eprintln!(
        "  Timeout: {}s, {} attempts",
        config.provider.timeout_seconds, config.provider.retry_attempts
    );

    eprintln!();
    eprintln!("{}", style("Index Settings:").bold().yellow());
    eprintln!(
        "  Corpus: {}",
        style(config.corpus_path().display()).cyan()
    );
    eprintln!(
        "  Storage: {}",
        style(config.storage_path().display()).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Retrieval Settings:").bold().yellow());
    eprintln!("  Top K: {}", style(config.retrieval.top_k).cyan());
    eprintln!(
        "  Missing Parent Policy: {}",
        style(config.retrieval.missing_parent_policy).cyan()
    );
    eprintln!(
        "  Expose Provider Errors: {}",
        style(config.server.expose_provider_errors).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config() -> Result<Config> {
    let config_dir = Config::config_dir().context("Failed to determine config directory")?;
    Config::load(&config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No valid configuration found. Using defaults.").yellow()
            );
            Ok(Config {
                base_dir: config_dir.clone(),
                ..Config::default()
            })
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_provider(provider: &mut ProviderConfig) -> Result<()> {
    let base_url: String = Input::new()
        .with_prompt("API base URL")
        .default(provider.base_url.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = ProviderConfig {
                base_url: input.clone(),
                ..ProviderConfig::default()
            };
            temp_config.provider_url()?;
            Ok(())
        })
        .interact_text()?;

    let api_key_env: String = Input::new()
        .with_prompt("Environment variable holding the API key")
        .default(provider.api_key_env.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Variable name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let embedding_model: String = Input::new()
        .with_prompt("Embedding model")
        .default(provider.embedding_model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let embedding_dimension: u32 = Input::new()
        .with_prompt("Embedding dimension")
        .default(provider.embedding_dimension)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (64..=4096).contains(input) {
                Ok(())
            } else {
                Err("Dimension must be between 64 and 4096")
            }
        })
        .interact_text()?;

    let chat_model: String = Input::new()
        .with_prompt("Chat model")
        .default(provider.chat_model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Batch size for embedding generation")
        .default(provider.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 2048 {
                Err("Batch size must be 2048 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    provider.set_base_url(base_url)?;
    provider.api_key_env = api_key_env.trim().to_string();
    provider.set_embedding_model(embedding_model)?;
    provider.set_embedding_dimension(embedding_dimension)?;
    provider.set_chat_model(chat_model)?;
    provider.set_batch_size(batch_size)?;

    Ok(())
}

fn configure_retrieval(config: &mut Config) -> Result<()> {
    let top_k: usize = Input::new()
        .with_prompt("Documents retrieved per query (top k)")
        .default(config.retrieval.top_k)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=100).contains(input) {
                Ok(())
            } else {
                Err("Top k must be between 1 and 100")
            }
        })
        .interact_text()?;

    let policies = [MissingParentPolicy::Distinct, MissingParentPolicy::Collapse];
    let default_index = policies
        .iter()
        .position(|p| *p == config.retrieval.missing_parent_policy)
        .unwrap_or(0);
    let policy_index = Select::new()
        .with_prompt("Records without a parent code")
        .default(default_index)
        .items(&["keep each one", "keep only the first"])
        .interact()?;

    config.retrieval.set_top_k(top_k)?;
    config.retrieval.missing_parent_policy = policies[policy_index];

    Ok(())
}

fn test_provider_connection(provider: &ProviderConfig) -> Result<()> {
    let client = crate::provider::OpenAiClient::new(provider)?
        .with_timeout(std::time::Duration::from_secs(5))
        .with_retry_attempts(1);
    client.health_check()
}
