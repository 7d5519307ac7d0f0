use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;
use embedding_sync::Result;
use embedding_sync::config::{Config, show_config};
use embedding_sync::embeddings::{AzureOpenAiClient, probe};
use embedding_sync::filter::content_hash;
use embedding_sync::trigger::{BatchFormat, ChangeFeedHandler, WriterSink, read_batch};
use embedding_sync::updater::EmbeddingUpdater;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "embedding-sync")]
#[command(about = "Keeps document embeddings in sync with their text")]
#[command(version)]
struct Cli {
    /// Directory containing config.toml (defaults to ~/.embedding-sync)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one change batch and write the updated documents to stdout
    Process {
        /// Read the batch from this file instead of stdin
        #[arg(long)]
        input: Option<PathBuf>,
        /// Treat input and output as one JSON document per line
        #[arg(long)]
        json_lines: bool,
    },
    /// Print the content hash of a piece of text
    Hash {
        /// Text to hash
        text: String,
    },
    /// Send a probe request to the embedding backend
    Check,
    /// Show the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Hash { text } => {
            println!("{}", content_hash(&text));
        }
        Commands::Config => {
            let config = load_config(cli.config_dir)?;
            show_config(&config)?;
        }
        Commands::Check => {
            let config = load_config(cli.config_dir)?;
            let client = AzureOpenAiClient::new(&config.embedding)?;
            probe(&client, config.embedding.dimensions).await?;
            eprintln!(
                "{}",
                style(format!(
                    "✓ {} returned {}-dimensional embeddings",
                    config.embedding.deployment, config.embedding.dimensions
                ))
                .green()
            );
        }
        Commands::Process { input, json_lines } => {
            let config = load_config(cli.config_dir)?;
            let format = if json_lines {
                BatchFormat::Lines
            } else {
                BatchFormat::Array
            };
            process_batch(&config, input, format).await?;
        }
    }

    Ok(())
}

fn load_config(config_dir: Option<PathBuf>) -> Result<Config> {
    let config_dir = match config_dir {
        Some(dir) => dir,
        None => Config::default_dir()?,
    };
    Ok(Config::load(&config_dir)?)
}

async fn process_batch(config: &Config, input: Option<PathBuf>, format: BatchFormat) -> Result<()> {
    let batch = match input {
        Some(path) => {
            let file = File::open(&path)
                .with_context(|| format!("Failed to open batch file: {}", path.display()))?;
            read_batch(BufReader::new(file), format)?
        }
        None => read_batch(std::io::stdin().lock(), format)?,
    };

    let client = AzureOpenAiClient::new(&config.embedding)?;
    let updater = EmbeddingUpdater::from_config(client, config);
    let mut handler = ChangeFeedHandler::new(updater, WriterSink::new(std::io::stdout(), format));

    tokio::select! {
        result = handler.handle(batch) => {
            let written = result?;
            info!("Batch complete, {} documents written", written);
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, abandoning batch");
            return Err(anyhow::anyhow!("batch abandoned before completion").into());
        }
    }

    Ok(())
}
