use anyhow::Result;
use console::style;

use super::Config;

#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Document Fields:").bold().yellow());
    eprintln!("  Embed field: {}", style(&config.fields.embed).cyan());
    eprintln!("  Hash field: {}", style(&config.fields.hash).cyan());
    eprintln!("  Vector field: {}", style(&config.fields.vector).cyan());

    eprintln!();
    eprintln!("{}", style("Embedding Backend:").bold().yellow());
    eprintln!("  Endpoint: {}", style(&config.embedding.endpoint).cyan());
    eprintln!("  Deployment: {}", style(&config.embedding.deployment).cyan());
    eprintln!("  API version: {}", style(&config.embedding.api_version).cyan());
    eprintln!("  Dimensions: {}", style(config.embedding.dimensions).cyan());
    eprintln!(
        "  API key: {}",
        match config.embedding.api_key {
            Some(_) => style("<redacted>").dim(),
            None => style("<not set>").yellow(),
        }
    );
    eprintln!(
        "  Timeout: {}s, attempts: {}",
        style(config.embedding.timeout_seconds).cyan(),
        style(config.embedding.retry_attempts).cyan()
    );

    eprintln!();
    match config.embedding.embeddings_url() {
        Ok(url) => eprintln!("  Request URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Request URL: {} ({})", style("Invalid").red(), e),
    }

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}
