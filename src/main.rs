use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use podcatch::config::Config;
use podcatch::pipeline;

#[derive(Parser, Debug)]
#[command(
    name = "podcatch",
    about = "Ingest podcast feeds into PostgreSQL and mirror episode media to object storage"
)]
struct Args {
    /// Download pending episode media instead of ingesting feeds
    #[arg(long)]
    download: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout only carries the summary line
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("podcatch=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::debug!(config = ?config, "Configuration loaded");

    if args.download {
        let summary = pipeline::run_downloads(&config).await?;
        println!("{}", summary);
    } else {
        let summary = pipeline::run_ingest(&config).await?;
        println!("{}", summary);
    }

    Ok(())
}
