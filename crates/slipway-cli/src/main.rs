//! Slipway CLI entrypoint.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;
mod handlers;

use commands::Commands;

#[derive(Parser)]
#[command(name = "slipway")]
#[command(author, version, about = "Slipway pipeline runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => handlers::run(args).await?,
        Commands::Graph(args) => handlers::graph(args)?,
        Commands::Validate { path } => handlers::validate(&path)?,
    }

    Ok(())
}
