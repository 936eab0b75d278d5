//! Pico CLI: the main entry point.
//!
//! Commands:
//! - `serve` : Start the HTTP API server
//! - `chat`  : Interactive chat or single-message mode
//! - `tools` : List discovered tools and resources
//! - `init`  : Write a default config file

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod runtime;

#[derive(Parser)]
#[command(
    name = "pico",
    about = "Pico: a personal notes and todos assistant",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.pico/config.toml)
    #[arg(long, global = true, env = "PICO_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Chat with the assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// List discovered tools and resources
    Tools,

    /// Write a default config file if none exists
    Init,
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve { port } => commands::serve::run(config_path, port).await?,
        Commands::Chat { message } => commands::chat::run(config_path, message).await?,
        Commands::Tools => commands::tools::run(config_path).await?,
        Commands::Init => commands::init::run(config_path)?,
    }

    Ok(())
}
