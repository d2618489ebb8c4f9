use clap::{Parser, Subcommand};
use std::path::PathBuf;

use bridge_client::{commands, config::ClientConfig};

#[derive(Parser)]
#[command(name = "bridge-client")]
#[command(about = "Pair with a bridge host and issue signed requests")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pair with a host using its pairing code JSON
    Pair {
        /// The pairing code payload, as scanned or copied
        code: String,
    },
    /// Connect using the persisted pairing
    Connect,
    /// Show the current pairing status
    Status,
    /// Send one signed GET request
    Request {
        path: String,
        #[arg(default_value = "")]
        query: String,
    },
    /// Remove the pairing and device identity
    Unpair,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "bridge_client={},bridge_core={},bridge_crypto={}",
            args.log_level, args.log_level, args.log_level
        ))
        .init();

    let config = if let Some(path) = &args.config {
        ClientConfig::load_from_file(path)?
    } else {
        ClientConfig::load_from_env()
    };

    match args.command {
        Command::Pair { code } => commands::pair(&config, &code).await,
        Command::Connect => commands::connect(&config).await,
        Command::Status => commands::status(&config).await,
        Command::Request { path, query } => commands::request(&config, &path, &query).await,
        Command::Unpair => commands::unpair(&config).await,
    }
}
