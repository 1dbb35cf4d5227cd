mod accept;
mod config;
mod event;
mod filter;
mod proto;
mod registry;
mod server;
mod storage;
mod subscription;
mod verify;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use config::Settings;
use server::{AppState, RelayInfo};
use storage::{EventStore, FsStore};

/// Command line interface entry point.
#[derive(Parser)]
#[command(name = "castr", author, version, about = "Streaming Nostr relay")]
struct Cli {
    /// Path to the `.env` configuration file.
    #[arg(long, default_value = ".env")]
    env: String,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the storage tree at `STORE_ROOT`.
    Init,
    /// Launch the relay.
    Serve,
}

/// Execute the selected CLI subcommand.
async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = Settings::from_env(&cli.env)?;
    match cli.command {
        Commands::Init => {
            FsStore::open(cfg.store_root.clone())?;
        }
        Commands::Serve => {
            let store: Arc<dyn EventStore> = Arc::new(FsStore::open(cfg.store_root.clone())?);
            let addr: SocketAddr = cfg.bind.parse()?;
            let state = AppState::new(store, RelayInfo::from_settings(&cfg));
            server::serve(addr, state, std::future::pending()).await?;
        }
    }
    Ok(())
}

#[cfg(not(test))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    run(cli).await
}
