//! Chroma Games - terminal front-end

#![warn(missing_docs)]

mod cli;
mod terminal;

use anyhow::Result;
use chroma_games::AppConfig;
use chroma_games::tictactoe::Mode;
use clap::Parser;
use cli::{Cli, Command, ModeArg};
use tracing::{info, instrument};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    initialize_tracing()?;

    let config = AppConfig::load_or_default(&cli.config)?;
    info!(config = ?config, "Configuration ready");

    match cli.command {
        Command::Xo { mode, offline } => {
            let mode = match mode {
                ModeArg::Pvp => Mode::PlayerVsPlayer,
                ModeArg::Ai => Mode::PlayerVsAi,
            };
            terminal::run_xo(&config, mode, offline).await
        }
        Command::Adventure => terminal::run_adventure(&config).await,
    }
}

/// Logs go to a file so they do not interleave with the game on the terminal.
#[instrument]
fn initialize_tracing() -> Result<()> {
    let log_file = std::fs::File::create("chroma_games.log")?;
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chroma_games=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Arc::new(log_file))
                .with_ansi(false),
        )
        .init();

    info!("Tracing initialized");
    Ok(())
}
