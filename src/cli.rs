//! Command-line interface for chroma_games.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Chroma Games - tic-tac-toe and a text adventure with LLM collaborators
#[derive(Parser, Debug)]
#[command(name = "chroma_games")]
#[command(about = "Turn-based games with LLM opponents and narrators", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true, default_value = "chroma_games.toml")]
    pub config: PathBuf,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play Chroma XO (tic-tac-toe)
    Xo {
        /// Who plays O
        #[arg(long, value_enum, default_value_t = ModeArg::Pvp)]
        mode: ModeArg,

        /// Use the built-in first-free-square opponent instead of an LLM
        #[arg(long)]
        offline: bool,
    },

    /// Play the Aetheris text adventure
    Adventure,
}

/// Match mode as given on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Two players at one keyboard
    Pvp,
    /// Play against the automated opponent
    Ai,
}
