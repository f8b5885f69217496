//! Chroma Games library - turn-based games with LLM collaborators
//!
//! Both games follow one pattern: a pure reducer owns the rules, a store
//! replaces the state record wholesale on every accepted action, and an
//! async driver runs the one collaborator call a game may have in flight.
//!
//! # Architecture
//!
//! - **Engine**: reducer trait, store, single-slot request runner
//! - **Chroma XO**: tic-tac-toe with scores and an optional AI opponent
//! - **Aetheris**: text adventure narrated by an LLM game master
//! - **LLM client**: OpenAI, Anthropic and Gemini behind one call
//!
//! # Example
//!
//! ```
//! use chroma_games::tictactoe::{Action, MatchState, Mode, Position};
//! use chroma_games::Reducer;
//!
//! let state = MatchState::new(Mode::PlayerVsPlayer);
//! let step = state.reduce(Action::Place(Position::Center)).unwrap();
//! assert_eq!(step.state.board().filled(), 1);
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod engine;
mod games;
mod llm_client;

// Crate-level exports - Configuration
pub use config::{AppConfig, ConfigError};

// Crate-level exports - Engine
pub use engine::{CollaboratorError, InFlight, Reducer, Reply, Step, Store, Ticket};

// Crate-level exports - LLM client
pub use llm_client::{LlmClient, LlmConfig, LlmError, LlmProvider, ReplyFormat};

// Crate-level exports - Games
pub use games::{adventure, tictactoe};
