//! Chroma XO: tic-tac-toe with cumulative scores and an optional automated
//! opponent.

mod action;
mod driver;
mod opponent;
mod position;
mod rules;
mod state;
mod types;

pub use action::{Action, OpponentRequest, Rejection};
pub use driver::{Command, DriverSettings, MatchDriver, MatchEvent};
pub use opponent::{FirstAvailable, LlmOpponent, Opponent, move_prompt, parse_move_reply};
pub use position::Position;
pub use rules::{Verdict, WINNING_LINES, evaluate};
pub use state::{MatchState, Mode, Outcome, Phase};
pub use types::{Board, BoardParseError, Mark, Scores, Square};
