//! Actions accepted by a tic-tac-toe match and the reasons they are refused.

use super::{Board, Position};
use crate::engine::{CollaboratorError, Ticket};

/// Input to the match reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Place the current mark on a square.
    Place(Position),
    /// Ask the automated opponent for a move.
    RequestOpponent,
    /// The automated opponent answered (or failed to).
    OpponentReplied {
        /// Ticket of the request being answered.
        ticket: Ticket,
        /// The chosen board index, or why there is none.
        result: Result<usize, CollaboratorError>,
    },
    /// Start a new round, keeping scores and mode.
    Restart,
    /// Switch between local play and playing the automated opponent.
    ToggleMode,
}

/// Request for the automated opponent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpponentRequest {
    /// Ticket the reply must carry.
    pub ticket: Ticket,
    /// Board the opponent should move on.
    pub board: Board,
}

/// Why an action was refused. The match state is unchanged in every case.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum Rejection {
    /// The square at the position is already occupied.
    #[display("Square {} is already occupied", _0)]
    SquareOccupied(Position),

    /// The index does not name a square.
    #[display("Index {} is off the board", _0)]
    OutOfBounds(usize),

    /// The round already has a winner or is drawn.
    #[display("Round is already over")]
    GameOver,

    /// The automated opponent is still choosing.
    #[display("Waiting for the opponent")]
    AwaitingOpponent,

    /// The opponent was asked to move out of turn.
    #[display("It is not the opponent's turn")]
    NotOpponentsTurn,

    /// The opponent was asked to move in a local game.
    #[display("No automated opponent in this mode")]
    NoOpponent,

    /// A reply arrived for a request that is no longer pending.
    #[display("Reply {} is stale", _0)]
    StaleReply(Ticket),
}

impl std::error::Error for Rejection {}
