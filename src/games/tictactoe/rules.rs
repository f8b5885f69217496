//! Turn arbiter: decides whether a board is won, drawn or still open.

use super::position::Position;
use super::types::{Board, Mark, Square};
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// The eight winning triples, in scan order.
pub const WINNING_LINES: [[Position; 3]; 8] = [
    // Rows
    [Position::TopLeft, Position::TopCenter, Position::TopRight],
    [Position::MiddleLeft, Position::Center, Position::MiddleRight],
    [Position::BottomLeft, Position::BottomCenter, Position::BottomRight],
    // Columns
    [Position::TopLeft, Position::MiddleLeft, Position::BottomLeft],
    [Position::TopCenter, Position::Center, Position::BottomCenter],
    [Position::TopRight, Position::MiddleRight, Position::BottomRight],
    // Diagonals
    [Position::TopLeft, Position::Center, Position::BottomRight],
    [Position::TopRight, Position::Center, Position::BottomLeft],
];

/// What the arbiter concluded about a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    /// Moves remain and nobody has three in a row.
    Undecided,
    /// `mark` holds `line`.
    Won {
        /// The winning mark.
        mark: Mark,
        /// The first winning triple in scan order.
        line: [Position; 3],
    },
    /// Board is full with no line.
    Draw,
}

/// Evaluates a board.
///
/// Lines are scanned in [`WINNING_LINES`] order and the first complete one
/// wins, so even an unreachable board with two lines gets a deterministic
/// answer.
#[instrument(skip(board), fields(filled = board.filled()))]
pub fn evaluate(board: &Board) -> Verdict {
    for line @ [a, b, c] in WINNING_LINES {
        if let Square::Occupied(mark) = board.get(a)
            && board.get(b) == Square::Occupied(mark)
            && board.get(c) == Square::Occupied(mark)
        {
            return Verdict::Won { mark, line };
        }
    }

    if board.is_full() {
        Verdict::Draw
    } else {
        Verdict::Undecided
    }
}
