//! Match state and its reducer.

use super::action::{Action, OpponentRequest, Rejection};
use super::rules::{Verdict, evaluate};
use super::{Board, Mark, Position, Scores};
use crate::engine::{Reducer, Step, Ticket};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// Who plays O.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
pub enum Mode {
    /// Two people share the board.
    #[display("PvP")]
    PlayerVsPlayer,
    /// O is played by the automated opponent.
    #[display("Versus AI")]
    PlayerVsAi,
}

impl Mode {
    /// The other mode.
    pub fn toggled(self) -> Self {
        match self {
            Mode::PlayerVsPlayer => Mode::PlayerVsAi,
            Mode::PlayerVsAi => Mode::PlayerVsPlayer,
        }
    }
}

/// How a finished round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// `mark` completed `line`.
    Won {
        /// The winning mark.
        mark: Mark,
        /// Squares forming the winning line.
        line: [Position; 3],
    },
    /// Full board, no line.
    Draw,
}

/// Where the round stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Accepting moves.
    Open,
    /// The opponent was asked for a move and has not answered.
    AwaitingOpponent {
        /// Ticket of the outstanding request.
        ticket: Ticket,
    },
    /// Round finished.
    Over(Outcome),
}

/// Complete state of a tic-tac-toe match: the current round plus scores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchState {
    board: Board,
    to_move: Mark,
    phase: Phase,
    scores: Scores,
    mode: Mode,
    version: u64,
}

impl MatchState {
    /// Creates a match in the given mode with an empty board and no score.
    pub fn new(mode: Mode) -> Self {
        Self {
            board: Board::new(),
            to_move: Mark::X,
            phase: Phase::Open,
            scores: Scores::default(),
            mode,
            version: 0,
        }
    }

    /// Returns the board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Mark that moves next.
    pub fn to_move(&self) -> Mark {
        self.to_move
    }

    /// Round phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Cumulative scores.
    pub fn scores(&self) -> Scores {
        self.scores
    }

    /// Current mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The finished round's outcome, if any.
    pub fn outcome(&self) -> Option<Outcome> {
        match self.phase {
            Phase::Over(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// Whether an opponent request is outstanding.
    pub fn is_awaiting_opponent(&self) -> bool {
        matches!(self.phase, Phase::AwaitingOpponent { .. })
    }

    /// Whether the automated opponent should be asked to move now.
    pub fn opponent_due(&self) -> bool {
        self.mode == Mode::PlayerVsAi && self.to_move == Mark::O && self.phase == Phase::Open
    }

    /// Copy of the state one transition later.
    fn next(&self) -> Self {
        Self {
            version: self.version + 1,
            ..self.clone()
        }
    }

    /// The single acceptance path for moves, human or automated.
    #[instrument(skip(self), fields(to_move = %self.to_move, phase = ?self.phase))]
    fn place(&self, pos: Position) -> Result<Self, Rejection> {
        match self.phase {
            Phase::Over(_) => return Err(Rejection::GameOver),
            Phase::AwaitingOpponent { .. } => return Err(Rejection::AwaitingOpponent),
            Phase::Open => {}
        }
        if !self.board.is_empty(pos) {
            return Err(Rejection::SquareOccupied(pos));
        }

        let mut next = self.next();
        next.board = self.board.with(pos, self.to_move);
        next.to_move = self.to_move.opponent();

        match evaluate(&next.board) {
            Verdict::Undecided => {}
            Verdict::Won { mark, line } => {
                info!(%mark, ?line, "Round won");
                next.scores = self.scores.record(mark);
                next.phase = Phase::Over(Outcome::Won { mark, line });
            }
            Verdict::Draw => {
                info!("Round drawn");
                next.phase = Phase::Over(Outcome::Draw);
            }
        }
        Ok(next)
    }

    fn request_opponent(&self) -> Result<Step<Self, OpponentRequest>, Rejection> {
        match self.phase {
            Phase::Over(_) => return Err(Rejection::GameOver),
            Phase::AwaitingOpponent { .. } => return Err(Rejection::AwaitingOpponent),
            Phase::Open => {}
        }
        if self.mode != Mode::PlayerVsAi {
            return Err(Rejection::NoOpponent);
        }
        if self.to_move != Mark::O {
            return Err(Rejection::NotOpponentsTurn);
        }

        let mut next = self.next();
        let ticket = Ticket::new(next.version);
        next.phase = Phase::AwaitingOpponent { ticket };
        debug!(%ticket, "Opponent requested");
        Ok(Step::with_effect(
            next,
            OpponentRequest {
                ticket,
                board: self.board,
            },
        ))
    }

    fn opponent_replied(
        &self,
        ticket: Ticket,
        result: Result<usize, crate::engine::CollaboratorError>,
    ) -> Result<Self, Rejection> {
        if self.phase != (Phase::AwaitingOpponent { ticket }) {
            return Err(Rejection::StaleReply(ticket));
        }

        // The pending phase ends whatever the reply says.
        let mut cleared = self.next();
        cleared.phase = Phase::Open;

        let index = match result {
            Ok(index) => index,
            Err(error) => {
                warn!(%ticket, %error, "Opponent failed; turn left unresolved");
                return Ok(cleared);
            }
        };

        let placed = Position::from_index(index)
            .ok_or(Rejection::OutOfBounds(index))
            .and_then(|pos| cleared.place(pos));
        match placed {
            Ok(next) => Ok(next),
            Err(rejection) => {
                warn!(%ticket, index, %rejection, "Opponent chose an illegal move");
                Ok(cleared)
            }
        }
    }

    /// A fresh round: empty board, X to move, scores and mode kept.
    fn new_round(&self) -> Self {
        Self {
            board: Board::new(),
            to_move: Mark::X,
            phase: Phase::Open,
            ..self.next()
        }
    }
}

impl Default for MatchState {
    fn default() -> Self {
        Self::new(Mode::PlayerVsPlayer)
    }
}

impl Reducer for MatchState {
    type Action = Action;
    type Effect = OpponentRequest;
    type Rejection = Rejection;

    /// Number of accepted transitions over the life of the match.
    fn version(&self) -> u64 {
        self.version
    }

    #[instrument(skip(self), fields(version = self.version))]
    fn reduce(&self, action: Action) -> Result<Step<Self, OpponentRequest>, Rejection> {
        match action {
            Action::Place(pos) => self.place(pos).map(Step::to),
            Action::RequestOpponent => self.request_opponent(),
            Action::OpponentReplied { ticket, result } => {
                self.opponent_replied(ticket, result).map(Step::to)
            }
            Action::Restart => Ok(Step::to(self.new_round())),
            Action::ToggleMode => {
                let mode = self.mode.toggled();
                info!(%mode, "Switching mode");
                Ok(Step::to(Self {
                    mode,
                    scores: Scores::default(),
                    ..self.new_round()
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CollaboratorError;

    fn apply(state: &MatchState, action: Action) -> MatchState {
        state.reduce(action).expect("action accepted").state
    }

    fn play(mode: Mode, moves: &[usize]) -> MatchState {
        moves.iter().fold(MatchState::new(mode), |state, &i| {
            apply(&state, Action::Place(Position::from_index(i).unwrap()))
        })
    }

    fn awaiting(state: &MatchState) -> (MatchState, OpponentRequest) {
        let step = state.reduce(Action::RequestOpponent).unwrap();
        (step.state, step.effect.unwrap())
    }

    #[test]
    fn test_place_flips_turn() {
        let state = play(Mode::PlayerVsPlayer, &[4]);
        assert_eq!(state.to_move(), Mark::O);
        assert_eq!(state.board().filled(), 1);
        assert_eq!(state.phase(), Phase::Open);
    }

    #[test]
    fn test_occupied_square_rejected() {
        let state = play(Mode::PlayerVsPlayer, &[4]);
        assert_eq!(
            state.reduce(Action::Place(Position::Center)),
            Err(Rejection::SquareOccupied(Position::Center))
        );
    }

    #[test]
    fn test_win_scores_once() {
        // X: 0 1 2, O: 3 4
        let state = play(Mode::PlayerVsPlayer, &[0, 3, 1, 4, 2]);
        assert!(matches!(
            state.outcome(),
            Some(Outcome::Won { mark: Mark::X, .. })
        ));
        assert_eq!(state.scores(), Scores { x: 1, o: 0 });

        for pos in Position::ALL {
            assert_eq!(state.reduce(Action::Place(pos)), Err(Rejection::GameOver));
        }
        assert_eq!(state.scores(), Scores { x: 1, o: 0 });
    }

    #[test]
    fn test_restart_keeps_scores_and_mode() {
        let won = play(Mode::PlayerVsAi, &[0, 3, 1, 4, 2]);
        let fresh = apply(&won, Action::Restart);
        assert_eq!(fresh.board(), &Board::new());
        assert_eq!(fresh.phase(), Phase::Open);
        assert_eq!(fresh.to_move(), Mark::X);
        assert_eq!(fresh.scores(), Scores { x: 1, o: 0 });
        assert_eq!(fresh.mode(), Mode::PlayerVsAi);
        assert!(fresh.version() > won.version());
    }

    #[test]
    fn test_toggle_mode_zeroes_scores() {
        let won = play(Mode::PlayerVsPlayer, &[0, 3, 1, 4, 2]);
        let toggled = apply(&won, Action::ToggleMode);
        assert_eq!(toggled.mode(), Mode::PlayerVsAi);
        assert_eq!(toggled.scores(), Scores::default());
        assert_eq!(toggled.board(), &Board::new());
    }

    #[test]
    fn test_opponent_request_only_on_its_turn() {
        let state = MatchState::new(Mode::PlayerVsAi);
        assert_eq!(
            state.reduce(Action::RequestOpponent),
            Err(Rejection::NotOpponentsTurn)
        );

        let local = play(Mode::PlayerVsPlayer, &[4]);
        assert_eq!(
            local.reduce(Action::RequestOpponent),
            Err(Rejection::NoOpponent)
        );
    }

    #[test]
    fn test_pending_request_blocks_moves_and_duplicates() {
        let state = play(Mode::PlayerVsAi, &[4]);
        assert!(state.opponent_due());
        let (pending, request) = awaiting(&state);
        assert_eq!(request.board, *state.board());
        assert!(pending.is_awaiting_opponent());

        assert_eq!(
            pending.reduce(Action::Place(Position::TopLeft)),
            Err(Rejection::AwaitingOpponent)
        );
        assert_eq!(
            pending.reduce(Action::RequestOpponent),
            Err(Rejection::AwaitingOpponent)
        );
    }

    #[test]
    fn test_opponent_move_applied() {
        let state = play(Mode::PlayerVsAi, &[4]);
        let (pending, request) = awaiting(&state);
        let next = apply(
            &pending,
            Action::OpponentReplied {
                ticket: request.ticket,
                result: Ok(0),
            },
        );
        assert_eq!(next.board().filled(), 2);
        assert_eq!(next.to_move(), Mark::X);
        assert_eq!(next.phase(), Phase::Open);
    }

    #[test]
    fn test_opponent_illegal_move_clears_pending() {
        let state = play(Mode::PlayerVsAi, &[4]);
        let (pending, request) = awaiting(&state);

        for index in [4, 9] {
            let next = apply(
                &pending,
                Action::OpponentReplied {
                    ticket: request.ticket,
                    result: Ok(index),
                },
            );
            assert_eq!(next.board(), state.board());
            assert_eq!(next.phase(), Phase::Open);
            assert_eq!(next.to_move(), Mark::O);
        }
    }

    #[test]
    fn test_opponent_failure_leaves_turn_unresolved() {
        let state = play(Mode::PlayerVsAi, &[4]);
        let (pending, request) = awaiting(&state);
        let next = apply(
            &pending,
            Action::OpponentReplied {
                ticket: request.ticket,
                result: Err(CollaboratorError::Failed("boom".to_string())),
            },
        );
        assert_eq!(next.board(), state.board());
        assert!(next.opponent_due());
    }

    #[test]
    fn test_stale_reply_rejected() {
        let state = play(Mode::PlayerVsAi, &[4]);
        let (pending, request) = awaiting(&state);
        let restarted = apply(&pending, Action::Restart);

        assert_eq!(
            restarted.reduce(Action::OpponentReplied {
                ticket: request.ticket,
                result: Ok(0),
            }),
            Err(Rejection::StaleReply(request.ticket))
        );
    }

    #[test]
    fn test_column_win_for_o() {
        // X O X / X O O / _ _ X, O to move.
        let state = play(Mode::PlayerVsPlayer, &[0, 1, 2, 4, 3, 5, 8]);
        assert_eq!(state.to_move(), Mark::O);
        let next = apply(&state, Action::Place(Position::BottomCenter));
        assert_eq!(
            next.outcome(),
            Some(Outcome::Won {
                mark: Mark::O,
                line: [Position::TopCenter, Position::Center, Position::BottomCenter],
            })
        );
        assert_eq!(next.scores().o, 1);
    }
}
