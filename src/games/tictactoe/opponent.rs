//! Automated opponents.

use super::{Board, Position};
use crate::engine::CollaboratorError;
use crate::llm_client::{LlmClient, ReplyFormat};
use tracing::{debug, info, instrument, warn};

const SYSTEM_PROMPT: &str = "You are playing tic-tac-toe as O. \
    When asked to move, respond with ONLY the index (0-8) of an empty square and nothing else.";

/// Something that can choose O's move.
#[async_trait::async_trait]
pub trait Opponent: Send + Sync {
    /// Picks the board index (0-8) of an empty square.
    ///
    /// Answers are not trusted: the match state rejects occupied or
    /// out-of-range indices like any other move.
    async fn choose_move(&self, board: &Board) -> Result<usize, CollaboratorError>;

    /// Display name.
    fn name(&self) -> &str;
}

/// Offline opponent that takes the first empty square.
#[derive(Debug, Clone)]
pub struct FirstAvailable {
    name: String,
}

impl FirstAvailable {
    /// Creates the opponent.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait::async_trait]
impl Opponent for FirstAvailable {
    async fn choose_move(&self, board: &Board) -> Result<usize, CollaboratorError> {
        let pos = Position::valid_moves(board)
            .first()
            .copied()
            .ok_or_else(|| CollaboratorError::Malformed("No valid moves available".to_string()))?;
        debug!(opponent = %self.name, position = %pos, "Chose first empty square");
        Ok(pos.to_index())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Opponent that asks an LLM for its move.
#[derive(Debug, Clone)]
pub struct LlmOpponent {
    name: String,
    client: LlmClient,
}

impl LlmOpponent {
    /// Creates an opponent backed by `client`.
    pub fn new(name: impl Into<String>, client: LlmClient) -> Self {
        let name = name.into();
        info!(opponent = %name, provider = ?client.config().provider(), "Creating LLM opponent");
        Self { name, client }
    }
}

/// Builds the move prompt for `board`.
pub fn move_prompt(board: &Board) -> String {
    let free: Vec<String> = Position::valid_moves(board)
        .iter()
        .map(|pos| pos.to_index().to_string())
        .collect();
    format!(
        "It's your turn! You are playing as O.\n\n\
         Current board (numbers are empty squares):\n{}\n\n\
         Empty squares: {}\n\
         Positions are numbered left-to-right, top-to-bottom (0=top-left, 8=bottom-right).\n\
         Reply with the number of the square you take.",
        board.display(),
        free.join(", ")
    )
}

/// Extracts the first standalone board index (0-8) from a model reply.
pub fn parse_move_reply(reply: &str) -> Option<usize> {
    reply
        .split(|c: char| !c.is_ascii_digit())
        .filter(|token| !token.is_empty())
        .find_map(|token| token.parse::<usize>().ok().filter(|i| *i < 9))
}

#[async_trait::async_trait]
impl Opponent for LlmOpponent {
    #[instrument(skip(self, board), fields(opponent = %self.name))]
    async fn choose_move(&self, board: &Board) -> Result<usize, CollaboratorError> {
        let reply = self
            .client
            .generate(SYSTEM_PROMPT, &move_prompt(board), ReplyFormat::Text)
            .await?;

        match parse_move_reply(&reply) {
            Some(index) => {
                debug!(index, "Parsed opponent move");
                Ok(index)
            }
            None => {
                warn!(reply = %reply, "Opponent reply holds no board index");
                Err(CollaboratorError::Malformed(format!(
                    "no board index in {:?}",
                    reply
                )))
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
