//! Drives a match: user commands in, state snapshots out, opponent calls in
//! between.

use super::action::{Action, OpponentRequest, Rejection};
use super::opponent::Opponent;
use super::state::MatchState;
use super::Position;
use crate::engine::{CollaboratorError, InFlight, Store, Ticket};
use anyhow::Result;
use derive_setters::Setters;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// User input to a running match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Place the current mark.
    Place(Position),
    /// Ask the opponent again after it stalled.
    Retry,
    /// New round, same scores.
    Restart,
    /// Switch between local and automated play.
    ToggleMode,
}

/// Messages sent from the driver to the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchEvent {
    /// A new state was accepted.
    StateChanged(MatchState),
    /// The opponent was asked for a move.
    OpponentThinking {
        /// Name of the opponent.
        opponent: String,
    },
    /// The opponent produced no usable move.
    OpponentStalled(CollaboratorError),
    /// A command was refused.
    Rejected(Rejection),
}

/// Timing knobs for opponent requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Setters)]
#[setters(prefix = "with_")]
pub struct DriverSettings {
    /// Limit on one opponent request, delay included.
    pub timeout: Duration,
    /// Pause before the opponent is consulted.
    pub delay: Duration,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            delay: Duration::from_millis(800),
        }
    }
}

/// Orchestrates a match between the user and, in AI mode, an opponent.
pub struct MatchDriver {
    store: Store<MatchState>,
    opponent: Arc<dyn Opponent>,
    inflight: InFlight<usize>,
    delay: Duration,
    event_tx: mpsc::UnboundedSender<MatchEvent>,
}

impl MatchDriver {
    /// Creates a driver starting from `state`.
    pub fn new(
        state: MatchState,
        opponent: Arc<dyn Opponent>,
        settings: DriverSettings,
        event_tx: mpsc::UnboundedSender<MatchEvent>,
    ) -> Self {
        Self {
            store: Store::new(state),
            opponent,
            inflight: InFlight::new(settings.timeout),
            delay: settings.delay,
            event_tx,
        }
    }

    /// Runs until the command channel closes, returning the final state.
    #[instrument(skip_all, fields(opponent = %self.opponent.name()))]
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) -> Result<MatchState> {
        info!("Starting match");
        self.publish_state()?;
        self.request_opponent_if_due()?;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command)?,
                    None => break,
                },
                (ticket, result) = self.inflight.recv() => self.resolve(ticket, result)?,
            }
        }

        self.inflight.cancel();
        info!("Match closed");
        Ok(self.store.state().clone())
    }

    #[instrument(skip(self))]
    fn handle(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Place(pos) => {
                if self.dispatch(Action::Place(pos))? {
                    self.request_opponent_if_due()?;
                }
            }
            Command::Retry => match self.launch() {
                Ok(()) => self.announce_request()?,
                Err(rejection) => self.event_tx.send(MatchEvent::Rejected(rejection))?,
            },
            Command::Restart | Command::ToggleMode => {
                if let Some(ticket) = self.inflight.cancel() {
                    debug!(%ticket, "Abandoning opponent request");
                }
                let action = if command == Command::Restart {
                    Action::Restart
                } else {
                    Action::ToggleMode
                };
                self.dispatch(action)?;
            }
        }
        Ok(())
    }

    /// Dispatches an action that produces no effect, publishing the outcome.
    /// Returns whether it was accepted.
    fn dispatch(&mut self, action: Action) -> Result<bool> {
        match self.store.dispatch(action) {
            Ok(_) => {
                self.publish_state()?;
                Ok(true)
            }
            Err(rejection) => {
                self.event_tx.send(MatchEvent::Rejected(rejection))?;
                Ok(false)
            }
        }
    }

    fn request_opponent_if_due(&mut self) -> Result<()> {
        if !self.store.state().opponent_due() {
            return Ok(());
        }
        match self.launch() {
            Ok(()) => self.announce_request(),
            Err(rejection) => {
                warn!(%rejection, "Opponent request refused");
                Ok(())
            }
        }
    }

    /// Moves the match into the awaiting phase and starts the request.
    fn launch(&mut self) -> Result<(), Rejection> {
        let Some(OpponentRequest { ticket, board }) = self.store.dispatch(Action::RequestOpponent)?
        else {
            return Ok(());
        };

        let opponent = Arc::clone(&self.opponent);
        let delay = self.delay;
        let launched = self.inflight.launch(ticket, async move {
            tokio::time::sleep(delay).await;
            opponent.choose_move(&board).await
        });
        if let Err(busy) = launched {
            // Phase and runner disagree; release the phase.
            warn!(%busy, %ticket, "Runner busy");
            let _ = self.store.dispatch(Action::OpponentReplied {
                ticket,
                result: Err(CollaboratorError::Cancelled),
            });
            return Err(Rejection::AwaitingOpponent);
        }
        Ok(())
    }

    fn announce_request(&self) -> Result<()> {
        self.event_tx.send(MatchEvent::OpponentThinking {
            opponent: self.opponent.name().to_string(),
        })?;
        self.publish_state()
    }

    #[instrument(skip(self, result), fields(ok = result.is_ok()))]
    fn resolve(&mut self, ticket: Ticket, result: Result<usize, CollaboratorError>) -> Result<()> {
        let before = *self.store.state().board();
        let failure = result.as_ref().err().cloned();

        if let Err(rejection) = self.store.dispatch(Action::OpponentReplied { ticket, result }) {
            debug!(%rejection, "Ignoring opponent reply");
            return Ok(());
        }

        if self.store.state().board() == &before {
            let reason = failure.unwrap_or_else(|| {
                CollaboratorError::Malformed("opponent chose an unavailable square".to_string())
            });
            warn!(%reason, "Opponent stalled");
            self.event_tx.send(MatchEvent::OpponentStalled(reason))?;
        }
        self.publish_state()
    }

    fn publish_state(&self) -> Result<()> {
        self.event_tx
            .send(MatchEvent::StateChanged(self.store.state().clone()))?;
        Ok(())
    }
}
