//! Drives a story: player commands in, state snapshots out, narrator calls in
//! between.

use super::narrator::{Narrator, NarratorReply};
use super::state::{Action, AdventureState, PlayerAction, RESTART_ACTION, Rejection};
use crate::engine::{CollaboratorError, InFlight, Store, Ticket};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// Player input to a running story.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Free-text action.
    Say(String),
    /// Pick one of the latest suggestions (zero-based).
    Choose(usize),
    /// Start over.
    Restart,
}

/// Messages sent from the driver to the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum StoryEvent {
    /// A new state was accepted.
    StateChanged(AdventureState),
    /// The narrator was asked for the next beat.
    NarratorThinking,
    /// The narrator failed; the fallback beat was used.
    NarratorFailed(CollaboratorError),
    /// A command was refused.
    Rejected(Rejection),
    /// A suggestion number that does not exist.
    NoSuchSuggestion(usize),
}

/// Orchestrates a story between the player and a narrator.
pub struct StoryDriver {
    store: Store<AdventureState>,
    narrator: Arc<dyn Narrator>,
    inflight: InFlight<NarratorReply>,
    event_tx: mpsc::UnboundedSender<StoryEvent>,
}

impl StoryDriver {
    /// Creates a driver for a fresh story whose narrator calls time out
    /// after `timeout`.
    pub fn new(
        narrator: Arc<dyn Narrator>,
        timeout: Duration,
        event_tx: mpsc::UnboundedSender<StoryEvent>,
    ) -> Self {
        Self {
            store: Store::new(AdventureState::new()),
            narrator,
            inflight: InFlight::new(timeout),
            event_tx,
        }
    }

    /// Opens the story and runs until the command channel closes, returning
    /// the final state.
    #[instrument(skip_all)]
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) -> Result<AdventureState> {
        info!("Starting story");
        self.dispatch(Action::Submit(PlayerAction::Initialize))?;

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
        info!(turns = self.store.state().turn(), "Story closed");
        Ok(self.store.state().clone())
    }

    #[instrument(skip(self))]
    fn handle(&mut self, command: Command) -> Result<()> {
        let text = match command {
            Command::Restart => return self.restart(),
            Command::Say(text) => text,
            Command::Choose(index) => match self.store.state().suggestions().get(index) {
                Some(text) => text.clone(),
                None => {
                    self.event_tx.send(StoryEvent::NoSuchSuggestion(index))?;
                    return Ok(());
                }
            },
        };

        if self.store.state().is_over() && text.trim().eq_ignore_ascii_case(RESTART_ACTION) {
            return self.restart();
        }
        self.dispatch(Action::Submit(PlayerAction::Say(text)))
    }

    fn restart(&mut self) -> Result<()> {
        if let Some(ticket) = self.inflight.cancel() {
            debug!(%ticket, "Abandoning narrator request");
        }
        self.dispatch(Action::Restart)
    }

    /// Dispatches an action, launching the narrator when asked to and
    /// publishing the outcome.
    fn dispatch(&mut self, action: Action) -> Result<()> {
        let request = match self.store.dispatch(action) {
            Ok(request) => request,
            Err(rejection) => {
                self.event_tx.send(StoryEvent::Rejected(rejection))?;
                return Ok(());
            }
        };

        if let Some(request) = request {
            let ticket = request.ticket;
            let narrator = Arc::clone(&self.narrator);
            let launched = self
                .inflight
                .launch(ticket, async move { narrator.narrate(&request).await });
            match launched {
                Ok(()) => self.event_tx.send(StoryEvent::NarratorThinking)?,
                Err(busy) => {
                    // Phase and runner disagree; settle the phase with a failure.
                    warn!(%busy, %ticket, "Runner busy");
                    let _ = self.store.dispatch(Action::NarratorReplied {
                        ticket,
                        result: Err(CollaboratorError::Cancelled),
                    });
                }
            }
        }
        self.publish_state()
    }

    #[instrument(skip(self, result), fields(ok = result.is_ok()))]
    fn resolve(&mut self, ticket: Ticket, result: Result<NarratorReply, CollaboratorError>) -> Result<()> {
        if let Err(error) = &result {
            warn!(%error, "Narrator failed");
            self.event_tx.send(StoryEvent::NarratorFailed(error.clone()))?;
        }
        self.dispatch(Action::NarratorReplied { ticket, result })
    }

    fn publish_state(&self) -> Result<()> {
        self.event_tx
            .send(StoryEvent::StateChanged(self.store.state().clone()))?;
        Ok(())
    }
}
