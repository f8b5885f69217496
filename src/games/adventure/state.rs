//! Adventure state and its turn processor.

use super::narrator::{NarratorReply, NarratorRequest, whole_delta};
use super::types::{Ending, Entry, Resources, Room, adjust};
use crate::engine::{CollaboratorError, Reducer, Step, Ticket};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// Oxygen spent by every player action.
pub const OXYGEN_COST: u8 = 5;

/// Transcript entries sent to the narrator as context (three exchanges).
pub const CONTEXT_ENTRIES: usize = 6;

/// Action text used to open the story.
pub const OPENING_ACTION: &str = "Wake up and look around.";

/// Narrative appended when oxygen runs out.
pub const SUFFOCATION_NARRATIVE: &str = "Your lungs burn as the last of the oxygen bleeds out of \
    the recycler. The emerald vines pulse softly in the dark as your vision narrows to nothing. \
    The Aetheris drifts on, silent.";

/// Narrative appended when the narrator cannot be reached.
pub const FALLBACK_NARRATIVE: &str = "The air grows thin and the lights flicker violently. A \
    system error prevents the Aetheris from processing your request. Try again.";

/// Actions offered with [`FALLBACK_NARRATIVE`].
pub const FALLBACK_ACTIONS: [&str; 3] = ["Retry", "Check Systems", "Wait in Silence"];

/// Action offered once the story is over.
pub const RESTART_ACTION: &str = "Restart";

/// What the player does on a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerAction {
    /// Opens the story; free and not shown in the transcript.
    Initialize,
    /// Free text or a chosen suggestion.
    Say(String),
}

/// Input to the adventure reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// The player acts.
    Submit(PlayerAction),
    /// The narrator answered (or failed to).
    NarratorReplied {
        /// Ticket of the request being answered.
        ticket: Ticket,
        /// The reply, or why there is none.
        result: Result<NarratorReply, CollaboratorError>,
    },
    /// Throw the story away and open a new one.
    Restart,
}

/// Why an action was refused. The state is unchanged in every case.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum Rejection {
    /// The story has ended; only a restart is accepted.
    #[display("The story is over")]
    GameOver,
    /// The narrator has not answered the previous action.
    #[display("Waiting for the narrator")]
    AwaitingNarrator,
    /// Nothing was said.
    #[display("Empty action")]
    EmptyAction,
    /// A reply arrived for a request that is no longer pending.
    #[display("Reply {} is stale", _0)]
    StaleReply(Ticket),
}

impl std::error::Error for Rejection {}

/// Where the story stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Waiting for the player.
    Idle,
    /// The narrator was asked and has not answered.
    AwaitingNarrator {
        /// Ticket of the outstanding request.
        ticket: Ticket,
    },
    /// The story ended.
    Over(Ending),
}

/// Complete state of one story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdventureState {
    resources: Resources,
    location: Room,
    inventory: Vec<String>,
    turn: u32,
    phase: Phase,
    transcript: Vec<Entry>,
    version: u64,
}

impl AdventureState {
    /// The opening snapshot, before the first narrative beat.
    pub fn new() -> Self {
        Self {
            resources: Resources::INITIAL,
            location: Room::CryoChamber,
            inventory: Vec::new(),
            turn: 0,
            phase: Phase::Idle,
            transcript: Vec::new(),
            version: 0,
        }
    }

    /// Life-support gauges.
    pub fn resources(&self) -> Resources {
        self.resources
    }

    /// Current room.
    pub fn location(&self) -> Room {
        self.location
    }

    /// Items held, in the order found.
    pub fn inventory(&self) -> &[String] {
        &self.inventory
    }

    /// Player actions taken so far.
    pub fn turn(&self) -> u32 {
        self.turn
    }

    /// Story phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Everything said so far.
    pub fn transcript(&self) -> &[Entry] {
        &self.transcript
    }

    /// The ending, once the story is over.
    pub fn ending(&self) -> Option<Ending> {
        match self.phase {
            Phase::Over(ending) => Some(ending),
            _ => None,
        }
    }

    /// Whether the story has ended.
    pub fn is_over(&self) -> bool {
        self.ending().is_some()
    }

    /// Suggested actions of the latest narrator entry.
    pub fn suggestions(&self) -> &[String] {
        self.transcript
            .last()
            .map(|entry| entry.actions.as_slice())
            .unwrap_or_default()
    }

    fn next(&self) -> Self {
        Self {
            version: self.version + 1,
            ..self.clone()
        }
    }

    fn request(&self, ticket: Ticket, action: String, context: &[Entry]) -> NarratorRequest {
        let start = context.len().saturating_sub(CONTEXT_ENTRIES);
        NarratorRequest {
            ticket,
            resources: self.resources,
            location: self.location,
            inventory: self.inventory.clone(),
            recent: context[start..].to_vec(),
            action,
        }
    }

    #[instrument(skip(self), fields(turn = self.turn, oxygen = self.resources.oxygen))]
    fn submit(&self, action: PlayerAction) -> Result<Step<Self, NarratorRequest>, Rejection> {
        match self.phase {
            Phase::Over(_) => return Err(Rejection::GameOver),
            Phase::AwaitingNarrator { .. } => return Err(Rejection::AwaitingNarrator),
            Phase::Idle => {}
        }

        let mut next = self.next();
        let text = match action {
            PlayerAction::Initialize => OPENING_ACTION.to_string(),
            PlayerAction::Say(text) => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    return Err(Rejection::EmptyAction);
                }
                next.transcript.push(Entry::player(text.clone()));
                next.turn += 1;

                if self.resources.oxygen <= OXYGEN_COST {
                    info!("Oxygen exhausted");
                    next.resources.oxygen = 0;
                    next.phase = Phase::Over(Ending::OxygenDepleted);
                    next.transcript.push(Entry::narrator(
                        SUFFOCATION_NARRATIVE,
                        vec![RESTART_ACTION.to_string()],
                    ));
                    return Ok(Step::to(next));
                }
                next.resources.oxygen -= OXYGEN_COST;
                text
            }
        };

        let ticket = Ticket::new(next.version);
        next.phase = Phase::AwaitingNarrator { ticket };
        let request = next.request(ticket, text, &self.transcript);
        debug!(%ticket, "Narrator requested");
        Ok(Step::with_effect(next, request))
    }

    #[instrument(skip(self, result), fields(ok = result.is_ok()))]
    fn narrator_replied(
        &self,
        ticket: Ticket,
        result: Result<NarratorReply, CollaboratorError>,
    ) -> Result<Self, Rejection> {
        if self.phase != (Phase::AwaitingNarrator { ticket }) {
            return Err(Rejection::StaleReply(ticket));
        }

        let mut next = self.next();
        next.phase = Phase::Idle;

        let reply = match result.and_then(NarratorReply::validated) {
            Ok(reply) => reply,
            Err(error) => {
                warn!(%ticket, %error, "Narrator failed; using fallback");
                next.transcript.push(Entry::narrator(
                    FALLBACK_NARRATIVE,
                    FALLBACK_ACTIONS.iter().map(|a| a.to_string()).collect(),
                ));
                return Ok(next);
            }
        };

        let gauges = &mut next.resources;
        gauges.health = adjust(gauges.health, whole_delta(reply.health_delta));
        gauges.power = adjust(gauges.power, whole_delta(reply.power_delta));
        gauges.oxygen = adjust(gauges.oxygen, whole_delta(reply.oxygen_delta));

        if let Some(item) = &reply.item_found {
            if next.inventory.contains(item) {
                debug!(%item, "Item already held");
            } else {
                info!(%item, "Item found");
                next.inventory.push(item.clone());
            }
        }

        match Room::from_label(&reply.location_update) {
            Some(room) => next.location = room,
            None => warn!(label = %reply.location_update, "Unknown location; staying put"),
        }

        let ending = if next.resources.health == 0 {
            Some(Ending::HealthDepleted)
        } else if next.resources.oxygen == 0 {
            Some(Ending::OxygenDepleted)
        } else if reply.ends_story() {
            Some(Ending::StoryComplete)
        } else {
            None
        };
        if let Some(ending) = ending {
            info!(%ending, "Story over");
            next.phase = Phase::Over(ending);
        }

        next.transcript
            .push(Entry::narrator(reply.narrative, reply.suggested_actions));
        Ok(next)
    }

    /// A brand-new story that has already asked for its opening beat.
    fn restarted(&self) -> Step<Self, NarratorRequest> {
        let fresh = Self {
            version: self.version + 1,
            ..Self::new()
        };
        info!("Restarting story");
        match fresh.submit(PlayerAction::Initialize) {
            Ok(opening) => opening,
            Err(rejection) => {
                warn!(%rejection, "Fresh story refused its opening");
                Step::to(fresh)
            }
        }
    }
}

impl Default for AdventureState {
    fn default() -> Self {
        Self::new()
    }
}

impl Reducer for AdventureState {
    type Action = Action;
    type Effect = NarratorRequest;
    type Rejection = Rejection;

    /// Number of accepted transitions, kept across restarts.
    fn version(&self) -> u64 {
        self.version
    }

    #[instrument(skip(self), fields(version = self.version))]
    fn reduce(&self, action: Action) -> Result<Step<Self, NarratorRequest>, Rejection> {
        match action {
            Action::Submit(action) => self.submit(action),
            Action::NarratorReplied { ticket, result } => {
                self.narrator_replied(ticket, result).map(Step::to)
            }
            Action::Restart => Ok(self.restarted()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::adventure::{Author, RESOURCE_MAX};

    fn reply(narrative: &str, location: &str) -> NarratorReply {
        NarratorReply::new(
            narrative,
            vec!["Look around".to_string(), "Move on".to_string()],
            location,
        )
    }

    fn ask(state: &AdventureState, action: PlayerAction) -> (AdventureState, NarratorRequest) {
        let step = state.reduce(Action::Submit(action)).unwrap();
        (step.state, step.effect.expect("narrator requested"))
    }

    fn answer(
        state: &AdventureState,
        request: &NarratorRequest,
        result: Result<NarratorReply, CollaboratorError>,
    ) -> AdventureState {
        state
            .reduce(Action::NarratorReplied {
                ticket: request.ticket,
                result,
            })
            .unwrap()
            .state
    }

    fn say(text: &str) -> PlayerAction {
        PlayerAction::Say(text.to_string())
    }

    fn opened() -> AdventureState {
        let (pending, request) = ask(&AdventureState::new(), PlayerAction::Initialize);
        answer(&pending, &request, Ok(reply("You wake.", "Cryo-Chamber")))
    }

    #[test]
    fn test_initialize_is_free() {
        let (pending, request) = ask(&AdventureState::new(), PlayerAction::Initialize);
        assert_eq!(request.action, OPENING_ACTION);
        assert_eq!(pending.resources(), Resources::INITIAL);
        assert_eq!(pending.turn(), 0);
        assert!(pending.transcript().is_empty());

        let state = answer(&pending, &request, Ok(reply("You wake.", "Cryo-Chamber")));
        assert_eq!(state.transcript().len(), 1);
        assert_eq!(state.transcript()[0].author, Author::Narrator);
        assert_eq!(state.phase(), Phase::Idle);
    }

    #[test]
    fn test_action_costs_oxygen() {
        let (pending, request) = ask(&opened(), say("Open the pod"));
        assert_eq!(pending.resources().oxygen, 100 - OXYGEN_COST);
        assert_eq!(request.resources.oxygen, 100 - OXYGEN_COST);
        assert_eq!(pending.turn(), 1);
        assert_eq!(pending.transcript().last(), Some(&Entry::player("Open the pod")));
        assert_eq!(request.recent.len(), 1);
    }

    #[test]
    fn test_busy_and_blank_rejected() {
        let (pending, _) = ask(&opened(), say("Open the pod"));
        assert_eq!(
            pending.reduce(Action::Submit(say("Scream"))),
            Err(Rejection::AwaitingNarrator)
        );
        assert_eq!(
            opened().reduce(Action::Submit(say("   "))),
            Err(Rejection::EmptyAction)
        );
    }

    #[test]
    fn test_context_is_bounded() {
        let mut state = opened();
        for i in 0..5 {
            let (pending, request) = ask(&state, say(&format!("Step {}", i)));
            state = answer(&pending, &request, Ok(reply("Onward.", "Corridor")));
        }
        let (_, request) = ask(&state, say("Final step"));
        assert_eq!(request.recent.len(), CONTEXT_ENTRIES);
        assert_eq!(request.recent.last(), state.transcript().last());
    }

    #[test]
    fn test_reply_updates_state() {
        let (pending, request) = ask(&opened(), say("Walk out"));
        let mut beat = reply("The corridor is cold.", "Corridor");
        beat.item_found = Some("Flashlight".to_string());
        beat.power_delta = Some(10.0);
        beat.health_delta = Some(-20.0);

        let state = answer(&pending, &request, Ok(beat));
        assert_eq!(state.location(), Room::Corridor);
        assert_eq!(state.inventory(), ["Flashlight".to_string()]);
        assert_eq!(state.resources(), Resources::new(95, 80, 22));
        assert_eq!(state.suggestions().len(), 2);
        assert_eq!(state.phase(), Phase::Idle);
    }

    #[test]
    fn test_inventory_add_is_idempotent() {
        let mut state = opened();
        for _ in 0..2 {
            let (pending, request) = ask(&state, say("Search"));
            let mut beat = reply("A keycard glints.", "Cryo-Chamber");
            beat.item_found = Some("Keycard".to_string());
            state = answer(&pending, &request, Ok(beat));
        }
        assert_eq!(state.inventory(), ["Keycard".to_string()]);
    }

    #[test]
    fn test_unknown_location_keeps_room() {
        let (pending, request) = ask(&opened(), say("Crawl into the vent"));
        let state = answer(&pending, &request, Ok(reply("Darkness.", "Ventilation Shaft")));
        assert_eq!(state.location(), Room::CryoChamber);
    }

    #[test]
    fn test_end_marker_ends_story() {
        let (pending, request) = ask(&opened(), say("Restore power"));
        let state = answer(
            &pending,
            &request,
            Ok(reply("Light floods the ship. THE END", "Reactor")),
        );
        assert_eq!(state.ending(), Some(Ending::StoryComplete));
        assert_eq!(
            state.reduce(Action::Submit(say("Celebrate"))),
            Err(Rejection::GameOver)
        );
    }

    #[test]
    fn test_narrator_can_grant_oxygen() {
        let (pending, request) = ask(&opened(), say("Put on the mask"));
        let mut beat = reply("Cool air fills the mask.", "Medbay");
        beat.oxygen_delta = Some(50.0);
        let state = answer(&pending, &request, Ok(beat));
        assert_eq!(state.resources().oxygen, 100);
    }

    #[test]
    fn test_huge_deltas_are_clamped() {
        let (pending, request) = ask(&opened(), say("Drink the glowing serum"));
        let mut beat = reply("Strength floods every limb.", "Medbay");
        beat.health_delta = Some(1e12);
        beat.power_delta = Some(1e12);
        let state = answer(&pending, &request, Ok(beat));
        assert_eq!(state.resources().health, RESOURCE_MAX);
        assert_eq!(state.resources().power, RESOURCE_MAX);
        assert!(!state.is_over());

        let (pending, request) = ask(&state, say("Inhale the spores"));
        let mut beat = reply("Your lungs seize.", "Medbay");
        beat.health_delta = Some(-1e12);
        let state = answer(&pending, &request, Ok(beat));
        assert_eq!(state.resources().health, 0);
        assert_eq!(state.ending(), Some(Ending::HealthDepleted));
    }

    #[test]
    fn test_malformed_reply_uses_fallback() {
        let (pending, request) = ask(&opened(), say("Listen"));
        let state = answer(&pending, &request, Ok(reply("   ", "Bridge")));
        let last = state.transcript().last().unwrap();
        assert_eq!(last.text, FALLBACK_NARRATIVE);
        assert_eq!(state.location(), Room::CryoChamber);
    }

    #[test]
    fn test_stale_reply_rejected() {
        let (pending, request) = ask(&opened(), say("Listen"));
        let restarted = pending.reduce(Action::Restart).unwrap().state;
        assert_eq!(
            restarted.reduce(Action::NarratorReplied {
                ticket: request.ticket,
                result: Ok(reply("Late.", "Bridge")),
            }),
            Err(Rejection::StaleReply(request.ticket))
        );
    }
}
