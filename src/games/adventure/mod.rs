//! Aetheris: a text adventure narrated by an LLM game master.

mod driver;
mod narrator;
mod state;
mod types;

pub use driver::{Command, StoryDriver, StoryEvent};
pub use narrator::{
    END_MARKER, LlmNarrator, MAX_SUGGESTIONS, Narrator, NarratorReply, NarratorRequest, parse_reply,
    turn_prompt, whole_delta,
};
pub use state::{
    Action, AdventureState, CONTEXT_ENTRIES, FALLBACK_ACTIONS, FALLBACK_NARRATIVE, OPENING_ACTION,
    OXYGEN_COST, Phase, PlayerAction, RESTART_ACTION, Rejection, SUFFOCATION_NARRATIVE,
};
pub use types::{Author, Ending, Entry, RESOURCE_MAX, Resources, Room, adjust};
