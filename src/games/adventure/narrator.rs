//! The game master collaborator and its wire format.

use super::types::{Author, Entry, Resources, Room};
use crate::engine::{CollaboratorError, Ticket};
use crate::llm_client::{LlmClient, ReplyFormat};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// Most suggested actions kept from one reply.
pub const MAX_SUGGESTIONS: usize = 4;

/// Text that marks the end of the story when it appears in a narrative.
pub const END_MARKER: &str = "THE END";

const SYSTEM_INSTRUCTION: &str = "\
You are a sophisticated Game Master (GM) for a high-stakes, sci-fi mystery text adventure.
Scenario: The player wakes up on the Aetheris, a deep-space research vessel.
The power is at 12%, the rest of the crew is in stasis pods that won't open, and an unidentified \
organic growth (pulsing, emerald-veined vines) is spreading through the ventilation.

Narrative style: atmospheric and sensory (the hum of failing lights, the smell of ozone, the chill \
of the air, the wet slither of the growth).

Mechanics:
- Oxygen and Health start at 100%. Ship power starts at 12%.
- Locations: Cryo-Chamber (start), Corridor, Bridge, Medbay, Reactor, Crew Quarters, Engineering.
- The Cryo-Chamber connects to the Corridor; the Corridor connects to every other room.
- The player's goal is to discover what the growth is and restore ship power.

Response requirements:
- Respond with a single JSON object and nothing else:
  {\"narrative\": string, \"suggestedActions\": [3-4 strings], \"locationUpdate\": string,
   \"itemFound\": string (optional), \"healthDelta\": number (optional),
   \"powerDelta\": number (optional), \"oxygenDelta\": number (optional)}
- locationUpdate must be one of the location names above.
- Apply negative healthDelta when the growth is touched or hazards are met.
- When the story reaches its conclusion, end the narrative with the words THE END.";

/// Everything the narrator is told about one turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NarratorRequest {
    /// Ticket the reply must carry.
    pub ticket: Ticket,
    /// Gauges after this turn's oxygen cost.
    pub resources: Resources,
    /// Current room.
    pub location: Room,
    /// Items held.
    pub inventory: Vec<String>,
    /// Recent transcript, oldest first.
    pub recent: Vec<Entry>,
    /// What the player did.
    pub action: String,
}

/// Structured reply from the narrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarratorReply {
    /// Scene description.
    pub narrative: String,
    /// Options offered to the player.
    pub suggested_actions: Vec<String>,
    /// Where the player is now.
    pub location_update: String,
    /// Item picked up this turn.
    #[serde(default)]
    pub item_found: Option<String>,
    /// Change in health.
    #[serde(default)]
    pub health_delta: Option<f64>,
    /// Change in ship power.
    #[serde(default)]
    pub power_delta: Option<f64>,
    /// Change in oxygen; only the narrator can grant air back.
    #[serde(default)]
    pub oxygen_delta: Option<f64>,
}

impl NarratorReply {
    /// Creates a reply with no item and no deltas.
    pub fn new(
        narrative: impl Into<String>,
        suggested_actions: Vec<String>,
        location_update: impl Into<String>,
    ) -> Self {
        Self {
            narrative: narrative.into(),
            suggested_actions,
            location_update: location_update.into(),
            item_found: None,
            health_delta: None,
            power_delta: None,
            oxygen_delta: None,
        }
    }

    /// Checks and tidies a reply.
    ///
    /// A blank narrative or no non-blank suggestion is malformed. Suggestions
    /// beyond [`MAX_SUGGESTIONS`] are dropped, a blank item counts as none and
    /// non-finite deltas are discarded.
    pub fn validated(mut self) -> Result<Self, CollaboratorError> {
        self.narrative = self.narrative.trim().to_string();
        if self.narrative.is_empty() {
            return Err(CollaboratorError::Malformed("empty narrative".to_string()));
        }

        self.suggested_actions = self
            .suggested_actions
            .into_iter()
            .map(|action| action.trim().to_string())
            .filter(|action| !action.is_empty())
            .take(MAX_SUGGESTIONS)
            .collect();
        if self.suggested_actions.is_empty() {
            return Err(CollaboratorError::Malformed("no suggested actions".to_string()));
        }

        self.item_found = self
            .item_found
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty());
        for delta in [
            &mut self.health_delta,
            &mut self.power_delta,
            &mut self.oxygen_delta,
        ] {
            *delta = delta.filter(|d| d.is_finite());
        }
        Ok(self)
    }

    /// Whether the narrative closes the story.
    pub fn ends_story(&self) -> bool {
        self.narrative.contains(END_MARKER)
    }
}

/// Rounds a reported delta to whole percentage points.
pub fn whole_delta(delta: Option<f64>) -> i32 {
    // `as` saturates out-of-range floats.
    delta.map_or(0, |d| d.round() as i32)
}

/// Parses a model completion into a validated reply.
///
/// Completions wrapped in a Markdown code fence are unwrapped first.
pub fn parse_reply(text: &str) -> Result<NarratorReply, CollaboratorError> {
    let body = strip_code_fence(text.trim());
    let reply: NarratorReply = serde_json::from_str(body)
        .map_err(|e| CollaboratorError::Malformed(format!("invalid narrator JSON: {}", e)))?;
    reply.validated()
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    // The info string ("json") may share the line with the body.
    rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()).trim()
}

/// Builds the per-turn prompt.
pub fn turn_prompt(request: &NarratorRequest) -> String {
    let inventory = if request.inventory.is_empty() {
        "Empty".to_string()
    } else {
        request.inventory.join(", ")
    };
    let context: Vec<String> = request
        .recent
        .iter()
        .map(|entry| {
            let who = match entry.author {
                Author::Narrator => "GM",
                Author::Player => "Player",
            };
            format!("{}: {}", who, entry.text)
        })
        .collect();

    format!(
        "Current Player State:\n\
         - Location: {}\n\
         - Health: {}%\n\
         - Oxygen: {}%\n\
         - Power: {}%\n\
         - Inventory: {}\n\n\
         Player's Action: \"{}\"\n\n\
         Previous Context (Last 3 Turns):\n{}\n\n\
         Provide the next part of the story.",
        request.location,
        request.resources.health,
        request.resources.oxygen,
        request.resources.power,
        inventory,
        request.action,
        context.join("\n"),
    )
}

/// Something that narrates the story.
#[async_trait::async_trait]
pub trait Narrator: Send + Sync {
    /// Produces the next story beat for `request`.
    async fn narrate(&self, request: &NarratorRequest) -> Result<NarratorReply, CollaboratorError>;
}

/// Narrator backed by an LLM.
#[derive(Debug, Clone)]
pub struct LlmNarrator {
    client: LlmClient,
}

impl LlmNarrator {
    /// Creates a narrator that talks to `client`.
    pub fn new(client: LlmClient) -> Self {
        info!(provider = ?client.config().provider(), "Creating LLM narrator");
        Self { client }
    }
}

#[async_trait::async_trait]
impl Narrator for LlmNarrator {
    #[instrument(skip(self, request), fields(ticket = %request.ticket, location = %request.location))]
    async fn narrate(&self, request: &NarratorRequest) -> Result<NarratorReply, CollaboratorError> {
        let completion = self
            .client
            .generate(SYSTEM_INSTRUCTION, &turn_prompt(request), ReplyFormat::Json)
            .await?;

        parse_reply(&completion)
            .inspect(|reply| debug!(actions = reply.suggested_actions.len(), "Narrator replied"))
            .inspect_err(|error| warn!(%error, completion = %completion, "Unusable narrator reply"))
    }
}
