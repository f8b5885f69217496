//! Domain types for the Aetheris adventure.

use derive_new::new;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

/// Upper bound of every resource gauge.
pub const RESOURCE_MAX: u8 = 100;

/// Rooms of the Aetheris.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::EnumIter, derive_more::Display,
)]
pub enum Room {
    /// Where the player wakes.
    #[display("Cryo-Chamber")]
    CryoChamber,
    /// Hub connecting every other room.
    #[display("Corridor")]
    Corridor,
    /// Command deck.
    #[display("Bridge")]
    Bridge,
    /// Medical bay.
    #[display("Medbay")]
    Medbay,
    /// Main reactor.
    #[display("Reactor")]
    Reactor,
    /// Crew quarters.
    #[display("Crew Quarters")]
    CrewQuarters,
    /// Engineering.
    #[display("Engineering")]
    Engineering,
}

impl Room {
    /// Resolves a free-form location label.
    ///
    /// Matching ignores case and punctuation. A label that merely mentions
    /// one room ("the reactor core") resolves to it; a label mentioning
    /// several, or none, does not resolve.
    pub fn from_label(label: &str) -> Option<Room> {
        let wanted = normalize(label);
        if wanted.is_empty() {
            return None;
        }
        if let Some(room) = Self::iter().find(|room| normalize(&room.to_string()) == wanted) {
            return Some(room);
        }

        let mut mentioned = Self::iter().filter(|room| wanted.contains(&normalize(&room.to_string())));
        match (mentioned.next(), mentioned.next()) {
            (Some(room), None) => Some(room),
            _ => None,
        }
    }
}

fn normalize(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Life-support gauges, each within `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, new)]
pub struct Resources {
    /// Breathable air left.
    pub oxygen: u8,
    /// Player health.
    pub health: u8,
    /// Ship power.
    pub power: u8,
}

impl Resources {
    /// Gauges at the start of a story: full air and health, ship at 12% power.
    pub const INITIAL: Resources = Resources {
        oxygen: 100,
        health: 100,
        power: 12,
    };
}

/// Adds a signed delta to a gauge, clamping to `0..=100`.
pub fn adjust(value: u8, delta: i32) -> u8 {
    i32::from(value)
        .saturating_add(delta)
        .clamp(0, i32::from(RESOURCE_MAX)) as u8
}

/// Who wrote a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    /// Typed or chosen by the player.
    Player,
    /// Produced by the narrator (or a fixed fallback).
    Narrator,
}

/// One transcript line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Author of the entry.
    pub author: Author,
    /// What was said.
    pub text: String,
    /// Suggested next actions; empty for player entries.
    pub actions: Vec<String>,
}

impl Entry {
    /// A player entry.
    pub fn player(text: impl Into<String>) -> Self {
        Self {
            author: Author::Player,
            text: text.into(),
            actions: Vec::new(),
        }
    }

    /// A narrator entry with suggested actions.
    pub fn narrator(text: impl Into<String>, actions: Vec<String>) -> Self {
        Self {
            author: Author::Narrator,
            text: text.into(),
            actions,
        }
    }
}

/// How a story ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
pub enum Ending {
    /// Oxygen ran out.
    #[display("Oxygen depleted")]
    OxygenDepleted,
    /// Health reached zero.
    #[display("Vital signs lost")]
    HealthDepleted,
    /// The narrator concluded the story.
    #[display("Story complete")]
    StoryComplete,
}
