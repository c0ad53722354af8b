//! Combat records: encounters, participants, their mutable status, and the
//! damage audit log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::damage::{DamageModifiers, DamageType};

// ============================================================================
// Encounter
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EncounterStatus {
    #[default]
    Active,
    Paused,
    Completed,
}

impl EncounterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }
}

/// One entry of the initiative order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InitiativeSlot {
    pub participant_id: String,
    pub initiative: i32,
    /// Insertion sequence, breaks initiative ties
    pub seq: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncounterRecord {
    pub id: String,
    pub session_id: String,
    pub name: Option<String>,
    pub status: EncounterStatus,
    /// Starts at 1
    pub round: u32,
    /// Index into `order`
    pub current_turn: usize,
    /// Participants sorted by descending initiative
    pub order: Vec<InitiativeSlot>,
    pub next_seq: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl EncounterRecord {
    pub fn current_participant_id(&self) -> Option<&str> {
        self.order
            .get(self.current_turn)
            .map(|slot| slot.participant_id.as_str())
    }
}

// ============================================================================
// Participant
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantCategory {
    Player,
    Npc,
    Enemy,
    Monster,
}

/// What a participant stands for outside the encounter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum ParticipantLink {
    Character(String),
    Npc(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParticipantRecord {
    pub id: String,
    pub encounter_id: String,
    pub link: ParticipantLink,
    pub name: String,
    pub category: ParticipantCategory,
    pub initiative: i32,
    pub initiative_modifier: i32,
    pub turn_order: usize,
    pub armor_class: i32,
    pub max_hp: i32,
    pub speed: u32,
    #[serde(default)]
    pub damage_modifiers: DamageModifiers,
}

// ============================================================================
// Participant Status
// ============================================================================

/// Where a participant sits in the conscious/dying/dead lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifeState {
    Conscious,
    /// At 0 HP and making death saves
    Dying,
    /// At 0 HP, no further saves needed
    Stabilized,
    Dead,
}

/// Mutable combat state for one participant.
///
/// `0 <= current_hp <= max_hp`, `temp_hp >= 0`, both death-save counters stay
/// within `0..=3` and are zero while conscious.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParticipantStatus {
    pub participant_id: String,
    pub current_hp: i32,
    pub max_hp: i32,
    pub temp_hp: i32,
    pub death_save_successes: u8,
    pub death_save_failures: u8,
    pub is_conscious: bool,
    pub is_stabilized: bool,
    pub is_dead: bool,
    pub updated_at: DateTime<Utc>,
}

impl ParticipantStatus {
    /// Fresh status at full health
    pub fn new(participant_id: impl Into<String>, max_hp: i32, now: DateTime<Utc>) -> Self {
        Self {
            participant_id: participant_id.into(),
            current_hp: max_hp,
            max_hp,
            temp_hp: 0,
            death_save_successes: 0,
            death_save_failures: 0,
            is_conscious: max_hp > 0,
            is_stabilized: false,
            is_dead: false,
            updated_at: now,
        }
    }

    pub fn life_state(&self) -> LifeState {
        if self.is_dead {
            LifeState::Dead
        } else if self.current_hp > 0 {
            LifeState::Conscious
        } else if self.is_stabilized {
            LifeState::Stabilized
        } else {
            LifeState::Dying
        }
    }

    pub fn reset_death_saves(&mut self) {
        self.death_save_successes = 0;
        self.death_save_failures = 0;
        self.is_stabilized = false;
    }

    /// True when every documented invariant holds
    pub fn invariants_hold(&self) -> bool {
        let hp_ok = (0..=self.max_hp).contains(&self.current_hp) && self.temp_hp >= 0;
        let saves_ok = self.death_save_successes <= 3 && self.death_save_failures <= 3;
        let conscious_ok = self.is_dead || self.is_conscious == (self.current_hp > 0);
        let clean_when_up = !self.is_conscious
            || (self.death_save_successes == 0 && self.death_save_failures == 0);
        hp_ok && saves_ok && conscious_ok && clean_when_up
    }
}

// ============================================================================
// Damage Log
// ============================================================================

/// Append-only audit record of one damage application
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DamageLogEntry {
    pub id: String,
    pub encounter_id: String,
    pub participant_id: String,
    pub round: u32,
    /// Effective damage after resistances
    pub amount: i32,
    pub damage_type: DamageType,
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
}
