//! Storage Layer
//!
//! The rules engine talks to storage only through the [`CombatOps`] and
//! [`ResourceOps`] extension traits. [`Database`] is the in-memory backend
//! used by tests, the demo binary, and embedders that persist elsewhere.

mod combat;
mod error;
pub mod models;
mod resources;
mod table;

pub use combat::CombatOps;
pub use error::{StorageError, StorageResult};
pub use models::*;
pub use resources::ResourceOps;
pub use table::{AppendLog, Table};

/// In-memory database, one locked table per entity
pub struct Database {
    encounters: Table<EncounterRecord>,
    participants: Table<ParticipantRecord>,
    statuses: Table<ParticipantStatus>,
    damage_log: AppendLog<DamageLogEntry>,
    characters: Table<CharacterSheet>,
    spell_slots: Table<SpellSlotPool>,
    hit_dice: Table<HitDicePools>,
    rest_events: AppendLog<RestEvent>,
}

impl Database {
    pub fn new() -> Self {
        Self {
            encounters: Table::new("Encounter"),
            participants: Table::new("Participant"),
            statuses: Table::new("ParticipantStatus"),
            damage_log: AppendLog::new("DamageLogEntry"),
            characters: Table::new("Character"),
            spell_slots: Table::new("SpellSlotPool"),
            hit_dice: Table::new("HitDicePool"),
            rest_events: AppendLog::new("RestEvent"),
        }
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}
