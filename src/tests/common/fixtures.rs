//! Test Fixtures
//!
//! Managers wired to an in-memory database, scripted dice, and a manual
//! clock, plus ready-made combatants and characters.

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use crate::core::clock::ManualClock;
use crate::core::damage::DamageModifiers;
use crate::core::dice::ScriptedDice;
use crate::core::logging;
use crate::core::resources::{NewCharacter, ResourceManager, RestConfig};
use crate::core::session::{CombatManager, NewParticipant};
use crate::database::{
    ClassFeature, ClassLevel, Database, ParticipantCategory, ParticipantLink, RestScope,
};

// =============================================================================
// Harness
// =============================================================================

/// Both managers over one database, sharing dice and clock
pub struct Harness {
    pub db: Arc<Database>,
    pub dice: Arc<ScriptedDice>,
    pub clock: Arc<ManualClock>,
    pub combat: CombatManager<Database>,
    pub resources: ResourceManager<Database>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(RestConfig::default())
    }

    pub fn with_config(config: RestConfig) -> Self {
        logging::init_test();
        let db = Arc::new(Database::new());
        let dice = Arc::new(ScriptedDice::default());
        let start = Utc
            .with_ymd_and_hms(2024, 6, 1, 18, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        let clock = Arc::new(ManualClock::new(start));

        Self {
            combat: CombatManager::new(db.clone(), dice.clone(), clock.clone()),
            resources: ResourceManager::new(db.clone(), dice.clone(), clock.clone(), config),
            db,
            dice,
            clock,
        }
    }

    /// Queue faces for the next random rolls
    pub fn script(&self, faces: impl IntoIterator<Item = u32>) {
        self.dice.push(faces);
    }
}

// =============================================================================
// Combatant Fixtures
// =============================================================================

pub fn fighter(initiative: i32) -> NewParticipant {
    NewParticipant::new(
        ParticipantLink::Character("fighter".into()),
        "Brakka",
        ParticipantCategory::Player,
        18,
        30,
    )
    .with_initiative(initiative)
}

pub fn wizard(initiative: i32) -> NewParticipant {
    NewParticipant::new(
        ParticipantLink::Character("wizard".into()),
        "Ilyra",
        ParticipantCategory::Player,
        12,
        18,
    )
    .with_initiative(initiative)
}

pub fn goblin(name: &str, initiative: i32) -> NewParticipant {
    NewParticipant::new(
        ParticipantLink::Npc("goblin".into()),
        name,
        ParticipantCategory::Enemy,
        15,
        7,
    )
    .with_initiative(initiative)
}

pub fn fire_elemental(initiative: i32, modifiers: DamageModifiers) -> NewParticipant {
    NewParticipant::new(
        ParticipantLink::Npc("fire-elemental".into()),
        "Fire Elemental",
        ParticipantCategory::Monster,
        13,
        102,
    )
    .with_initiative(initiative)
    .with_modifiers(modifiers)
}

// =============================================================================
// Character Fixtures
// =============================================================================

/// Wizard 5, 32 max HP, +2 CON, one short-rest and one long-rest feature
pub fn wizard_character(id: &str) -> NewCharacter {
    NewCharacter {
        id: Some(id.to_string()),
        name: "Ilyra".into(),
        max_hp: 32,
        constitution_modifier: 2,
        class_levels: vec![ClassLevel::new("Wizard", 5)],
        features: vec![
            ClassFeature::new("Arcane Recovery", 1, RestScope::LongRest),
            ClassFeature::new("Portent", 2, RestScope::ShortRest),
        ],
    }
}

/// Warlock 5 / Paladin 2
pub fn pact_character(id: &str) -> NewCharacter {
    NewCharacter {
        id: Some(id.to_string()),
        name: "Vex".into(),
        max_hp: 52,
        constitution_modifier: 1,
        class_levels: vec![ClassLevel::new("Warlock", 5), ClassLevel::new("Paladin", 2)],
        features: Vec::new(),
    }
}
