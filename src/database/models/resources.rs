//! Character resource records: the character sheet fields the rest engine
//! touches, spell-slot pools, hit-dice pools, and the rest history.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Character Sheet
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassLevel {
    pub class_name: String,
    pub level: u32,
}

impl ClassLevel {
    pub fn new(class_name: impl Into<String>, level: u32) -> Self {
        Self {
            class_name: class_name.into(),
            level,
        }
    }
}

/// Which rest recharges a feature
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RestScope {
    ShortRest,
    LongRest,
}

/// A limited-use class feature (Action Surge, Channel Divinity, ...)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassFeature {
    pub name: String,
    pub max_uses: u32,
    pub used: u32,
    pub recharge: RestScope,
}

impl ClassFeature {
    pub fn new(name: impl Into<String>, max_uses: u32, recharge: RestScope) -> Self {
        Self {
            name: name.into(),
            max_uses,
            used: 0,
            recharge,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.max_uses.saturating_sub(self.used)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CharacterSheet {
    pub id: String,
    pub name: String,
    pub current_hp: i32,
    pub max_hp: i32,
    pub temp_hp: i32,
    pub constitution_modifier: i32,
    pub class_levels: Vec<ClassLevel>,
    #[serde(default)]
    pub features: Vec<ClassFeature>,
    pub last_long_rest_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CharacterSheet {
    pub fn character_level(&self) -> u32 {
        self.class_levels.iter().map(|c| c.level).sum()
    }
}

// ============================================================================
// Spell Slots
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SlotCount {
    pub total: u32,
    pub used: u32,
}

impl SlotCount {
    pub fn available(&self) -> u32 {
        self.total.saturating_sub(self.used)
    }
}

/// Pact magic: a few slots that all share one level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PactSlots {
    pub slot_level: u8,
    pub total: u32,
    pub used: u32,
}

impl PactSlots {
    pub fn available(&self) -> u32 {
        self.total.saturating_sub(self.used)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpellSlotPool {
    pub character_id: String,
    /// Spell level (1-9) to slot counts; levels without slots are absent
    pub slots: BTreeMap<u8, SlotCount>,
    pub pact: Option<PactSlots>,
    pub updated_at: DateTime<Utc>,
}

impl SpellSlotPool {
    pub fn available(&self, level: u8) -> u32 {
        self.slots.get(&level).map(SlotCount::available).unwrap_or(0)
    }
}

// ============================================================================
// Hit Dice
// ============================================================================

/// Hit dice granted by one class
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HitDicePool {
    pub class_name: String,
    /// Die size, e.g. 10 for d10
    pub die: u32,
    pub total: u32,
    pub used: u32,
}

impl HitDicePool {
    pub fn available(&self) -> u32 {
        self.total.saturating_sub(self.used)
    }
}

/// Every hit-dice pool a character owns, stored together so spending across
/// classes is a single write
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HitDicePools {
    pub character_id: String,
    pub pools: Vec<HitDicePool>,
    pub updated_at: DateTime<Utc>,
}

impl HitDicePools {
    pub fn total(&self) -> u32 {
        self.pools.iter().map(|p| p.total).sum()
    }

    pub fn used(&self) -> u32 {
        self.pools.iter().map(|p| p.used).sum()
    }

    pub fn available(&self) -> u32 {
        self.pools.iter().map(HitDicePool::available).sum()
    }
}

// ============================================================================
// Rest History
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RestType {
    Short,
    Long,
}

/// Append-only record of one completed rest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RestEvent {
    pub id: String,
    pub rest_type: RestType,
    pub character_id: String,
    pub session_id: Option<String>,
    pub hit_dice_spent: u32,
    pub hp_restored: i32,
    /// Human-readable list of what came back ("spell_slots", feature names, ...)
    pub resources_restored: Vec<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}
