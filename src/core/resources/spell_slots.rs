//! Spell Slot Calculator
//!
//! Class progression tables and slot bookkeeping. The table functions are
//! pure; the pool functions mutate a [`SpellSlotPool`] in place and reject
//! before touching anything.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::{RulesError, RulesResult};
use crate::database::{ClassLevel, PactSlots, SlotCount, SpellSlotPool};

/// Spell level to number of slots
pub type SlotTable = BTreeMap<u8, u32>;

pub const MAX_SPELL_LEVEL: u8 = 9;
pub const MAX_CLASS_LEVEL: u32 = 20;
const THIRD_CASTER_MAX_SLOT: u8 = 4;

// ============================================================================
// Caster Archetypes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CasterType {
    Full,
    Half,
    Third,
    Pact,
    None,
}

impl CasterType {
    /// Level looked up in the full-caster table; 0 for pact and non-casters
    pub fn effective_level(&self, class_level: u32) -> u32 {
        match self {
            Self::Full => class_level,
            Self::Half => class_level / 2,
            Self::Third => class_level / 3,
            Self::Pact | Self::None => 0,
        }
    }
}

/// Lowercase, trimmed, with `_` and `-` read as spaces
pub(crate) fn normalize_class(class_name: &str) -> String {
    class_name
        .trim()
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn caster_type(class_name: &str) -> RulesResult<CasterType> {
    match normalize_class(class_name).as_str() {
        "bard" | "cleric" | "druid" | "sorcerer" | "wizard" => Ok(CasterType::Full),
        "paladin" | "ranger" | "artificer" => Ok(CasterType::Half),
        "eldritch knight" | "arcane trickster" => Ok(CasterType::Third),
        "warlock" => Ok(CasterType::Pact),
        "barbarian" | "fighter" | "monk" | "rogue" => Ok(CasterType::None),
        _ => Err(RulesError::UnknownClass(class_name.to_string())),
    }
}

fn check_level(level: u32) -> RulesResult<()> {
    if !(1..=MAX_CLASS_LEVEL).contains(&level) {
        return Err(RulesError::InvalidLevel(level));
    }
    Ok(())
}

fn check_spell_level(level: u8) -> RulesResult<()> {
    if level > MAX_SPELL_LEVEL {
        return Err(RulesError::InvalidSpellLevel(level));
    }
    Ok(())
}

// ============================================================================
// Progression Tables
// ============================================================================

/// Slots per spell level for a full caster of levels 1 through 20
const FULL_CASTER: [[u32; 9]; 20] = [
    [2, 0, 0, 0, 0, 0, 0, 0, 0],
    [3, 0, 0, 0, 0, 0, 0, 0, 0],
    [4, 2, 0, 0, 0, 0, 0, 0, 0],
    [4, 3, 0, 0, 0, 0, 0, 0, 0],
    [4, 3, 2, 0, 0, 0, 0, 0, 0],
    [4, 3, 3, 0, 0, 0, 0, 0, 0],
    [4, 3, 3, 1, 0, 0, 0, 0, 0],
    [4, 3, 3, 2, 0, 0, 0, 0, 0],
    [4, 3, 3, 3, 1, 0, 0, 0, 0],
    [4, 3, 3, 3, 2, 0, 0, 0, 0],
    [4, 3, 3, 3, 2, 1, 0, 0, 0],
    [4, 3, 3, 3, 2, 1, 0, 0, 0],
    [4, 3, 3, 3, 2, 1, 1, 0, 0],
    [4, 3, 3, 3, 2, 1, 1, 0, 0],
    [4, 3, 3, 3, 2, 1, 1, 1, 0],
    [4, 3, 3, 3, 2, 1, 1, 1, 0],
    [4, 3, 3, 3, 2, 1, 1, 1, 1],
    [4, 3, 3, 3, 3, 1, 1, 1, 1],
    [4, 3, 3, 3, 3, 2, 1, 1, 1],
    [4, 3, 3, 3, 3, 2, 2, 1, 1],
];

/// Full-caster table row; empty for caster level 0
pub fn full_caster_slots(caster_level: u32) -> SlotTable {
    let level = caster_level.min(MAX_CLASS_LEVEL) as usize;
    if level == 0 {
        return SlotTable::new();
    }

    FULL_CASTER[level - 1]
        .iter()
        .enumerate()
        .filter(|&(_, &count)| count > 0)
        .map(|(i, &count)| ((i + 1) as u8, count))
        .collect()
}

/// Pact slot level and slot count for a warlock level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PactTable {
    pub slot_level: u8,
    pub count: u32,
}

pub fn pact_slots(warlock_level: u32) -> Option<PactTable> {
    let (count, slot_level) = match warlock_level.min(MAX_CLASS_LEVEL) {
        0 => return None,
        1 => (1, 1),
        2 => (2, 1),
        3..=4 => (2, 2),
        5..=6 => (2, 3),
        7..=8 => (2, 4),
        9..=10 => (2, 5),
        11..=16 => (3, 5),
        _ => (4, 5),
    };
    Some(PactTable { slot_level, count })
}

// ============================================================================
// Slot Calculation
// ============================================================================

/// Standard slots for a single-class character.
///
/// Warlocks have no standard slots; their pact slots are returned keyed by
/// the pact slot level.
pub fn calculate_spell_slots(class_name: &str, level: u32) -> RulesResult<SlotTable> {
    check_level(level)?;
    let caster = caster_type(class_name)?;

    let slots = match caster {
        CasterType::Pact => pact_slots(level)
            .map(|pact| SlotTable::from([(pact.slot_level, pact.count)]))
            .unwrap_or_default(),
        CasterType::Third => {
            let mut slots = full_caster_slots(caster.effective_level(level));
            slots.retain(|&spell_level, _| spell_level <= THIRD_CASTER_MAX_SLOT);
            slots
        }
        other => full_caster_slots(other.effective_level(level)),
    };
    Ok(slots)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MulticlassSlots {
    /// Summed effective caster level, capped at 20
    pub caster_level: u32,
    pub slots: SlotTable,
    pub pact: Option<PactTable>,
}

/// Combine class levels into one standard table plus a separate pact pool
pub fn calculate_multiclass_spell_slots(classes: &[ClassLevel]) -> RulesResult<MulticlassSlots> {
    let mut caster_level = 0;
    let mut pact_level = 0;
    let mut only_third = true;

    for class in classes {
        check_level(class.level)?;
        let caster = caster_type(&class.class_name)?;
        match caster {
            CasterType::Pact => pact_level += class.level,
            CasterType::None => {}
            other => {
                caster_level += other.effective_level(class.level);
                only_third &= other == CasterType::Third;
            }
        }
    }

    let caster_level = caster_level.min(MAX_CLASS_LEVEL);
    let mut slots = full_caster_slots(caster_level);
    if only_third {
        slots.retain(|&spell_level, _| spell_level <= THIRD_CASTER_MAX_SLOT);
    }

    Ok(MulticlassSlots {
        caster_level,
        slots,
        pact: pact_slots(pact_level),
    })
}

// ============================================================================
// Pools
// ============================================================================

/// Fresh pool for a set of class levels, nothing used
pub fn build_pool(
    character_id: &str,
    classes: &[ClassLevel],
    now: DateTime<Utc>,
) -> RulesResult<SpellSlotPool> {
    let table = calculate_multiclass_spell_slots(classes)?;
    Ok(SpellSlotPool {
        character_id: character_id.to_string(),
        slots: table
            .slots
            .into_iter()
            .map(|(level, total)| (level, SlotCount { total, used: 0 }))
            .collect(),
        pact: table.pact.map(|p| PactSlots {
            slot_level: p.slot_level,
            total: p.count,
            used: 0,
        }),
        updated_at: now,
    })
}

/// Recompute totals after a level change, keeping used counts where the
/// level still exists (clamped to the new total)
pub fn rebuild_pool(
    existing: &SpellSlotPool,
    classes: &[ClassLevel],
    now: DateTime<Utc>,
) -> RulesResult<SpellSlotPool> {
    let mut pool = build_pool(&existing.character_id, classes, now)?;

    for (level, count) in pool.slots.iter_mut() {
        if let Some(old) = existing.slots.get(level) {
            count.used = old.used.min(count.total);
        }
    }
    if let (Some(pact), Some(old)) = (pool.pact.as_mut(), existing.pact.as_ref()) {
        pact.used = old.used.min(pact.total);
    }
    Ok(pool)
}

/// Upcasting rules: a slot at or above the spell's level, never for cantrips
pub fn validate_slot_level(spell_level: u8, slot_level: u8) -> RulesResult<()> {
    check_spell_level(spell_level)?;
    check_spell_level(slot_level)?;
    if spell_level == 0 {
        return Err(RulesError::CantripUpcast);
    }
    if slot_level < spell_level {
        return Err(RulesError::SlotBelowSpellLevel {
            spell_level,
            slot_level,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotUsage {
    pub spell_level: u8,
    pub slot_level: u8,
    pub upcast: bool,
    pub pact: bool,
    /// Slots left at `slot_level` after this cast
    pub remaining: u32,
}

/// Spend one slot of `slot_level` to cast a `spell_level` spell
pub fn use_spell_slot(
    pool: &mut SpellSlotPool,
    spell_level: u8,
    slot_level: u8,
    now: DateTime<Utc>,
) -> RulesResult<SlotUsage> {
    validate_slot_level(spell_level, slot_level)?;

    let available = pool.available(slot_level);
    let count = match pool.slots.get_mut(&slot_level) {
        Some(count) if available > 0 => count,
        _ => {
            return Err(RulesError::InsufficientSpellSlots {
                level: slot_level,
                available,
                requested: 1,
            })
        }
    };
    count.used += 1;
    let remaining = count.available();
    pool.updated_at = now;

    Ok(SlotUsage {
        spell_level,
        slot_level,
        upcast: slot_level > spell_level,
        pact: false,
        remaining,
    })
}

/// Spend a pact slot; the spell is cast at the pact slot level
pub fn use_pact_slot(
    pool: &mut SpellSlotPool,
    spell_level: u8,
    now: DateTime<Utc>,
) -> RulesResult<SlotUsage> {
    let pact = pool
        .pact
        .as_mut()
        .ok_or_else(|| RulesError::NoPactMagic(pool.character_id.clone()))?;
    validate_slot_level(spell_level, pact.slot_level)?;

    if pact.available() == 0 {
        return Err(RulesError::InsufficientSpellSlots {
            level: pact.slot_level,
            available: 0,
            requested: 1,
        });
    }
    pact.used += 1;
    let usage = SlotUsage {
        spell_level,
        slot_level: pact.slot_level,
        upcast: pact.slot_level > spell_level,
        pact: true,
        remaining: pact.available(),
    };
    pool.updated_at = now;
    Ok(usage)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoredSlots {
    /// Slots regained per level
    pub levels: SlotTable,
    pub pact: u32,
}

/// Restore the named levels, or every slot including pact slots
pub fn restore_spell_slots(
    pool: &mut SpellSlotPool,
    levels: Option<&[u8]>,
    now: DateTime<Utc>,
) -> RulesResult<RestoredSlots> {
    if let Some(levels) = levels {
        for &level in levels {
            if level == 0 || level > MAX_SPELL_LEVEL {
                return Err(RulesError::InvalidSpellLevel(level));
            }
        }
    }

    let mut restored = RestoredSlots::default();
    for (level, count) in pool.slots.iter_mut() {
        let wanted = levels.map_or(true, |ls| ls.contains(level));
        if wanted && count.used > 0 {
            restored.levels.insert(*level, count.used);
            count.used = 0;
        }
    }
    if levels.is_none() {
        if let Some(pact) = pool.pact.as_mut() {
            restored.pact = pact.used;
            pact.used = 0;
        }
    }

    pool.updated_at = now;
    Ok(restored)
}
