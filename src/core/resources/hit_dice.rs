//! Hit dice: per-class pools, spending for healing, and long-rest recovery.
//!
//! Spending and restoring both walk the pools from the largest die down.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::spell_slots::{normalize_class, MAX_CLASS_LEVEL};
use crate::core::dice::RandomSource;
use crate::core::error::{RulesError, RulesResult};
use crate::database::{ClassLevel, HitDicePool, HitDicePools};

/// Hit die size for a class or spellcasting subclass
pub fn hit_die(class_name: &str) -> RulesResult<u32> {
    match normalize_class(class_name).as_str() {
        "barbarian" => Ok(12),
        "fighter" | "paladin" | "ranger" | "eldritch knight" => Ok(10),
        "bard" | "cleric" | "druid" | "monk" | "rogue" | "warlock" | "artificer"
        | "arcane trickster" => Ok(8),
        "sorcerer" | "wizard" => Ok(6),
        _ => Err(RulesError::UnknownClass(class_name.to_string())),
    }
}

/// Pool indices, largest die first; ties keep class order
fn largest_first(pools: &[HitDicePool]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..pools.len()).collect();
    order.sort_by(|&a, &b| pools[b].die.cmp(&pools[a].die));
    order
}

// ============================================================================
// Pool Construction
// ============================================================================

/// One pool per class with a die per level, nothing used
pub fn build_pools(
    character_id: &str,
    classes: &[ClassLevel],
    now: DateTime<Utc>,
) -> RulesResult<HitDicePools> {
    let mut pools: Vec<HitDicePool> = Vec::new();

    for class in classes {
        if !(1..=MAX_CLASS_LEVEL).contains(&class.level) {
            return Err(RulesError::InvalidLevel(class.level));
        }
        let die = hit_die(&class.class_name)?;
        let name = normalize_class(&class.class_name);

        match pools.iter_mut().find(|p| p.class_name == name) {
            Some(pool) => pool.total += class.level,
            None => pools.push(HitDicePool {
                class_name: name,
                die,
                total: class.level,
                used: 0,
            }),
        }
    }

    Ok(HitDicePools {
        character_id: character_id.to_string(),
        pools,
        updated_at: now,
    })
}

/// Rebuild after a level change, keeping each class's used dice (clamped)
pub fn rebuild_pools(
    existing: &HitDicePools,
    classes: &[ClassLevel],
    now: DateTime<Utc>,
) -> RulesResult<HitDicePools> {
    let used: BTreeMap<&str, u32> = existing
        .pools
        .iter()
        .map(|p| (p.class_name.as_str(), p.used))
        .collect();

    let mut rebuilt = build_pools(&existing.character_id, classes, now)?;
    for pool in rebuilt.pools.iter_mut() {
        if let Some(&old) = used.get(pool.class_name.as_str()) {
            pool.used = old.min(pool.total);
        }
    }
    Ok(rebuilt)
}

// ============================================================================
// Spending
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitDieRoll {
    pub die: u32,
    pub roll: u32,
    /// `max(1, roll + CON modifier)`
    pub healed: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitDiceSpend {
    pub rolls: Vec<HitDieRoll>,
    /// Sum of every die's healing, before capping at max HP
    pub total_healing: i32,
}

impl HitDiceSpend {
    pub fn spent(&self) -> u32 {
        self.rolls.len() as u32
    }
}

/// Spend `count` dice, largest first.
///
/// `rolls` supplies faces in spending order; any dice beyond them are
/// rolled. Nothing is spent if the request or a supplied face is invalid.
pub fn spend_hit_dice(
    pools: &mut HitDicePools,
    count: u32,
    constitution_modifier: i32,
    rolls: &[u32],
    dice: &dyn RandomSource,
    now: DateTime<Utc>,
) -> RulesResult<HitDiceSpend> {
    let available = pools.available();
    if count > available {
        return Err(RulesError::InsufficientHitDice {
            available,
            requested: count,
        });
    }
    if rolls.len() > count as usize {
        return Err(RulesError::InvalidInput(format!(
            "{} hit die rolls supplied for {count} dice",
            rolls.len()
        )));
    }

    // Which pool each die comes from
    let mut plan = Vec::with_capacity(count as usize);
    for index in largest_first(&pools.pools) {
        let take = pools.pools[index].available().min(count - plan.len() as u32);
        plan.extend(std::iter::repeat(index).take(take as usize));
    }

    for (&roll, &index) in rolls.iter().zip(&plan) {
        let die = pools.pools[index].die;
        if !(1..=die).contains(&roll) {
            return Err(RulesError::InvalidRoll {
                what: "hit die",
                roll,
                max: die,
            });
        }
    }

    let mut spend = HitDiceSpend::default();
    for (i, &index) in plan.iter().enumerate() {
        let pool = &mut pools.pools[index];
        let roll = rolls.get(i).copied().unwrap_or_else(|| dice.roll(pool.die));
        let healed = (roll as i32).saturating_add(constitution_modifier).max(1);

        pool.used += 1;
        spend.total_healing = spend.total_healing.saturating_add(healed);
        spend.rolls.push(HitDieRoll {
            die: pool.die,
            roll,
            healed,
        });
    }

    if count > 0 {
        pools.updated_at = now;
    }
    Ok(spend)
}

// ============================================================================
// Restoring
// ============================================================================

/// Long-rest recovery: half the total dice (at least one), largest first,
/// never more than are used. Nothing comes back when nothing was spent.
///
/// Returns how many dice were restored.
pub fn restore_hit_dice(pools: &mut HitDicePools, now: DateTime<Utc>) -> u32 {
    let used = pools.used();
    if used == 0 {
        return 0;
    }

    let mut budget = (pools.total() / 2).max(1).min(used);
    let restored = budget;

    for index in largest_first(&pools.pools) {
        let pool = &mut pools.pools[index];
        let back = pool.used.min(budget);
        pool.used -= back;
        budget -= back;
        if budget == 0 {
            break;
        }
    }

    pools.updated_at = now;
    restored
}
