//! Rest & Resource Engine
//!
//! Short and long rests as pure transitions over a character's sheet,
//! spell-slot pool, and hit-dice pools. The caller persists the three
//! records together and appends the returned [`RestEvent`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::hit_dice::{restore_hit_dice, spend_hit_dice, HitDiceSpend};
use super::spell_slots::{restore_spell_slots, RestoredSlots};
use crate::core::dice::RandomSource;
use crate::core::error::{RulesError, RulesResult};
use crate::database::{
    CharacterSheet, ClassFeature, HitDicePools, RestEvent, RestScope, RestType, SpellSlotPool,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestConfig {
    pub enforce_long_rest_cooldown: bool,
    pub long_rest_cooldown_hours: i64,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            enforce_long_rest_cooldown: true,
            long_rest_cooldown_hours: 24,
        }
    }
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortRestRequest {
    pub session_id: Option<String>,
    /// Hit dice to spend
    pub hit_dice: u32,
    /// Faces for the spent dice, in spending order; the rest are rolled
    pub rolls: Vec<u32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LongRestRequest {
    pub session_id: Option<String>,
    pub notes: Option<String>,
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortRestResult {
    pub hit_dice: HitDiceSpend,
    /// Healing actually gained, capped at max HP
    pub hp_restored: i32,
    pub features_restored: Vec<String>,
    pub event: RestEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongRestResult {
    pub hp_restored: i32,
    pub spell_slots_restored: RestoredSlots,
    pub hit_dice_restored: u32,
    pub features_restored: Vec<String>,
    pub event: RestEvent,
}

// ============================================================================
// Features
// ============================================================================

/// Reset every used feature the rest recharges; returns their names
pub fn restore_features(features: &mut [ClassFeature], rest: RestType) -> Vec<String> {
    features
        .iter_mut()
        .filter(|f| f.used > 0)
        .filter(|f| match rest {
            RestType::Short => f.recharge == RestScope::ShortRest,
            RestType::Long => true,
        })
        .map(|f| {
            f.used = 0;
            f.name.clone()
        })
        .collect()
}

/// Spend one use of a named feature (case-insensitive)
pub fn use_feature(character: &mut CharacterSheet, name: &str) -> RulesResult<u32> {
    let feature = character
        .features
        .iter_mut()
        .find(|f| f.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| RulesError::not_found("ClassFeature", name))?;

    if feature.remaining() == 0 {
        return Err(RulesError::InsufficientFeatureUses {
            feature: feature.name.clone(),
            available: 0,
        });
    }
    feature.used += 1;
    Ok(feature.remaining())
}

// ============================================================================
// Rests
// ============================================================================

fn rest_event(
    rest_type: RestType,
    character_id: &str,
    session_id: Option<String>,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> RestEvent {
    RestEvent {
        id: Uuid::new_v4().to_string(),
        rest_type,
        character_id: character_id.to_string(),
        session_id,
        hit_dice_spent: 0,
        hp_restored: 0,
        resources_restored: Vec::new(),
        notes,
        created_at: now,
    }
}

/// Spend hit dice for healing and recharge short-rest features.
/// Spell slots are untouched.
pub fn take_short_rest(
    character: &mut CharacterSheet,
    pools: &mut HitDicePools,
    request: &ShortRestRequest,
    dice: &dyn RandomSource,
    now: DateTime<Utc>,
) -> RulesResult<ShortRestResult> {
    let spend = spend_hit_dice(
        pools,
        request.hit_dice,
        character.constitution_modifier,
        &request.rolls,
        dice,
        now,
    )?;

    let hp_restored = spend
        .total_healing
        .min(character.max_hp - character.current_hp)
        .max(0);
    character.current_hp += hp_restored;

    let features_restored = restore_features(&mut character.features, RestType::Short);
    character.updated_at = now;

    let mut event = rest_event(
        RestType::Short,
        &character.id,
        request.session_id.clone(),
        request.notes.clone(),
        now,
    );
    event.hit_dice_spent = spend.spent();
    event.hp_restored = hp_restored;
    if hp_restored > 0 {
        event.resources_restored.push("hit_points".to_string());
    }
    event.resources_restored.extend(features_restored.iter().cloned());

    Ok(ShortRestResult {
        hit_dice: spend,
        hp_restored,
        features_restored,
        event,
    })
}

/// Fails with [`RulesError::LongRestCooldown`] when the previous long rest
/// finished less than the configured number of hours ago
pub fn check_long_rest_cooldown(
    last_long_rest: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    config: &RestConfig,
) -> RulesResult<()> {
    let Some(last) = last_long_rest else {
        return Ok(());
    };
    if !config.enforce_long_rest_cooldown {
        return Ok(());
    }

    let ready_at = last + Duration::hours(config.long_rest_cooldown_hours);
    if now < ready_at {
        let seconds = (ready_at - now).num_seconds();
        return Err(RulesError::LongRestCooldown {
            remaining_minutes: (seconds + 59) / 60,
        });
    }
    Ok(())
}

/// Full HP, every spell slot, half the hit dice, and every feature
pub fn take_long_rest(
    character: &mut CharacterSheet,
    slots: &mut SpellSlotPool,
    pools: &mut HitDicePools,
    request: &LongRestRequest,
    config: &RestConfig,
    now: DateTime<Utc>,
) -> RulesResult<LongRestResult> {
    check_long_rest_cooldown(character.last_long_rest_at, now, config)?;

    let hp_restored = (character.max_hp - character.current_hp).max(0);
    character.current_hp = character.max_hp;

    let spell_slots_restored = restore_spell_slots(slots, None, now)?;
    let hit_dice_restored = restore_hit_dice(pools, now);
    let features_restored = restore_features(&mut character.features, RestType::Long);

    character.last_long_rest_at = Some(now);
    character.updated_at = now;

    let mut event = rest_event(
        RestType::Long,
        &character.id,
        request.session_id.clone(),
        request.notes.clone(),
        now,
    );
    event.hp_restored = hp_restored;
    let restored = &mut event.resources_restored;
    if hp_restored > 0 {
        restored.push("hit_points".to_string());
    }
    if !spell_slots_restored.levels.is_empty() {
        restored.push("spell_slots".to_string());
    }
    if spell_slots_restored.pact > 0 {
        restored.push("pact_slots".to_string());
    }
    if hit_dice_restored > 0 {
        restored.push("hit_dice".to_string());
    }
    restored.extend(features_restored.iter().cloned());

    Ok(LongRestResult {
        hp_restored,
        spell_slots_restored,
        hit_dice_restored,
        features_restored,
        event,
    })
}
