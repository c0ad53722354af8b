//! HP & Status Engine
//!
//! Pure state transitions on a [`ParticipantStatus`]: damage, healing,
//! temporary hit points, and death saves. Each function validates first and
//! only then mutates, so an `Err` leaves the status exactly as it was.
//!
//! Lifecycle: `Conscious -> Dying -> {Stabilized | Dead}`. A dying or
//! stabilized participant comes back through healing or a natural 20;
//! `Dead` is terminal.

use serde::{Deserialize, Serialize};

use crate::core::damage::{DamageModifiers, DamageType, ModifierBypass};
use crate::core::error::{check_d20, RulesError, RulesResult};
use crate::database::ParticipantStatus;

pub const DEATH_SAVE_LIMIT: u8 = 3;

// ============================================================================
// Damage
// ============================================================================

/// Per-call switches for [`apply_damage`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DamageOptions {
    pub ignore_resistances: bool,
    pub ignore_immunities: bool,
}

impl From<DamageOptions> for ModifierBypass {
    fn from(options: DamageOptions) -> Self {
        ModifierBypass {
            ignore_resistances: options.ignore_resistances,
            ignore_immunities: options.ignore_immunities,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageResult {
    pub original_amount: i32,
    /// After resistance, vulnerability, and immunity
    pub modified_amount: i32,
    pub hp_lost: i32,
    pub temp_hp_lost: i32,
    pub new_current_hp: i32,
    pub new_temp_hp: i32,
    pub is_conscious: bool,
    pub is_dead: bool,
    pub resisted: bool,
    pub vulnerable: bool,
    pub immune: bool,
    pub massive_damage: bool,
    /// This hit took the participant from conscious to 0 HP
    pub knocked_out: bool,
}

/// Apply one instance of damage.
///
/// Temporary HP soaks damage first. Hitting a participant who is already at
/// 0 HP with effective damage of at least their max HP kills them outright.
pub fn apply_damage(
    status: &mut ParticipantStatus,
    modifiers: &DamageModifiers,
    amount: i32,
    damage_type: DamageType,
    options: DamageOptions,
) -> RulesResult<DamageResult> {
    if amount < 0 {
        return Err(RulesError::negative("Damage", amount));
    }

    let modified = modifiers.resolve(amount, damage_type, options.into());
    let effective = modified.effective;

    let mut result = DamageResult {
        original_amount: amount,
        modified_amount: effective,
        hp_lost: 0,
        temp_hp_lost: 0,
        new_current_hp: status.current_hp,
        new_temp_hp: status.temp_hp,
        is_conscious: status.is_conscious,
        is_dead: status.is_dead,
        resisted: modified.resisted,
        vulnerable: modified.vulnerable,
        immune: modified.immune,
        massive_damage: false,
        knocked_out: false,
    };

    if status.is_dead || effective == 0 {
        return Ok(result);
    }

    let was_down = status.current_hp == 0;

    let temp_hp_lost = effective.min(status.temp_hp);
    let remaining = effective - temp_hp_lost;
    let hp_lost = remaining.min(status.current_hp);

    status.temp_hp -= temp_hp_lost;
    status.current_hp -= hp_lost;

    if was_down && effective >= status.max_hp {
        status.death_save_failures = DEATH_SAVE_LIMIT;
        status.is_conscious = false;
        status.is_stabilized = false;
        status.is_dead = true;
        result.massive_damage = true;
    } else if status.current_hp == 0 {
        status.is_conscious = false;
        result.knocked_out = !was_down;
    }

    result.hp_lost = hp_lost;
    result.temp_hp_lost = temp_hp_lost;
    result.new_current_hp = status.current_hp;
    result.new_temp_hp = status.temp_hp;
    result.is_conscious = status.is_conscious;
    result.is_dead = status.is_dead;
    Ok(result)
}

// ============================================================================
// Healing
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealResult {
    pub requested: i32,
    pub applied: i32,
    pub overheal: i32,
    pub new_current_hp: i32,
    /// Healing brought the participant back from 0 HP
    pub revived: bool,
}

pub fn heal_damage(status: &mut ParticipantStatus, amount: i32) -> RulesResult<HealResult> {
    if amount < 0 {
        return Err(RulesError::negative("Healing", amount));
    }
    if status.is_dead {
        return Err(RulesError::ParticipantDead(status.participant_id.clone()));
    }

    let applied = amount.min(status.max_hp - status.current_hp);
    let was_down = status.current_hp == 0;

    status.current_hp += applied;

    let revived = was_down && status.current_hp > 0;
    if revived {
        status.reset_death_saves();
        status.is_conscious = true;
    }

    Ok(HealResult {
        requested: amount,
        applied,
        overheal: amount - applied,
        new_current_hp: status.current_hp,
        revived,
    })
}

// ============================================================================
// Temporary HP
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempHpResult {
    pub previous_temp_hp: i32,
    pub new_temp_hp: i32,
    /// False when the existing pool was already at least as large
    pub replaced: bool,
}

/// Temporary HP do not stack: keep whichever pool is larger
pub fn set_temp_hp(status: &mut ParticipantStatus, amount: i32) -> RulesResult<TempHpResult> {
    if amount < 0 {
        return Err(RulesError::negative("Temporary HP", amount));
    }

    let previous = status.temp_hp;
    status.temp_hp = previous.max(amount);

    Ok(TempHpResult {
        previous_temp_hp: previous,
        new_temp_hp: status.temp_hp,
        replaced: status.temp_hp != previous,
    })
}

// ============================================================================
// Death Saves
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathSaveOutcome {
    /// Natural 20: back on your feet with 1 HP
    CriticalSuccess,
    Success,
    Failure,
    /// Natural 1: two failures
    CriticalFailure,
}

impl DeathSaveOutcome {
    pub fn from_roll(roll: u32) -> Self {
        match roll {
            20 => Self::CriticalSuccess,
            1 => Self::CriticalFailure,
            10..=19 => Self::Success,
            _ => Self::Failure,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathSaveResult {
    pub roll: u32,
    pub outcome: DeathSaveOutcome,
    pub successes: u8,
    pub failures: u8,
    pub is_stabilized: bool,
    pub is_dead: bool,
    pub revived: bool,
    pub current_hp: i32,
}

pub fn roll_death_save(status: &mut ParticipantStatus, roll: u32) -> RulesResult<DeathSaveResult> {
    check_d20("death save", roll)?;

    let refuse = |reason: &str| RulesError::DeathSaveNotAllowed {
        participant: status.participant_id.clone(),
        reason: reason.to_string(),
    };
    if status.is_dead {
        return Err(RulesError::ParticipantDead(status.participant_id.clone()));
    }
    if status.current_hp > 0 {
        return Err(refuse("participant is conscious"));
    }
    if status.is_stabilized {
        return Err(refuse("participant is already stable"));
    }

    let outcome = DeathSaveOutcome::from_roll(roll);
    let mut revived = false;

    match outcome {
        DeathSaveOutcome::CriticalSuccess => {
            status.current_hp = 1;
            status.is_conscious = true;
            status.reset_death_saves();
            revived = true;
        }
        DeathSaveOutcome::Success => {
            status.death_save_successes = (status.death_save_successes + 1).min(DEATH_SAVE_LIMIT);
            if status.death_save_successes >= DEATH_SAVE_LIMIT {
                status.is_stabilized = true;
            }
        }
        DeathSaveOutcome::Failure | DeathSaveOutcome::CriticalFailure => {
            let failures = if outcome == DeathSaveOutcome::CriticalFailure { 2 } else { 1 };
            status.death_save_failures = (status.death_save_failures + failures).min(DEATH_SAVE_LIMIT);
            if status.death_save_failures >= DEATH_SAVE_LIMIT {
                status.is_dead = true;
            }
        }
    }

    Ok(DeathSaveResult {
        roll,
        outcome,
        successes: status.death_save_successes,
        failures: status.death_save_failures,
        is_stabilized: status.is_stabilized,
        is_dead: status.is_dead,
        revived,
        current_hp: status.current_hp,
    })
}

// ============================================================================
// Tests
// ============================================================================
