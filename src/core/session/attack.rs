//! Attack Resolver
//!
//! Hit checks, damage rolls, and spell resolution. Damage modifiers are
//! applied here, so the HP engine is always called with
//! [`ModifierBypass::PREFILTERED`] semantics.

use serde::{Deserialize, Serialize};

use super::health::{apply_damage, DamageOptions, DamageResult};
use crate::core::damage::{DamageModifiers, DamageType, ModifierBypass};
use crate::core::dice::{DiceError, DiceNotation, RandomSource};
use crate::core::error::{check_d20, RulesError, RulesResult};
use crate::database::ParticipantStatus;

const PREFILTERED: DamageOptions = DamageOptions {
    ignore_resistances: true,
    ignore_immunities: true,
};

// ============================================================================
// Hit Checks
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitCheck {
    pub roll: u32,
    pub attack_bonus: i32,
    pub total: i32,
    pub target_ac: i32,
    pub is_hit: bool,
    pub is_critical: bool,
    /// Natural 1
    pub is_fumble: bool,
}

fn d20_total(roll: u32, bonus: i32, what: &str) -> RulesResult<i32> {
    i32::try_from(roll)
        .ok()
        .and_then(|roll| roll.checked_add(bonus))
        .ok_or_else(|| RulesError::InvalidInput(format!("{what} {bonus} is out of range")))
}

/// `roll` is the d20 face already chosen for advantage or disadvantage
pub fn check_hit(roll: u32, attack_bonus: i32, target_ac: i32) -> RulesResult<HitCheck> {
    check_d20("attack", roll)?;

    let total = d20_total(roll, attack_bonus, "attack bonus")?;
    let is_critical = roll == 20;
    let is_fumble = roll == 1;
    let is_hit = !is_fumble && (is_critical || total >= target_ac);

    Ok(HitCheck {
        roll,
        attack_bonus,
        total,
        target_ac,
        is_hit,
        is_critical,
        is_fumble,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveCheck {
    pub roll: u32,
    pub save_bonus: i32,
    pub total: i32,
    pub dc: i32,
    pub success: bool,
}

/// Saving throws have no natural 1/20 rule
pub fn check_save(roll: u32, save_bonus: i32, dc: i32) -> RulesResult<SaveCheck> {
    check_d20("saving throw", roll)?;
    let total = d20_total(roll, save_bonus, "save bonus")?;
    Ok(SaveCheck {
        roll,
        save_bonus,
        total,
        dc,
        success: total >= dc,
    })
}

// ============================================================================
// Damage
// ============================================================================

/// What a weapon or spell deals on a hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageSpec {
    pub dice: DiceNotation,
    /// Flat bonus on top of any modifier in the notation
    #[serde(default)]
    pub bonus: i32,
    pub damage_type: DamageType,
}

impl DamageSpec {
    pub fn new(dice: DiceNotation, bonus: i32, damage_type: DamageType) -> Self {
        Self {
            dice,
            bonus,
            damage_type,
        }
    }

    /// `DamageSpec::parse("1d8+3", DamageType::Slashing)`
    pub fn parse(notation: &str, damage_type: DamageType) -> RulesResult<Self> {
        Ok(Self::new(DiceNotation::parse(notation)?, 0, damage_type))
    }

    fn flat_bonus(&self) -> RulesResult<i32> {
        self.dice
            .modifier
            .checked_add(self.bonus)
            .ok_or(RulesError::InvalidDice(DiceError::ModifierOverflow))
    }
}

/// Dice and bonus totalled, before any defences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDamage {
    /// Doubled on a critical
    pub dice_rolled: String,
    /// Individual faces; empty when the caller supplied the total
    pub rolls: Vec<u32>,
    pub dice_total: u32,
    pub bonus: i32,
    /// `dice_total + bonus`, never below 0
    pub total: i32,
    pub is_critical: bool,
}

/// Roll (or accept) the dice portion and add the flat bonus once.
///
/// An explicit roll is the total of the *undoubled* dice and must be
/// achievable with them; on a critical it is doubled.
pub fn roll_damage(
    spec: &DamageSpec,
    is_critical: bool,
    explicit_roll: Option<u32>,
    dice: &dyn RandomSource,
) -> RulesResult<RawDamage> {
    // Deserialized notation skips the parser's bounds
    DiceNotation::new(spec.dice.count, spec.dice.sides, spec.dice.modifier)?;

    let notation = if is_critical {
        spec.dice.doubled()
    } else {
        spec.dice.clone()
    };

    let overflow = || RulesError::InvalidDice(DiceError::ModifierOverflow);

    let (rolls, dice_total) = match explicit_roll {
        Some(total) => {
            spec.dice.validate_dice_total(total)?;
            let total = if is_critical {
                total.checked_mul(2).ok_or_else(overflow)?
            } else {
                total
            };
            (Vec::new(), total)
        }
        None => {
            let rolled = DiceNotation {
                modifier: 0,
                ..notation.clone()
            }
            .roll(dice)?;
            let sum = u32::try_from(rolled.subtotal).map_err(|_| overflow())?;
            (rolled.rolls, sum)
        }
    };

    let bonus = spec.flat_bonus()?;
    let total = i32::try_from(dice_total)
        .ok()
        .and_then(|sum| sum.checked_add(bonus))
        .ok_or_else(overflow)?
        .max(0);

    Ok(RawDamage {
        dice_rolled: format!("{}d{}", notation.count, notation.sides),
        rolls,
        dice_total,
        bonus,
        total,
        is_critical,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageCalculation {
    pub raw: RawDamage,
    pub damage_type: DamageType,
    pub resisted: bool,
    pub vulnerable: bool,
    pub immune: bool,
    pub final_damage: i32,
}

fn apply_modifiers(
    raw: RawDamage,
    damage_type: DamageType,
    modifiers: &DamageModifiers,
) -> DamageCalculation {
    let modified = modifiers.resolve(raw.total, damage_type, ModifierBypass::default());
    DamageCalculation {
        raw,
        damage_type,
        resisted: modified.resisted,
        vulnerable: modified.vulnerable,
        immune: modified.immune,
        final_damage: modified.effective,
    }
}

/// Total the damage of one hit and run it through the target's defences
pub fn calculate_damage(
    spec: &DamageSpec,
    is_critical: bool,
    modifiers: &DamageModifiers,
    explicit_roll: Option<u32>,
    dice: &dyn RandomSource,
) -> RulesResult<DamageCalculation> {
    let raw = roll_damage(spec, is_critical, explicit_roll, dice)?;
    Ok(apply_modifiers(raw, spec.damage_type, modifiers))
}

// ============================================================================
// Weapon Attacks
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackInput {
    /// Chosen d20 face
    pub roll: u32,
    pub attack_bonus: i32,
    pub damage: DamageSpec,
    /// Pre-rolled dice total, otherwise the random source rolls
    #[serde(default)]
    pub damage_roll: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackResult {
    pub hit: HitCheck,
    pub damage: Option<DamageCalculation>,
    pub applied: Option<DamageResult>,
}

impl AttackResult {
    pub fn damage_dealt(&self) -> i32 {
        self.applied.as_ref().map_or(0, |a| a.modified_amount)
    }
}

/// Check the hit, roll damage, and apply it to the target.
///
/// A miss leaves the target untouched.
pub fn resolve_attack(
    target: &mut ParticipantStatus,
    target_ac: i32,
    modifiers: &DamageModifiers,
    input: &AttackInput,
    dice: &dyn RandomSource,
) -> RulesResult<AttackResult> {
    let hit = check_hit(input.roll, input.attack_bonus, target_ac)?;
    if !hit.is_hit {
        return Ok(AttackResult {
            hit,
            damage: None,
            applied: None,
        });
    }

    let damage = calculate_damage(
        &input.damage,
        hit.is_critical,
        modifiers,
        input.damage_roll,
        dice,
    )?;
    let applied = apply_damage(
        target,
        modifiers,
        damage.final_damage,
        damage.damage_type,
        PREFILTERED,
    )?;

    Ok(AttackResult {
        hit,
        damage: Some(damage),
        applied: Some(applied),
    })
}

// ============================================================================
// Spells
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SpellResolution {
    /// One attack roll per target; can critically hit
    AttackRoll { attack_bonus: i32 },
    /// Targets save against `dc`; no criticals
    SavingThrow {
        dc: i32,
        /// Half damage on a successful save, otherwise none
        half_on_success: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellAttack {
    pub name: String,
    pub damage: DamageSpec,
    pub resolution: SpellResolution,
    /// Pre-rolled dice total for saving-throw spells, shared by every target
    #[serde(default)]
    pub damage_roll: Option<u32>,
}

/// Per-target input for one spell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellTargetInput {
    pub participant_id: String,
    /// Attack d20 for attack-roll spells, save d20 otherwise
    pub roll: u32,
    #[serde(default)]
    pub save_bonus: i32,
    #[serde(default)]
    pub armor_class: i32,
    #[serde(default)]
    pub modifiers: DamageModifiers,
    /// Pre-rolled dice total for this target's attack-roll damage
    #[serde(default)]
    pub damage_roll: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellTargetOutcome {
    pub participant_id: String,
    pub hit: Option<HitCheck>,
    pub save: Option<SaveCheck>,
    pub damage: Option<DamageCalculation>,
    /// After defences and any save reduction
    pub final_damage: i32,
    pub applied: Option<DamageResult>,
}

/// Work out every target's damage without touching any status.
///
/// Fails as a whole if any target's input is invalid.
pub fn plan_spell_attack(
    spell: &SpellAttack,
    targets: &[SpellTargetInput],
    dice: &dyn RandomSource,
) -> RulesResult<Vec<SpellTargetOutcome>> {
    if targets.is_empty() {
        return Err(RulesError::InvalidInput(format!(
            "{} needs at least one target",
            spell.name
        )));
    }

    match spell.resolution {
        SpellResolution::AttackRoll { attack_bonus } => targets
            .iter()
            .map(|target| {
                let hit = check_hit(target.roll, attack_bonus, target.armor_class)?;
                let damage = if hit.is_hit {
                    Some(calculate_damage(
                        &spell.damage,
                        hit.is_critical,
                        &target.modifiers,
                        target.damage_roll,
                        dice,
                    )?)
                } else {
                    None
                };
                Ok(SpellTargetOutcome {
                    participant_id: target.participant_id.clone(),
                    hit: Some(hit),
                    save: None,
                    final_damage: damage.as_ref().map_or(0, |d| d.final_damage),
                    damage,
                    applied: None,
                })
            })
            .collect(),

        SpellResolution::SavingThrow {
            dc,
            half_on_success,
        } => {
            let saves = targets
                .iter()
                .map(|t| check_save(t.roll, t.save_bonus, dc))
                .collect::<RulesResult<Vec<_>>>()?;
            let raw = roll_damage(&spell.damage, false, spell.damage_roll, dice)?;

            Ok(targets
                .iter()
                .zip(saves)
                .map(|(target, save)| {
                    let damage =
                        apply_modifiers(raw.clone(), spell.damage.damage_type, &target.modifiers);
                    let final_damage = match (save.success, half_on_success) {
                        (false, _) => damage.final_damage,
                        (true, true) => damage.final_damage / 2,
                        (true, false) => 0,
                    };
                    SpellTargetOutcome {
                        participant_id: target.participant_id.clone(),
                        hit: None,
                        save: Some(save),
                        damage: Some(damage),
                        final_damage,
                        applied: None,
                    }
                })
                .collect())
        }
    }
}

/// Apply one planned outcome to its target
pub fn apply_spell_outcome(
    target: &mut ParticipantStatus,
    damage_type: DamageType,
    outcome: &mut SpellTargetOutcome,
) -> RulesResult<()> {
    if outcome.damage.is_none() {
        return Ok(());
    }
    let applied = apply_damage(
        target,
        &DamageModifiers::default(),
        outcome.final_damage,
        damage_type,
        PREFILTERED,
    )?;
    outcome.applied = Some(applied);
    Ok(())
}

/// Resolve a spell against several targets.
///
/// `statuses[i]` belongs to `targets[i]`. Nothing is applied unless every
/// target's input validates.
pub fn resolve_spell_attack(
    spell: &SpellAttack,
    targets: &[SpellTargetInput],
    statuses: &mut [&mut ParticipantStatus],
    dice: &dyn RandomSource,
) -> RulesResult<Vec<SpellTargetOutcome>> {
    if targets.len() != statuses.len() {
        return Err(RulesError::InvalidInput(format!(
            "{} targets but {} statuses",
            targets.len(),
            statuses.len()
        )));
    }

    let mut outcomes = plan_spell_attack(spell, targets, dice)?;
    for (status, outcome) in statuses.iter_mut().zip(outcomes.iter_mut()) {
        apply_spell_outcome(status, spell.damage.damage_type, outcome)?;
    }
    Ok(outcomes)
}

// ============================================================================
// Tests
// ============================================================================
