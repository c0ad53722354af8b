//! Property-based tests for the HP & status engine
//!
//! Tests invariants:
//! - `0 <= current_hp <= max_hp`, `temp_hp >= 0`, counters within `0..=3`
//! - Zero damage never changes a status
//! - Resistance plus vulnerability is the same as neither
//! - Setting temp HP keeps the larger pool

use chrono::Utc;
use proptest::prelude::*;

use crate::core::damage::{DamageModifiers, DamageType};
use crate::core::session::health::{
    apply_damage, heal_damage, roll_death_save, set_temp_hp, DamageOptions,
};
use crate::database::ParticipantStatus;

// ============================================================================
// Strategies for generating test inputs
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Damage(i32, DamageType),
    Heal(i32),
    TempHp(i32),
    DeathSave(u32),
}

fn arb_damage_type() -> impl Strategy<Value = DamageType> {
    prop::sample::select(DamageType::ALL.to_vec())
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0i32..80, arb_damage_type()).prop_map(|(a, t)| Op::Damage(a, t)),
        2 => (0i32..40).prop_map(Op::Heal),
        1 => (0i32..30).prop_map(Op::TempHp),
        2 => (1u32..=20).prop_map(Op::DeathSave),
    ]
}

fn arb_modifiers() -> impl Strategy<Value = DamageModifiers> {
    (
        prop::collection::vec(arb_damage_type(), 0..3),
        prop::collection::vec(arb_damage_type(), 0..3),
        prop::collection::vec(arb_damage_type(), 0..2),
    )
        .prop_map(|(res, vul, imm)| {
            let mut mods = DamageModifiers::new();
            for t in res {
                mods = mods.with_resistance(t);
            }
            for t in vul {
                mods = mods.with_vulnerability(t);
            }
            for t in imm {
                mods = mods.with_immunity(t);
            }
            mods
        })
}

fn apply(status: &mut ParticipantStatus, mods: &DamageModifiers, op: &Op) {
    // Rejected operations must leave the status valid too
    let _ = match *op {
        Op::Damage(amount, t) => {
            apply_damage(status, mods, amount, t, DamageOptions::default()).map(|_| ())
        }
        Op::Heal(amount) => heal_damage(status, amount).map(|_| ()),
        Op::TempHp(amount) => set_temp_hp(status, amount).map(|_| ()),
        Op::DeathSave(roll) => roll_death_save(status, roll).map(|_| ()),
    };
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn status_stays_in_bounds(
        max_hp in 1i32..150,
        mods in arb_modifiers(),
        ops in prop::collection::vec(arb_op(), 1..40),
    ) {
        let mut status = ParticipantStatus::new("p", max_hp, Utc::now());
        for op in &ops {
            apply(&mut status, &mods, op);
            prop_assert!(status.invariants_hold(), "after {:?}: {:?}", op, status);
            prop_assert!(status.current_hp >= 0 && status.current_hp <= status.max_hp);
            prop_assert!(status.temp_hp >= 0);
            prop_assert!(status.death_save_successes <= 3 && status.death_save_failures <= 3);
        }
    }

    #[test]
    fn dead_is_terminal(
        max_hp in 1i32..60,
        ops in prop::collection::vec(arb_op(), 1..30),
    ) {
        let mods = DamageModifiers::new();
        let mut status = ParticipantStatus::new("p", max_hp, Utc::now());
        // Drop, then massive damage
        apply(&mut status, &mods, &Op::Damage(max_hp, DamageType::Force));
        apply(&mut status, &mods, &Op::Damage(max_hp, DamageType::Force));
        prop_assert!(status.is_dead);

        for op in &ops {
            apply(&mut status, &mods, op);
            prop_assert!(status.is_dead);
            prop_assert_eq!(status.current_hp, 0);
        }
    }

    #[test]
    fn zero_damage_is_a_no_op(
        max_hp in 1i32..150,
        mods in arb_modifiers(),
        ops in prop::collection::vec(arb_op(), 0..20),
        damage_type in arb_damage_type(),
    ) {
        let mut status = ParticipantStatus::new("p", max_hp, Utc::now());
        for op in &ops {
            apply(&mut status, &mods, op);
        }
        let before = status.clone();
        let result = apply_damage(&mut status, &mods, 0, damage_type, DamageOptions::default())
            .unwrap();
        prop_assert_eq!(result.modified_amount, 0);
        prop_assert_eq!(status, before);
    }

    #[test]
    fn resistance_and_vulnerability_cancel(
        amount in 0i32..500,
        damage_type in arb_damage_type(),
    ) {
        let both = DamageModifiers::new()
            .with_resistance(damage_type)
            .with_vulnerability(damage_type);
        let resolved = both.resolve(amount, damage_type, Default::default());
        prop_assert_eq!(resolved.effective, amount);
        prop_assert!(!resolved.resisted && !resolved.vulnerable);
    }

    #[test]
    fn damage_splits_between_temp_and_real_hp(
        max_hp in 1i32..150,
        temp in 0i32..50,
        amount in 0i32..200,
    ) {
        let mut status = ParticipantStatus::new("p", max_hp, Utc::now());
        set_temp_hp(&mut status, temp).unwrap();
        let result = apply_damage(
            &mut status,
            &DamageModifiers::new(),
            amount,
            DamageType::Slashing,
            DamageOptions::default(),
        )
        .unwrap();

        prop_assert_eq!(result.temp_hp_lost, amount.min(temp));
        prop_assert_eq!(result.hp_lost, (amount - result.temp_hp_lost).min(max_hp));
        prop_assert_eq!(status.current_hp, max_hp - result.hp_lost);
    }

    #[test]
    fn temp_hp_keeps_larger_pool(first in 0i32..100, second in 0i32..100) {
        let mut status = ParticipantStatus::new("p", 10, Utc::now());
        set_temp_hp(&mut status, first).unwrap();
        let result = set_temp_hp(&mut status, second).unwrap();
        prop_assert_eq!(result.new_temp_hp, first.max(second));
        prop_assert_eq!(status.temp_hp, first.max(second));
    }
}
