//! Combat manager scenarios: turn order, attacks, spells, and the
//! conscious/dying/dead lifecycle as seen through storage.

use crate::core::clock::Clock;
use crate::core::damage::{DamageModifiers, DamageType};
use crate::core::dice::RollMode;
use crate::core::error::RulesError;
use crate::core::session::{
    AttackRequest, DamageOptions, DamageSpec, SpellAttack, SpellRequest, SpellResolution,
    SpellTarget,
};
use crate::database::{CombatOps, EncounterStatus, LifeState};
use crate::tests::common::*;

fn longsword_at(target_id: &str, roll: u32, damage_roll: u32) -> AttackRequest {
    AttackRequest {
        attacker_id: None,
        target_id: target_id.to_string(),
        roll: Some(roll),
        mode: RollMode::Normal,
        attack_bonus: 5,
        damage: DamageSpec::parse("1d8+3", DamageType::Slashing).unwrap(),
        damage_roll: Some(damage_roll),
        source: Some("Longsword".into()),
    }
}

// =============================================================================
// Turn Order
// =============================================================================

#[test]
fn test_turn_cycle_tracks_rounds_and_indices() {
    let h = Harness::new();
    let enc = h.combat.start_encounter("s-1", Some("Ambush")).unwrap();
    let fighter = h.combat.add_participant(&enc.id, fighter(15)).unwrap();
    let goblin = h.combat.add_participant(&enc.id, goblin("Goblin", 15)).unwrap();
    let wizard = h.combat.add_participant(&enc.id, wizard(18)).unwrap();

    let state = h.combat.get_combat_state(&enc.id).unwrap();
    let names: Vec<_> = state
        .participants
        .iter()
        .map(|p| p.participant.name.as_str())
        .collect();
    assert_eq!(names, vec!["Ilyra", "Brakka", "Goblin"]);
    assert_eq!(state.current().unwrap().participant.id, wizard.id);

    // Stored records carry their position in the order
    assert_eq!(h.combat.participant(&wizard.id).unwrap().turn_order, 0);
    assert_eq!(h.combat.participant(&fighter.id).unwrap().turn_order, 1);
    assert_eq!(h.combat.participant(&goblin.id).unwrap().turn_order, 2);

    let first = h.combat.advance_turn(&enc.id).unwrap();
    assert_eq!(first.current_participant.as_deref(), Some(fighter.id.as_str()));
    h.combat.advance_turn(&enc.id).unwrap();
    let wrap = h.combat.advance_turn(&enc.id).unwrap();
    assert!(wrap.new_round);
    assert_eq!(wrap.round, 2);
    assert_eq!(wrap.current_participant.as_deref(), Some(wizard.id.as_str()));

    let back = h.combat.previous_turn(&enc.id).unwrap();
    assert_eq!((back.round, back.turn), (1, 2));
}

#[test]
fn test_removing_current_participant_passes_the_turn() {
    let h = Harness::new();
    let enc = h.combat.start_encounter("s-1", None).unwrap();
    h.combat.add_participant(&enc.id, fighter(20)).unwrap();
    let goblin = h.combat.add_participant(&enc.id, goblin("Goblin", 12)).unwrap();
    let wizard = h.combat.add_participant(&enc.id, wizard(8)).unwrap();

    h.combat.advance_turn(&enc.id).unwrap();
    h.combat.remove_participant(&goblin.id).unwrap();

    let current = h.combat.current_participant(&enc.id).unwrap().unwrap();
    assert_eq!(current.id, wizard.id);
    assert_eq!(current.turn_order, 1);
    assert!(h.db.get_status(&goblin.id).unwrap().is_none());
}

#[test]
fn test_set_initiative_after_turns_start_keeps_actor() {
    let h = Harness::new();
    let enc = h.combat.start_encounter("s-1", None).unwrap();
    let fighter = h.combat.add_participant(&enc.id, fighter(20)).unwrap();
    let goblin = h.combat.add_participant(&enc.id, goblin("Goblin", 12)).unwrap();
    h.combat.advance_turn(&enc.id).unwrap();

    h.combat.set_initiative(&goblin.id, 25).unwrap();
    let state = h.combat.get_combat_state(&enc.id).unwrap();
    assert_eq!(state.participants[0].participant.id, goblin.id);
    assert_eq!(state.current().unwrap().participant.id, goblin.id);
    assert_eq!(h.combat.participant(&fighter.id).unwrap().turn_order, 1);
}

#[test]
fn test_out_of_turn_attack_rejected_without_mutation() {
    let h = Harness::new();
    let enc = h.combat.start_encounter("s-1", None).unwrap();
    let wizard = h.combat.add_participant(&enc.id, wizard(18)).unwrap();
    let fighter = h.combat.add_participant(&enc.id, fighter(10)).unwrap();
    let goblin = h.combat.add_participant(&enc.id, goblin("Goblin", 5)).unwrap();

    let mut request = longsword_at(&goblin.id, 18, 5);
    request.attacker_id = Some(fighter.id.clone());

    let err = h.combat.resolve_attack(&request).unwrap_err();
    assert_eq!(
        err,
        RulesError::NotParticipantsTurn {
            expected: wizard.id.clone(),
            actual: fighter.id.clone(),
        }
    );
    assert_eq!(h.combat.status(&goblin.id).unwrap().current_hp, 7);

    h.combat.advance_turn(&enc.id).unwrap();
    assert!(h.combat.resolve_attack(&request).is_ok());
}

#[test]
fn test_paused_and_completed_encounters_block_turns() {
    let h = Harness::new();
    let enc = h.combat.start_encounter("s-1", None).unwrap();
    let fighter = h.combat.add_participant(&enc.id, fighter(10)).unwrap();

    h.combat.pause_encounter(&enc.id).unwrap();
    assert!(matches!(
        h.combat.advance_turn(&enc.id),
        Err(RulesError::EncounterNotActive { .. })
    ));
    assert!(h.combat.ensure_turn(&enc.id, &fighter.id).is_err());
    h.combat.resume_encounter(&enc.id).unwrap();
    h.combat.ensure_turn(&enc.id, &fighter.id).unwrap();

    let ended = h.combat.end_combat(&enc.id).unwrap();
    assert_eq!(ended.status, EncounterStatus::Completed);
    assert_eq!(ended.ended_at, Some(h.clock.now()));
    assert!(h.combat.advance_turn(&enc.id).is_err());
    assert!(h.combat.add_participant(&enc.id, goblin("Late", 3)).is_err());
}

// =============================================================================
// Attacks
// =============================================================================

#[test]
fn test_attack_drops_goblin_and_logs_effective_damage() {
    let h = Harness::new();
    let enc = h.combat.start_encounter("s-1", None).unwrap();
    let goblin = h.combat.add_participant(&enc.id, goblin("Goblin", 12)).unwrap();

    // 10 + 5 meets AC 15; 5 + 3 slashing
    let outcome = h.combat.resolve_attack(&longsword_at(&goblin.id, 10, 5)).unwrap();
    assert!(outcome.d20.is_none());
    assert!(outcome.result.hit.is_hit);
    assert_eq!(outcome.result.damage_dealt(), 8);

    let applied = outcome.result.applied.unwrap();
    assert!(applied.knocked_out);
    assert_eq!(applied.new_current_hp, 0);

    let log = h.combat.damage_log(&enc.id).unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].amount, 8);
    assert_eq!(log[0].round, 1);
    assert_eq!(log[0].source.as_deref(), Some("Longsword"));

    let view = h.combat.get_combat_state(&enc.id).unwrap();
    assert_eq!(view.participants[0].life_state, LifeState::Dying);
}

#[test]
fn test_miss_changes_nothing() {
    let h = Harness::new();
    let enc = h.combat.start_encounter("s-1", None).unwrap();
    let goblin = h.combat.add_participant(&enc.id, goblin("Goblin", 12)).unwrap();

    let outcome = h.combat.resolve_attack(&longsword_at(&goblin.id, 9, 8)).unwrap();
    assert!(!outcome.result.hit.is_hit);
    assert_eq!(outcome.result.damage_dealt(), 0);
    assert_eq!(h.combat.status(&goblin.id).unwrap().current_hp, 7);
    assert!(h.combat.damage_log(&enc.id).unwrap().is_empty());
}

#[test]
fn test_rolled_attack_with_advantage_takes_higher_die() {
    let h = Harness::new();
    let enc = h.combat.start_encounter("s-1", None).unwrap();
    let target = h
        .combat
        .add_participant(&enc.id, fire_elemental(10, DamageModifiers::new()))
        .unwrap();

    // d20s 4 and 17, then a natural 6 on the d8
    h.script([4, 17, 6]);
    let mut request = longsword_at(&target.id, 0, 0);
    request.roll = None;
    request.damage_roll = None;
    request.mode = RollMode::Advantage;

    let outcome = h.combat.resolve_attack(&request).unwrap();
    let d20 = outcome.d20.unwrap();
    assert_eq!(d20.rolls, vec![4, 17]);
    assert_eq!(d20.chosen, 17);
    assert_eq!(outcome.result.damage_dealt(), 9);
    assert_eq!(h.dice.remaining(), 0);
}

#[test]
fn test_critical_doubles_dice_not_bonus() {
    let h = Harness::new();
    let enc = h.combat.start_encounter("s-1", None).unwrap();
    let target = h
        .combat
        .add_participant(&enc.id, fire_elemental(10, DamageModifiers::new()))
        .unwrap();

    let outcome = h.combat.resolve_attack(&longsword_at(&target.id, 20, 6)).unwrap();
    assert!(outcome.result.hit.is_critical);
    let damage = outcome.result.damage.unwrap();
    assert_eq!(damage.raw.dice_total, 12);
    assert_eq!(damage.final_damage, 15);
}

#[test]
fn test_attack_on_resistant_target_applies_modifiers_once() {
    let h = Harness::new();
    let enc = h.combat.start_encounter("s-1", None).unwrap();
    let elemental = h
        .combat
        .add_participant(
            &enc.id,
            fire_elemental(10, DamageModifiers::new().with_resistance(DamageType::Slashing)),
        )
        .unwrap();

    // 7 + 3 = 10 slashing, halved once to 5
    let outcome = h.combat.resolve_attack(&longsword_at(&elemental.id, 15, 7)).unwrap();
    let damage = outcome.result.damage.unwrap();
    assert!(damage.resisted);
    assert_eq!(damage.final_damage, 5);
    assert_eq!(h.combat.status(&elemental.id).unwrap().current_hp, 97);
}

#[test]
fn test_invalid_damage_roll_rejected() {
    let h = Harness::new();
    let enc = h.combat.start_encounter("s-1", None).unwrap();
    let goblin = h.combat.add_participant(&enc.id, goblin("Goblin", 12)).unwrap();

    assert!(h.combat.resolve_attack(&longsword_at(&goblin.id, 15, 9)).is_err());
    assert!(matches!(
        h.combat.resolve_attack(&longsword_at(&goblin.id, 21, 4)),
        Err(RulesError::InvalidRoll { .. })
    ));
    assert_eq!(h.combat.status(&goblin.id).unwrap().current_hp, 7);
}

// =============================================================================
// Spells
// =============================================================================

fn fireball() -> SpellAttack {
    SpellAttack {
        name: "Fireball".into(),
        damage: DamageSpec::parse("8d6", DamageType::Fire).unwrap(),
        resolution: SpellResolution::SavingThrow {
            dc: 15,
            half_on_success: true,
        },
        damage_roll: Some(28),
    }
}

#[test]
fn test_fireball_one_roll_many_saves() {
    let h = Harness::new();
    let enc = h.combat.start_encounter("s-1", None).unwrap();
    let a = h.combat.add_participant(&enc.id, goblin("Goblin A", 12)).unwrap();
    let b = h.combat.add_participant(&enc.id, fighter(10)).unwrap();
    let elemental = h
        .combat
        .add_participant(
            &enc.id,
            fire_elemental(5, DamageModifiers::new().with_immunity(DamageType::Fire)),
        )
        .unwrap();

    let request = SpellRequest {
        caster_id: None,
        spell: fireball(),
        targets: vec![
            SpellTarget {
                roll: Some(5),
                save_bonus: 1,
                ..SpellTarget::new(a.id.clone())
            },
            SpellTarget {
                roll: Some(18),
                save_bonus: 1,
                ..SpellTarget::new(b.id.clone())
            },
            SpellTarget {
                roll: Some(2),
                ..SpellTarget::new(elemental.id.clone())
            },
        ],
        mode: RollMode::Normal,
    };

    let outcomes = h.combat.resolve_spell_attack(&request).unwrap();
    let finals: Vec<_> = outcomes.iter().map(|o| o.final_damage).collect();
    assert_eq!(finals, vec![28, 14, 0]);
    assert!(outcomes[2].damage.as_ref().unwrap().immune);

    assert_eq!(h.combat.status(&a.id).unwrap().current_hp, 0);
    assert_eq!(h.combat.status(&b.id).unwrap().current_hp, 16);
    assert_eq!(h.combat.status(&elemental.id).unwrap().current_hp, 102);

    let log = h.combat.damage_log(&enc.id).unwrap();
    assert_eq!(log.len(), 2);
    assert!(log.iter().all(|e| e.source.as_deref() == Some("Fireball")));
}

#[test]
fn test_spell_with_bad_target_changes_nobody() {
    let h = Harness::new();
    let enc = h.combat.start_encounter("s-1", None).unwrap();
    let a = h.combat.add_participant(&enc.id, goblin("Goblin A", 12)).unwrap();

    let request = SpellRequest {
        caster_id: None,
        spell: fireball(),
        targets: vec![
            SpellTarget {
                roll: Some(3),
                ..SpellTarget::new(a.id.clone())
            },
            SpellTarget {
                roll: Some(25),
                ..SpellTarget::new(a.id.clone())
            },
        ],
        mode: RollMode::Normal,
    };
    assert!(h.combat.resolve_spell_attack(&request).is_err());
    assert_eq!(h.combat.status(&a.id).unwrap().current_hp, 7);

    let missing = SpellRequest {
        targets: vec![SpellTarget::new("ghost")],
        ..request
    };
    assert_eq!(
        h.combat.resolve_spell_attack(&missing).unwrap_err(),
        RulesError::not_found("Participant", "ghost")
    );
}

#[test]
fn test_attack_roll_spell_rolls_per_target() {
    let h = Harness::new();
    let enc = h.combat.start_encounter("s-1", None).unwrap();
    let a = h.combat.add_participant(&enc.id, goblin("Goblin A", 12)).unwrap();
    let b = h.combat.add_participant(&enc.id, goblin("Goblin B", 11)).unwrap();

    // d20 for A (hit), d20 for B (miss), then A's 2d6 damage
    h.script([16, 3, 2, 3]);
    let request = SpellRequest {
        caster_id: None,
        spell: SpellAttack {
            name: "Scorching Ray".into(),
            damage: DamageSpec::parse("2d6", DamageType::Fire).unwrap(),
            resolution: SpellResolution::AttackRoll { attack_bonus: 5 },
            damage_roll: None,
        },
        targets: vec![SpellTarget::new(a.id.clone()), SpellTarget::new(b.id.clone())],
        mode: RollMode::Normal,
    };

    let outcomes = h.combat.resolve_spell_attack(&request).unwrap();
    assert!(outcomes[0].hit.as_ref().unwrap().is_hit);
    assert!(!outcomes[1].hit.as_ref().unwrap().is_hit);
    assert_eq!(outcomes[0].final_damage, 5);
    assert_eq!(h.combat.status(&a.id).unwrap().current_hp, 2);
    assert_eq!(h.combat.status(&b.id).unwrap().current_hp, 7);
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_dying_then_death_by_failed_saves() {
    let h = Harness::new();
    let enc = h.combat.start_encounter("s-1", None).unwrap();
    let wizard = h.combat.add_participant(&enc.id, wizard(10)).unwrap();

    h.combat
        .apply_damage(&wizard.id, 18, DamageType::Necrotic, DamageOptions::default(), None)
        .unwrap();

    let first = h.combat.roll_death_save(&wizard.id, Some(10)).unwrap();
    assert_eq!((first.successes, first.failures), (1, 0));
    let second = h.combat.roll_death_save(&wizard.id, Some(9)).unwrap();
    assert_eq!(second.failures, 1);
    let last = h.combat.roll_death_save(&wizard.id, Some(1)).unwrap();
    assert_eq!(last.failures, 3);
    assert!(last.is_dead);

    let status = h.combat.status(&wizard.id).unwrap();
    assert_eq!(status.life_state(), LifeState::Dead);
    assert!(status.invariants_hold());
    assert!(matches!(
        h.combat.roll_death_save(&wizard.id, Some(12)),
        Err(RulesError::ParticipantDead(_))
    ));
    assert!(matches!(
        h.combat.heal_damage(&wizard.id, 5),
        Err(RulesError::ParticipantDead(_))
    ));
}

#[test]
fn test_massive_damage_while_down_kills() {
    let h = Harness::new();
    let enc = h.combat.start_encounter("s-1", None).unwrap();
    let wizard = h.combat.add_participant(&enc.id, wizard(10)).unwrap();

    let ko = h
        .combat
        .apply_damage(&wizard.id, 25, DamageType::Bludgeoning, DamageOptions::default(), None)
        .unwrap();
    assert!(ko.knocked_out);
    assert!(!ko.is_dead);

    let finisher = h
        .combat
        .apply_damage(&wizard.id, 18, DamageType::Bludgeoning, DamageOptions::default(), None)
        .unwrap();
    assert!(finisher.massive_damage);
    assert!(finisher.is_dead);

    // Further hits on the dead are no-ops and stay out of the log
    h.combat
        .apply_damage(&wizard.id, 40, DamageType::Fire, DamageOptions::default(), None)
        .unwrap();
    assert_eq!(h.combat.damage_log(&enc.id).unwrap().len(), 2);
}

#[test]
fn test_natural_twenty_and_healing_revive() {
    let h = Harness::new();
    let enc = h.combat.start_encounter("s-1", None).unwrap();
    let wizard = h.combat.add_participant(&enc.id, wizard(10)).unwrap();
    let fighter = h.combat.add_participant(&enc.id, fighter(5)).unwrap();

    for id in [&wizard.id, &fighter.id] {
        h.combat
            .apply_damage(id, 40, DamageType::Slashing, DamageOptions::default(), None)
            .unwrap();
        h.combat.roll_death_save(id, Some(4)).unwrap();
    }

    let nat20 = h.combat.roll_death_save(&wizard.id, Some(20)).unwrap();
    assert!(nat20.revived);
    assert_eq!(nat20.current_hp, 1);
    let status = h.combat.status(&wizard.id).unwrap();
    assert_eq!((status.death_save_successes, status.death_save_failures), (0, 0));

    let healed = h.combat.heal_damage(&fighter.id, 50).unwrap();
    assert!(healed.revived);
    assert_eq!(healed.applied, 30);
    assert_eq!(healed.overheal, 20);
    let status = h.combat.status(&fighter.id).unwrap();
    assert!(status.is_conscious);
    assert_eq!(status.death_save_failures, 0);

    assert!(matches!(
        h.combat.roll_death_save(&fighter.id, Some(5)),
        Err(RulesError::DeathSaveNotAllowed { .. })
    ));
}

#[test]
fn test_temp_hp_absorbs_and_does_not_stack() {
    let h = Harness::new();
    let enc = h.combat.start_encounter("s-1", None).unwrap();
    let fighter = h.combat.add_participant(&enc.id, fighter(10)).unwrap();

    h.combat.set_temp_hp(&fighter.id, 8).unwrap();
    let lower = h.combat.set_temp_hp(&fighter.id, 5).unwrap();
    assert!(!lower.replaced);
    assert_eq!(lower.new_temp_hp, 8);

    let hit = h
        .combat
        .apply_damage(&fighter.id, 12, DamageType::Piercing, DamageOptions::default(), None)
        .unwrap();
    assert_eq!(hit.temp_hp_lost, 8);
    assert_eq!(hit.hp_lost, 4);
    assert_eq!(hit.new_current_hp, 26);
}

#[test]
fn test_ignore_flags_bypass_participant_defences() {
    let h = Harness::new();
    let enc = h.combat.start_encounter("s-1", None).unwrap();
    let elemental = h
        .combat
        .add_participant(
            &enc.id,
            fire_elemental(
                10,
                DamageModifiers::new()
                    .with_immunity(DamageType::Fire)
                    .with_resistance(DamageType::Bludgeoning),
            ),
        )
        .unwrap();

    let options = DamageOptions {
        ignore_resistances: true,
        ignore_immunities: true,
    };
    let fire = h
        .combat
        .apply_damage(&elemental.id, 10, DamageType::Fire, options, Some("Holy flame"))
        .unwrap();
    assert_eq!(fire.modified_amount, 10);
    let blunt = h
        .combat
        .apply_damage(&elemental.id, 10, DamageType::Bludgeoning, DamageOptions::default(), None)
        .unwrap();
    assert_eq!(blunt.modified_amount, 5);
    assert_eq!(h.combat.status(&elemental.id).unwrap().current_hp, 87);
}

#[test]
fn test_encounters_are_isolated() {
    let h = Harness::new();
    let first = h.combat.start_encounter("s-1", Some("Bridge")).unwrap();
    let second = h.combat.start_encounter("s-1", Some("Cave")).unwrap();
    h.combat.add_participant(&first.id, fighter(10)).unwrap();
    h.combat.add_participant(&first.id, goblin("Goblin", 5)).unwrap();
    h.combat.add_participant(&second.id, wizard(12)).unwrap();

    h.combat.advance_turn(&first.id).unwrap();
    h.combat.advance_turn(&first.id).unwrap();

    let cave = h.combat.get_combat_state(&second.id).unwrap();
    assert_eq!(cave.encounter.round, 1);
    assert_eq!(cave.participants.len(), 1);
    assert_eq!(h.combat.list_session_encounters("s-1").unwrap().len(), 2);
}

#[test]
fn test_attacks_stay_inside_their_encounter() {
    let h = Harness::new();
    let bridge = h.combat.start_encounter("s-1", Some("Bridge")).unwrap();
    let cave = h.combat.start_encounter("s-1", Some("Cave")).unwrap();
    let fighter = h.combat.add_participant(&bridge.id, fighter(20)).unwrap();
    let lurker = h.combat.add_participant(&cave.id, goblin("Lurker", 5)).unwrap();

    // Fighter is acting on the bridge but the lurker is in the cave
    let mut swing = longsword_at(&lurker.id, 18, 5);
    swing.attacker_id = Some(fighter.id.clone());
    assert!(matches!(
        h.combat.resolve_attack(&swing),
        Err(RulesError::InvalidInput(_))
    ));

    let mut blast = SpellRequest {
        caster_id: Some(fighter.id.clone()),
        spell: fireball(),
        targets: vec![SpellTarget {
            roll: Some(3),
            ..SpellTarget::new(lurker.id.clone())
        }],
        mode: RollMode::Normal,
    };
    assert!(matches!(
        h.combat.resolve_spell_attack(&blast),
        Err(RulesError::InvalidInput(_))
    ));

    h.combat.end_combat(&cave.id).unwrap();
    swing.attacker_id = None;
    assert!(matches!(
        h.combat.resolve_attack(&swing),
        Err(RulesError::EncounterNotActive { .. })
    ));
    blast.caster_id = None;
    assert!(matches!(
        h.combat.resolve_spell_attack(&blast),
        Err(RulesError::EncounterNotActive { .. })
    ));

    assert_eq!(h.combat.status(&lurker.id).unwrap().current_hp, 7);
    assert!(h.combat.damage_log(&cave.id).unwrap().is_empty());
}

#[test]
fn test_paused_encounter_blocks_attacks() {
    let h = Harness::new();
    let enc = h.combat.start_encounter("s-1", None).unwrap();
    let goblin = h.combat.add_participant(&enc.id, goblin("Goblin", 12)).unwrap();

    h.combat.pause_encounter(&enc.id).unwrap();
    assert!(matches!(
        h.combat.resolve_attack(&longsword_at(&goblin.id, 18, 5)),
        Err(RulesError::EncounterNotActive { .. })
    ));
    h.combat.resume_encounter(&enc.id).unwrap();
    assert!(h.combat.resolve_attack(&longsword_at(&goblin.id, 18, 5)).is_ok());
}
