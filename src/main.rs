use std::sync::Arc;

use serde::Serialize;
use ttrpg_rules::core::damage::{DamageModifiers, DamageType};
use ttrpg_rules::core::dice::{RandomSource, RollMode, SeededDice, ThreadDice};
use ttrpg_rules::core::resources::{LongRestRequest, NewCharacter, ShortRestRequest};
use ttrpg_rules::core::session::{
    AttackRequest, DamageOptions, DamageSpec, NewParticipant, SpellAttack, SpellRequest,
    SpellResolution, SpellTarget,
};
use ttrpg_rules::database::{
    ClassFeature, ClassLevel, ParticipantCategory, ParticipantLink, RestScope,
};
use ttrpg_rules::{CombatManager, Database, ResourceManager, RulesConfig, SystemClock};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = RulesConfig::load();
    let _log_guard = ttrpg_rules::core::logging::init(&config.logging);
    tracing::info!("{} v{} starting", ttrpg_rules::NAME, ttrpg_rules::VERSION);

    let dice: Arc<dyn RandomSource> = match config.dice.seed {
        Some(seed) => Arc::new(SeededDice::new(seed)),
        None => Arc::new(ThreadDice),
    };
    let clock = Arc::new(SystemClock);
    let db = Arc::new(Database::new());

    let combat = CombatManager::new(db.clone(), dice.clone(), clock.clone());
    let resources = ResourceManager::new(db, dice, clock, config.rest.clone());

    run_skirmish(&combat)?;
    run_downtime(&resources)?;

    tracing::info!("Demo finished");
    Ok(())
}

fn print_json<T: Serialize>(label: &str, value: &T) -> Result<(), serde_json::Error> {
    println!("== {label} ==\n{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// A short fight: one fighter, one wizard, two goblins
fn run_skirmish(combat: &CombatManager<Database>) -> Result<(), Box<dyn std::error::Error>> {
    let encounter = combat.start_encounter("demo-session", Some("Goblin ambush"))?;

    let fighter = combat.add_participant(
        &encounter.id,
        NewParticipant::new(
            ParticipantLink::Character("thorin".into()),
            "Thorin",
            ParticipantCategory::Player,
            18,
            28,
        )
        .with_initiative_modifier(1),
    )?;
    let wizard = combat.add_participant(
        &encounter.id,
        NewParticipant::new(
            ParticipantLink::Character("elara".into()),
            "Elara",
            ParticipantCategory::Player,
            12,
            16,
        )
        .with_initiative(15),
    )?;
    let mut goblins = Vec::new();
    for name in ["Goblin 1", "Goblin 2"] {
        goblins.push(combat.add_participant(
            &encounter.id,
            NewParticipant::new(
                ParticipantLink::Npc("goblin".into()),
                name,
                ParticipantCategory::Enemy,
                15,
                7,
            )
            .with_initiative_modifier(2)
            .with_modifiers(DamageModifiers::new().with_vulnerability(DamageType::Radiant)),
        )?);
    }

    let attack = combat.resolve_attack(&AttackRequest {
        attacker_id: None,
        target_id: goblins[0].id.clone(),
        roll: None,
        mode: RollMode::Advantage,
        attack_bonus: 5,
        damage: DamageSpec::parse("1d8+3", DamageType::Slashing)?,
        damage_roll: None,
        source: Some(fighter.name.clone()),
    })?;
    print_json("Longsword attack", &attack)?;

    let burning_hands = SpellRequest {
        caster_id: None,
        spell: SpellAttack {
            name: "Burning Hands".into(),
            damage: DamageSpec::parse("3d6", DamageType::Fire)?,
            resolution: SpellResolution::SavingThrow {
                dc: 13,
                half_on_success: true,
            },
            damage_roll: None,
        },
        targets: goblins
            .iter()
            .map(|g| SpellTarget {
                save_bonus: 2,
                ..SpellTarget::new(g.id.clone())
            })
            .collect(),
        mode: RollMode::Normal,
    };
    print_json("Burning Hands", &combat.resolve_spell_attack(&burning_hands)?)?;

    // The wizard gets caught out and drops
    let hit = combat.apply_damage(
        &wizard.id,
        20,
        DamageType::Piercing,
        DamageOptions::default(),
        Some("Goblin ambush"),
    )?;
    print_json("Elara is hit", &hit)?;
    for roll in [8, 14] {
        print_json("Death save", &combat.roll_death_save(&wizard.id, Some(roll))?)?;
    }
    print_json("Healing word", &combat.heal_damage(&wizard.id, 6)?)?;

    for _ in 0..4 {
        combat.advance_turn(&encounter.id)?;
    }
    print_json("Combat state", &combat.get_combat_state(&encounter.id)?)?;
    print_json("Damage log", &combat.damage_log(&encounter.id)?)?;

    combat.end_combat(&encounter.id)?;
    Ok(())
}

/// Spell slots and rests for a fighter/wizard multiclass
fn run_downtime(resources: &ResourceManager<Database>) -> Result<(), Box<dyn std::error::Error>> {
    let sheet = resources.register_character(NewCharacter {
        id: Some("elara".into()),
        name: "Elara".into(),
        max_hp: 38,
        constitution_modifier: 2,
        class_levels: vec![ClassLevel::new("Wizard", 5), ClassLevel::new("Fighter", 2)],
        features: vec![
            ClassFeature::new("Action Surge", 1, RestScope::ShortRest),
            ClassFeature::new("Arcane Recovery", 1, RestScope::LongRest),
        ],
    })?;
    print_json("Registered", &sheet)?;

    print_json("Magic Missile at 3rd", &resources.use_spell_slot("elara", 1, 3)?)?;
    resources.use_feature("elara", "Action Surge")?;
    print_json("Spend hit dice", &resources.spend_hit_dice("elara", 1, &[])?)?;

    let short = resources.take_short_rest(
        "elara",
        &ShortRestRequest {
            session_id: Some("demo-session".into()),
            hit_dice: 1,
            ..Default::default()
        },
    )?;
    print_json("Short rest", &short)?;

    let long = resources.take_long_rest(
        "elara",
        &LongRestRequest {
            session_id: Some("demo-session".into()),
            notes: Some("Camp at the ruined shrine".into()),
        },
    )?;
    print_json("Long rest", &long)?;
    print_json("Rest history", &resources.get_rest_history("elara", None)?)?;
    Ok(())
}
