//! Combat session rules
//!
//! - [`health`]: HP, temporary HP, and death saves
//! - [`attack`]: hit checks, damage, and spells
//! - [`initiative`]: turn order and round tracking
//! - [`manager`]: [`CombatManager`], the storage-backed service

pub mod attack;
pub mod health;
pub mod initiative;
pub mod manager;

pub use attack::{
    calculate_damage, check_hit, check_save, plan_spell_attack, resolve_attack,
    resolve_spell_attack, AttackInput, AttackResult, DamageCalculation, DamageSpec, HitCheck,
    RawDamage, SaveCheck, SpellAttack, SpellResolution, SpellTargetInput, SpellTargetOutcome,
};
pub use health::{
    apply_damage, heal_damage, roll_death_save, set_temp_hp, DamageOptions, DamageResult,
    DeathSaveOutcome, DeathSaveResult, HealResult, TempHpResult,
};
pub use initiative::TurnAdvance;
pub use manager::{
    AttackOutcome, AttackRequest, CombatManager, CombatState, NewParticipant, ParticipantView,
    SpellRequest, SpellTarget,
};
