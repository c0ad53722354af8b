//! Per-character resources: spell slots, hit dice, class features, rests.

pub mod hit_dice;
pub mod manager;
pub mod rest;
pub mod spell_slots;

pub use hit_dice::{hit_die, restore_hit_dice, spend_hit_dice, HitDiceSpend, HitDieRoll};
pub use manager::{CharacterResources, NewCharacter, ResourceManager};
pub use rest::{
    take_long_rest, take_short_rest, LongRestRequest, LongRestResult, RestConfig,
    ShortRestRequest, ShortRestResult,
};
pub use spell_slots::{
    calculate_multiclass_spell_slots, calculate_spell_slots, caster_type, restore_spell_slots,
    use_pact_slot, use_spell_slot, validate_slot_level, CasterType, MulticlassSlots, PactTable,
    RestoredSlots, SlotTable, SlotUsage,
};
