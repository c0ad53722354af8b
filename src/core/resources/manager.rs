//! Resource Manager
//!
//! Storage-backed service for character resources. Operations that touch
//! several records nest their updates (character, then spell slots, then
//! hit dice) so a rest either commits to all three or to none.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::hit_dice::{self, HitDiceSpend};
use super::rest::{self, LongRestRequest, LongRestResult, RestConfig, ShortRestRequest, ShortRestResult};
use super::spell_slots::{self, RestoredSlots, SlotUsage};
use crate::core::clock::{Clock, SystemClock};
use crate::core::dice::{RandomSource, ThreadDice};
use crate::core::error::{RulesError, RulesResult};
use crate::database::{
    CharacterSheet, ClassFeature, ClassLevel, HitDicePools, RestEvent, ResourceOps, SpellSlotPool,
};

/// Input for [`ResourceManager::register_character`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCharacter {
    /// Generated when absent
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub max_hp: i32,
    #[serde(default)]
    pub constitution_modifier: i32,
    pub class_levels: Vec<ClassLevel>,
    #[serde(default)]
    pub features: Vec<ClassFeature>,
}

/// A character with every pool it owns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterResources {
    pub character: CharacterSheet,
    pub spell_slots: SpellSlotPool,
    pub hit_dice: HitDicePools,
}

pub struct ResourceManager<D: ResourceOps> {
    db: Arc<D>,
    dice: Arc<dyn RandomSource>,
    clock: Arc<dyn Clock>,
    config: RestConfig,
}

impl<D: ResourceOps> ResourceManager<D> {
    pub fn new(
        db: Arc<D>,
        dice: Arc<dyn RandomSource>,
        clock: Arc<dyn Clock>,
        config: RestConfig,
    ) -> Self {
        Self {
            db,
            dice,
            clock,
            config,
        }
    }

    pub fn with_defaults(db: Arc<D>) -> Self {
        Self::new(
            db,
            Arc::new(ThreadDice),
            Arc::new(SystemClock),
            RestConfig::default(),
        )
    }

    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Characters
    // ------------------------------------------------------------------

    #[instrument(skip(self, new), fields(name = %new.name))]
    pub fn register_character(&self, new: NewCharacter) -> RulesResult<CharacterResources> {
        if new.name.trim().is_empty() {
            return Err(RulesError::InvalidInput("character name is empty".into()));
        }
        if new.max_hp < 1 {
            return Err(RulesError::InvalidInput(format!(
                "max HP must be at least 1, got {}",
                new.max_hp
            )));
        }
        if new.class_levels.is_empty() {
            return Err(RulesError::InvalidInput("character has no class levels".into()));
        }

        let now = self.clock.now();
        let id = new.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        // Validate every class before writing anything
        let spell_slots = spell_slots::build_pool(&id, &new.class_levels, now)?;
        let hit_dice = hit_dice::build_pools(&id, &new.class_levels, now)?;

        let character = CharacterSheet {
            id: id.clone(),
            name: new.name,
            current_hp: new.max_hp,
            max_hp: new.max_hp,
            temp_hp: 0,
            constitution_modifier: new.constitution_modifier,
            class_levels: new.class_levels,
            features: new.features,
            last_long_rest_at: None,
            created_at: now,
            updated_at: now,
        };

        self.db.create_character(&character)?;
        self.db.save_spell_slots(&spell_slots)?;
        self.db.save_hit_dice(&hit_dice)?;

        info!(
            character_id = %id,
            level = character.character_level(),
            hit_dice = hit_dice.total(),
            "Character registered"
        );
        Ok(CharacterResources {
            character,
            spell_slots,
            hit_dice,
        })
    }

    pub fn get_character(&self, character_id: &str) -> RulesResult<CharacterResources> {
        let character = self
            .db
            .get_character(character_id)?
            .ok_or_else(|| RulesError::not_found("Character", character_id))?;
        let spell_slots = self
            .db
            .get_spell_slots(character_id)?
            .ok_or_else(|| RulesError::not_found("SpellSlotPool", character_id))?;
        let hit_dice = self
            .db
            .get_hit_dice(character_id)?
            .ok_or_else(|| RulesError::not_found("HitDicePool", character_id))?;
        Ok(CharacterResources {
            character,
            spell_slots,
            hit_dice,
        })
    }

    pub fn remove_character(&self, character_id: &str) -> RulesResult<()> {
        self.db.delete_character(character_id)?;
        info!(character_id, "Character removed");
        Ok(())
    }

    /// Replace class levels and recompute both pools, keeping used counts
    #[instrument(skip(self, class_levels))]
    pub fn set_class_levels(
        &self,
        character_id: &str,
        class_levels: Vec<ClassLevel>,
    ) -> RulesResult<CharacterResources> {
        if class_levels.is_empty() {
            return Err(RulesError::InvalidInput("character has no class levels".into()));
        }
        let now = self.clock.now();

        let resources = self.db.update_character(character_id, |character| {
            let (spell_slots, hit_dice) =
                self.db.update_spell_slots(character_id, |slots| {
                    let rebuilt = spell_slots::rebuild_pool(slots, &class_levels, now)?;
                    let dice = self.db.update_hit_dice(character_id, |pools| {
                        *pools = hit_dice::rebuild_pools(pools, &class_levels, now)?;
                        Ok::<_, RulesError>(pools.clone())
                    })?;
                    *slots = rebuilt;
                    Ok::<_, RulesError>((slots.clone(), dice))
                })?;

            character.class_levels = class_levels.clone();
            character.updated_at = now;
            Ok::<_, RulesError>(CharacterResources {
                character: character.clone(),
                spell_slots,
                hit_dice,
            })
        })?;

        info!(
            character_id,
            level = resources.character.character_level(),
            "Class levels changed"
        );
        Ok(resources)
    }

    #[instrument(skip(self))]
    pub fn use_feature(&self, character_id: &str, feature: &str) -> RulesResult<u32> {
        let now = self.clock.now();
        let remaining = self
            .db
            .update_character(character_id, |character| {
                let remaining = rest::use_feature(character, feature)?;
                character.updated_at = now;
                Ok(remaining)
            })
            .inspect_err(|err: &RulesError| warn!(character_id, %err, "Feature use rejected"))?;
        debug!(character_id, feature, remaining, "Feature used");
        Ok(remaining)
    }

    // ------------------------------------------------------------------
    // Spell slots
    // ------------------------------------------------------------------

    pub fn calculate_spell_slots(
        &self,
        class_name: &str,
        level: u32,
    ) -> RulesResult<spell_slots::SlotTable> {
        spell_slots::calculate_spell_slots(class_name, level)
    }

    pub fn calculate_multiclass_spell_slots(
        &self,
        classes: &[ClassLevel],
    ) -> RulesResult<spell_slots::MulticlassSlots> {
        spell_slots::calculate_multiclass_spell_slots(classes)
    }

    pub fn get_spell_slots(&self, character_id: &str) -> RulesResult<SpellSlotPool> {
        self.db
            .get_spell_slots(character_id)?
            .ok_or_else(|| RulesError::not_found("SpellSlotPool", character_id))
    }

    /// Spend a standard slot of `slot_level` for a `spell_level` spell
    #[instrument(skip(self))]
    pub fn use_spell_slot(
        &self,
        character_id: &str,
        spell_level: u8,
        slot_level: u8,
    ) -> RulesResult<SlotUsage> {
        let now = self.clock.now();
        let usage = self
            .db
            .update_spell_slots(character_id, |pool| {
                spell_slots::use_spell_slot(pool, spell_level, slot_level, now)
            })
            .inspect_err(|err: &RulesError| warn!(character_id, %err, "Spell slot use rejected"))?;

        debug!(
            character_id,
            spell_level,
            slot_level,
            remaining = usage.remaining,
            "Spell slot used"
        );
        Ok(usage)
    }

    #[instrument(skip(self))]
    pub fn use_pact_slot(&self, character_id: &str, spell_level: u8) -> RulesResult<SlotUsage> {
        let now = self.clock.now();
        let usage = self
            .db
            .update_spell_slots(character_id, |pool| {
                spell_slots::use_pact_slot(pool, spell_level, now)
            })
            .inspect_err(|err: &RulesError| warn!(character_id, %err, "Pact slot use rejected"))?;
        debug!(character_id, slot_level = usage.slot_level, remaining = usage.remaining, "Pact slot used");
        Ok(usage)
    }

    /// Restore the given levels, or all slots (pact included) when `None`
    pub fn restore_spell_slots(
        &self,
        character_id: &str,
        levels: Option<&[u8]>,
    ) -> RulesResult<RestoredSlots> {
        let now = self.clock.now();
        let restored = self.db.update_spell_slots(character_id, |pool| {
            spell_slots::restore_spell_slots(pool, levels, now)
        })?;
        debug!(character_id, levels = ?restored.levels, pact = restored.pact, "Spell slots restored");
        Ok(restored)
    }

    // ------------------------------------------------------------------
    // Hit dice
    // ------------------------------------------------------------------

    pub fn get_hit_dice(&self, character_id: &str) -> RulesResult<HitDicePools> {
        self.db
            .get_hit_dice(character_id)?
            .ok_or_else(|| RulesError::not_found("HitDicePool", character_id))
    }

    /// Spend hit dice outside a rest: heals the character, capped at max HP
    #[instrument(skip(self, rolls))]
    pub fn spend_hit_dice(
        &self,
        character_id: &str,
        count: u32,
        rolls: &[u32],
    ) -> RulesResult<HitDiceSpend> {
        let now = self.clock.now();
        let dice = self.dice.as_ref();

        let spend = self.db.update_character(character_id, |character| {
            let spend = self.db.update_hit_dice(character_id, |pools| {
                hit_dice::spend_hit_dice(
                    pools,
                    count,
                    character.constitution_modifier,
                    rolls,
                    dice,
                    now,
                )
            })?;
            let healed = spend
                .total_healing
                .min(character.max_hp - character.current_hp)
                .max(0);
            character.current_hp += healed;
            character.updated_at = now;
            Ok::<_, RulesError>(spend)
        })?;

        debug!(
            character_id,
            spent = spend.spent(),
            healing = spend.total_healing,
            "Hit dice spent"
        );
        Ok(spend)
    }

    /// Long-rest hit die recovery on its own; returns dice restored
    pub fn restore_hit_dice(&self, character_id: &str) -> RulesResult<u32> {
        let now = self.clock.now();
        let restored = self.db.update_hit_dice(character_id, |pools| {
            Ok::<_, RulesError>(hit_dice::restore_hit_dice(pools, now))
        })?;
        debug!(character_id, restored, "Hit dice restored");
        Ok(restored)
    }

    // ------------------------------------------------------------------
    // Rests
    // ------------------------------------------------------------------

    #[instrument(skip(self, request))]
    pub fn take_short_rest(
        &self,
        character_id: &str,
        request: &ShortRestRequest,
    ) -> RulesResult<ShortRestResult> {
        let now = self.clock.now();
        let dice = self.dice.as_ref();

        let result = self.db.update_character(character_id, |character| {
            self.db.update_hit_dice(character_id, |pools| {
                rest::take_short_rest(character, pools, request, dice, now)
            })
        })?;
        self.db.append_rest_event(&result.event)?;

        info!(
            character_id,
            hit_dice = result.event.hit_dice_spent,
            hp = result.hp_restored,
            "Short rest taken"
        );
        Ok(result)
    }

    #[instrument(skip(self, request))]
    pub fn take_long_rest(
        &self,
        character_id: &str,
        request: &LongRestRequest,
    ) -> RulesResult<LongRestResult> {
        let now = self.clock.now();
        let config = &self.config;

        let result = self
            .db
            .update_character(character_id, |character| {
                self.db.update_spell_slots(character_id, |slots| {
                    self.db.update_hit_dice(character_id, |pools| {
                        rest::take_long_rest(character, slots, pools, request, config, now)
                    })
                })
            })
            .inspect_err(|err: &RulesError| warn!(character_id, %err, "Long rest rejected"))?;
        self.db.append_rest_event(&result.event)?;

        info!(
            character_id,
            hp = result.hp_restored,
            hit_dice = result.hit_dice_restored,
            "Long rest taken"
        );
        Ok(result)
    }

    /// Rest events for a character, newest first, optionally for one session
    pub fn get_rest_history(
        &self,
        character_id: &str,
        session_id: Option<&str>,
    ) -> RulesResult<Vec<RestEvent>> {
        Ok(self.db.list_rest_events(character_id, session_id)?)
    }
}
