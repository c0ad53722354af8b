//! Character resource database operations
//!
//! CRUD for character sheets, spell-slot pools, hit-dice pools, and the
//! append-only rest history.

use super::error::{StorageError, StorageResult};
use super::models::{CharacterSheet, HitDicePools, RestEvent, SpellSlotPool};
use super::Database;

/// Extension trait for character resource operations
pub trait ResourceOps: Send + Sync {
    fn create_character(&self, character: &CharacterSheet) -> StorageResult<()>;
    fn get_character(&self, id: &str) -> StorageResult<Option<CharacterSheet>>;
    fn update_character<R, E, F>(&self, id: &str, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut CharacterSheet) -> Result<R, E>,
        E: From<StorageError>;
    fn delete_character(&self, id: &str) -> StorageResult<()>;

    fn save_spell_slots(&self, pool: &SpellSlotPool) -> StorageResult<()>;
    fn get_spell_slots(&self, character_id: &str) -> StorageResult<Option<SpellSlotPool>>;
    fn update_spell_slots<R, E, F>(&self, character_id: &str, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut SpellSlotPool) -> Result<R, E>,
        E: From<StorageError>;

    fn save_hit_dice(&self, pools: &HitDicePools) -> StorageResult<()>;
    fn get_hit_dice(&self, character_id: &str) -> StorageResult<Option<HitDicePools>>;
    fn update_hit_dice<R, E, F>(&self, character_id: &str, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut HitDicePools) -> Result<R, E>,
        E: From<StorageError>;

    fn append_rest_event(&self, event: &RestEvent) -> StorageResult<()>;
    fn list_rest_events(
        &self,
        character_id: &str,
        session_id: Option<&str>,
    ) -> StorageResult<Vec<RestEvent>>;
}

impl ResourceOps for Database {
    fn create_character(&self, character: &CharacterSheet) -> StorageResult<()> {
        self.characters.insert(&character.id, character.clone())
    }

    fn get_character(&self, id: &str) -> StorageResult<Option<CharacterSheet>> {
        self.characters.get(id)
    }

    fn update_character<R, E, F>(&self, id: &str, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut CharacterSheet) -> Result<R, E>,
        E: From<StorageError>,
    {
        self.characters.update(id, f)
    }

    fn delete_character(&self, id: &str) -> StorageResult<()> {
        self.characters.remove(id)?;
        self.spell_slots.remove(id)?;
        self.hit_dice.remove(id)?;
        Ok(())
    }

    fn save_spell_slots(&self, pool: &SpellSlotPool) -> StorageResult<()> {
        self.spell_slots.upsert(&pool.character_id, pool.clone())
    }

    fn get_spell_slots(&self, character_id: &str) -> StorageResult<Option<SpellSlotPool>> {
        self.spell_slots.get(character_id)
    }

    fn update_spell_slots<R, E, F>(&self, character_id: &str, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut SpellSlotPool) -> Result<R, E>,
        E: From<StorageError>,
    {
        self.spell_slots.update(character_id, f)
    }

    fn save_hit_dice(&self, pools: &HitDicePools) -> StorageResult<()> {
        self.hit_dice.upsert(&pools.character_id, pools.clone())
    }

    fn get_hit_dice(&self, character_id: &str) -> StorageResult<Option<HitDicePools>> {
        self.hit_dice.get(character_id)
    }

    fn update_hit_dice<R, E, F>(&self, character_id: &str, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut HitDicePools) -> Result<R, E>,
        E: From<StorageError>,
    {
        self.hit_dice.update(character_id, f)
    }

    fn append_rest_event(&self, event: &RestEvent) -> StorageResult<()> {
        self.rest_events.append(event.clone())
    }

    fn list_rest_events(
        &self,
        character_id: &str,
        session_id: Option<&str>,
    ) -> StorageResult<Vec<RestEvent>> {
        let mut events = self.rest_events.query(|e| {
            e.character_id == character_id
                && session_id.map_or(true, |sid| e.session_id.as_deref() == Some(sid))
        })?;
        events.reverse();
        Ok(events)
    }
}
