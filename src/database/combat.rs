//! Combat state database operations
//!
//! This module provides CRUD operations for encounters, participants, their
//! status records, and the damage log.

use super::error::{StorageError, StorageResult};
use super::models::{DamageLogEntry, EncounterRecord, ParticipantRecord, ParticipantStatus};
use super::Database;

/// Extension trait for combat-related database operations
pub trait CombatOps: Send + Sync {
    fn save_encounter(&self, encounter: &EncounterRecord) -> StorageResult<()>;
    fn get_encounter(&self, id: &str) -> StorageResult<Option<EncounterRecord>>;
    fn list_session_encounters(&self, session_id: &str) -> StorageResult<Vec<EncounterRecord>>;
    fn update_encounter<R, E, F>(&self, id: &str, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut EncounterRecord) -> Result<R, E>,
        E: From<StorageError>;

    fn save_participant(&self, participant: &ParticipantRecord) -> StorageResult<()>;
    fn get_participant(&self, id: &str) -> StorageResult<Option<ParticipantRecord>>;
    fn delete_participant(&self, id: &str) -> StorageResult<()>;

    fn create_status(&self, status: &ParticipantStatus) -> StorageResult<()>;
    fn get_status(&self, participant_id: &str) -> StorageResult<Option<ParticipantStatus>>;
    fn update_status<R, E, F>(&self, participant_id: &str, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut ParticipantStatus) -> Result<R, E>,
        E: From<StorageError>;
    fn delete_status(&self, participant_id: &str) -> StorageResult<()>;

    fn append_damage_log(&self, entry: &DamageLogEntry) -> StorageResult<()>;
    fn list_damage_log(&self, encounter_id: &str) -> StorageResult<Vec<DamageLogEntry>>;
}

impl CombatOps for Database {
    fn save_encounter(&self, encounter: &EncounterRecord) -> StorageResult<()> {
        self.encounters.upsert(&encounter.id, encounter.clone())
    }

    fn get_encounter(&self, id: &str) -> StorageResult<Option<EncounterRecord>> {
        self.encounters.get(id)
    }

    fn list_session_encounters(&self, session_id: &str) -> StorageResult<Vec<EncounterRecord>> {
        let mut encounters = self.encounters.list(|e| e.session_id == session_id)?;
        encounters.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(encounters)
    }

    fn update_encounter<R, E, F>(&self, id: &str, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut EncounterRecord) -> Result<R, E>,
        E: From<StorageError>,
    {
        self.encounters.update(id, f)
    }

    fn save_participant(&self, participant: &ParticipantRecord) -> StorageResult<()> {
        self.participants.upsert(&participant.id, participant.clone())
    }

    fn get_participant(&self, id: &str) -> StorageResult<Option<ParticipantRecord>> {
        self.participants.get(id)
    }

    fn delete_participant(&self, id: &str) -> StorageResult<()> {
        self.participants.remove(id)?;
        Ok(())
    }

    fn create_status(&self, status: &ParticipantStatus) -> StorageResult<()> {
        self.statuses.insert(&status.participant_id, status.clone())
    }

    fn get_status(&self, participant_id: &str) -> StorageResult<Option<ParticipantStatus>> {
        self.statuses.get(participant_id)
    }

    fn update_status<R, E, F>(&self, participant_id: &str, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut ParticipantStatus) -> Result<R, E>,
        E: From<StorageError>,
    {
        self.statuses.update(participant_id, f)
    }

    fn delete_status(&self, participant_id: &str) -> StorageResult<()> {
        self.statuses.remove(participant_id)?;
        Ok(())
    }

    fn append_damage_log(&self, entry: &DamageLogEntry) -> StorageResult<()> {
        self.damage_log.append(entry.clone())
    }

    fn list_damage_log(&self, encounter_id: &str) -> StorageResult<Vec<DamageLogEntry>> {
        self.damage_log.query(|e| e.encounter_id == encounter_id)
    }
}
