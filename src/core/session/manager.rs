//! Combat Manager
//!
//! Service layer over [`CombatOps`]: every mutation is one atomic
//! read-modify-write on the affected record, and audit entries are appended
//! only after the write succeeded.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::attack::{
    self, AttackInput, AttackResult, DamageSpec, SpellAttack, SpellResolution, SpellTargetInput,
    SpellTargetOutcome,
};
use super::health::{self, DamageOptions, DamageResult, DeathSaveResult, HealResult, TempHpResult};
use super::initiative::{self, TurnAdvance};
use crate::core::clock::{Clock, SystemClock};
use crate::core::damage::{DamageModifiers, DamageType};
use crate::core::dice::{roll_d20, D20Roll, RandomSource, RollMode, ThreadDice};
use crate::core::error::{RulesError, RulesResult};
use crate::database::{
    CombatOps, DamageLogEntry, EncounterRecord, EncounterStatus, LifeState, ParticipantCategory,
    ParticipantLink, ParticipantRecord, ParticipantStatus,
};

// ============================================================================
// Request / View Types
// ============================================================================

/// Everything needed to put a combatant into an encounter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewParticipant {
    pub link: ParticipantLink,
    pub name: String,
    pub category: ParticipantCategory,
    /// Rolled as d20 + modifier when absent
    #[serde(default)]
    pub initiative: Option<i32>,
    #[serde(default)]
    pub initiative_modifier: i32,
    pub armor_class: i32,
    pub max_hp: i32,
    #[serde(default = "default_speed")]
    pub speed: u32,
    #[serde(default)]
    pub damage_modifiers: DamageModifiers,
}

fn default_speed() -> u32 {
    30
}

impl NewParticipant {
    pub fn new(
        link: ParticipantLink,
        name: impl Into<String>,
        category: ParticipantCategory,
        armor_class: i32,
        max_hp: i32,
    ) -> Self {
        Self {
            link,
            name: name.into(),
            category,
            initiative: None,
            initiative_modifier: 0,
            armor_class,
            max_hp,
            speed: default_speed(),
            damage_modifiers: DamageModifiers::default(),
        }
    }

    pub fn with_initiative(mut self, initiative: i32) -> Self {
        self.initiative = Some(initiative);
        self
    }

    pub fn with_initiative_modifier(mut self, modifier: i32) -> Self {
        self.initiative_modifier = modifier;
        self
    }

    pub fn with_modifiers(mut self, modifiers: DamageModifiers) -> Self {
        self.damage_modifiers = modifiers;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackRequest {
    /// When set, the attack only goes through on this participant's turn
    #[serde(default)]
    pub attacker_id: Option<String>,
    pub target_id: String,
    /// Chosen d20 face; rolled with `mode` when absent
    #[serde(default)]
    pub roll: Option<u32>,
    #[serde(default)]
    pub mode: RollMode,
    pub attack_bonus: i32,
    pub damage: DamageSpec,
    #[serde(default)]
    pub damage_roll: Option<u32>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackOutcome {
    /// Present when the d20 was rolled here
    pub d20: Option<D20Roll>,
    pub result: AttackResult,
}

/// One target of a spell. Rolls left empty are made by the manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpellTarget {
    pub participant_id: String,
    #[serde(default)]
    pub roll: Option<u32>,
    #[serde(default)]
    pub save_bonus: i32,
    #[serde(default)]
    pub damage_roll: Option<u32>,
}

impl SpellTarget {
    pub fn new(participant_id: impl Into<String>) -> Self {
        Self {
            participant_id: participant_id.into(),
            roll: None,
            save_bonus: 0,
            damage_roll: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpellRequest {
    #[serde(default)]
    pub caster_id: Option<String>,
    pub spell: SpellAttack,
    pub targets: Vec<SpellTarget>,
    /// Applies to attack rolls only
    #[serde(default)]
    pub mode: RollMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantView {
    pub participant: ParticipantRecord,
    pub status: ParticipantStatus,
    pub life_state: LifeState,
    pub is_current: bool,
}

/// Snapshot of an encounter with its participants in turn order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatState {
    pub encounter: EncounterRecord,
    pub participants: Vec<ParticipantView>,
}

impl CombatState {
    pub fn current(&self) -> Option<&ParticipantView> {
        self.participants.iter().find(|p| p.is_current)
    }
}

// ============================================================================
// Manager
// ============================================================================

pub struct CombatManager<D: CombatOps> {
    db: Arc<D>,
    dice: Arc<dyn RandomSource>,
    clock: Arc<dyn Clock>,
}

impl<D: CombatOps> CombatManager<D> {
    pub fn new(db: Arc<D>, dice: Arc<dyn RandomSource>, clock: Arc<dyn Clock>) -> Self {
        Self { db, dice, clock }
    }

    /// Thread RNG and wall-clock time
    pub fn with_defaults(db: Arc<D>) -> Self {
        Self::new(db, Arc::new(ThreadDice), Arc::new(SystemClock))
    }

    pub fn database(&self) -> &Arc<D> {
        &self.db
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    fn encounter(&self, id: &str) -> RulesResult<EncounterRecord> {
        self.db
            .get_encounter(id)?
            .ok_or_else(|| RulesError::not_found("Encounter", id))
    }

    pub fn participant(&self, id: &str) -> RulesResult<ParticipantRecord> {
        self.db
            .get_participant(id)?
            .ok_or_else(|| RulesError::not_found("Participant", id))
    }

    pub fn status(&self, participant_id: &str) -> RulesResult<ParticipantStatus> {
        self.db
            .get_status(participant_id)?
            .ok_or_else(|| RulesError::not_found("ParticipantStatus", participant_id))
    }

    pub fn list_session_encounters(&self, session_id: &str) -> RulesResult<Vec<EncounterRecord>> {
        Ok(self.db.list_session_encounters(session_id)?)
    }

    // ------------------------------------------------------------------
    // Encounter lifecycle
    // ------------------------------------------------------------------

    #[instrument(skip(self))]
    pub fn start_encounter(
        &self,
        session_id: &str,
        name: Option<&str>,
    ) -> RulesResult<EncounterRecord> {
        if session_id.trim().is_empty() {
            return Err(RulesError::InvalidInput("session id is empty".into()));
        }

        let encounter = EncounterRecord {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            name: name.map(str::to_string),
            status: EncounterStatus::Active,
            round: 1,
            current_turn: 0,
            order: Vec::new(),
            next_seq: 0,
            started_at: self.clock.now(),
            ended_at: None,
        };
        self.db.save_encounter(&encounter)?;

        info!(encounter_id = %encounter.id, "Combat started");
        Ok(encounter)
    }

    #[instrument(skip(self))]
    pub fn end_combat(&self, encounter_id: &str) -> RulesResult<EncounterRecord> {
        let now = self.clock.now();
        let encounter = self.db.update_encounter(encounter_id, |enc| {
            initiative::end_combat(enc, now)?;
            Ok::<_, RulesError>(enc.clone())
        })?;

        info!(
            encounter_id,
            rounds = encounter.round,
            "Combat ended"
        );
        Ok(encounter)
    }

    pub fn pause_encounter(&self, encounter_id: &str) -> RulesResult<()> {
        self.db
            .update_encounter(encounter_id, |enc| initiative::pause(enc))?;
        info!(encounter_id, "Combat paused");
        Ok(())
    }

    pub fn resume_encounter(&self, encounter_id: &str) -> RulesResult<()> {
        self.db
            .update_encounter(encounter_id, |enc| initiative::resume(enc))?;
        info!(encounter_id, "Combat resumed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Roster
    // ------------------------------------------------------------------

    #[instrument(skip(self, new), fields(name = %new.name))]
    pub fn add_participant(
        &self,
        encounter_id: &str,
        new: NewParticipant,
    ) -> RulesResult<ParticipantRecord> {
        if new.name.trim().is_empty() {
            return Err(RulesError::InvalidInput("participant name is empty".into()));
        }
        if new.max_hp < 1 {
            return Err(RulesError::InvalidInput(format!(
                "max HP must be at least 1, got {}",
                new.max_hp
            )));
        }

        let initiative = match new.initiative {
            Some(value) => value,
            None => (self.dice.roll(20) as i32).saturating_add(new.initiative_modifier),
        };

        let id = Uuid::new_v4().to_string();
        let encounter = self.db.update_encounter(encounter_id, |enc| {
            initiative::insert_participant(enc, &id, initiative)?;
            Ok::<_, RulesError>(enc.clone())
        })?;

        let turn_order = initiative::turn_orders(&encounter)
            .find(|(pid, _)| *pid == id)
            .map(|(_, idx)| idx)
            .unwrap_or_default();

        let participant = ParticipantRecord {
            id: id.clone(),
            encounter_id: encounter_id.to_string(),
            link: new.link,
            name: new.name,
            category: new.category,
            initiative,
            initiative_modifier: new.initiative_modifier,
            turn_order,
            armor_class: new.armor_class,
            max_hp: new.max_hp,
            speed: new.speed,
            damage_modifiers: new.damage_modifiers,
        };
        self.db.save_participant(&participant)?;
        self.db
            .create_status(&ParticipantStatus::new(&id, new.max_hp, self.clock.now()))?;
        self.sync_turn_orders(&encounter)?;

        info!(
            encounter_id,
            participant_id = %id,
            initiative,
            "Participant joined combat"
        );
        Ok(participant)
    }

    #[instrument(skip(self))]
    pub fn remove_participant(&self, participant_id: &str) -> RulesResult<ParticipantRecord> {
        let participant = self.participant(participant_id)?;

        let encounter = self.db.update_encounter(&participant.encounter_id, |enc| {
            initiative::remove_participant(enc, participant_id)?;
            Ok::<_, RulesError>(enc.clone())
        })?;
        self.db.delete_participant(participant_id)?;
        self.db.delete_status(participant_id)?;
        self.sync_turn_orders(&encounter)?;

        info!(participant_id, name = %participant.name, "Participant left combat");
        Ok(participant)
    }

    #[instrument(skip(self))]
    pub fn set_initiative(&self, participant_id: &str, value: i32) -> RulesResult<()> {
        let mut participant = self.participant(participant_id)?;

        let encounter = self.db.update_encounter(&participant.encounter_id, |enc| {
            initiative::set_initiative(enc, participant_id, value)?;
            Ok::<_, RulesError>(enc.clone())
        })?;
        participant.initiative = value;
        self.db.save_participant(&participant)?;
        self.sync_turn_orders(&encounter)?;
        Ok(())
    }

    /// Copy the encounter's order indices onto the participant records
    fn sync_turn_orders(&self, encounter: &EncounterRecord) -> RulesResult<()> {
        for (participant_id, index) in initiative::turn_orders(encounter) {
            if let Some(mut participant) = self.db.get_participant(participant_id)? {
                if participant.turn_order != index {
                    participant.turn_order = index;
                    self.db.save_participant(&participant)?;
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Turns
    // ------------------------------------------------------------------

    #[instrument(skip(self))]
    pub fn advance_turn(&self, encounter_id: &str) -> RulesResult<TurnAdvance> {
        let step = self
            .db
            .update_encounter(encounter_id, |enc| initiative::advance_turn(enc))?;

        if step.new_round {
            info!(encounter_id, round = step.round, "New round");
        }
        debug!(
            encounter_id,
            turn = step.turn,
            current = ?step.current_participant,
            "Turn advanced"
        );
        Ok(step)
    }

    pub fn previous_turn(&self, encounter_id: &str) -> RulesResult<TurnAdvance> {
        self.db
            .update_encounter(encounter_id, |enc| initiative::previous_turn(enc))
    }

    pub fn current_participant(&self, encounter_id: &str) -> RulesResult<Option<ParticipantRecord>> {
        let encounter = self.encounter(encounter_id)?;
        match encounter.current_participant_id() {
            Some(id) => Ok(Some(self.participant(id)?)),
            None => Ok(None),
        }
    }

    /// Fails unless the encounter is active and it is `participant_id`'s turn
    pub fn ensure_turn(&self, encounter_id: &str, participant_id: &str) -> RulesResult<()> {
        let encounter = self.encounter(encounter_id)?;
        initiative::ensure_active(&encounter)?;

        match encounter.current_participant_id() {
            Some(current) if current == participant_id => Ok(()),
            current => {
                let err = RulesError::NotParticipantsTurn {
                    expected: current.unwrap_or("nobody").to_string(),
                    actual: participant_id.to_string(),
                };
                warn!(encounter_id, %err, "Out of turn action rejected");
                Err(err)
            }
        }
    }

    pub fn get_combat_state(&self, encounter_id: &str) -> RulesResult<CombatState> {
        let encounter = self.encounter(encounter_id)?;

        let participants = encounter
            .order
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                let participant = self.participant(&slot.participant_id)?;
                let status = self.status(&slot.participant_id)?;
                Ok(ParticipantView {
                    life_state: status.life_state(),
                    is_current: index == encounter.current_turn,
                    participant,
                    status,
                })
            })
            .collect::<RulesResult<Vec<_>>>()?;

        Ok(CombatState {
            encounter,
            participants,
        })
    }

    pub fn damage_log(&self, encounter_id: &str) -> RulesResult<Vec<DamageLogEntry>> {
        Ok(self.db.list_damage_log(encounter_id)?)
    }

    // ------------------------------------------------------------------
    // HP & status
    // ------------------------------------------------------------------

    #[instrument(skip(self, options))]
    pub fn apply_damage(
        &self,
        participant_id: &str,
        amount: i32,
        damage_type: DamageType,
        options: DamageOptions,
        source: Option<&str>,
    ) -> RulesResult<DamageResult> {
        let participant = self.participant(participant_id)?;
        let now = self.clock.now();

        let (result, was_dead) = self.db.update_status(participant_id, |status| {
            let was_dead = status.is_dead;
            let result = health::apply_damage(
                status,
                &participant.damage_modifiers,
                amount,
                damage_type,
                options,
            )?;
            status.updated_at = now;
            Ok::<_, RulesError>((result, was_dead))
        })?;

        if !was_dead {
            self.record_damage(&participant, &result, damage_type, source)?;
        }
        Ok(result)
    }

    #[instrument(skip(self))]
    pub fn heal_damage(&self, participant_id: &str, amount: i32) -> RulesResult<HealResult> {
        let now = self.clock.now();
        let result = self.db.update_status(participant_id, |status| {
            let result = health::heal_damage(status, amount)?;
            status.updated_at = now;
            Ok::<_, RulesError>(result)
        })?;

        if result.revived {
            info!(participant_id, hp = result.new_current_hp, "Participant revived by healing");
        }
        debug!(
            participant_id,
            applied = result.applied,
            overheal = result.overheal,
            "Healing applied"
        );
        Ok(result)
    }

    pub fn set_temp_hp(&self, participant_id: &str, amount: i32) -> RulesResult<TempHpResult> {
        let now = self.clock.now();
        self.db.update_status(participant_id, |status| {
            let result = health::set_temp_hp(status, amount)?;
            status.updated_at = now;
            Ok(result)
        })
    }

    /// Roll a death save; `roll` overrides the random d20
    #[instrument(skip(self))]
    pub fn roll_death_save(
        &self,
        participant_id: &str,
        roll: Option<u32>,
    ) -> RulesResult<DeathSaveResult> {
        let roll = roll.unwrap_or_else(|| self.dice.roll(20));
        let now = self.clock.now();

        let result = self
            .db
            .update_status(participant_id, |status| {
                let result = health::roll_death_save(status, roll)?;
                status.updated_at = now;
                Ok(result)
            })
            .inspect_err(|err: &RulesError| {
                warn!(participant_id, %err, "Death save rejected");
            })?;

        if result.revived {
            info!(participant_id, "Natural 20 on a death save");
        } else if result.is_dead {
            info!(participant_id, failures = result.failures, "Participant died");
        } else if result.is_stabilized {
            info!(participant_id, "Participant stabilized");
        }
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Attacks
    // ------------------------------------------------------------------

    /// A named actor must be on their turn and share every target's
    /// encounter; each target's encounter must be active
    fn check_engagement(
        &self,
        actor_id: Option<&str>,
        targets: &[ParticipantRecord],
    ) -> RulesResult<()> {
        if let Some(actor_id) = actor_id {
            let actor = self.participant(actor_id)?;
            self.ensure_turn(&actor.encounter_id, actor_id)?;

            if let Some(outsider) = targets.iter().find(|t| t.encounter_id != actor.encounter_id) {
                let err = RulesError::InvalidInput(format!(
                    "{} is not in {}'s encounter",
                    outsider.name, actor.name
                ));
                warn!(actor_id, target_id = %outsider.id, %err, "Cross-encounter action rejected");
                return Err(err);
            }
        }

        let mut checked: Vec<&str> = Vec::new();
        for target in targets {
            if !checked.contains(&target.encounter_id.as_str()) {
                initiative::ensure_active(&self.encounter(&target.encounter_id)?)?;
                checked.push(&target.encounter_id);
            }
        }
        Ok(())
    }

    #[instrument(skip(self, request), fields(target = %request.target_id))]
    pub fn resolve_attack(&self, request: &AttackRequest) -> RulesResult<AttackOutcome> {
        let target = self.participant(&request.target_id)?;
        self.check_engagement(request.attacker_id.as_deref(), std::slice::from_ref(&target))?;

        let (roll, d20) = match request.roll {
            Some(roll) => (roll, None),
            None => {
                let d20 = roll_d20(self.dice.as_ref(), request.mode);
                (d20.chosen, Some(d20))
            }
        };

        let input = AttackInput {
            roll,
            attack_bonus: request.attack_bonus,
            damage: request.damage.clone(),
            damage_roll: request.damage_roll,
        };
        let now = self.clock.now();
        let dice = self.dice.as_ref();

        let (result, was_dead) = self.db.update_status(&target.id, |status| {
            let was_dead = status.is_dead;
            let result = attack::resolve_attack(
                status,
                target.armor_class,
                &target.damage_modifiers,
                &input,
                dice,
            )?;
            status.updated_at = now;
            Ok::<_, RulesError>((result, was_dead))
        })?;

        debug!(
            roll,
            total = result.hit.total,
            hit = result.hit.is_hit,
            critical = result.hit.is_critical,
            "Attack resolved"
        );
        if let (Some(applied), Some(damage)) = (&result.applied, &result.damage) {
            if !was_dead {
                self.record_damage(
                    &target,
                    applied,
                    damage.damage_type,
                    request.source.as_deref(),
                )?;
            }
        }

        Ok(AttackOutcome { d20, result })
    }

    /// Resolve a spell against every target.
    ///
    /// All rolls and damage are worked out before any status is written, so
    /// invalid input for one target leaves every target untouched.
    #[instrument(skip(self, request), fields(spell = %request.spell.name, targets = request.targets.len()))]
    pub fn resolve_spell_attack(&self, request: &SpellRequest) -> RulesResult<Vec<SpellTargetOutcome>> {
        let records = request
            .targets
            .iter()
            .map(|t| self.participant(&t.participant_id))
            .collect::<RulesResult<Vec<_>>>()?;
        self.check_engagement(request.caster_id.as_deref(), &records)?;

        let inputs: Vec<SpellTargetInput> = request
            .targets
            .iter()
            .zip(&records)
            .map(|(target, record)| {
                let roll = target.roll.unwrap_or_else(|| match request.spell.resolution {
                    SpellResolution::AttackRoll { .. } => {
                        roll_d20(self.dice.as_ref(), request.mode).chosen
                    }
                    SpellResolution::SavingThrow { .. } => self.dice.roll(20),
                });
                SpellTargetInput {
                    participant_id: record.id.clone(),
                    roll,
                    save_bonus: target.save_bonus,
                    armor_class: record.armor_class,
                    modifiers: record.damage_modifiers.clone(),
                    damage_roll: target.damage_roll,
                }
            })
            .collect();

        let mut outcomes = attack::plan_spell_attack(&request.spell, &inputs, self.dice.as_ref())?;
        let damage_type = request.spell.damage.damage_type;
        let now = self.clock.now();

        for (outcome, record) in outcomes.iter_mut().zip(&records) {
            let was_dead = self.db.update_status(&record.id, |status| {
                let was_dead = status.is_dead;
                attack::apply_spell_outcome(status, damage_type, outcome)?;
                status.updated_at = now;
                Ok::<_, RulesError>(was_dead)
            })?;

            if let Some(applied) = &outcome.applied {
                if !was_dead {
                    self.record_damage(record, applied, damage_type, Some(&request.spell.name))?;
                }
            }
        }

        Ok(outcomes)
    }

    /// Log the lifecycle transitions of one damage application and append
    /// its audit entry
    fn record_damage(
        &self,
        participant: &ParticipantRecord,
        result: &DamageResult,
        damage_type: DamageType,
        source: Option<&str>,
    ) -> RulesResult<()> {
        debug!(
            participant_id = %participant.id,
            original = result.original_amount,
            effective = result.modified_amount,
            temp_hp_lost = result.temp_hp_lost,
            hp_lost = result.hp_lost,
            damage_type = %damage_type,
            "Damage applied"
        );
        if result.massive_damage {
            info!(participant_id = %participant.id, "Massive damage: participant killed outright");
        } else if result.knocked_out {
            info!(participant_id = %participant.id, name = %participant.name, "Participant dropped to 0 HP");
        }

        if result.modified_amount == 0 {
            return Ok(());
        }

        let round = self
            .db
            .get_encounter(&participant.encounter_id)?
            .map_or(1, |enc| enc.round);

        self.db.append_damage_log(&DamageLogEntry {
            id: Uuid::new_v4().to_string(),
            encounter_id: participant.encounter_id.clone(),
            participant_id: participant.id.clone(),
            round,
            amount: result.modified_amount,
            damage_type,
            source: source.map(str::to_string),
            created_at: self.clock.now(),
        })?;
        Ok(())
    }
}
