//! Initiative/Turn Manager
//!
//! Ordering and round/turn bookkeeping on an [`EncounterRecord`]. The
//! record's `order` is kept sorted by descending initiative, ties broken by
//! the order participants joined.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::{RulesError, RulesResult};
use crate::database::{EncounterRecord, EncounterStatus, InitiativeSlot};

// ============================================================================
// Status Checks
// ============================================================================

fn not_active(encounter: &EncounterRecord) -> RulesError {
    RulesError::EncounterNotActive {
        id: encounter.id.clone(),
        status: encounter.status.as_str().to_string(),
    }
}

/// Turn operations only run on an active encounter
pub fn ensure_active(encounter: &EncounterRecord) -> RulesResult<()> {
    match encounter.status {
        EncounterStatus::Active => Ok(()),
        _ => Err(not_active(encounter)),
    }
}

/// Roster changes are allowed while paused, not after the end
pub fn ensure_open(encounter: &EncounterRecord) -> RulesResult<()> {
    match encounter.status {
        EncounterStatus::Completed => Err(not_active(encounter)),
        _ => Ok(()),
    }
}

// ============================================================================
// Ordering
// ============================================================================

fn sort_order(order: &mut [InitiativeSlot]) {
    order.sort_by(|a, b| b.initiative.cmp(&a.initiative).then(a.seq.cmp(&b.seq)));
}

/// Turns have started once the pointer has left round 1, turn 0
fn turns_started(encounter: &EncounterRecord) -> bool {
    encounter.round > 1 || encounter.current_turn > 0
}

/// Re-sort and keep whoever was acting as the current participant. Before
/// the first advance the top of the order is always the one to act.
fn resort_keeping_current(encounter: &mut EncounterRecord) {
    let acting = turns_started(encounter)
        .then(|| encounter.current_participant_id().map(str::to_string))
        .flatten();
    sort_order(&mut encounter.order);
    if let Some(acting) = acting {
        if let Some(pos) = position(encounter, &acting) {
            encounter.current_turn = pos;
        }
    }
}

fn position(encounter: &EncounterRecord, participant_id: &str) -> Option<usize> {
    encounter
        .order
        .iter()
        .position(|slot| slot.participant_id == participant_id)
}

/// Add a participant to the order; returns its index
pub fn insert_participant(
    encounter: &mut EncounterRecord,
    participant_id: &str,
    initiative: i32,
) -> RulesResult<usize> {
    ensure_open(encounter)?;
    if position(encounter, participant_id).is_some() {
        return Err(RulesError::InvalidInput(format!(
            "{participant_id} is already in the initiative order"
        )));
    }

    encounter.order.push(InitiativeSlot {
        participant_id: participant_id.to_string(),
        initiative,
        seq: encounter.next_seq,
    });
    encounter.next_seq += 1;
    resort_keeping_current(encounter);

    position(encounter, participant_id)
        .ok_or_else(|| RulesError::not_found("Participant", participant_id))
}

/// Change a participant's initiative and re-sort
pub fn set_initiative(
    encounter: &mut EncounterRecord,
    participant_id: &str,
    initiative: i32,
) -> RulesResult<usize> {
    ensure_open(encounter)?;
    let pos = position(encounter, participant_id)
        .ok_or_else(|| RulesError::not_found("Participant", participant_id))?;
    encounter.order[pos].initiative = initiative;
    resort_keeping_current(encounter);

    position(encounter, participant_id)
        .ok_or_else(|| RulesError::not_found("Participant", participant_id))
}

/// Drop a participant from the order.
///
/// Removing someone before the acting participant shifts the index down so
/// the same participant keeps the turn; removing the acting participant
/// hands the turn to whoever followed them.
pub fn remove_participant(
    encounter: &mut EncounterRecord,
    participant_id: &str,
) -> RulesResult<InitiativeSlot> {
    let pos = position(encounter, participant_id)
        .ok_or_else(|| RulesError::not_found("Participant", participant_id))?;
    let removed = encounter.order.remove(pos);

    if pos < encounter.current_turn {
        encounter.current_turn -= 1;
    }
    if encounter.current_turn >= encounter.order.len() {
        encounter.current_turn = 0;
    }
    Ok(removed)
}

/// Index of each participant in the current order
pub fn turn_orders(encounter: &EncounterRecord) -> impl Iterator<Item = (&str, usize)> {
    encounter
        .order
        .iter()
        .enumerate()
        .map(|(i, slot)| (slot.participant_id.as_str(), i))
}

// ============================================================================
// Turn Advancement
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnAdvance {
    pub previous_participant: Option<String>,
    pub current_participant: Option<String>,
    pub round: u32,
    pub turn: usize,
    pub new_round: bool,
}

pub fn advance_turn(encounter: &mut EncounterRecord) -> RulesResult<TurnAdvance> {
    ensure_active(encounter)?;
    if encounter.order.is_empty() {
        return Err(RulesError::InvalidInput(format!(
            "encounter {} has no participants",
            encounter.id
        )));
    }

    let previous = encounter.current_participant_id().map(str::to_string);
    let next = encounter.current_turn + 1;
    let new_round = next >= encounter.order.len();

    if new_round {
        encounter.current_turn = 0;
        encounter.round += 1;
    } else {
        encounter.current_turn = next;
    }

    Ok(TurnAdvance {
        previous_participant: previous,
        current_participant: encounter.current_participant_id().map(str::to_string),
        round: encounter.round,
        turn: encounter.current_turn,
        new_round,
    })
}

/// Step back one turn. Never goes below round 1, turn 0.
pub fn previous_turn(encounter: &mut EncounterRecord) -> RulesResult<TurnAdvance> {
    ensure_active(encounter)?;
    let previous = encounter.current_participant_id().map(str::to_string);

    if encounter.current_turn > 0 {
        encounter.current_turn -= 1;
    } else if encounter.round > 1 && !encounter.order.is_empty() {
        encounter.round -= 1;
        encounter.current_turn = encounter.order.len() - 1;
    }

    Ok(TurnAdvance {
        previous_participant: previous,
        current_participant: encounter.current_participant_id().map(str::to_string),
        round: encounter.round,
        turn: encounter.current_turn,
        new_round: false,
    })
}

// ============================================================================
// Lifecycle
// ============================================================================

pub fn end_combat(encounter: &mut EncounterRecord, now: DateTime<Utc>) -> RulesResult<()> {
    ensure_open(encounter)?;
    encounter.status = EncounterStatus::Completed;
    encounter.ended_at = Some(now);
    Ok(())
}

pub fn pause(encounter: &mut EncounterRecord) -> RulesResult<()> {
    ensure_active(encounter)?;
    encounter.status = EncounterStatus::Paused;
    Ok(())
}

pub fn resume(encounter: &mut EncounterRecord) -> RulesResult<()> {
    match encounter.status {
        EncounterStatus::Paused => {
            encounter.status = EncounterStatus::Active;
            Ok(())
        }
        _ => Err(RulesError::InvalidInput(format!(
            "encounter {} is {}, not paused",
            encounter.id,
            encounter.status.as_str()
        ))),
    }
}
