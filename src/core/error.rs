//! Rules Engine Errors
//!
//! Every public operation returns [`RulesResult`]. Rejections happen before
//! any record is written, so an `Err` always means "nothing changed".

use thiserror::Error;

use super::dice::DiceError;
use crate::database::StorageError;

/// Coarse error category, for callers that branch on the kind of failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input; retry with corrected values
    Validation,
    /// Unknown participant, character, encounter, or pool
    NotFound,
    /// Input was well formed but the game rules forbid the action
    BusinessRule,
    /// Backend failure
    Storage,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RulesError {
    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------
    #[error("Invalid {what} roll {roll}: must be between 1 and {max}")]
    InvalidRoll { what: &'static str, roll: u32, max: u32 },

    #[error("{what} cannot be negative, got {amount}")]
    NegativeAmount { what: &'static str, amount: i32 },

    #[error("Dice error: {0}")]
    InvalidDice(#[from] DiceError),

    #[error("Unknown class: {0}")]
    UnknownClass(String),

    #[error("Spell level must be between 0 and 9, got {0}")]
    InvalidSpellLevel(u8),

    #[error("Level must be between 1 and 20, got {0}")]
    InvalidLevel(u32),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ------------------------------------------------------------------
    // Not found
    // ------------------------------------------------------------------
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    // ------------------------------------------------------------------
    // Business rules
    // ------------------------------------------------------------------
    #[error("No level {level} spell slots left: {available} available, {requested} requested")]
    InsufficientSpellSlots {
        level: u8,
        available: u32,
        requested: u32,
    },

    #[error("Not enough hit dice: {available} available, {requested} requested")]
    InsufficientHitDice { available: u32, requested: u32 },

    #[error("No uses of {feature} left ({available} available)")]
    InsufficientFeatureUses { feature: String, available: u32 },

    #[error("{participant} cannot make a death save: {reason}")]
    DeathSaveNotAllowed { participant: String, reason: String },

    #[error("{0} is dead")]
    ParticipantDead(String),

    #[error("Cannot cast a level {spell_level} spell with a level {slot_level} slot")]
    SlotBelowSpellLevel { spell_level: u8, slot_level: u8 },

    #[error("Cantrips do not use spell slots and cannot be upcast")]
    CantripUpcast,

    #[error("{0} has no pact magic slots")]
    NoPactMagic(String),

    #[error("Encounter {id} is not active ({status})")]
    EncounterNotActive { id: String, status: String },

    #[error("It is {expected}'s turn, not {actual}'s")]
    NotParticipantsTurn { expected: String, actual: String },

    #[error("Long rest is on cooldown for another {remaining_minutes} minutes")]
    LongRestCooldown { remaining_minutes: i64 },

    // ------------------------------------------------------------------
    // Storage
    // ------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl RulesError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn negative(what: &'static str, amount: i32) -> Self {
        Self::NegativeAmount { what, amount }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRoll { .. }
            | Self::NegativeAmount { .. }
            | Self::InvalidDice(_)
            | Self::UnknownClass(_)
            | Self::InvalidSpellLevel(_)
            | Self::InvalidLevel(_)
            | Self::InvalidInput(_) => ErrorKind::Validation,

            Self::NotFound { .. } => ErrorKind::NotFound,

            Self::InsufficientSpellSlots { .. }
            | Self::InsufficientHitDice { .. }
            | Self::InsufficientFeatureUses { .. }
            | Self::DeathSaveNotAllowed { .. }
            | Self::ParticipantDead(_)
            | Self::SlotBelowSpellLevel { .. }
            | Self::CantripUpcast
            | Self::NoPactMagic(_)
            | Self::EncounterNotActive { .. }
            | Self::NotParticipantsTurn { .. }
            | Self::LongRestCooldown { .. } => ErrorKind::BusinessRule,

            Self::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<StorageError> for RulesError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity, id } => Self::NotFound { entity, id },
            other => Self::Storage(other),
        }
    }
}

/// Result type for rules operations
pub type RulesResult<T> = Result<T, RulesError>;

/// Validate a d20 face
pub fn check_d20(what: &'static str, roll: u32) -> RulesResult<()> {
    if !(1..=20).contains(&roll) {
        return Err(RulesError::InvalidRoll { what, roll, max: 20 });
    }
    Ok(())
}
