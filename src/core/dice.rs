//! Dice Notation and Random Sources
//!
//! Parses standard TTRPG dice notation and provides injectable random
//! sources so every roll in the rules engine can be made deterministic.
//!
//! - Standard dice: d4, d6, d8, d10, d12, d20, d100
//! - Compound dice: 2d6, 3d8+5, 4d6-2
//! - Percentile: d%
//!
//! ## Examples
//!
//! ```rust
//! use ttrpg_rules::core::dice::{DiceNotation, ScriptedDice};
//!
//! let notation = DiceNotation::parse("2d6+3").unwrap();
//! assert_eq!(notation.count, 2);
//! assert_eq!(notation.sides, 6);
//! assert_eq!(notation.modifier, 3);
//!
//! let dice = ScriptedDice::new(vec![4, 5]);
//! let result = notation.roll(&dice).unwrap();
//! assert_eq!(result.total, 12);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during dice notation parsing or rolling
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceError {
    #[error("Invalid dice notation: {0}")]
    InvalidNotation(String),

    #[error("Invalid dice count: must be between 1 and {max}, got {got}")]
    InvalidCount { max: u32, got: u32 },

    #[error("Invalid dice sides: must be between 1 and {max}, got {got}")]
    InvalidSides { max: u32, got: u32 },

    #[error("Modifier overflow: result would exceed i32 bounds")]
    ModifierOverflow,

    #[error("Roll {roll} is outside the possible range {min}..={max} for {notation}")]
    RollOutOfRange {
        notation: String,
        roll: u32,
        min: u32,
        max: u32,
    },

    #[error("Empty notation")]
    EmptyNotation,
}

/// Result type for dice operations
pub type DiceResult<T> = Result<T, DiceError>;

// ============================================================================
// Random Sources
// ============================================================================

/// Source of uniformly distributed die faces.
///
/// Implementations must return a value in `[1, sides]`. Rolling takes `&self`
/// so a single source can be shared between managers behind an `Arc`.
pub trait RandomSource: Send + Sync {
    fn roll(&self, sides: u32) -> u32;
}

/// Thread-local RNG backed dice, the default for live play.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadDice;

impl RandomSource for ThreadDice {
    fn roll(&self, sides: u32) -> u32 {
        if sides == 0 {
            return 1;
        }
        rand::thread_rng().gen_range(1..=sides)
    }
}

/// Reproducible dice for simulations and replays.
#[derive(Debug)]
pub struct SeededDice {
    rng: Mutex<StdRng>,
}

impl SeededDice {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededDice {
    fn roll(&self, sides: u32) -> u32 {
        if sides == 0 {
            return 1;
        }
        match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(1..=sides),
            Err(poisoned) => poisoned.into_inner().gen_range(1..=sides),
        }
    }
}

/// Dice that replay a fixed script of faces, used to pin down outcomes.
///
/// Each value is clamped into `[1, sides]`; once the script runs out every
/// further roll is a 1.
#[derive(Debug, Default)]
pub struct ScriptedDice {
    queue: Mutex<VecDeque<u32>>,
}

impl ScriptedDice {
    pub fn new(values: impl IntoIterator<Item = u32>) -> Self {
        Self {
            queue: Mutex::new(values.into_iter().collect()),
        }
    }

    /// Append more faces to the end of the script
    pub fn push(&self, values: impl IntoIterator<Item = u32>) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.extend(values);
        }
    }

    /// Number of scripted faces not yet consumed
    pub fn remaining(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }
}

impl RandomSource for ScriptedDice {
    fn roll(&self, sides: u32) -> u32 {
        let next = self
            .queue
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or(1);
        next.clamp(1, sides.max(1))
    }
}

// ============================================================================
// Dice Notation Types
// ============================================================================

/// Parsed dice notation with count, sides, and modifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceNotation {
    /// Number of dice to roll
    pub count: u32,
    /// Faces per die
    pub sides: u32,
    /// Flat modifier added after rolling
    pub modifier: i32,
}

impl DiceNotation {
    /// Maximum number of dice allowed in a single roll
    pub const MAX_DICE_COUNT: u32 = 100;
    /// Largest die allowed
    pub const MAX_DICE_SIDES: u32 = 1000;

    /// Create a new dice notation
    pub fn new(count: u32, sides: u32, modifier: i32) -> DiceResult<Self> {
        if count == 0 || count > Self::MAX_DICE_COUNT {
            return Err(DiceError::InvalidCount {
                max: Self::MAX_DICE_COUNT,
                got: count,
            });
        }
        if sides == 0 || sides > Self::MAX_DICE_SIDES {
            return Err(DiceError::InvalidSides {
                max: Self::MAX_DICE_SIDES,
                got: sides,
            });
        }
        let notation = Self {
            count,
            sides,
            modifier,
        };
        // Critical hits double the dice, so the doubled range must fit too
        notation.doubled().total_range()?;
        Ok(notation)
    }

    /// Parse a dice notation string
    ///
    /// Supported formats:
    /// - "d20" -> 1d20
    /// - "2d6" -> 2d6
    /// - "3d8+5" -> 3d8+5
    /// - "d20-2" -> 1d20-2
    /// - "d%" -> 1d100
    pub fn parse(notation: &str) -> DiceResult<Self> {
        let notation = notation.trim().to_lowercase().replace(' ', "");

        if notation.is_empty() {
            return Err(DiceError::EmptyNotation);
        }

        let notation = notation.replace("d%", "d100");

        let d_pos = notation
            .find('d')
            .ok_or_else(|| DiceError::InvalidNotation(notation.clone()))?;

        let count_str = &notation[..d_pos];
        let count: u32 = if count_str.is_empty() {
            1
        } else {
            count_str
                .parse()
                .map_err(|_| DiceError::InvalidNotation(notation.clone()))?
        };

        let rest = &notation[d_pos + 1..];

        let (sides_str, modifier) = match rest.find(['+', '-']) {
            Some(pos) => {
                let modifier: i32 = rest[pos..]
                    .trim_start_matches('+')
                    .parse()
                    .map_err(|_| DiceError::InvalidNotation(notation.clone()))?;
                (&rest[..pos], modifier)
            }
            None => (rest, 0),
        };

        let sides: u32 = sides_str
            .parse()
            .map_err(|_| DiceError::InvalidNotation(notation.clone()))?;

        Self::new(count, sides, modifier)
    }

    /// Lowest possible sum of the dice, modifier excluded
    pub fn min_dice(&self) -> u32 {
        self.count
    }

    /// Highest possible sum of the dice, modifier excluded
    pub fn max_dice(&self) -> u32 {
        self.count.saturating_mul(self.sides)
    }

    /// Lowest and highest totals with the modifier applied
    pub fn total_range(&self) -> DiceResult<(i32, i32)> {
        let min = i32::try_from(self.min_dice())
            .ok()
            .and_then(|m| m.checked_add(self.modifier));
        let max = self
            .count
            .checked_mul(self.sides)
            .and_then(|m| i32::try_from(m).ok())
            .and_then(|m| m.checked_add(self.modifier));
        min.zip(max).ok_or(DiceError::ModifierOverflow)
    }

    /// Average expected result including the modifier
    pub fn average_result(&self) -> f64 {
        let die_average = (1.0 + f64::from(self.sides)) / 2.0;
        f64::from(self.count) * die_average + f64::from(self.modifier)
    }

    /// Same dice with the count doubled, as for a critical hit
    pub fn doubled(&self) -> Self {
        Self {
            count: self.count.saturating_mul(2),
            ..self.clone()
        }
    }

    /// Check that a caller supplied dice total could have come from these dice
    pub fn validate_dice_total(&self, total: u32) -> DiceResult<()> {
        if total < self.min_dice() || total > self.max_dice() {
            return Err(DiceError::RollOutOfRange {
                notation: self.to_string(),
                roll: total,
                min: self.min_dice(),
                max: self.max_dice(),
            });
        }
        Ok(())
    }

    /// Roll every die through the given source
    pub fn roll(&self, dice: &dyn RandomSource) -> DiceResult<RollResult> {
        let rolls: Vec<u32> = (0..self.count).map(|_| dice.roll(self.sides)).collect();
        let subtotal = rolls
            .iter()
            .try_fold(0i32, |acc, &r| i32::try_from(r).ok().and_then(|r| acc.checked_add(r)))
            .ok_or(DiceError::ModifierOverflow)?;
        let total = subtotal
            .checked_add(self.modifier)
            .ok_or(DiceError::ModifierOverflow)?;

        Ok(RollResult {
            notation: self.clone(),
            rolls,
            subtotal,
            total,
        })
    }
}

impl fmt::Display for DiceNotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.modifier {
            0 => write!(f, "{}d{}", self.count, self.sides),
            m if m > 0 => write!(f, "{}d{}+{}", self.count, self.sides, m),
            m => write!(f, "{}d{}{}", self.count, self.sides, m),
        }
    }
}

impl std::str::FromStr for DiceNotation {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ============================================================================
// Roll Result Types
// ============================================================================

/// Complete result of a dice roll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollResult {
    /// The notation that was rolled
    pub notation: DiceNotation,
    /// Individual die faces
    pub rolls: Vec<u32>,
    /// Sum of all dice (before modifier)
    pub subtotal: i32,
    /// Final total (after modifier)
    pub total: i32,
}

impl fmt::Display for RollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rolls_str: Vec<String> = self.rolls.iter().map(|r| r.to_string()).collect();
        if self.notation.modifier == 0 {
            write!(f, "{}: [{}] = {}", self.notation, rolls_str.join(", "), self.total)
        } else {
            write!(
                f,
                "{}: [{}] ({}) = {}",
                self.notation,
                rolls_str.join(", "),
                self.subtotal,
                self.total
            )
        }
    }
}

// ============================================================================
// d20 Tests
// ============================================================================

/// How many d20s to roll for a test and which one counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollMode {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
}

impl RollMode {
    /// Advantage and disadvantage from any number of sources cancel out
    pub fn from_flags(advantage: bool, disadvantage: bool) -> Self {
        match (advantage, disadvantage) {
            (true, false) => Self::Advantage,
            (false, true) => Self::Disadvantage,
            _ => Self::Normal,
        }
    }
}

/// A d20 roll with the raw faces kept for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct D20Roll {
    pub mode: RollMode,
    pub rolls: Vec<u32>,
    /// The face that counts after advantage/disadvantage
    pub chosen: u32,
}

/// Roll a d20, taking the higher or lower of two on advantage/disadvantage
pub fn roll_d20(dice: &dyn RandomSource, mode: RollMode) -> D20Roll {
    let first = dice.roll(20);
    let (rolls, chosen) = match mode {
        RollMode::Normal => (vec![first], first),
        RollMode::Advantage => {
            let second = dice.roll(20);
            (vec![first, second], first.max(second))
        }
        RollMode::Disadvantage => {
            let second = dice.roll(20);
            (vec![first, second], first.min(second))
        }
    };
    D20Roll { mode, rolls, chosen }
}

// ============================================================================
// Tests
// ============================================================================
