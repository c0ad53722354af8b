//! TTRPG Rules - combat and resource rules engine for 5e-style tabletop play
//!
//! The crate exposes two services over a pluggable store:
//! - [`CombatManager`]: encounters, initiative, attacks, HP, death saves
//! - [`ResourceManager`]: spell slots, hit dice, class features, rests

pub mod config;
pub mod core;
pub mod database;


pub use crate::config::RulesConfig;
pub use crate::core::clock::{Clock, ManualClock, SystemClock};
pub use crate::core::damage::{DamageModifiers, DamageType};
pub use crate::core::dice::{DiceNotation, RandomSource, RollMode, SeededDice, ThreadDice};
pub use crate::core::error::{RulesError, RulesResult};
pub use crate::core::resources::ResourceManager;
pub use crate::core::session::CombatManager;
pub use crate::database::Database;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
