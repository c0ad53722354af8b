//! Damage Modifier Resolver
//!
//! Maps a raw damage amount to its effective value for one target, given the
//! target's resistance, vulnerability, and immunity sets.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::RulesError;

// ============================================================================
// Damage Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageType {
    Acid,
    Bludgeoning,
    Cold,
    Fire,
    Force,
    Lightning,
    Necrotic,
    Piercing,
    Poison,
    Psychic,
    Radiant,
    Slashing,
    Thunder,
}

impl DamageType {
    pub const ALL: [DamageType; 13] = [
        DamageType::Acid,
        DamageType::Bludgeoning,
        DamageType::Cold,
        DamageType::Fire,
        DamageType::Force,
        DamageType::Lightning,
        DamageType::Necrotic,
        DamageType::Piercing,
        DamageType::Poison,
        DamageType::Psychic,
        DamageType::Radiant,
        DamageType::Slashing,
        DamageType::Thunder,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Acid => "acid",
            Self::Bludgeoning => "bludgeoning",
            Self::Cold => "cold",
            Self::Fire => "fire",
            Self::Force => "force",
            Self::Lightning => "lightning",
            Self::Necrotic => "necrotic",
            Self::Piercing => "piercing",
            Self::Poison => "poison",
            Self::Psychic => "psychic",
            Self::Radiant => "radiant",
            Self::Slashing => "slashing",
            Self::Thunder => "thunder",
        }
    }
}

impl fmt::Display for DamageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DamageType {
    type Err = RulesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name() == wanted)
            .ok_or_else(|| RulesError::InvalidInput(format!("unknown damage type '{s}'")))
    }
}

// ============================================================================
// Modifier Sets
// ============================================================================

/// A combatant's damage-type defences
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DamageModifiers {
    pub resistances: BTreeSet<DamageType>,
    pub vulnerabilities: BTreeSet<DamageType>,
    pub immunities: BTreeSet<DamageType>,
}

impl DamageModifiers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resistance(mut self, damage_type: DamageType) -> Self {
        self.resistances.insert(damage_type);
        self
    }

    pub fn with_vulnerability(mut self, damage_type: DamageType) -> Self {
        self.vulnerabilities.insert(damage_type);
        self
    }

    pub fn with_immunity(mut self, damage_type: DamageType) -> Self {
        self.immunities.insert(damage_type);
        self
    }

    /// Compute the effective damage of one hit of `damage_type`.
    ///
    /// Immunity wins outright. Resistance halves (rounding down) and
    /// vulnerability doubles; a type in both sets is unmodified.
    pub fn resolve(
        &self,
        amount: i32,
        damage_type: DamageType,
        bypass: ModifierBypass,
    ) -> ModifiedDamage {
        let amount = amount.max(0);

        if !bypass.ignore_immunities && self.immunities.contains(&damage_type) {
            return ModifiedDamage {
                original: amount,
                effective: 0,
                resisted: false,
                vulnerable: false,
                immune: true,
            };
        }

        let (resisted, vulnerable) = if bypass.ignore_resistances {
            (false, false)
        } else {
            let resistant = self.resistances.contains(&damage_type);
            let vulnerable = self.vulnerabilities.contains(&damage_type);
            if resistant && vulnerable {
                (false, false)
            } else {
                (resistant, vulnerable)
            }
        };

        let effective = if resisted {
            amount / 2
        } else if vulnerable {
            amount.saturating_mul(2)
        } else {
            amount
        };

        ModifiedDamage {
            original: amount,
            effective,
            resisted,
            vulnerable,
            immune: false,
        }
    }
}

/// Which defences a caller has already applied upstream.
///
/// `ignore_resistances` covers vulnerabilities as well, since both scale the
/// same total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModifierBypass {
    pub ignore_resistances: bool,
    pub ignore_immunities: bool,
}

impl ModifierBypass {
    /// Skip every defence, for damage that was already filtered
    pub const PREFILTERED: Self = Self {
        ignore_resistances: true,
        ignore_immunities: true,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifiedDamage {
    pub original: i32,
    pub effective: i32,
    pub resisted: bool,
    pub vulnerable: bool,
    pub immune: bool,
}
