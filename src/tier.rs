//! Per-user respect tiers.

pub mod store;

pub use store::TierStore;

use serde::{Deserialize, Serialize};

/// Respect tier steering the tone of generated replies.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Loyal, maximal deference.
    Boss,
    /// Default for unknown users.
    #[default]
    Neutral,
    /// Dismissive.
    Cold,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Boss, Tier::Neutral, Tier::Cold];

    /// Numeric tier as stored and shown in prompts.
    pub fn as_i64(self) -> i64 {
        match self {
            Tier::Boss => 1,
            Tier::Neutral => 2,
            Tier::Cold => 3,
        }
    }
}

impl TryFrom<i64> for Tier {
    type Error = InvalidTier;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Tier::Boss),
            2 => Ok(Tier::Neutral),
            3 => Ok(Tier::Cold),
            other => Err(InvalidTier(other)),
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_i64())
    }
}

/// A tier value outside 1..=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("respect tier must be 1, 2, or 3 (got {0})")]
pub struct InvalidTier(pub i64);
