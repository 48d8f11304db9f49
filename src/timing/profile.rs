//! Behavior profiles and aggressiveness tiers

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{Error, Result};

/// Personality archetype controlling the overall pace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Personality {
    /// Reads everything, acts slowly
    Deliberate,
    Casual,
    Focused,
    /// Acts before reading
    Impulsive,
}

impl Personality {
    /// Multiplier on the median delay
    pub fn pace_factor(self) -> f64 {
        match self {
            Personality::Deliberate => 1.35,
            Personality::Casual => 1.1,
            Personality::Focused => 0.9,
            Personality::Impulsive => 0.75,
        }
    }

    /// Multiplier on the log-normal spread
    pub fn spread_factor(self) -> f64 {
        match self {
            Personality::Deliberate => 0.85,
            Personality::Casual => 1.1,
            Personality::Focused => 0.8,
            Personality::Impulsive => 1.25,
        }
    }
}

/// Immutable timing profile of one session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ProfileFields")]
pub struct BehaviorProfile {
    personality: Personality,
    aggressiveness: f64,
    consistency_target: f64,
}

/// Unchecked wire form, validated through [`BehaviorProfile::new`]
#[derive(Deserialize)]
struct ProfileFields {
    personality: Personality,
    aggressiveness: f64,
    consistency_target: f64,
}

impl TryFrom<ProfileFields> for BehaviorProfile {
    type Error = Error;

    fn try_from(fields: ProfileFields) -> Result<Self> {
        Self::new(fields.personality, fields.aggressiveness, fields.consistency_target)
    }
}

impl BehaviorProfile {
    pub fn new(personality: Personality, aggressiveness: f64, consistency_target: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&aggressiveness) {
            return Err(Error::configuration(format!(
                "aggressiveness {} outside [0, 1]",
                aggressiveness
            )));
        }
        if !(0.0..=1.0).contains(&consistency_target) {
            return Err(Error::configuration(format!(
                "consistency_target {} outside [0, 1]",
                consistency_target
            )));
        }
        Ok(Self {
            personality,
            aggressiveness,
            consistency_target,
        })
    }

    pub fn personality(&self) -> Personality {
        self.personality
    }

    pub fn aggressiveness(&self) -> f64 {
        self.aggressiveness
    }

    pub fn consistency_target(&self) -> f64 {
        self.consistency_target
    }

    pub fn tier(&self) -> AggressivenessTier {
        AggressivenessTier::from_aggressiveness(self.aggressiveness)
    }
}

impl Default for BehaviorProfile {
    fn default() -> Self {
        Self {
            personality: Personality::Casual,
            aggressiveness: 0.4,
            consistency_target: 0.7,
        }
    }
}

/// Four bands of delay behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggressivenessTier {
    /// [0, 0.25)
    Cautious,
    /// [0.25, 0.5)
    Moderate,
    /// [0.5, 0.75)
    Brisk,
    /// [0.75, 1]
    Aggressive,
}

impl AggressivenessTier {
    pub fn from_aggressiveness(value: f64) -> Self {
        if value < 0.25 {
            AggressivenessTier::Cautious
        } else if value < 0.5 {
            AggressivenessTier::Moderate
        } else if value < 0.75 {
            AggressivenessTier::Brisk
        } else {
            AggressivenessTier::Aggressive
        }
    }

    /// `[min, max]` delay band every draw is clamped to
    pub fn band(self) -> (Duration, Duration) {
        match self {
            AggressivenessTier::Cautious => (Duration::from_millis(1500), Duration::from_millis(6000)),
            AggressivenessTier::Moderate => (Duration::from_millis(800), Duration::from_millis(3500)),
            AggressivenessTier::Brisk => (Duration::from_millis(400), Duration::from_millis(2000)),
            AggressivenessTier::Aggressive => (Duration::from_millis(200), Duration::from_millis(1200)),
        }
    }

    /// Multiplier on the base delay
    pub fn scale(self) -> f64 {
        match self {
            AggressivenessTier::Cautious => 2.5,
            AggressivenessTier::Moderate => 1.5,
            AggressivenessTier::Brisk => 0.8,
            AggressivenessTier::Aggressive => 0.45,
        }
    }

    /// Log-normal shape parameter
    pub fn sigma(self) -> f64 {
        match self {
            AggressivenessTier::Cautious => 0.45,
            AggressivenessTier::Moderate => 0.4,
            AggressivenessTier::Brisk => 0.35,
            AggressivenessTier::Aggressive => 0.3,
        }
    }

    pub fn all() -> [AggressivenessTier; 4] {
        [
            AggressivenessTier::Cautious,
            AggressivenessTier::Moderate,
            AggressivenessTier::Brisk,
            AggressivenessTier::Aggressive,
        ]
    }
}
