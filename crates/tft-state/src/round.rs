use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Rounds per stage in the trials mode. `"2-5"` is absolute round 15.
pub const ROUNDS_PER_STAGE: u32 = 10;

/// Total rounds in a full run of the reference dataset
pub const DEFAULT_TOTAL_ROUNDS: u32 = 30;

/// Highest stage a label may carry. OCR noise above this is rejected.
pub const MAX_STAGE: u32 = 99;

/// A "stage-round" label such as `2-5`. Ordered by stage, then round, which for
/// labels built through `new` is the same order as `absolute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoundLabel {
    pub stage: u32,
    pub round: u32,
}

impl RoundLabel {
    pub const FIRST: RoundLabel = RoundLabel { stage: 1, round: 1 };

    pub fn new(stage: u32, round: u32) -> Option<Self> {
        if !(1..=MAX_STAGE).contains(&stage) || !(1..=ROUNDS_PER_STAGE).contains(&round) {
            return None;
        }
        Some(Self { stage, round })
    }

    /// Parse `"S-R"`. Whitespace around the parts is tolerated, anything else is rejected.
    pub fn parse(text: &str) -> Option<Self> {
        let (stage, round) = text.trim().split_once('-')?;
        let stage = stage.trim().parse().ok()?;
        let round = round.trim().parse().ok()?;
        Self::new(stage, round)
    }

    /// Absolute round number: `(stage - 1) * 10 + round`.
    pub fn absolute(&self) -> u32 {
        self.stage
            .saturating_sub(1)
            .saturating_mul(ROUNDS_PER_STAGE)
            .saturating_add(self.round)
    }

    pub fn from_absolute(n: u32) -> Option<Self> {
        let n = n.checked_sub(1)?;
        Self::new(n / ROUNDS_PER_STAGE + 1, n % ROUNDS_PER_STAGE + 1)
    }

    pub fn is_first(&self) -> bool {
        *self == Self::FIRST
    }
}

/// Absolute round for an optional label; unknown labels count as round 0.
pub fn absolute_round(label: Option<RoundLabel>) -> u32 {
    label.map(|l| l.absolute()).unwrap_or(0)
}

impl fmt::Display for RoundLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.stage, self.round)
    }
}

impl FromStr for RoundLabel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| anyhow::anyhow!("invalid round label '{s}'"))
    }
}

impl Serialize for RoundLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RoundLabel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
