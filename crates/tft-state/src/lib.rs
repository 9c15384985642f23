use serde::{Deserialize, Serialize};

mod round;

pub use round::{absolute_round, RoundLabel, DEFAULT_TOTAL_ROUNDS, MAX_STAGE, ROUNDS_PER_STAGE};

/// Game phase as classified from a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Planning,
    Combat,
    Augment,
    Carousel,
    #[default]
    Unknown,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Planning => "planning",
            Phase::Combat => "combat",
            Phase::Augment => "augment",
            Phase::Carousel => "carousel",
            Phase::Unknown => "unknown",
        }
    }
}

/// A champion portrait found on the board or bench, in frame coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSighting {
    pub champion: String,
    pub x: u32,
    pub y: u32,
    pub confidence: f64,
}

/// An item component found on the item bench, in frame coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSighting {
    pub item: String,
    pub x: u32,
    pub y: u32,
    pub confidence: f64,
}

/// Structured game state read from a single captured frame.
///
/// Built once by the state reader and then shared read-only; a newer frame
/// produces a new `Observation` instead of touching this one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub phase: Phase,
    pub board: Vec<UnitSighting>,
    pub bench: Vec<UnitSighting>,
    pub items: Vec<ItemSighting>,
    /// One entry per shop card, left to right; `None` is an empty or unreadable card
    pub shop: Vec<Option<String>>,
    pub gold: Option<u32>,
    pub level: Option<u32>,
    pub lives: Option<u32>,
    /// Only populated while `phase == Phase::Augment`
    pub augment_choices: Vec<String>,
    pub round: Option<RoundLabel>,
}

impl Observation {
    /// Number of unassembled components on the item bench
    pub fn component_count(&self) -> u32 {
        self.items.len() as u32
    }

    /// Units currently on the board, used as the surviving-unit estimate
    pub fn board_unit_count(&self) -> u32 {
        self.board.len() as u32
    }

    pub fn shop_names(&self) -> impl Iterator<Item = &str> {
        self.shop.iter().filter_map(|s| s.as_deref())
    }
}
