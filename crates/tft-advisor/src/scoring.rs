//! Score projection for the trials.
//!
//! Points accrue per remaining round: each held component, each interest
//! tier, each surviving unit and each round survived is worth a fixed amount
//! multiplied by the rounds still to play.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tft_data::{Augment, EnemyUnit, ReferenceStore, RoundInfo};
use tft_state::DEFAULT_TOTAL_ROUNDS;

pub const COMPONENT_POINTS: u64 = 2500;
pub const INTEREST_POINTS: u64 = 1000;
pub const SURVIVING_UNIT_POINTS: u64 = 250;
pub const TIME_POINTS: u64 = 2750;
pub const MAX_INTEREST: u32 = 5;

pub fn component_score(n_components: u32, rounds_remaining: u32) -> u64 {
    n_components as u64 * COMPONENT_POINTS * rounds_remaining as u64
}

/// One tier per 10 gold, capped
pub fn interest(gold: u32) -> u32 {
    (gold / 10).min(MAX_INTEREST)
}

pub fn surviving_score(units: u32, rounds_remaining: u32) -> u64 {
    units as u64 * SURVIVING_UNIT_POINTS * rounds_remaining as u64
}

pub fn time_score(rounds_remaining: u32) -> u64 {
    TIME_POINTS * rounds_remaining as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub rounds_remaining: u32,
    pub component_pts: u64,
    pub interest_pts: u64,
    pub surviving_pts: u64,
    pub time_pts: u64,
    pub total: u64,
}

pub struct ScoringEngine {
    reference: Arc<ReferenceStore>,
    total_rounds: u32,
}

impl ScoringEngine {
    pub fn new(reference: Arc<ReferenceStore>) -> Self {
        Self {
            reference,
            total_rounds: DEFAULT_TOTAL_ROUNDS,
        }
    }

    pub fn with_total_rounds(mut self, total_rounds: u32) -> Self {
        self.total_rounds = total_rounds;
        self
    }

    pub fn total_rounds(&self) -> u32 {
        self.total_rounds
    }

    /// Rounds left after `round` (absolute, 0 when unknown), never below zero
    pub fn rounds_remaining(&self, round: u32) -> u32 {
        self.total_rounds.saturating_sub(round)
    }

    pub fn projected_score(
        &self,
        round: u32,
        n_components: u32,
        gold: u32,
        surviving_units: u32,
    ) -> ScoreBreakdown {
        let r = self.rounds_remaining(round);
        let component_pts = component_score(n_components, r);
        let interest_pts = interest(gold) as u64 * INTEREST_POINTS * r as u64;
        let surviving_pts = surviving_score(surviving_units, r);
        let time_pts = time_score(r);
        ScoreBreakdown {
            rounds_remaining: r,
            component_pts,
            interest_pts,
            surviving_pts,
            time_pts,
            total: component_pts + interest_pts + surviving_pts + time_pts,
        }
    }

    pub fn enemy_board(&self, round_number: u32) -> Result<Vec<EnemyUnit>> {
        self.reference.enemy_board(round_number)
    }

    /// `None` outside `1..=total_rounds`
    pub fn round_info(&self, round_number: u32) -> Result<Option<RoundInfo>> {
        if round_number == 0 || round_number > self.total_rounds {
            return Ok(None);
        }
        self.reference.round_info(round_number)
    }

    pub fn eligible_augments(&self) -> Result<Vec<Augment>> {
        self.reference.eligible_augments()
    }
}
