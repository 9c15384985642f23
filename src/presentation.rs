//! Messages pushed to whatever renders the overlay.

use serde::Serialize;
use tft_advisor::{component_score, interest, ScoreBreakdown, ScoringEngine};
use tft_data::RoundInfo;
use tft_state::{absolute_round, Observation, RoundLabel};
use tracing::warn;

/// Next round as shown to the player
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextRound {
    pub label: RoundLabel,
    pub round_type: String,
    pub augment_tier: Option<String>,
    pub enemy_units: usize,
}

/// One overlay refresh, built from a single observation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayUpdate {
    pub round: Option<RoundLabel>,
    pub absolute_round: u32,
    pub score: ScoreBreakdown,
    pub components: u32,
    /// Points the held components are worth if kept to the end
    pub components_value: u64,
    pub gold: Option<u32>,
    pub interest: u32,
    pub lives: Option<u32>,
    pub next_round: Option<NextRound>,
    pub advice: Option<String>,
}

impl OverlayUpdate {
    pub fn build(obs: &Observation, scoring: &ScoringEngine, advice: Option<String>) -> Self {
        let round = absolute_round(obs.round);
        let components = obs.component_count();
        let gold = obs.gold.unwrap_or(0);
        let score = scoring.projected_score(round, components, gold, obs.board_unit_count());

        Self {
            round: obs.round,
            absolute_round: round,
            components_value: component_score(components, score.rounds_remaining),
            score,
            components,
            gold: obs.gold,
            interest: interest(gold),
            lives: obs.lives,
            next_round: next_round(scoring, round),
            advice,
        }
    }
}

fn next_round(scoring: &ScoringEngine, round: u32) -> Option<NextRound> {
    let next = round.checked_add(1)?;
    let label = RoundLabel::from_absolute(next)?;
    let info: RoundInfo = match scoring.round_info(next) {
        Ok(info) => info?,
        Err(e) => {
            warn!("Round info lookup for {} failed: {}", next, e);
            return None;
        }
    };
    let enemy_units = scoring.enemy_board(next).map(|b| b.len()).unwrap_or_else(|e| {
        warn!("Enemy board lookup for {} failed: {}", next, e);
        0
    });
    Some(NextRound {
        label,
        round_type: info.round_type,
        augment_tier: info.augment_tier,
        enemy_units,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tft_data::ReferenceStore;
    use tft_state::{ItemSighting, UnitSighting};

    fn scoring() -> ScoringEngine {
        ScoringEngine::new(Arc::new(ReferenceStore::standard_rounds(30).unwrap()))
    }

    #[test]
    fn test_update_from_observation() {
        let item = ItemSighting {
            item: "TFT_Item_ChainVest".into(),
            x: 0,
            y: 0,
            confidence: 0.9,
        };
        let unit = UnitSighting {
            champion: "TFT16_Jinx".into(),
            x: 0,
            y: 0,
            confidence: 0.9,
        };
        let obs = Observation {
            round: RoundLabel::parse("1-4"),
            gold: Some(30),
            lives: Some(3),
            items: vec![item; 5],
            board: vec![unit; 6],
            ..Default::default()
        };

        let update = OverlayUpdate::build(&obs, &scoring(), Some("Hold.".into()));
        assert_eq!(update.absolute_round, 4);
        assert_eq!(update.score.rounds_remaining, 26);
        assert_eq!(update.components, 5);
        assert_eq!(update.components_value, 5 * 2500 * 26);
        assert_eq!(update.interest, 3);
        let next = update.next_round.unwrap();
        assert_eq!(next.label.to_string(), "1-5");
        assert_eq!(next.round_type, "augment");
        assert_eq!(next.augment_tier.as_deref(), Some("gold"));
        assert_eq!(update.advice.as_deref(), Some("Hold."));
    }

    #[test]
    fn test_unknown_round_projects_full_game() {
        let update = OverlayUpdate::build(&Observation::default(), &scoring(), None);
        assert_eq!(update.absolute_round, 0);
        assert_eq!(update.score.rounds_remaining, 30);
        assert_eq!(update.interest, 0);
        assert_eq!(update.next_round.unwrap().label.to_string(), "1-1");
    }

    #[test]
    fn test_no_next_round_after_final() {
        let obs = Observation {
            round: RoundLabel::parse("3-10"),
            ..Default::default()
        };
        let update = OverlayUpdate::build(&obs, &scoring(), None);
        assert_eq!(update.score.total, 0);
        assert!(update.next_round.is_none());
    }

    #[test]
    fn test_unbounded_label_does_not_overflow() {
        let obs = Observation {
            round: Some(RoundLabel {
                stage: u32::MAX,
                round: u32::MAX,
            }),
            ..Default::default()
        };
        let update = OverlayUpdate::build(&obs, &scoring(), None);
        assert_eq!(update.absolute_round, u32::MAX);
        assert_eq!(update.score.rounds_remaining, 0);
        assert!(update.next_round.is_none());
    }

    #[test]
    fn test_serializes_as_json_line() {
        let update = OverlayUpdate::build(&Observation::default(), &scoring(), None);
        let line = serde_json::to_string(&update).unwrap();
        assert!(!line.contains('\n'));
        assert!(line.contains("\"components_value\":0"));
        assert!(line.contains("\"round\":null"));
    }
}
