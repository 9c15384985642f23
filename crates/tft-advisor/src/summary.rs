use crate::scoring::{component_score, interest, ScoreBreakdown};
use tft_state::Observation;

/// Plain-text game state handed to the advisor with each question
pub fn summarize_state(obs: &Observation, score: &ScoreBreakdown, total_rounds: u32) -> String {
    let round = obs
        .round
        .map(|r| format!("{} ({}/{})", r, r.absolute(), total_rounds))
        .unwrap_or_else(|| "--".to_string());
    let lives = obs
        .lives
        .map(|l| format!("{}/3", l))
        .unwrap_or_else(|| "--".to_string());
    let shop: Vec<&str> = obs.shop_names().collect();
    let components = obs.component_count();

    let mut lines = vec![
        format!(
            "Round: {}  Gold: {}  Level: {}  Lives: {}",
            round,
            field(obs.gold),
            field(obs.level),
            lives
        ),
        format!(
            "Shop: {}",
            if shop.is_empty() { "--".to_string() } else { shop.join(", ") }
        ),
        format!(
            "Items on bench: {}  (+{} pts)",
            components,
            thousands(component_score(components, score.rounds_remaining))
        ),
        format!(
            "Interest tier: {}  Board units: {}",
            obs.gold.map(interest).unwrap_or(0),
            obs.board_unit_count()
        ),
    ];
    if !obs.augment_choices.is_empty() {
        lines.push(format!("Augment choices: {}", obs.augment_choices.join(", ")));
    }
    lines.push(format!("Projected score: {}", thousands(score.total)));
    lines.join("\n")
}

fn field(value: Option<u32>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "--".to_string())
}

/// 395000 -> "395,000"
pub fn thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
