pub mod hook;
pub mod recorder;
pub mod tracker;

pub use hook::{PostRunHook, PostRunScheduler, PostRunWorker};
pub use recorder::{RunStore, SqliteRecorder};
pub use tracker::{RunTracker, TrackerConfig, Transition};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::str::FromStr;
use tft_state::RoundLabel;

pub type RunId = i64;

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    Eliminated,
    Completed,
    Abandoned,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::Eliminated => "eliminated",
            EndReason::Completed => "completed",
            EndReason::Abandoned => "abandoned",
        }
    }

    /// Whether closing with this reason triggers the post-run hook
    pub fn runs_hook(&self) -> bool {
        !matches!(self, EndReason::Abandoned)
    }
}

impl FromStr for EndReason {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "eliminated" => Ok(EndReason::Eliminated),
            "completed" => Ok(EndReason::Completed),
            "abandoned" => Ok(EndReason::Abandoned),
            _ => Err(anyhow!("unknown end reason '{s}'")),
        }
    }
}

/// One attempt at the trials, from 1-1 to elimination, completion or abandonment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub rounds_completed: u32,
    pub end_reason: Option<EndReason>,
}

impl RunRecord {
    pub fn is_active(&self) -> bool {
        self.end_reason.is_none()
    }
}

/// State recorded when a round finished. Never updated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    pub round: RoundLabel,
    pub gold: Option<u32>,
    pub level: Option<u32>,
    pub lives: Option<u32>,
    pub component_count: u32,
    /// Shop cards left to right; `None` is an empty slot
    pub shop: Vec<Option<String>>,
    pub items_built: u32,
    pub life_lost: bool,
}

/// Components that disappeared from the bench between two snapshots
pub fn items_built(previous_components: u32, current_components: u32) -> u32 {
    previous_components.saturating_sub(current_components)
}

/// Only true when both readings are known and lives went down
pub fn life_lost(previous_lives: Option<u32>, current_lives: Option<u32>) -> bool {
    matches!((previous_lives, current_lives), (Some(prev), Some(cur)) if prev > cur)
}

/// Compact text digest of past runs, oldest first, for the strategy refresh prompt
pub fn history_summary(runs: &[RunRecord], rounds: &BTreeMap<RunId, Vec<RoundSnapshot>>) -> String {
    let mut ordered: Vec<&RunRecord> = runs.iter().collect();
    ordered.sort_by_key(|r| r.id);

    let mut out = String::new();
    for run in ordered {
        let reason = run.end_reason.map(|r| r.as_str()).unwrap_or("active");
        let _ = writeln!(
            out,
            "Run {} ({}): {} rounds, {}",
            run.id,
            run.started_at.format("%Y-%m-%d %H:%M"),
            run.rounds_completed,
            reason
        );

        let Some(snapshots) = rounds.get(&run.id) else {
            continue;
        };
        for s in snapshots {
            let shop: Vec<&str> = s.shop.iter().flatten().map(String::as_str).collect();
            let _ = writeln!(
                out,
                "  {} gold={} level={} lives={} components={} built={}{} shop=[{}]",
                s.round,
                opt(s.gold),
                opt(s.level),
                opt(s.lives),
                s.component_count,
                s.items_built,
                if s.life_lost { " LIFE LOST" } else { "" },
                shop.join(", ")
            );
        }
    }
    out
}

fn opt(value: Option<u32>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "?".to_string())
}
