use crate::advisor::{AdviceRequest, Advisor, SCORING_RULES};
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tft_runs::{history_summary, PostRunHook, RunRecord, SqliteRecorder};
use tracing::{info, warn};

const REFRESH_QUESTION: &str = "\
Here is my run history. Rewrite the strategy document so it reflects what these \
runs show. Reply with the complete new document in markdown and nothing else.";

/// The strategy document, shared by reference and reloadable from disk
#[derive(Debug)]
pub struct StrategyText {
    path: PathBuf,
    text: RwLock<String>,
}

impl StrategyText {
    /// A missing file starts as an empty document
    pub fn load(path: &Path) -> Result<Self> {
        let strategy = Self {
            path: path.to_path_buf(),
            text: RwLock::new(String::new()),
        };
        strategy.reload()?;
        Ok(strategy)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> String {
        match self.text.read() {
            Ok(text) => text.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn reload(&self) -> Result<()> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Strategy file {} not found; starting empty", self.path.display());
                String::new()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };
        self.set(text)
    }

    /// Write a new document to disk, then make it current
    pub fn replace(&self, text: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("md.tmp");
        std::fs::write(&tmp, text).with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        self.set(text.to_string())?;
        info!("Strategy updated ({} bytes)", text.len());
        Ok(())
    }

    /// Scoring rules followed by the strategy document
    pub fn system_prompt(&self) -> String {
        let current = self.current();
        if current.trim().is_empty() {
            SCORING_RULES.to_string()
        } else {
            format!("{}\n\nCurrent strategy:\n{}", SCORING_RULES, current)
        }
    }

    fn set(&self, text: String) -> Result<()> {
        let mut guard = self
            .text
            .write()
            .map_err(|_| anyhow!("strategy lock poisoned"))?;
        *guard = text;
        Ok(())
    }
}

/// Post-run job that asks the advisor to rewrite the strategy from run history
pub struct StrategyRefresh {
    advisor: Option<Arc<dyn Advisor>>,
    strategy: Arc<StrategyText>,
    runs_db: PathBuf,
    history_limit: usize,
}

impl StrategyRefresh {
    pub fn new(strategy: Arc<StrategyText>, runs_db: &Path) -> Self {
        Self {
            advisor: None,
            strategy,
            runs_db: runs_db.to_path_buf(),
            history_limit: 20,
        }
    }

    pub fn with_advisor(mut self, advisor: Arc<dyn Advisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Returns whether the strategy was rewritten
    pub fn refresh(&self) -> Result<bool> {
        let Some(advisor) = &self.advisor else {
            return Ok(false);
        };

        // Read-only use of the store the tracker writes to
        let recorder = SqliteRecorder::open_read_only(&self.runs_db)?;
        let (runs, rounds) = recorder.history(self.history_limit)?;
        if runs.is_empty() {
            info!("No runs recorded; strategy left as is");
            return Ok(false);
        }

        let request = AdviceRequest {
            system: self.strategy.system_prompt(),
            state_summary: history_summary(&runs, &rounds),
            question: REFRESH_QUESTION.to_string(),
            history: Vec::new(),
        };
        let text = advisor
            .advise(&request)
            .map_err(|e| anyhow!("strategy refresh failed: {e}"))?;
        if text.trim().is_empty() {
            warn!("Advisor returned an empty strategy; keeping the old one");
            return Ok(false);
        }
        self.strategy.replace(text.trim())?;
        Ok(true)
    }
}

impl PostRunHook for StrategyRefresh {
    fn on_run_closed(&self, run: &RunRecord) -> Result<()> {
        info!(
            "Run {} finished ({}) after {} rounds",
            run.id,
            run.end_reason.map(|r| r.as_str()).unwrap_or("open"),
            run.rounds_completed
        );
        if self.advisor.is_none() {
            return Ok(());
        }
        self.refresh()?;
        Ok(())
    }
}
