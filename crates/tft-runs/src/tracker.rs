//! Run lifecycle detection.
//!
//! The tracker turns the stream of observations into run records and round
//! snapshots. Every observation causes at most one [`Transition`], and state
//! only advances once the corresponding write has succeeded.

use crate::hook::PostRunScheduler;
use crate::recorder::RunStore;
use crate::{items_built, life_lost, EndReason, RoundSnapshot, RunId, RunRecord};
use anyhow::Result;
use chrono::{DateTime, Utc};
use tft_state::{Observation, RoundLabel, DEFAULT_TOTAL_ROUNDS};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    pub total_rounds: u32,
    /// Consecutive label-less observations on the final round before the run
    /// counts as completed
    pub final_round_grace_polls: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            total_rounds: DEFAULT_TOTAL_ROUNDS,
            final_round_grace_polls: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    None,
    RunStarted { run_id: RunId },
    RoundRecorded { run_id: RunId, round: RoundLabel },
    RunClosed(RunRecord),
}

/// Values carried forward for a round while its label is current
#[derive(Debug, Clone, Default)]
struct RoundValues {
    gold: Option<u32>,
    level: Option<u32>,
    lives: Option<u32>,
    component_count: u32,
    shop: Vec<Option<String>>,
}

impl RoundValues {
    fn from_observation(obs: &Observation) -> Self {
        Self {
            gold: obs.gold,
            level: obs.level,
            lives: obs.lives,
            component_count: obs.component_count(),
            shop: obs.shop.clone(),
        }
    }

    /// Keep the last known value of each field
    fn absorb(&mut self, obs: &Observation) {
        self.gold = obs.gold.or(self.gold);
        self.level = obs.level.or(self.level);
        self.lives = obs.lives.or(self.lives);
        self.component_count = obs.component_count();
        if obs.shop.iter().any(Option::is_some) {
            self.shop = obs.shop.clone();
        }
    }

    /// Values of `obs` with gaps filled from `self`
    fn closed_by(&self, obs: &Observation) -> Self {
        let mut values = self.clone();
        values.absorb(obs);
        values
    }
}

/// What the next snapshot's derived fields are measured against
#[derive(Debug, Clone, Copy)]
struct Baseline {
    component_count: u32,
    lives: Option<u32>,
}

#[derive(Debug)]
struct ActiveRun {
    id: RunId,
    started_at: DateTime<Utc>,
    current: RoundLabel,
    latest: RoundValues,
    baseline: Baseline,
    last_snapshot: Option<RoundLabel>,
    polls_without_label: u32,
    /// Set when closing failed; retried before anything else
    closing: Option<EndReason>,
}

impl ActiveRun {
    fn has_snapshot(&self, label: RoundLabel) -> bool {
        self.last_snapshot == Some(label)
    }
}

#[derive(Debug, Default)]
enum TrackerState {
    #[default]
    NoRun,
    Active(ActiveRun),
}

type Step = (TrackerState, Result<Transition>);

pub struct RunTracker<S: RunStore> {
    store: S,
    scheduler: Option<Box<dyn PostRunScheduler>>,
    config: TrackerConfig,
    final_round: RoundLabel,
    state: TrackerState,
}

impl<S: RunStore> RunTracker<S> {
    pub fn new(store: S, config: TrackerConfig) -> Self {
        let final_round =
            RoundLabel::from_absolute(config.total_rounds.max(1)).unwrap_or(RoundLabel::FIRST);
        Self {
            store,
            scheduler: None,
            config,
            final_round,
            state: TrackerState::NoRun,
        }
    }

    pub fn with_scheduler(mut self, scheduler: impl PostRunScheduler + 'static) -> Self {
        self.scheduler = Some(Box::new(scheduler));
        self
    }

    pub fn active_run(&self) -> Option<RunId> {
        match &self.state {
            TrackerState::Active(run) => Some(run.id),
            TrackerState::NoRun => None,
        }
    }

    pub fn current_round(&self) -> Option<RoundLabel> {
        match &self.state {
            TrackerState::Active(run) => Some(run.current),
            TrackerState::NoRun => None,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Feed one observation. On error the tracker keeps its previous state and
    /// the same step is attempted again with the next observation.
    pub fn observe(&mut self, obs: &Observation) -> Result<Transition> {
        let state = std::mem::take(&mut self.state);
        let (next, result) = match state {
            TrackerState::NoRun => self.idle(obs),
            TrackerState::Active(run) => self.advance(run, obs),
        };
        self.state = next;
        result
    }

    /// Close an active run as abandoned. The post-run hook is not scheduled.
    pub fn shutdown(&mut self) -> Result<Transition> {
        let state = std::mem::take(&mut self.state);
        let (next, result) = match state {
            TrackerState::NoRun => (TrackerState::NoRun, Ok(Transition::None)),
            TrackerState::Active(run) => self.close(run, EndReason::Abandoned),
        };
        self.state = next;
        result
    }

    fn idle(&mut self, obs: &Observation) -> Step {
        if obs.round != Some(RoundLabel::FIRST) {
            return (TrackerState::NoRun, Ok(Transition::None));
        }

        let started_at = Utc::now();
        match self.store.start_run(started_at) {
            Ok(id) => {
                info!("Run {} started", id);
                let latest = RoundValues::from_observation(obs);
                let baseline = Baseline {
                    component_count: latest.component_count,
                    lives: latest.lives,
                };
                let run = ActiveRun {
                    id,
                    started_at,
                    current: RoundLabel::FIRST,
                    latest,
                    baseline,
                    last_snapshot: None,
                    polls_without_label: 0,
                    closing: None,
                };
                (TrackerState::Active(run), Ok(Transition::RunStarted { run_id: id }))
            }
            Err(err) => (TrackerState::NoRun, Err(err)),
        }
    }

    fn advance(&mut self, mut run: ActiveRun, obs: &Observation) -> Step {
        if let Some(reason) = run.closing {
            return self.close(run, reason);
        }

        if obs.lives == Some(0) {
            return self.eliminate(run, obs);
        }

        let Some(label) = obs.round else {
            run.latest.absorb(obs);
            if run.current == self.final_round {
                run.polls_without_label += 1;
                if run.polls_without_label >= self.config.final_round_grace_polls {
                    debug!("Final round label gone for {} polls", run.polls_without_label);
                    let values = run.latest.clone();
                    return self.finish_round(run, values);
                }
            }
            return (TrackerState::Active(run), Ok(Transition::None));
        };

        if label == run.current {
            run.polls_without_label = 0;
            run.latest.absorb(obs);
            return (TrackerState::Active(run), Ok(Transition::None));
        }

        if label.is_first() {
            info!("Round 1-1 seen during run {} at {}; abandoning", run.id, run.current);
            return self.close(run, EndReason::Abandoned);
        }

        if label.absolute() < run.current.absolute() {
            debug!("Ignoring round label {} behind {}", label, run.current);
            return (TrackerState::Active(run), Ok(Transition::None));
        }

        let values = run.latest.closed_by(obs);
        let run_id = run.id;
        let closed_round = run.current;
        let (next, result) = self.finish_round(run, values);
        match (next, result) {
            (TrackerState::Active(mut run), Ok(Transition::RoundRecorded { .. })) => {
                run.current = label;
                run.latest = RoundValues::from_observation(obs);
                run.polls_without_label = 0;
                (
                    TrackerState::Active(run),
                    Ok(Transition::RoundRecorded {
                        run_id,
                        round: closed_round,
                    }),
                )
            }
            other => other,
        }
    }

    /// Snapshot the current round; closes the run as completed when it was the last one
    fn finish_round(&mut self, mut run: ActiveRun, values: RoundValues) -> Step {
        let round = run.current;
        if let Err(err) = self.record(&mut run, values) {
            return (TrackerState::Active(run), Err(err));
        }
        if round == self.final_round {
            return self.close(run, EndReason::Completed);
        }
        let run_id = run.id;
        (
            TrackerState::Active(run),
            Ok(Transition::RoundRecorded { run_id, round }),
        )
    }

    fn eliminate(&mut self, mut run: ActiveRun, obs: &Observation) -> Step {
        if !run.has_snapshot(run.current) {
            let values = run.latest.closed_by(obs);
            if let Err(err) = self.record(&mut run, values) {
                return (TrackerState::Active(run), Err(err));
            }
        }
        self.close(run, EndReason::Eliminated)
    }

    fn record(&mut self, run: &mut ActiveRun, values: RoundValues) -> Result<()> {
        let snapshot = RoundSnapshot {
            round: run.current,
            gold: values.gold,
            level: values.level,
            lives: values.lives,
            component_count: values.component_count,
            shop: values.shop,
            items_built: items_built(run.baseline.component_count, values.component_count),
            life_lost: life_lost(run.baseline.lives, values.lives),
        };
        self.store.append_round(run.id, &snapshot)?;
        debug!(
            "Run {} round {} recorded: components={} built={} life_lost={}",
            run.id, snapshot.round, snapshot.component_count, snapshot.items_built, snapshot.life_lost
        );

        run.baseline = Baseline {
            component_count: snapshot.component_count,
            lives: snapshot.lives.or(run.baseline.lives),
        };
        run.last_snapshot = Some(snapshot.round);
        Ok(())
    }

    fn close(&mut self, mut run: ActiveRun, reason: EndReason) -> Step {
        let ended_at = Utc::now();
        match self.store.close_run(run.id, reason, ended_at) {
            Ok(rounds_completed) => {
                let record = RunRecord {
                    id: run.id,
                    started_at: run.started_at,
                    ended_at: Some(ended_at),
                    rounds_completed,
                    end_reason: Some(reason),
                };
                info!(
                    "Run {} closed: {} after {} rounds",
                    run.id,
                    reason.as_str(),
                    rounds_completed
                );
                if reason.runs_hook() {
                    if let Some(scheduler) = &self.scheduler {
                        scheduler.schedule(record.clone());
                    }
                }
                (TrackerState::NoRun, Ok(Transition::RunClosed(record)))
            }
            Err(err) => {
                warn!("Closing run {} failed; will retry: {err:#}", run.id);
                run.closing = Some(reason);
                (TrackerState::Active(run), Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::SqliteRecorder;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use tft_state::ItemSighting;

    #[derive(Clone, Default)]
    struct Hooks(Arc<Mutex<Vec<RunRecord>>>);

    impl PostRunScheduler for Hooks {
        fn schedule(&self, run: RunRecord) {
            self.0.lock().unwrap().push(run);
        }
    }

    impl Hooks {
        fn count(&self) -> usize {
            self.0.lock().unwrap().len()
        }
    }

    /// Wraps the SQLite store with switchable write failures
    struct Flaky {
        inner: SqliteRecorder,
        fail_append: Arc<AtomicBool>,
        fail_close: Arc<AtomicBool>,
    }

    impl RunStore for Flaky {
        fn start_run(&mut self, started_at: DateTime<Utc>) -> Result<RunId> {
            self.inner.start_run(started_at)
        }

        fn append_round(&mut self, run_id: RunId, snapshot: &RoundSnapshot) -> Result<()> {
            if self.fail_append.load(Ordering::SeqCst) {
                anyhow::bail!("disk full");
            }
            self.inner.append_round(run_id, snapshot)
        }

        fn close_run(&mut self, run_id: RunId, reason: EndReason, ended_at: DateTime<Utc>) -> Result<u32> {
            if self.fail_close.load(Ordering::SeqCst) {
                anyhow::bail!("database locked");
            }
            self.inner.close_run(run_id, reason, ended_at)
        }
    }

    fn obs(label: Option<&str>, components: usize, lives: Option<u32>) -> Observation {
        Observation {
            round: label.and_then(RoundLabel::parse),
            items: (0..components)
                .map(|i| ItemSighting {
                    item: format!("TFT_Item_{i}"),
                    x: i as u32 * 40,
                    y: 0,
                    confidence: 0.9,
                })
                .collect(),
            lives,
            gold: Some(10),
            ..Default::default()
        }
    }

    fn tracker() -> (RunTracker<SqliteRecorder>, Hooks) {
        let hooks = Hooks::default();
        let tracker = RunTracker::new(SqliteRecorder::open_in_memory().unwrap(), TrackerConfig::default())
            .with_scheduler(hooks.clone());
        (tracker, hooks)
    }

    #[test]
    fn test_ignores_everything_until_first_round() {
        let (mut t, _) = tracker();
        assert_eq!(t.observe(&obs(None, 3, Some(3))).unwrap(), Transition::None);
        assert_eq!(t.observe(&obs(Some("2-3"), 3, Some(3))).unwrap(), Transition::None);
        assert_eq!(t.active_run(), None);
        assert!(matches!(
            t.observe(&obs(Some("1-1"), 3, Some(3))).unwrap(),
            Transition::RunStarted { .. }
        ));
        assert_eq!(t.current_round(), RoundLabel::parse("1-1"));
        assert!(t.store().rounds(t.active_run().unwrap()).unwrap().is_empty());
    }

    #[test]
    fn test_repeated_label_snapshots_once() {
        let (mut t, _) = tracker();
        t.observe(&obs(Some("1-1"), 5, Some(3))).unwrap();
        let id = t.active_run().unwrap();
        for _ in 0..6 {
            assert_eq!(t.observe(&obs(Some("1-1"), 5, Some(3))).unwrap(), Transition::None);
        }
        assert_eq!(
            t.observe(&obs(Some("1-2"), 5, Some(3))).unwrap(),
            Transition::RoundRecorded {
                run_id: id,
                round: RoundLabel::FIRST
            }
        );
        for _ in 0..4 {
            t.observe(&obs(Some("1-2"), 5, Some(3))).unwrap();
        }
        assert_eq!(t.store().rounds(id).unwrap().len(), 1);
    }

    #[test]
    fn test_items_built_from_component_drop() {
        let (mut t, _) = tracker();
        t.observe(&obs(Some("1-1"), 5, Some(3))).unwrap();
        t.observe(&obs(Some("1-1"), 5, Some(3))).unwrap();
        t.observe(&obs(Some("1-2"), 3, Some(3))).unwrap();

        let rounds = t.store().rounds(t.active_run().unwrap()).unwrap();
        assert_eq!(rounds.len(), 1);
        assert_eq!(rounds[0].round, RoundLabel::FIRST);
        assert_eq!(rounds[0].items_built, 2);
        assert!(!rounds[0].life_lost);
    }

    #[test]
    fn test_component_gain_builds_nothing() {
        let (mut t, _) = tracker();
        t.observe(&obs(Some("1-1"), 2, Some(3))).unwrap();
        t.observe(&obs(Some("1-2"), 6, Some(3))).unwrap();
        t.observe(&obs(Some("1-3"), 1, Some(3))).unwrap();

        let rounds = t.store().rounds(t.active_run().unwrap()).unwrap();
        let built: Vec<u32> = rounds.iter().map(|r| r.items_built).collect();
        assert_eq!(built, vec![0, 5]);
    }

    #[test]
    fn test_life_lost_between_rounds() {
        let (mut t, _) = tracker();
        t.observe(&obs(Some("1-1"), 0, Some(3))).unwrap();
        t.observe(&obs(Some("1-2"), 0, Some(3))).unwrap();
        t.observe(&obs(Some("1-3"), 0, None)).unwrap();
        t.observe(&obs(Some("1-3"), 0, Some(2))).unwrap();
        t.observe(&obs(Some("1-4"), 0, None)).unwrap();

        let rounds = t.store().rounds(t.active_run().unwrap()).unwrap();
        let lost: Vec<bool> = rounds.iter().map(|r| r.life_lost).collect();
        assert_eq!(lost, vec![false, false, true]);
        assert_eq!(rounds[2].lives, Some(2), "missing lives fall back to last reading");
    }

    #[test]
    fn test_backward_and_missing_labels_are_noise() {
        let (mut t, _) = tracker();
        t.observe(&obs(Some("1-1"), 0, Some(3))).unwrap();
        t.observe(&obs(Some("1-3"), 0, Some(3))).unwrap();
        assert_eq!(t.observe(&obs(Some("1-2"), 0, Some(3))).unwrap(), Transition::None);
        assert_eq!(t.observe(&obs(None, 0, Some(3))).unwrap(), Transition::None);
        assert_eq!(t.current_round(), RoundLabel::parse("1-3"));
        assert_eq!(t.store().rounds(t.active_run().unwrap()).unwrap().len(), 1);
    }

    #[test]
    fn test_elimination_closes_and_schedules_one_hook() {
        let (mut t, hooks) = tracker();
        t.observe(&obs(Some("1-1"), 4, Some(1))).unwrap();
        t.observe(&obs(Some("1-2"), 4, Some(1))).unwrap();
        let id = t.active_run().unwrap();

        let transition = t.observe(&obs(Some("1-2"), 4, Some(0))).unwrap();
        let Transition::RunClosed(record) = transition else {
            panic!("expected run to close, got {transition:?}");
        };
        assert_eq!(record.end_reason, Some(EndReason::Eliminated));
        assert_eq!(record.rounds_completed, 2);
        assert_eq!(t.active_run(), None);
        assert_eq!(hooks.count(), 1);

        // Further zero-lives frames do nothing.
        t.observe(&obs(Some("1-2"), 4, Some(0))).unwrap();
        assert_eq!(hooks.count(), 1);

        let rounds = t.store().rounds(id).unwrap();
        assert_eq!(rounds[1].lives, Some(0));
        assert!(rounds[1].life_lost);
        assert_eq!(t.store().runs(1).unwrap()[0].end_reason, Some(EndReason::Eliminated));
    }

    #[test]
    fn test_out_of_range_label_does_not_wedge_run() {
        let (mut t, hooks) = tracker();
        t.observe(&obs(Some("1-1"), 2, Some(2))).unwrap();
        let id = t.active_run().unwrap();

        assert_eq!(t.observe(&obs(Some("1-12"), 2, Some(2))).unwrap(), Transition::None);
        assert_eq!(t.current_round(), RoundLabel::parse("1-1"));

        for label in ["2-1", "2-2", "2-3"] {
            assert!(matches!(
                t.observe(&obs(Some(label), 2, Some(2))).unwrap(),
                Transition::RoundRecorded { .. }
            ));
        }
        let transition = t.observe(&obs(Some("2-3"), 2, Some(0))).unwrap();
        let Transition::RunClosed(record) = transition else {
            panic!("expected run to close, got {transition:?}");
        };
        assert_eq!(record.end_reason, Some(EndReason::Eliminated));
        assert_eq!(record.rounds_completed, 4);
        assert_eq!(t.active_run(), None);
        assert_eq!(hooks.count(), 1);

        let labels: Vec<String> = t.store().rounds(id).unwrap().iter().map(|r| r.round.to_string()).collect();
        assert_eq!(labels, vec!["1-1", "2-1", "2-2", "2-3"]);
    }

    #[test]
    fn test_elimination_without_round_label() {
        let (mut t, hooks) = tracker();
        t.observe(&obs(Some("1-1"), 0, Some(1))).unwrap();
        let transition = t.observe(&obs(None, 0, Some(0))).unwrap();
        assert!(matches!(transition, Transition::RunClosed(_)));
        assert_eq!(hooks.count(), 1);
    }

    #[test]
    fn test_completion_after_final_round() {
        let config = TrackerConfig {
            total_rounds: 3,
            final_round_grace_polls: 2,
        };
        let hooks = Hooks::default();
        let mut t = RunTracker::new(SqliteRecorder::open_in_memory().unwrap(), config)
            .with_scheduler(hooks.clone());

        t.observe(&obs(Some("1-1"), 0, Some(3))).unwrap();
        t.observe(&obs(Some("1-2"), 0, Some(3))).unwrap();
        t.observe(&obs(Some("1-3"), 0, Some(3))).unwrap();
        let transition = t.observe(&obs(Some("1-4"), 0, Some(3))).unwrap();
        let Transition::RunClosed(record) = transition else {
            panic!("expected completion, got {transition:?}");
        };
        assert_eq!(record.end_reason, Some(EndReason::Completed));
        assert_eq!(record.rounds_completed, 3);
        assert_eq!(hooks.count(), 1);
    }

    #[test]
    fn test_completion_when_final_label_disappears() {
        let config = TrackerConfig {
            total_rounds: 2,
            final_round_grace_polls: 3,
        };
        let hooks = Hooks::default();
        let mut t = RunTracker::new(SqliteRecorder::open_in_memory().unwrap(), config)
            .with_scheduler(hooks.clone());

        t.observe(&obs(Some("1-1"), 2, Some(3))).unwrap();
        t.observe(&obs(Some("1-2"), 2, Some(3))).unwrap();
        assert_eq!(t.observe(&obs(None, 1, None)).unwrap(), Transition::None);
        assert_eq!(t.observe(&obs(None, 1, None)).unwrap(), Transition::None);
        let transition = t.observe(&obs(None, 1, None)).unwrap();
        assert!(matches!(transition, Transition::RunClosed(ref r) if r.end_reason == Some(EndReason::Completed)));
        assert_eq!(hooks.count(), 1);

        let runs = t.store().runs(1).unwrap();
        let rounds = t.store().rounds(runs[0].id).unwrap();
        assert_eq!(rounds.len(), 2);
        assert_eq!(rounds[1].component_count, 1);
        assert_eq!(rounds[1].items_built, 1);
        assert_eq!(rounds[1].lives, Some(3));
    }

    #[test]
    fn test_restart_abandons_then_starts_new_run() {
        let (mut t, hooks) = tracker();
        t.observe(&obs(Some("1-1"), 0, Some(3))).unwrap();
        t.observe(&obs(Some("1-2"), 0, Some(3))).unwrap();
        let first = t.active_run().unwrap();

        let transition = t.observe(&obs(Some("1-1"), 0, Some(3))).unwrap();
        assert!(matches!(transition, Transition::RunClosed(ref r) if r.end_reason == Some(EndReason::Abandoned)));
        assert_eq!(hooks.count(), 0);

        assert!(matches!(
            t.observe(&obs(Some("1-1"), 0, Some(3))).unwrap(),
            Transition::RunStarted { run_id } if run_id != first
        ));
    }

    #[test]
    fn test_shutdown_abandons_without_hook() {
        let (mut t, hooks) = tracker();
        assert_eq!(t.shutdown().unwrap(), Transition::None);
        t.observe(&obs(Some("1-1"), 0, Some(3))).unwrap();
        let transition = t.shutdown().unwrap();
        assert!(matches!(transition, Transition::RunClosed(ref r) if r.end_reason == Some(EndReason::Abandoned)));
        assert_eq!(hooks.count(), 0);
        assert_eq!(t.active_run(), None);
    }

    #[test]
    fn test_failed_snapshot_is_retried() {
        let fail_append = Arc::new(AtomicBool::new(false));
        let store = Flaky {
            inner: SqliteRecorder::open_in_memory().unwrap(),
            fail_append: fail_append.clone(),
            fail_close: Arc::new(AtomicBool::new(false)),
        };
        let mut t = RunTracker::new(store, TrackerConfig::default());

        t.observe(&obs(Some("1-1"), 5, Some(3))).unwrap();
        fail_append.store(true, Ordering::SeqCst);
        assert!(t.observe(&obs(Some("1-2"), 4, Some(3))).is_err());
        assert_eq!(t.current_round(), RoundLabel::parse("1-1"));

        fail_append.store(false, Ordering::SeqCst);
        t.observe(&obs(Some("1-2"), 4, Some(3))).unwrap();
        assert_eq!(t.current_round(), RoundLabel::parse("1-2"));
        let rounds = t.store().inner.rounds(t.active_run().unwrap()).unwrap();
        assert_eq!(rounds.len(), 1);
        assert_eq!(rounds[0].items_built, 1);
    }

    #[test]
    fn test_failed_close_is_retried_before_next_input() {
        let fail_close = Arc::new(AtomicBool::new(true));
        let store = Flaky {
            inner: SqliteRecorder::open_in_memory().unwrap(),
            fail_append: Arc::new(AtomicBool::new(false)),
            fail_close: fail_close.clone(),
        };
        let hooks = Hooks::default();
        let mut t = RunTracker::new(store, TrackerConfig::default()).with_scheduler(hooks.clone());

        t.observe(&obs(Some("1-1"), 0, Some(1))).unwrap();
        assert!(t.observe(&obs(Some("1-1"), 0, Some(0))).is_err());
        assert!(t.active_run().is_some());
        assert_eq!(hooks.count(), 0);

        fail_close.store(false, Ordering::SeqCst);
        let transition = t.observe(&obs(None, 0, None)).unwrap();
        assert!(matches!(transition, Transition::RunClosed(ref r) if r.end_reason == Some(EndReason::Eliminated)));
        assert_eq!(hooks.count(), 1);
        let runs = t.store().inner.runs(1).unwrap();
        assert_eq!(runs[0].rounds_completed, 1);
    }
}
