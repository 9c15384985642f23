use image::{Rgba, RgbaImage};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::Duration;
use tft_advisor::ScoringEngine;
use tft_capture::{FrameSource, StillImageSource};
use tft_data::ReferenceStore;
use tft_runs::{
    EndReason, PostRunScheduler, RunRecord, RunStore, RunTracker, SqliteRecorder, TrackerConfig,
    Transition,
};
use tft_state::{ItemSighting, Observation, RoundLabel};
use tft_vision::{MatchThresholds, NumericField, NumericReader, StateReader, TemplateSets, ZoneLayout};
use tocker_overlay::{Pipeline, PollWorker};
use tokio::sync::mpsc;

#[derive(Clone, Default)]
struct Hooks(Arc<Mutex<Vec<RunRecord>>>);

impl PostRunScheduler for Hooks {
    fn schedule(&self, run: RunRecord) {
        self.0.lock().unwrap().push(run);
    }
}

fn scoring() -> Arc<ScoringEngine> {
    Arc::new(ScoringEngine::new(Arc::new(ReferenceStore::standard_rounds(30).unwrap())))
}

fn reader() -> StateReader {
    StateReader::new(ZoneLayout::default(), MatchThresholds::default(), TemplateSets::empty())
}

fn observation(label: &str, components: usize, lives: u32) -> Observation {
    Observation {
        round: RoundLabel::parse(label),
        lives: Some(lives),
        gold: Some(20),
        items: (0..components)
            .map(|i| ItemSighting {
                item: "TFT_Item_RecurveBow".into(),
                x: 400 + i as u32 * 60,
                y: 1200,
                confidence: 0.9,
            })
            .collect(),
        ..Default::default()
    }
}

fn worker<S: RunStore>(store: S, hooks: &Hooks) -> PollWorker<S> {
    let tracker = RunTracker::new(store, TrackerConfig::default()).with_scheduler(hooks.clone());
    PollWorker::new(Box::new(StillImageSource::blank(4, 4)), reader(), scoring(), tracker)
}

#[test]
fn scripted_observations_drive_runs_and_updates() {
    let hooks = Hooks::default();
    let mut worker = worker(SqliteRecorder::open_in_memory().unwrap(), &hooks);

    let started = worker.ingest(observation("1-1", 5, 3));
    let Transition::RunStarted { run_id } = started.transition else {
        panic!("expected run start, got {:?}", started.transition);
    };
    assert_eq!(started.update.components, 5);
    assert_eq!(started.update.score.rounds_remaining, 29);

    assert_eq!(worker.ingest(observation("1-1", 5, 3)).transition, Transition::None);

    let advanced = worker.ingest(observation("1-2", 3, 3));
    assert_eq!(
        advanced.transition,
        Transition::RoundRecorded {
            run_id,
            round: RoundLabel::FIRST
        }
    );
    assert_eq!(advanced.update.interest, 2);
    assert_eq!(advanced.update.next_round.as_ref().unwrap().round_type, "standard");

    let rounds = worker.tracker().store().rounds(run_id).unwrap();
    assert_eq!(rounds.len(), 1);
    assert_eq!(rounds[0].items_built, 2);

    let closed = worker.shutdown();
    assert!(matches!(closed, Transition::RunClosed(ref r) if r.end_reason == Some(EndReason::Abandoned)));
    assert!(hooks.0.lock().unwrap().is_empty());
    assert_eq!(worker.shutdown(), Transition::None);
}

/// Frames whose pixels encode their index, so a scripted reader knows which one it sees
struct IndexedFrames {
    next: usize,
    total: usize,
}

impl FrameSource for IndexedFrames {
    fn frame(&mut self) -> Option<Arc<RgbaImage>> {
        if self.next >= self.total {
            return None;
        }
        let index = self.next as u8;
        self.next += 1;
        Some(Arc::new(RgbaImage::from_pixel(2560, 1440, Rgba([index, 0, 0, 255]))))
    }

    fn describe(&self) -> String {
        "indexed test frames".to_string()
    }

    fn finished(&self) -> bool {
        self.next >= self.total
    }
}

struct ScriptedReader {
    script: Vec<(&'static str, u32)>,
}

impl ScriptedReader {
    fn entry(&self, crop: &RgbaImage) -> Option<(&'static str, u32)> {
        let index = crop.get_pixel(0, 0)[0] as usize;
        self.script.get(index).copied()
    }
}

impl NumericReader for ScriptedReader {
    fn read_number(&self, crop: &RgbaImage, field: NumericField) -> Option<u32> {
        let (_, lives) = self.entry(crop)?;
        match field {
            NumericField::Lives => Some(lives),
            NumericField::Gold => Some(12),
            NumericField::Level => Some(3),
        }
    }

    fn read_round(&self, crop: &RgbaImage) -> Option<RoundLabel> {
        RoundLabel::parse(self.entry(crop)?.0)
    }
}

#[tokio::test]
async fn polling_loop_records_an_eliminated_run() {
    let dir = tempfile::tempdir().unwrap();
    let runs_db = dir.path().join("runs.db");
    let hooks = Hooks::default();

    let script = vec![("1-1", 3), ("1-1", 3), ("1-2", 3), ("1-3", 1), ("1-3", 0)];
    let total = script.len();
    let reader = reader().with_numeric_reader(ScriptedReader { script });
    let tracker = RunTracker::new(SqliteRecorder::open(&runs_db).unwrap(), TrackerConfig::default())
        .with_scheduler(hooks.clone());
    let worker = PollWorker::new(
        Box::new(IndexedFrames { next: 0, total }),
        reader,
        scoring(),
        tracker,
    );

    let (tx, mut rx) = mpsc::channel(16);
    let pipeline = Pipeline::start(worker, Duration::from_millis(5), tx);
    let observations = pipeline.subscribe();
    pipeline.join().await;

    let mut updates = Vec::new();
    while let Some(update) = rx.recv().await {
        updates.push(update);
    }
    assert_eq!(updates.len(), total);
    assert_eq!(updates[2].absolute_round, 2);
    assert_eq!(updates[4].lives, Some(0));

    let last = observations.borrow().clone().unwrap();
    assert_eq!(last.round, RoundLabel::parse("1-3"));

    let hooks = hooks.0.lock().unwrap();
    assert_eq!(hooks.len(), 1);
    assert_eq!(hooks[0].end_reason, Some(EndReason::Eliminated));
    assert_eq!(hooks[0].rounds_completed, 3);

    let store = SqliteRecorder::open_read_only(&runs_db).unwrap();
    let runs = store.runs(5).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].end_reason, Some(EndReason::Eliminated));
    let rounds = store.rounds(runs[0].id).unwrap();
    let labels: Vec<String> = rounds.iter().map(|r| r.round.to_string()).collect();
    assert_eq!(labels, vec!["1-1", "1-2", "1-3"]);
    assert!(rounds[1].life_lost);
    assert!(rounds[2].life_lost);
}

/// Scheduler that remembers which thread dropped it
struct DropSite(Arc<Mutex<Option<ThreadId>>>);

impl PostRunScheduler for DropSite {
    fn schedule(&self, _run: RunRecord) {}
}

impl Drop for DropSite {
    fn drop(&mut self) {
        *self.0.lock().unwrap() = Some(std::thread::current().id());
    }
}

#[tokio::test]
async fn worker_is_released_off_the_runtime_thread() {
    let dropped_on = Arc::new(Mutex::new(None));
    let tracker = RunTracker::new(SqliteRecorder::open_in_memory().unwrap(), TrackerConfig::default())
        .with_scheduler(DropSite(dropped_on.clone()));
    let worker = PollWorker::new(
        Box::new(IndexedFrames { next: 0, total: 1 }),
        reader(),
        scoring(),
        tracker,
    );

    let (tx, _rx) = mpsc::channel(4);
    Pipeline::start(worker, Duration::from_millis(5), tx).join().await;

    let site = dropped_on.lock().unwrap().take().expect("scheduler was never dropped");
    assert_ne!(site, std::thread::current().id());
}

/// Serves one frame, then panics as a failing capture backend would
struct FailingFrames {
    served: bool,
}

impl FrameSource for FailingFrames {
    fn frame(&mut self) -> Option<Arc<RgbaImage>> {
        if self.served {
            panic!("capture backend failed");
        }
        self.served = true;
        Some(Arc::new(RgbaImage::from_pixel(2560, 1440, Rgba([0, 0, 0, 255]))))
    }

    fn describe(&self) -> String {
        "failing test frames".to_string()
    }
}

#[tokio::test]
async fn panicking_step_still_abandons_active_run() {
    let dir = tempfile::tempdir().unwrap();
    let runs_db = dir.path().join("runs.db");
    let hooks = Hooks::default();

    let reader = reader().with_numeric_reader(ScriptedReader {
        script: vec![("1-1", 3)],
    });
    let tracker = RunTracker::new(SqliteRecorder::open(&runs_db).unwrap(), TrackerConfig::default())
        .with_scheduler(hooks.clone());
    let worker = PollWorker::new(Box::new(FailingFrames { served: false }), reader, scoring(), tracker);

    let (tx, _rx) = mpsc::channel(4);
    Pipeline::start(worker, Duration::from_millis(5), tx).join().await;

    let store = SqliteRecorder::open_read_only(&runs_db).unwrap();
    let runs = store.runs(5).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].end_reason, Some(EndReason::Abandoned));
    assert!(hooks.0.lock().unwrap().is_empty());
}
