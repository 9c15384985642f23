use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::presentation::OverlayUpdate;
use tft_advisor::ScoringEngine;
use tft_capture::FrameSource;
use tft_runs::{RunStore, RunTracker, Transition};
use tft_state::Observation;
use tft_vision::StateReader;

/// Result of one poll
#[derive(Debug)]
pub struct StepOutcome {
    pub observation: Arc<Observation>,
    pub transition: Transition,
    pub update: OverlayUpdate,
}

/// Owns everything a poll touches. Moved onto a blocking thread for each step,
/// so the tracker and its store only ever have one writer.
pub struct PollWorker<S: RunStore> {
    source: Box<dyn FrameSource>,
    reader: StateReader,
    scoring: Arc<ScoringEngine>,
    tracker: RunTracker<S>,
    advice: Option<watch::Receiver<Option<String>>>,
}

impl<S: RunStore> PollWorker<S> {
    pub fn new(
        source: Box<dyn FrameSource>,
        reader: StateReader,
        scoring: Arc<ScoringEngine>,
        tracker: RunTracker<S>,
    ) -> Self {
        Self {
            source,
            reader,
            scoring,
            tracker,
            advice: None,
        }
    }

    pub fn with_advice(mut self, advice: watch::Receiver<Option<String>>) -> Self {
        self.advice = Some(advice);
        self
    }

    pub fn tracker(&self) -> &RunTracker<S> {
        &self.tracker
    }

    pub fn source_finished(&self) -> bool {
        self.source.finished()
    }

    /// Capture, read and ingest one frame. `None` when the source had nothing.
    pub fn step(&mut self) -> Option<StepOutcome> {
        let frame = self.source.frame()?;
        let observation = self.reader.read(&frame);
        Some(self.ingest(observation))
    }

    /// Run an observation through the tracker and build the overlay update
    pub fn ingest(&mut self, observation: Observation) -> StepOutcome {
        let transition = match self.tracker.observe(&observation) {
            Ok(t) => t,
            Err(e) => {
                warn!("Run tracking failed, retrying next poll: {e:#}");
                Transition::None
            }
        };
        if transition != Transition::None {
            debug!("Run transition: {:?}", transition);
        }

        let advice = self.advice.as_ref().and_then(|rx| rx.borrow().clone());
        let update = OverlayUpdate::build(&observation, &self.scoring, advice);
        StepOutcome {
            observation: Arc::new(observation),
            transition,
            update,
        }
    }

    /// Close any active run as abandoned
    pub fn shutdown(&mut self) -> Transition {
        match self.tracker.shutdown() {
            Ok(t) => t,
            Err(e) => {
                warn!("Failed to close active run on shutdown: {e:#}");
                Transition::None
            }
        }
    }
}

/// The polling loop: sole producer of observations
pub struct Pipeline {
    stop: Arc<AtomicBool>,
    observation_rx: watch::Receiver<Option<Arc<Observation>>>,
    handle: JoinHandle<()>,
}

impl Pipeline {
    pub fn start<S: RunStore + 'static>(
        worker: PollWorker<S>,
        interval: Duration,
        updates: mpsc::Sender<OverlayUpdate>,
    ) -> Self {
        let (observation_tx, observation_rx) = watch::channel::<Option<Arc<Observation>>>(None);
        Self::start_with_channel(worker, interval, updates, observation_tx, observation_rx)
    }

    /// Start on an existing observation channel, for consumers created before the loop
    pub fn start_with_channel<S: RunStore + 'static>(
        worker: PollWorker<S>,
        interval: Duration,
        updates: mpsc::Sender<OverlayUpdate>,
        observation_tx: watch::Sender<Option<Arc<Observation>>>,
        observation_rx: watch::Receiver<Option<Arc<Observation>>>,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_loop = stop.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut worker = worker;

            loop {
                ticker.tick().await;
                if stop_loop.load(Ordering::Relaxed) {
                    break;
                }
                if worker.source_finished() {
                    info!("Frame source finished");
                    break;
                }

                let joined = tokio::task::spawn_blocking(move || {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| worker.step()));
                    (worker, outcome)
                })
                .await;
                let outcome = match joined {
                    Ok((w, Ok(outcome))) => {
                        worker = w;
                        outcome
                    }
                    Ok((w, Err(_))) => {
                        warn!("Poll step panicked; stopping pipeline");
                        worker = w;
                        break;
                    }
                    Err(e) => {
                        warn!("Poll task failed; stopping pipeline: {}", e);
                        return;
                    }
                };

                let Some(outcome) = outcome else {
                    continue;
                };
                observation_tx.send_replace(Some(outcome.observation));
                if let Err(mpsc::error::TrySendError::Full(_)) = updates.try_send(outcome.update) {
                    debug!("Overlay consumer behind; dropping update");
                }
            }

            // Dropping the worker joins the post-run thread, so it happens off the runtime.
            let closed = tokio::task::spawn_blocking(move || {
                let transition = worker.shutdown();
                drop(worker);
                transition
            })
            .await;
            match closed {
                Ok(Transition::RunClosed(run)) => info!("Run {} abandoned on shutdown", run.id),
                Ok(_) => {}
                Err(e) => warn!("Shutdown step panicked: {}", e),
            }
            info!("Pipeline stopped");
        });

        info!("Pipeline started ({:?} per poll)", interval);
        Self {
            stop,
            observation_rx,
            handle,
        }
    }

    /// Ask the loop to exit at its next iteration
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        info!("Pipeline stop requested");
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn latest_observation(&self) -> Option<Arc<Observation>> {
        self.observation_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Observation>>> {
        self.observation_rx.clone()
    }

    /// Wait for the loop, including the shutdown of any active run
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            warn!("Pipeline task failed: {}", e);
        }
    }
}
