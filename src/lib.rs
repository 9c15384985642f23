pub mod companion;
pub mod config;
pub mod pipeline;
pub mod presentation;

pub use companion::Companion;
pub use config::{AppConfig, ConfigError};
pub use pipeline::{Pipeline, PollWorker, StepOutcome};
pub use presentation::{NextRound, OverlayUpdate};

use anyhow::{Context, Result};
use std::sync::Arc;
use tft_advisor::{ScoringEngine, StrategyRefresh, StrategyText};
use tft_capture::FrameSource;
use tft_data::ReferenceStore;
use tft_runs::{PostRunWorker, RunTracker, SqliteRecorder};
use tft_vision::{DigitReader, StateReader, TemplateSets};
use tokio::io::AsyncBufReadExt;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

/// Capacity of the overlay update queue; older updates are dropped when full
const UPDATE_QUEUE: usize = 8;

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tocker_overlay=debug,tft_vision=info,tft_runs=debug".into()),
        )
        .init();
}

/// Reference data from `tft.db`, or just the round structure when it is missing
pub fn open_reference(config: &AppConfig) -> Result<ReferenceStore> {
    let path = config.reference_db();
    if path.exists() {
        ReferenceStore::open(&path)
    } else {
        warn!(
            "Reference dataset {} not found; enemy boards and augments unavailable",
            path.display()
        );
        ReferenceStore::standard_rounds(config.total_rounds)
    }
}

/// Run the overlay until the source finishes or Ctrl-C.
/// Updates go to stdout as JSON lines; stdin lines are questions for the advisor.
pub async fn run(config: AppConfig, source: Box<dyn FrameSource>) -> Result<()> {
    info!("Frame source: {}", source.describe());

    let reference = Arc::new(open_reference(&config)?);
    let scoring = Arc::new(ScoringEngine::new(reference).with_total_rounds(config.total_rounds));
    let strategy = Arc::new(StrategyText::load(&config.strategy_file())?);

    let recorder = SqliteRecorder::open(&config.runs_db()).context("run store unavailable")?;
    let hook = PostRunWorker::spawn(StrategyRefresh::new(strategy.clone(), &config.runs_db()))?;
    let tracker = RunTracker::new(recorder, config.tracker()).with_scheduler(hook);

    let templates_dir = config.templates_dir();
    let layout = config.layout.clone();
    let thresholds = config.thresholds;
    let reader = tokio::task::spawn_blocking(move || -> Result<StateReader> {
        let templates = TemplateSets::load(&templates_dir)?;
        let digits = DigitReader::new();
        if !digits.is_available() {
            warn!("Tesseract not found; gold, level, lives and round will be unknown");
        }
        Ok(StateReader::new(layout, thresholds, templates).with_numeric_reader(digits))
    })
    .await??;

    let (observation_tx, observation_rx) = watch::channel(None);
    let companion = Arc::new(Companion::new(strategy, scoring.clone(), observation_rx.clone()));
    let worker = PollWorker::new(source, reader, scoring, tracker).with_advice(companion.advice());

    let (updates_tx, mut updates_rx) = mpsc::channel::<OverlayUpdate>(UPDATE_QUEUE);
    let pipeline = Pipeline::start_with_channel(
        worker,
        config.poll_interval(),
        updates_tx,
        observation_tx,
        observation_rx,
    );

    let printer = tokio::spawn(async move {
        while let Some(update) = updates_rx.recv().await {
            match serde_json::to_string(&update) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Failed to encode update: {}", e),
            }
        }
    });

    let chat_companion = companion.clone();
    let chat = tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            let reply = match chat_companion.ask(&line).await {
                Ok(answer) => serde_json::json!({ "advice": answer }),
                Err(e) => serde_json::json!({ "error": e.to_string() }),
            };
            println!("{}", reply);
        }
    });

    let stop = pipeline.stop_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            stop.store(true, std::sync::atomic::Ordering::Relaxed);
        }
    });

    pipeline.join().await;
    chat.abort();
    let _ = printer.await;
    Ok(())
}
