use crate::RunRecord;
use anyhow::{Context, Result};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use tracing::{error, info, warn};

/// Job run after a run closes as eliminated or completed
pub trait PostRunHook: Send + 'static {
    fn on_run_closed(&self, run: &RunRecord) -> Result<()>;
}

/// Hands a closed run to the hook without waiting for it
pub trait PostRunScheduler: Send {
    fn schedule(&self, run: RunRecord);
}

enum HookCommand {
    Run(RunRecord),
    Shutdown,
}

/// Runs a [`PostRunHook`] on its own thread, one job at a time
pub struct PostRunWorker {
    sender: mpsc::Sender<HookCommand>,
    worker: Option<JoinHandle<()>>,
}

impl PostRunWorker {
    pub fn spawn<H: PostRunHook>(hook: H) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<HookCommand>();

        let worker = thread::Builder::new()
            .name("tocker-post-run".into())
            .spawn(move || {
                while let Ok(command) = receiver.recv() {
                    match command {
                        HookCommand::Run(run) => {
                            info!("Post-run job started for run {}", run.id);
                            if let Err(err) = hook.on_run_closed(&run) {
                                error!("Post-run job for run {} failed: {err:#}", run.id);
                            }
                        }
                        HookCommand::Shutdown => break,
                    }
                }
                info!("Post-run worker shutting down");
            })
            .context("failed to spawn post-run worker thread")?;

        Ok(Self {
            sender,
            worker: Some(worker),
        })
    }
}

impl PostRunScheduler for PostRunWorker {
    fn schedule(&self, run: RunRecord) {
        let id = run.id;
        if self.sender.send(HookCommand::Run(run)).is_err() {
            warn!("Post-run worker is gone; dropping job for run {}", id);
        }
    }
}

impl Drop for PostRunWorker {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.take() {
            let _ = self.sender.send(HookCommand::Shutdown);
            if let Err(err) = handle.join() {
                error!("Failed to join post-run worker: {err:?}");
            }
        }
    }
}
