//! Bounded-concurrency job execution.
//!
//! The dispatch loop receives [`JobRun`]s on the run channel and launches
//! each in its own task. Admission is a semaphore sized at
//! `max_running_jobs`: runs past the cap wait for a permit instead of being
//! dropped, so every accepted fire eventually executes while the active set
//! never exceeds the cap. Overlapping runs of the same job are permitted.

pub mod executor;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::error::{CronmanError, Result};
use crate::scheduler::job::{JobRun, RunState};
use crate::store::JobStore;

pub const DEFAULT_MAX_RUNNING_JOBS: usize = 100;
pub const DEFAULT_RUN_CHANNEL_BUFFER: usize = 50;
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(60);
const MONITOR_INTERVAL: Duration = Duration::from_secs(60);
const DRAIN_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub max_running_jobs: usize,
    pub run_channel_buffer: usize,
    pub stop_grace: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_running_jobs: DEFAULT_MAX_RUNNING_JOBS,
            run_channel_buffer: DEFAULT_RUN_CHANNEL_BUFFER,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }
}

/// Bookkeeping for one active run; the child handle stays inside the run
/// task, only the pid is recorded here so `stop` can signal it.
#[derive(Debug, Clone)]
struct ActiveRun {
    job_id: String,
    pid: Option<u32>,
    ran_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Shared {
    active: Mutex<HashMap<String, ActiveRun>>,
    token: CancellationToken,
}

/// The dispatch half: owns the run channel receiver.
pub struct JobRunner {
    shared: Arc<Shared>,
    store: Arc<JobStore>,
    semaphore: Arc<Semaphore>,
    run_rx: mpsc::Receiver<JobRun>,
}

/// The control half handed to the supervisor: stop and introspection.
#[derive(Clone)]
pub struct RunnerHandle {
    shared: Arc<Shared>,
    stop_grace: Duration,
}

impl JobRunner {
    pub fn new(
        config: &RunnerConfig,
        store: Arc<JobStore>,
        run_rx: mpsc::Receiver<JobRun>,
    ) -> (Self, RunnerHandle) {
        let shared = Arc::new(Shared::default());
        let runner = Self {
            shared: shared.clone(),
            store,
            semaphore: Arc::new(Semaphore::new(config.max_running_jobs)),
            run_rx,
        };
        let handle = RunnerHandle {
            shared,
            stop_grace: config.stop_grace,
        };
        (runner, handle)
    }

    /// Dispatch loop: one task per received run. Exits when the stop token
    /// fires or every sender is gone.
    pub async fn start(mut self) {
        tracing::info!("Job runner starting");
        self.spawn_monitor();

        loop {
            tokio::select! {
                received = self.run_rx.recv() => {
                    match received {
                        Some(run) => self.launch(run),
                        None => {
                            tracing::info!("Run channel closed, dispatch exiting");
                            break;
                        }
                    }
                }
                _ = self.shared.token.cancelled() => {
                    tracing::info!("Stop requested, dispatch exiting");
                    break;
                }
            }
        }
    }

    fn launch(&self, run: JobRun) {
        tracing::info!(job_id = %run.job.id, run_id = %run.run_id, "Received job run");
        let shared = self.shared.clone();
        let store = self.store.clone();
        let semaphore = self.semaphore.clone();
        tokio::spawn(async move {
            run_one(run, store, shared, semaphore).await;
        });
    }

    /// Periodic snapshot of the active set, logged while dispatch is alive.
    fn spawn_monitor(&self) {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(MONITOR_INTERVAL);
            ticker.tick().await; // first tick is immediate; skip it
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let active = shared.active.lock().await;
                        tracing::info!(running = active.len(), "Job runner monitor");
                        for (run_id, entry) in active.iter() {
                            tracing::info!(
                                run_id = %run_id,
                                job_id = %entry.job_id,
                                pid = ?entry.pid,
                                ran_at = %entry.ran_at,
                                "Active run"
                            );
                        }
                    }
                    _ = shared.token.cancelled() => return,
                }
            }
        });
    }
}

async fn run_one(
    mut run: JobRun,
    store: Arc<JobStore>,
    shared: Arc<Shared>,
    semaphore: Arc<Semaphore>,
) {
    // Admission: wait for a free slot, unless stop wins the race first.
    let permit = tokio::select! {
        permit = semaphore.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return,
        },
        _ = shared.token.cancelled() => {
            tracing::warn!(job_id = %run.job.id, run_id = %run.run_id, "Runner stopping, run not started");
            return;
        }
    };

    let mut child = match executor::spawn_child(&run.job) {
        Ok(child) => child,
        Err(e) => {
            run.state = RunState::Failed;
            tracing::error!(job_id = %run.job.id, run_id = %run.run_id, error = %e, "Run failed to start");
            drop(permit);
            return;
        }
    };

    let ran_at = Utc::now();
    run.ran_at = Some(ran_at);
    run.state = RunState::Running;
    shared.active.lock().await.insert(
        run.run_id.clone(),
        ActiveRun {
            job_id: run.job.id.clone(),
            pid: child.id(),
            ran_at,
        },
    );
    tracing::info!(
        job_id = %run.job.id,
        run_id = %run.run_id,
        pid = ?child.id(),
        "Run started"
    );

    // last_run is stamped only once the process has actually started.
    if let Err(e) = store.record_last_run(&run.job.id, ran_at).await {
        tracing::error!(job_id = %run.job.id, error = %e, "Failed to persist last run");
    }

    let wait_result = child.wait().await;
    run.completed_at = Some(Utc::now());
    match wait_result {
        Ok(status) => {
            let (state, error) = executor::classify_exit(status);
            run.state = state;
            match state {
                RunState::Completed => {
                    tracing::info!(job_id = %run.job.id, run_id = %run.run_id, "Run completed")
                }
                _ => tracing::warn!(
                    job_id = %run.job.id,
                    run_id = %run.run_id,
                    state = %state,
                    error = ?error,
                    "Run did not complete cleanly"
                ),
            }
        }
        Err(e) => {
            run.state = RunState::Failed;
            tracing::error!(job_id = %run.job.id, run_id = %run.run_id, error = %e, "Wait on child failed");
        }
    }

    shared.active.lock().await.remove(&run.run_id);
    drop(permit);
}

impl RunnerHandle {
    /// Number of runs currently holding a slot.
    pub async fn active_count(&self) -> usize {
        self.shared.active.lock().await.len()
    }

    /// Stop dispatch, SIGTERM every active child, and wait up to the grace
    /// period for them to exit. Children still alive afterwards are reported
    /// but not SIGKILLed; an escalating supervisor may do that.
    pub async fn stop(&self) -> Result<()> {
        tracing::info!("Stopping the job runner");
        self.shared.token.cancel();

        let targets: Vec<(String, String, Option<u32>)> = {
            let active = self.shared.active.lock().await;
            active
                .iter()
                .map(|(run_id, entry)| (run_id.clone(), entry.job_id.clone(), entry.pid))
                .collect()
        };
        for (run_id, job_id, pid) in targets {
            let Some(pid) = pid else { continue };
            tracing::info!(run_id = %run_id, job_id = %job_id, pid, "Sending SIGTERM to running job");
            if let Err(e) = nix::sys::signal::kill(
                nix::unistd::Pid::from_raw(pid as i32),
                nix::sys::signal::Signal::SIGTERM,
            ) {
                tracing::warn!(run_id = %run_id, pid, error = %e, "Failed to signal child");
            }
        }

        let deadline = tokio::time::Instant::now() + self.stop_grace;
        loop {
            let remaining = self.active_count().await;
            if remaining == 0 {
                tracing::info!("Job runner stopped, no active runs remain");
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::error!(remaining, "Jobs still running after the stop grace period");
                return Err(CronmanError::RunnersStillActive(remaining));
            }
            tokio::time::sleep(DRAIN_POLL).await;
        }
    }
}
