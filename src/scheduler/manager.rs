use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{CronmanError, Result};
use crate::schedule;
use crate::scheduler::entries::EntryList;
use crate::scheduler::job::{JobDefinition, JobId, JobRun};
use crate::store::JobStore;

/// Capacity of the control channel. Sends await until the loop drains
/// them; there is no send timeout.
const CONTROL_CHANNEL_BUFFER: usize = 16;

/// Timer armed when no entry has a future fire. Channel events preempt it,
/// so the exact value only bounds how often an idle scheduler wakes. Kept
/// well under tokio's ~2.2 year sleep ceiling.
const IDLE_TIMER: Duration = Duration::from_secs(86_400 * 365);

/// Schedule mutations. One channel carries both so add/remove sequences
/// issued by a single caller are processed in issue order.
#[derive(Debug)]
enum ControlMessage {
    Add(JobDefinition),
    Remove(JobId),
}

/// Channel-facing API of the scheduler. Sends fail with `Unavailable` once
/// the loop has exited; callers must not submit after requesting stop.
#[derive(Clone)]
pub struct SchedulerHandle {
    control_tx: mpsc::Sender<ControlMessage>,
    token: CancellationToken,
}

impl SchedulerHandle {
    pub async fn add(&self, job: JobDefinition) -> Result<()> {
        self.control_tx
            .send(ControlMessage::Add(job))
            .await
            .map_err(|_| CronmanError::Unavailable)
    }

    pub async fn remove(&self, job_id: JobId) -> Result<()> {
        self.control_tx
            .send(ControlMessage::Remove(job_id))
            .await
            .map_err(|_| CronmanError::Unavailable)
    }

    /// Request the loop to exit. In-flight fires already handed to the
    /// runner are not cancelled.
    pub fn stop(&self) {
        self.token.cancel();
    }
}

/// The single task that owns the schedule.
///
/// All schedule state is confined to this task; external callers interact
/// only through the [`SchedulerHandle`] channels. Each pass sorts the
/// entries, arms a timer for the earliest fire, and multiplexes over timer
/// expiry, add, remove, and stop.
pub struct Scheduler {
    entries: EntryList,
    control_rx: mpsc::Receiver<ControlMessage>,
    run_tx: mpsc::Sender<JobRun>,
    store: Arc<JobStore>,
    tz: Option<Tz>,
    token: CancellationToken,
}

impl Scheduler {
    /// Build a scheduler seeded with the jobs loaded at startup. `run_tx`
    /// is the runner's inbound channel; submitting blocks when it is full.
    pub fn new(
        seed: Vec<JobDefinition>,
        run_tx: mpsc::Sender<JobRun>,
        store: Arc<JobStore>,
        tz: Option<Tz>,
    ) -> (Self, SchedulerHandle) {
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_BUFFER);
        let token = CancellationToken::new();

        let scheduler = Self {
            entries: EntryList::new(seed),
            control_rx,
            run_tx,
            store,
            tz,
            token: token.clone(),
        };
        let handle = SchedulerHandle { control_tx, token };
        (scheduler, handle)
    }

    pub async fn run(mut self) {
        tracing::info!(jobs = self.entries.len(), "Scheduler starting");
        self.reschedule_seed().await;

        loop {
            self.entries.sort();
            // A fire further out than the idle timer (a leap-day expression,
            // say) just wakes early, finds nothing due, and re-arms.
            let wait = match self.entries.earliest() {
                Some(next) => (next - Utc::now())
                    .to_std()
                    .unwrap_or(Duration::ZERO)
                    .min(IDLE_TIMER),
                None => IDLE_TIMER,
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    let now = Utc::now();
                    tracing::debug!(%now, "Timer expired");
                    self.fire_due(now).await;
                }
                Some(message) = self.control_rx.recv() => {
                    match message {
                        ControlMessage::Add(job) => self.handle_add(job).await,
                        ControlMessage::Remove(job_id) => self.handle_remove(&job_id).await,
                    }
                }
                _ = self.token.cancelled() => {
                    tracing::info!("Scheduler stop requested, exiting the loop");
                    break;
                }
            }
        }
    }

    /// Recompute `next_run` for every seeded job. Stale values persisted by
    /// an earlier process are replaced, so fires missed while the daemon was
    /// down are skipped rather than replayed.
    async fn reschedule_seed(&mut self) {
        let now = Utc::now();
        for job in self.entries.iter_mut() {
            match schedule::next_after(&job.cron_expr, now, self.tz) {
                Ok(next) => job.next_run = next,
                Err(e) => {
                    tracing::error!(job_id = %job.id, error = %e, "Parking job with bad cron expression");
                    job.next_run = None;
                }
            }
            if let Err(e) = self.store.record_next_run(&job.id, job.next_run).await {
                tracing::error!(job_id = %job.id, error = %e, "Failed to persist next run");
            }
        }
    }

    /// Fire every entry due at `now`, in `(next_run, id)` order. Multiple
    /// fire points missed in one sleep collapse into a single run; `next_run`
    /// advances straight to the first future instant.
    async fn fire_due(&mut self, now: chrono::DateTime<chrono::Utc>) {
        let tz = self.tz;
        let mut fired: Vec<(JobId, Option<chrono::DateTime<chrono::Utc>>)> = Vec::new();

        for job in self.entries.iter_mut() {
            let due = match job.next_run {
                Some(next) if next <= now => next,
                // Sorted order: the first future or parked entry ends the walk.
                _ => break,
            };

            let run = JobRun::new(job.clone(), due);
            tracing::info!(
                job_id = %job.id,
                run_id = %run.run_id,
                scheduled_at = %due,
                "Dispatching job run"
            );
            if let Err(e) = self.run_tx.send(run).await {
                // A closed run channel never reopens. Leaving the stale
                // next_run in place would make every subsequent tick walk
                // into this entry again, so park it instead.
                tracing::error!(job_id = %job.id, error = %e, "Runner channel closed, parking job");
                job.next_run = None;
                fired.push((job.id.clone(), None));
                continue;
            }

            job.next_run = match schedule::next_after(&job.cron_expr, now, tz) {
                Ok(next) => next,
                Err(e) => {
                    tracing::error!(job_id = %job.id, error = %e, "Parking job with bad cron expression");
                    None
                }
            };
            fired.push((job.id.clone(), job.next_run));
        }

        for (job_id, next_run) in fired {
            match self.store.record_next_run(&job_id, next_run).await {
                Ok(()) => {}
                Err(CronmanError::JobNotFound(_)) => {
                    // Deleted while firing; the remove message is on its way.
                    tracing::debug!(job_id = %job_id, "Fired job no longer in the store");
                }
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "Failed to persist next run");
                }
            }
        }
    }

    async fn handle_add(&mut self, mut job: JobDefinition) {
        let now = Utc::now();
        job.next_run = match schedule::next_after(&job.cron_expr, now, self.tz) {
            Ok(next) => next,
            Err(e) => {
                // Validation happens at ingress; a bad expression here is a
                // seed from a hand-edited document. Park it.
                tracing::error!(job_id = %job.id, error = %e, "Parking job with bad cron expression");
                None
            }
        };
        // The facade persisted the definition before signalling us, so only
        // next_run needs to land on disk. A missing record means the job was
        // deleted while this message was queued; scheduling it anyway would
        // leave an entry the store no longer knows.
        match self.store.record_next_run(&job.id, job.next_run).await {
            Ok(()) => {
                tracing::info!(
                    job_id = %job.id,
                    next_run = ?job.next_run,
                    "Added job to the schedule"
                );
                self.entries.upsert(job);
            }
            Err(CronmanError::JobNotFound(_)) => {
                tracing::warn!(job_id = %job.id, "Job deleted before scheduling, dropping add");
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Failed to persist next run");
                self.entries.upsert(job);
            }
        }
    }

    async fn handle_remove(&mut self, job_id: &str) {
        // Persistence of the removal belongs to the facade; this only drops
        // the schedule entry.
        if self.entries.remove(job_id) {
            tracing::info!(job_id, "Removed job from the schedule");
        } else {
            tracing::warn!(job_id, "Remove requested for a job not in the schedule");
        }
    }
}
