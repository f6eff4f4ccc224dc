//! The control facade behind the REST adapter.
//!
//! Every operation writes through the job store before touching the
//! scheduler, so a successful reply guarantees the on-disk document already
//! reflects the change. When the scheduler channels are closed (shutdown in
//! progress) the persistence change is rolled back and the caller gets
//! `Unavailable`.

use std::sync::Arc;

use serde::Deserialize;

use crate::error::{CronmanError, Result};
use crate::schedule;
use crate::scheduler::{JobDefinition, SchedulerHandle};
use crate::store::{JobMap, JobStore};

/// Body of `POST /api/v1/job`. `id`, `next_run`, and `last_run` are never
/// client-supplied.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateJob {
    #[serde(rename = "Command", default)]
    pub command: String,
    #[serde(rename = "Args", default)]
    pub args: Vec<String>,
    #[serde(rename = "CronExpr", default)]
    pub cron_expr: String,
    #[serde(rename = "RunAsUser", default)]
    pub run_as_user: String,
}

/// Body of `PATCH /api/v1/job/{id}`; absent or empty fields keep their
/// stored values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateJob {
    #[serde(rename = "Command")]
    pub command: Option<String>,
    #[serde(rename = "Args")]
    pub args: Option<Vec<String>>,
    #[serde(rename = "CronExpr")]
    pub cron_expr: Option<String>,
    #[serde(rename = "RunAsUser")]
    pub run_as_user: Option<String>,
}

#[derive(Clone)]
pub struct JobService {
    store: Arc<JobStore>,
    scheduler: SchedulerHandle,
}

impl JobService {
    pub fn new(store: Arc<JobStore>, scheduler: SchedulerHandle) -> Self {
        Self { store, scheduler }
    }

    /// The current on-disk document; an absent file is an empty map.
    pub async fn list(&self) -> Result<JobMap> {
        self.store.load().await
    }

    pub async fn get(&self, job_id: &str) -> Result<JobDefinition> {
        let jobs = self.store.load().await?;
        jobs.get(job_id)
            .cloned()
            .ok_or_else(|| CronmanError::JobNotFound(job_id.to_string()))
    }

    pub async fn create(&self, request: CreateJob) -> Result<JobDefinition> {
        if request.command.is_empty() {
            return Err(CronmanError::BadRequest(
                "Command is not specified in the payload".to_string(),
            ));
        }
        if request.cron_expr.is_empty() {
            return Err(CronmanError::BadRequest(
                "CronExpr is not specified in the payload".to_string(),
            ));
        }
        schedule::parse(&request.cron_expr)?;

        let job = JobDefinition::new(
            request.command,
            request.args,
            request.cron_expr,
            request.run_as_user,
        );
        tracing::info!(job_id = %job.id, command = %job.command, "Creating job");

        self.store.upsert(&job).await?;
        if self.scheduler.add(job.clone()).await.is_err() {
            // Roll the record back so a stopped scheduler never leaves an
            // orphan behind on disk.
            if let Err(e) = self.store.remove(&job.id).await {
                tracing::error!(
                    job_id = %job.id,
                    error = %e,
                    "Rollback write failed; an unscheduled job record remains on disk"
                );
            }
            return Err(CronmanError::Unavailable);
        }
        Ok(job)
    }

    pub async fn update(&self, job_id: &str, patch: UpdateJob) -> Result<JobDefinition> {
        let jobs = self.store.load().await?;
        let previous = jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| CronmanError::JobNotFound(job_id.to_string()))?;

        let mut updated = previous.clone();
        if let Some(command) = patch.command.filter(|c| !c.is_empty()) {
            updated.command = command;
        }
        if let Some(args) = patch.args {
            updated.args = args;
        }
        if let Some(cron_expr) = patch.cron_expr.filter(|c| !c.is_empty()) {
            schedule::parse(&cron_expr)?;
            updated.cron_expr = cron_expr;
        }
        if let Some(run_as_user) = patch.run_as_user.filter(|u| !u.is_empty()) {
            updated.run_as_user = run_as_user;
        }
        tracing::info!(job_id, "Updating job");

        self.store.upsert(&updated).await?;
        let rescheduled = async {
            self.scheduler.remove(job_id.to_string()).await?;
            self.scheduler.add(updated.clone()).await
        }
        .await;
        if rescheduled.is_err() {
            if let Err(e) = self.store.upsert(&previous).await {
                tracing::error!(
                    job_id,
                    error = %e,
                    "Rollback write failed; the unscheduled patch remains on disk"
                );
            }
            return Err(CronmanError::Unavailable);
        }
        Ok(updated)
    }

    pub async fn delete(&self, job_id: &str) -> Result<()> {
        self.store.remove(job_id).await?;
        tracing::info!(job_id, "Deleted job");
        self.scheduler.remove(job_id.to_string()).await
    }
}
