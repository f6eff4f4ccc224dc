use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type JobId = String;

/// A persisted job definition. Field names match the on-disk document
/// (`resources/jobs.json`); times are RFC 3339 and `null` stands for
/// "unscheduled" (`next_run`) or "never ran" (`last_run`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDefinition {
    #[serde(rename = "ID")]
    pub id: JobId,
    #[serde(rename = "Command")]
    pub command: String,
    #[serde(rename = "Args", default)]
    pub args: Vec<String>,
    #[serde(rename = "CronExpr")]
    pub cron_expr: String,
    #[serde(rename = "RunAsUser", default)]
    pub run_as_user: String,
    #[serde(rename = "NextRun", default)]
    pub next_run: Option<DateTime<Utc>>,
    #[serde(rename = "LastRun", default)]
    pub last_run: Option<DateTime<Utc>>,
}

impl JobDefinition {
    pub fn new(command: String, args: Vec<String>, cron_expr: String, run_as_user: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            command,
            args,
            cron_expr,
            run_as_user,
            next_run: None,
            last_run: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Queued,
    Running,
    Completed,
    Failed,
    Terminated,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Queued => write!(f, "queued"),
            RunState::Running => write!(f, "running"),
            RunState::Completed => write!(f, "completed"),
            RunState::Failed => write!(f, "failed"),
            RunState::Terminated => write!(f, "terminated"),
        }
    }
}

/// One execution attempt of a job. In-memory only; created by the scheduler
/// at fire time and consumed by the runner.
#[derive(Debug, Clone)]
pub struct JobRun {
    pub run_id: String,
    pub job: JobDefinition,
    pub scheduled_at: DateTime<Utc>,
    pub ran_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub state: RunState,
}

impl JobRun {
    pub fn new(job: JobDefinition, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            job,
            scheduled_at,
            ran_at: None,
            completed_at: None,
            state: RunState::Queued,
        }
    }
}
