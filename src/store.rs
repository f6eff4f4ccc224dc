//! Persistent job store.
//!
//! All job definitions live in a single pretty-printed JSON document mapping
//! job id to [`JobDefinition`]. Every mutation rewrites the whole document
//! through a temp file in the same directory followed by a rename, so a
//! crash mid-save can never leave a truncated document behind. An internal
//! mutex serializes callers; the scheduler loop, the control facade, and the
//! runner all share one store handle.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::{CronmanError, Result};
use crate::scheduler::job::{JobDefinition, JobId};

pub type JobMap = BTreeMap<JobId, JobDefinition>;

pub struct JobStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JobStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the full document. An absent file is an empty map; a present
    /// but unreadable or unparsable file is an error (fatal at startup).
    pub async fn load(&self) -> Result<JobMap> {
        let _guard = self.lock.lock().await;
        read_document(&self.path).await
    }

    /// Replace the whole document.
    pub async fn save_all(&self, jobs: &JobMap) -> Result<()> {
        let _guard = self.lock.lock().await;
        write_document(&self.path, jobs).await
    }

    /// Insert or replace one job definition.
    pub async fn upsert(&self, job: &JobDefinition) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut jobs = read_document(&self.path).await?;
        jobs.insert(job.id.clone(), job.clone());
        write_document(&self.path, &jobs).await
    }

    /// Remove one job. A missing id is a `JobNotFound` error.
    pub async fn remove(&self, job_id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut jobs = read_document(&self.path).await?;
        if jobs.remove(job_id).is_none() {
            return Err(CronmanError::JobNotFound(job_id.to_string()));
        }
        write_document(&self.path, &jobs).await
    }

    /// Patch only `next_run` on the stored record. Targeted so the runner
    /// stamping `last_run` concurrently cannot be clobbered.
    pub async fn record_next_run(&self, job_id: &str, next_run: Option<DateTime<Utc>>) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut jobs = read_document(&self.path).await?;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| CronmanError::JobNotFound(job_id.to_string()))?;
        job.next_run = next_run;
        write_document(&self.path, &jobs).await
    }

    /// Patch only `last_run` on the stored record. Called by the runner when
    /// a child process actually starts.
    pub async fn record_last_run(&self, job_id: &str, last_run: DateTime<Utc>) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut jobs = read_document(&self.path).await?;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| CronmanError::JobNotFound(job_id.to_string()))?;
        job.last_run = Some(last_run);
        write_document(&self.path, &jobs).await
    }
}

async fn read_document(path: &Path) -> Result<JobMap> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(JobMap::new()),
        Err(e) => {
            return Err(CronmanError::Persistence(format!(
                "failed to read {}: {e}",
                path.display()
            )))
        }
    };
    serde_json::from_slice(&data).map_err(|e| {
        CronmanError::Persistence(format!("failed to parse {}: {e}", path.display()))
    })
}

async fn write_document(path: &Path, jobs: &JobMap) -> Result<()> {
    let json = serde_json::to_string_pretty(jobs)
        .map_err(|e| CronmanError::Persistence(format!("failed to encode jobs: {e}")))?;
    let path = path.to_path_buf();

    // Atomic replace on a blocking thread: temp file in the target
    // directory, then rename over the document.
    tokio::task::spawn_blocking(move || -> Result<()> {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(json.as_bytes())?;
        tmp.flush()?;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))?;
        tmp.persist(&path).map_err(|e| {
            CronmanError::Persistence(format!("failed to persist {}: {e}", path.display()))
        })?;
        Ok(())
    })
    .await
    .map_err(|e| CronmanError::Persistence(format!("write task panicked: {e}")))?
}
