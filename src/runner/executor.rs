use tokio::process::{Child, Command};

use crate::error::{CronmanError, Result};
use crate::scheduler::job::{JobDefinition, RunState};

/// Resolve a username to (uid, gid) through the OS user database.
#[cfg(unix)]
fn resolve_user(username: &str) -> Result<(u32, u32)> {
    let user = nix::unistd::User::from_name(username)
        .map_err(|e| CronmanError::UserLookup {
            user: username.to_string(),
            reason: e.to_string(),
        })?
        .ok_or_else(|| CronmanError::UserLookup {
            user: username.to_string(),
            reason: "no such user".to_string(),
        })?;
    Ok((user.uid.as_raw(), user.gid.as_raw()))
}

#[cfg(not(unix))]
fn resolve_user(username: &str) -> Result<(u32, u32)> {
    Err(CronmanError::UserLookup {
        user: username.to_string(),
        reason: "credential switching requires a POSIX host".to_string(),
    })
}

/// Spawn the job's command, switching credentials when `run_as_user` is set.
///
/// Dropping privileges requires the daemon itself to run with enough of
/// them (typically root); the spawn error surfaces per-run otherwise.
pub fn spawn_child(job: &JobDefinition) -> Result<Child> {
    let mut cmd = Command::new(&job.command);
    cmd.args(&job.args)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null());

    if !job.run_as_user.is_empty() {
        let (uid, gid) = resolve_user(&job.run_as_user)?;
        tracing::debug!(job_id = %job.id, user = %job.run_as_user, uid, gid, "Running with switched credentials");
        #[cfg(unix)]
        {
            cmd.uid(uid).gid(gid);
        }
    }

    cmd.spawn().map_err(|e| CronmanError::Spawn {
        command: job.command.clone(),
        reason: e.to_string(),
    })
}

/// Map a child exit status onto a run state.
pub fn classify_exit(status: std::process::ExitStatus) -> (RunState, Option<String>) {
    if status.success() {
        return (RunState::Completed, None);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return (
                RunState::Terminated,
                Some(format!("terminated by signal {signal}")),
            );
        }
    }
    (
        RunState::Failed,
        Some(format!("exit code: {:?}", status.code())),
    )
}
