use thiserror::Error;

#[derive(Error, Debug)]
pub enum CronmanError {
    #[error("Invalid request. {0}")]
    BadRequest(String),

    #[error("Failed to parse the cron expression '{expr}': {reason}")]
    BadCron { expr: String, reason: String },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Scheduler is not accepting requests")]
    Unavailable,

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("User lookup failed for '{user}': {reason}")]
    UserLookup { user: String, reason: String },

    #[error("Failed to spawn '{command}': {reason}")]
    Spawn { command: String, reason: String },

    #[error("{0} job(s) still running after stop")]
    RunnersStillActive(usize),

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CronmanError>;
