use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{CronmanError, Result};

pub const DEFAULT_BASE_DIRECTORY: &str = "/opt/jobManager";
pub const DEFAULT_REST_SERVER_PORT: u16 = 7000;
pub const DEFAULT_MAX_RUNNING_JOBS: i16 = 100;

const LOG_DIR_NAME: &str = "logs";
const RESOURCE_DIR_NAME: &str = "resources";
const JOBS_FILE: &str = "jobs.json";

/// User-provided configuration, read from the JSON file passed on the
/// command line. New options have to be added here to take effect.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub working_directory: String,
    pub log_level: String,
    pub max_running_jobs: i16,
    /// IANA time zone name used for cron evaluation. Empty means host
    /// local time.
    pub timezone: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            working_directory: DEFAULT_BASE_DIRECTORY.to_string(),
            log_level: "INFO".to_string(),
            max_running_jobs: DEFAULT_MAX_RUNNING_JOBS,
            timezone: String::new(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            CronmanError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let mut config: Config = serde_json::from_str(&data).map_err(|e| {
            CronmanError::Config(format!("failed to parse {}: {e}", path.display()))
        })?;
        if config.working_directory.is_empty() {
            config.working_directory = DEFAULT_BASE_DIRECTORY.to_string();
        }
        if config.log_level.is_empty() {
            config.log_level = "INFO".to_string();
        }
        if config.max_running_jobs <= 0 {
            config.max_running_jobs = DEFAULT_MAX_RUNNING_JOBS;
        }
        Ok(config)
    }

    pub fn base_directory(&self) -> PathBuf {
        PathBuf::from(&self.working_directory)
    }

    pub fn log_directory(&self) -> PathBuf {
        self.base_directory().join(LOG_DIR_NAME)
    }

    pub fn resource_directory(&self) -> PathBuf {
        self.base_directory().join(RESOURCE_DIR_NAME)
    }

    pub fn jobs_file(&self) -> PathBuf {
        self.resource_directory().join(JOBS_FILE)
    }

    /// Parsed cron evaluation zone; `None` means host local time.
    pub fn cron_timezone(&self) -> Result<Option<chrono_tz::Tz>> {
        if self.timezone.is_empty() {
            return Ok(None);
        }
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map(Some)
            .map_err(|_| CronmanError::Config(format!("unknown timezone '{}'", self.timezone)))
    }
}
