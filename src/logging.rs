use std::path::Path;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{CronmanError, Result};

const LOG_FILE_PREFIX: &str = "cronman";

/// Initialize tracing with console and file output.
///
/// The file layer writes to `<log_dir>/cronman.<date>.log` with daily
/// rotation. The returned guard must be kept alive for the lifetime of the
/// process or buffered log lines are lost on exit.
pub fn init(log_dir: &Path, level: &str) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(log_dir)
        .map_err(|e| CronmanError::Config(format!("failed to open log file: {e}")))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(guard)
}

fn level_directive(level: &str) -> &'static str {
    match level.to_uppercase().as_str() {
        "DEBUG" => "debug",
        "WARN" => "warn",
        "ERROR" => "error",
        _ => "info",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_level_falls_back_to_info() {
        assert_eq!(level_directive("TRACE2"), "info");
        assert_eq!(level_directive(""), "info");
    }

    #[test]
    fn levels_map_case_insensitively() {
        assert_eq!(level_directive("debug"), "debug");
        assert_eq!(level_directive("Warn"), "warn");
        assert_eq!(level_directive("ERROR"), "error");
    }
}
