//! Cron expression evaluation.
//!
//! Jobs carry standard 5-field cron expressions (minute, hour, day-of-month,
//! month, day-of-week). The `cron` crate wants a seconds field, so a `0` is
//! prepended before parsing; a job can therefore never fire more than once
//! per minute.

use std::str::FromStr;

use chrono::{DateTime, Local, Utc};
use chrono_tz::Tz;
use cron::Schedule;

use crate::error::{CronmanError, Result};

const CRON_FIELD_COUNT: usize = 5;

/// Parse and validate a 5-field cron expression.
pub fn parse(expr: &str) -> Result<Schedule> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != CRON_FIELD_COUNT {
        return Err(CronmanError::BadCron {
            expr: expr.to_string(),
            reason: format!("expected {CRON_FIELD_COUNT} fields, got {}", fields.len()),
        });
    }
    let with_seconds = format!("0 {}", fields.join(" "));
    Schedule::from_str(&with_seconds).map_err(|e| CronmanError::BadCron {
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}

/// Earliest instant strictly after `after` matching `expr`, evaluated in
/// `tz` (host local time when `None`). `Ok(None)` means the expression has
/// no future match and the job is parked.
pub fn next_after(expr: &str, after: DateTime<Utc>, tz: Option<Tz>) -> Result<Option<DateTime<Utc>>> {
    let schedule = parse(expr)?;
    let next = match tz {
        Some(tz) => schedule
            .after(&after.with_timezone(&tz))
            .next()
            .map(|t| t.with_timezone(&Utc)),
        None => schedule
            .after(&after.with_timezone(&Local))
            .next()
            .map(|t| t.with_timezone(&Utc)),
    };
    Ok(next)
}
