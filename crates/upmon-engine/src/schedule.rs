//! Schedule arithmetic: converting a schedule definition plus a reference
//! timestamp into the next expected timestamp.
//!
//! `Period` and `Interval` are pure duration arithmetic in UTC with no
//! calendar semantics. `Cron` delegates to the `cron` crate and evaluates
//! in UTC. For HTTP monitors the reference timestamp is always the poll
//! completion time, so probe latency never compounds into interval drift.

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use std::str::FromStr;
use upmon_common::types::ScheduleKind;

use crate::error::{Result, ScheduleError};

/// Validates a schedule definition at unit create/update time.
///
/// This is the only place schedule parsing is allowed to fail; callers
/// must reject the unit before it is persisted so the runtime evaluation
/// path never sees a malformed schedule.
pub fn validate_schedule(kind: &ScheduleKind) -> Result<()> {
    match kind {
        ScheduleKind::Period { seconds } | ScheduleKind::Interval { seconds } => {
            if *seconds == 0 {
                return Err(ScheduleError::NonPositivePeriod { seconds: *seconds });
            }
            Ok(())
        }
        ScheduleKind::Cron { expression } => {
            let schedule = parse_cron(expression)?;
            // A parseable expression can still describe a date that never
            // occurs (e.g. "0 0 31 2 *").
            if schedule.after(&Utc::now()).next().is_none() {
                return Err(ScheduleError::NoNextOccurrence {
                    expression: expression.clone(),
                });
            }
            Ok(())
        }
    }
}

/// Computes the next expected timestamp strictly after `from`.
pub fn next_expected(kind: &ScheduleKind, from: DateTime<Utc>) -> Result<DateTime<Utc>> {
    match kind {
        ScheduleKind::Period { seconds } | ScheduleKind::Interval { seconds } => {
            Ok(from + Duration::seconds(*seconds as i64))
        }
        ScheduleKind::Cron { expression } => {
            let schedule = parse_cron(expression)?;
            schedule
                .after(&from)
                .next()
                .ok_or_else(|| ScheduleError::NoNextOccurrence {
                    expression: expression.clone(),
                })
        }
    }
}

/// Parses a cron expression, accepting the standard 5-field form.
///
/// The `cron` crate expects a leading seconds field; 5-field expressions
/// are normalized by prepending `0` so they fire at the top of the minute.
fn parse_cron(expression: &str) -> Result<Schedule> {
    let trimmed = expression.trim();
    let field_count = trimmed.split_whitespace().count();
    let normalized = if field_count == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    };
    Schedule::from_str(&normalized).map_err(|source| ScheduleError::InvalidCron {
        expression: expression.to_string(),
        source,
    })
}
