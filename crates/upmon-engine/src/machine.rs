//! The monitor state machine.
//!
//! [`apply`] is a pure function over `(current record, event, now)`; it
//! performs no I/O, reads no clocks, and carries no retry logic. Callers
//! persist the returned record under per-unit serialization (optimistic
//! version check) and re-apply on conflict, which is safe because the
//! computation is idempotent with respect to the freshly read state.
//!
//! Out-of-order events must converge rather than error: a SUCCESS ping
//! processed after a GraceExceeded still moves the unit to UP and re-arms
//! the deadline, and transitions that make no sense for the current status
//! are normalized into no-ops instead of rejected.

use chrono::{DateTime, Duration, Utc};
use upmon_common::types::{
    AlertKind, MonitoredUnit, PingKind, PollOutcome, ScheduleKind, UnitKind, UnitStatus,
};

use crate::error::Result;
use crate::schedule;

/// An event driving a unit's state machine.
///
/// `Ping` and `PollResult` come from the outside world; `MissedDeadline`,
/// `GraceExceeded`, and `StillDown` are synthetic events produced by the
/// sweep; `Pause`/`Resume` come from the management API.
#[derive(Debug, Clone)]
pub enum UnitEvent {
    Ping(PingKind),
    PollResult(PollOutcome),
    MissedDeadline,
    GraceExceeded,
    StillDown,
    Pause,
    Resume,
}

/// Result of applying one event: the updated record, the alert kinds to
/// emit, and an optional measured run duration.
#[derive(Debug, Clone)]
pub struct Transition {
    pub unit: MonitoredUnit,
    /// False when the event was a no-op and no save is needed.
    pub changed: bool,
    pub alerts: Vec<AlertKind>,
    /// Present when a START ping was matched by this SUCCESS ping.
    pub duration_sample_ms: Option<i64>,
}

impl Transition {
    fn unchanged(unit: &MonitoredUnit) -> Self {
        Self {
            unit: unit.clone(),
            changed: false,
            alerts: Vec::new(),
            duration_sample_ms: None,
        }
    }
}

/// Applies `event` to `unit` at the injected instant `now`.
pub fn apply(unit: &MonitoredUnit, event: &UnitEvent, now: DateTime<Utc>) -> Result<Transition> {
    match event {
        UnitEvent::Ping(kind) => apply_ping(unit, *kind, now),
        UnitEvent::PollResult(outcome) => apply_poll_result(unit, outcome, now),
        UnitEvent::MissedDeadline => apply_missed_deadline(unit, now),
        UnitEvent::GraceExceeded => apply_grace_exceeded(unit, now),
        UnitEvent::StillDown => apply_still_down(unit, now),
        UnitEvent::Pause => Ok(apply_pause(unit, now)),
        UnitEvent::Resume => Ok(apply_resume(unit, now)),
    }
}

fn apply_ping(unit: &MonitoredUnit, kind: PingKind, now: DateTime<Utc>) -> Result<Transition> {
    let mut next = unit.clone();
    match kind {
        PingKind::Start => {
            // Duration tracking only: status and deadline are untouched,
            // even while paused.
            next.last_started_at = Some(now);
            next.updated_at = now;
            Ok(Transition {
                unit: next,
                changed: true,
                alerts: Vec::new(),
                duration_sample_ms: None,
            })
        }
        PingKind::Success => {
            let mut alerts = Vec::new();
            let duration_sample_ms = take_duration_sample(&mut next, now);
            next.last_seen_at = Some(now);
            next.last_error = None;
            next.updated_at = now;

            if unit.status == UnitStatus::Paused {
                // Paused is sticky: bookkeeping only, no re-arm.
                return Ok(Transition {
                    unit: next,
                    changed: true,
                    alerts,
                    duration_sample_ms,
                });
            }

            next.next_expected_at = Some(schedule::next_expected(&unit.schedule, now)?);
            next.failing_since = None;
            if unit.status == UnitStatus::Down && unit.alert_on_recovery {
                alerts.push(AlertKind::Up);
            }
            next.status = UnitStatus::Up;
            Ok(Transition {
                unit: next,
                changed: true,
                alerts,
                duration_sample_ms,
            })
        }
        PingKind::Fail => {
            // Explicit failure signals are informational: only the
            // absence-of-signal path is authoritative for liveness. The
            // pending START is cleared so a later unrelated SUCCESS does
            // not produce a bogus duration sample.
            tracing::debug!(unit_id = %unit.id, status = %unit.status, "FAIL ping received");
            if unit.last_started_at.is_none() {
                return Ok(Transition::unchanged(unit));
            }
            next.last_started_at = None;
            next.updated_at = now;
            Ok(Transition {
                unit: next,
                changed: true,
                alerts: Vec::new(),
                duration_sample_ms: None,
            })
        }
    }
}

fn apply_poll_result(
    unit: &MonitoredUnit,
    outcome: &PollOutcome,
    now: DateTime<Utc>,
) -> Result<Transition> {
    if unit.status == UnitStatus::Paused {
        return Ok(Transition::unchanged(unit));
    }

    let mut next = unit.clone();
    next.last_checked_at = Some(now);
    next.last_response_ms = outcome.response_ms;
    // Interval is measured from poll completion, not poll start.
    next.next_expected_at = Some(schedule::next_expected(&unit.schedule, now)?);
    next.updated_at = now;

    let mut alerts = Vec::new();
    if outcome.success {
        next.last_seen_at = Some(now);
        next.last_error = None;
        next.failing_since = None;
        if unit.status == UnitStatus::Down && unit.alert_on_recovery {
            alerts.push(AlertKind::Up);
        }
        next.status = UnitStatus::Up;
    } else {
        next.last_error = Some(describe_poll_failure(outcome));
        match unit.status {
            UnitStatus::New | UnitStatus::Up => {
                // First failure is tolerated, mirroring the push model's
                // grace buffer.
                next.status = UnitStatus::Late;
            }
            UnitStatus::Late => match unit.failing_since {
                Some(anchor) if now - anchor > Duration::seconds(unit.grace_seconds as i64) => {
                    next.status = UnitStatus::Down;
                    next.last_alert_at = Some(now);
                    alerts.push(AlertKind::Down);
                }
                Some(_) => {}
                None => {
                    // Arm the grace clock at the first failure observed
                    // while already LATE.
                    next.failing_since = Some(now);
                }
            },
            // Idempotent re-failure never re-alerts.
            UnitStatus::Down => {}
            UnitStatus::Paused => unreachable!("paused handled above"),
        }
    }

    Ok(Transition {
        unit: next,
        changed: true,
        alerts,
        duration_sample_ms: None,
    })
}

fn apply_missed_deadline(unit: &MonitoredUnit, now: DateTime<Utc>) -> Result<Transition> {
    let overdue = matches!(unit.next_expected_at, Some(deadline) if now > deadline);
    if unit.status != UnitStatus::Up || !overdue {
        return Ok(Transition::unchanged(unit));
    }
    let mut next = unit.clone();
    next.status = UnitStatus::Late;
    next.updated_at = now;
    // LATE is a grace buffer, not an alert-worthy state for cron jobs.
    Ok(Transition {
        unit: next,
        changed: true,
        alerts: Vec::new(),
        duration_sample_ms: None,
    })
}

fn apply_grace_exceeded(unit: &MonitoredUnit, now: DateTime<Utc>) -> Result<Transition> {
    let exceeded = match unit.next_expected_at {
        Some(deadline) => now > deadline + Duration::seconds(unit.grace_seconds as i64),
        None => false,
    };
    if unit.status != UnitStatus::Late || !exceeded {
        return Ok(Transition::unchanged(unit));
    }
    let mut next = unit.clone();
    next.status = UnitStatus::Down;
    next.last_alert_at = Some(now);
    next.updated_at = now;
    Ok(Transition {
        unit: next,
        changed: true,
        alerts: vec![AlertKind::Down],
        duration_sample_ms: None,
    })
}

fn apply_still_down(unit: &MonitoredUnit, now: DateTime<Utc>) -> Result<Transition> {
    if unit.status != UnitStatus::Down || !reminder_due(unit, now) {
        return Ok(Transition::unchanged(unit));
    }
    let mut next = unit.clone();
    next.last_alert_at = Some(now);
    next.updated_at = now;
    Ok(Transition {
        unit: next,
        changed: true,
        alerts: vec![AlertKind::StillDown],
        duration_sample_ms: None,
    })
}

fn apply_pause(unit: &MonitoredUnit, now: DateTime<Utc>) -> Transition {
    if unit.status == UnitStatus::Paused {
        return Transition::unchanged(unit);
    }
    let mut next = unit.clone();
    next.status = UnitStatus::Paused;
    next.next_expected_at = None;
    next.failing_since = None;
    next.updated_at = now;
    Transition {
        unit: next,
        changed: true,
        alerts: Vec::new(),
        duration_sample_ms: None,
    }
}

fn apply_resume(unit: &MonitoredUnit, now: DateTime<Utc>) -> Transition {
    if unit.status != UnitStatus::Paused {
        return Transition::unchanged(unit);
    }
    let mut next = unit.clone();
    next.status = UnitStatus::New;
    next.failing_since = None;
    next.updated_at = now;
    // Resume forces re-arming: cron jobs wait for their first ping, HTTP
    // monitors are polled again as soon as possible.
    next.next_expected_at = match unit.kind {
        UnitKind::CronJob => None,
        UnitKind::HttpMonitor => Some(now),
    };
    Transition {
        unit: next,
        changed: true,
        alerts: Vec::new(),
        duration_sample_ms: None,
    }
}

/// The single deadline predicate the sweep evaluates for cron jobs.
///
/// Keeping LATE/grace/reminder comparisons here (instead of in ad hoc
/// queries) means the sweep's range query only has to find units whose
/// deadline has passed; the exact transition is decided in one place.
/// Returns at most one synthetic event per unit per tick.
pub fn sweep_event_for(unit: &MonitoredUnit, now: DateTime<Utc>) -> Option<UnitEvent> {
    if unit.kind != UnitKind::CronJob {
        return None;
    }
    let deadline = unit.next_expected_at?;
    match unit.status {
        UnitStatus::Up if now > deadline => Some(UnitEvent::MissedDeadline),
        UnitStatus::Late if now > deadline + Duration::seconds(unit.grace_seconds as i64) => {
            Some(UnitEvent::GraceExceeded)
        }
        UnitStatus::Down if reminder_due(unit, now) => Some(UnitEvent::StillDown),
        _ => None,
    }
}

/// Whether an HTTP monitor is due for a poll.
pub fn poll_due(unit: &MonitoredUnit, now: DateTime<Utc>) -> bool {
    if unit.kind != UnitKind::HttpMonitor || unit.status == UnitStatus::Paused {
        return false;
    }
    matches!(unit.next_expected_at, Some(due) if now >= due)
}

/// Seeds the schedule for a freshly created unit: HTTP monitors are due
/// immediately, cron jobs stay unarmed until their first SUCCESS ping.
pub fn initial_deadline(kind: UnitKind, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match kind {
        UnitKind::CronJob => None,
        UnitKind::HttpMonitor => Some(now),
    }
}

fn reminder_due(unit: &MonitoredUnit, now: DateTime<Utc>) -> bool {
    let Some(hours) = unit.reminder_interval_hours else {
        return false;
    };
    let Some(last_alert) = unit.last_alert_at else {
        return false;
    };
    now > last_alert + Duration::hours(hours as i64)
}

fn take_duration_sample(next: &mut MonitoredUnit, now: DateTime<Utc>) -> Option<i64> {
    let started = next.last_started_at.take()?;
    if started > now {
        // Clock skew between the START and SUCCESS pings; nothing sane to
        // measure.
        return None;
    }
    Some((now - started).num_milliseconds())
}

fn describe_poll_failure(outcome: &PollOutcome) -> String {
    if let Some(err) = &outcome.error {
        return err.clone();
    }
    match outcome.status_code {
        Some(code) => format!("unexpected status {code}"),
        None => "probe failed".to_string(),
    }
}

/// True when `schedule` is valid for `kind`: cron jobs take `Period` or
/// `Cron`, HTTP monitors take `Interval`.
pub fn schedule_matches_kind(kind: UnitKind, schedule: &ScheduleKind) -> bool {
    match kind {
        UnitKind::CronJob => matches!(
            schedule,
            ScheduleKind::Period { .. } | ScheduleKind::Cron { .. }
        ),
        UnitKind::HttpMonitor => matches!(schedule, ScheduleKind::Interval { .. }),
    }
}
