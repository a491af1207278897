//! Serialized event application.
//!
//! Every mutation of a unit, whether from the ping intake, the management
//! API, or the sweep, goes through [`EventDispatcher::dispatch`]: load the
//! current row, apply the event through the pure state machine, save with
//! the version that was read. A conflict means another writer interleaved;
//! the loop re-reads and re-applies so the event is evaluated against the
//! fresh state instead of clobbering it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use upmon_common::types::MonitoredUnit;
use upmon_engine::error::ScheduleError;
use upmon_engine::machine::{self, UnitEvent};
use upmon_engine::stats::DurationStatsEngine;
use upmon_storage::error::StorageError;
use upmon_storage::{SaveOutcome, UnitRepository};

use crate::alert::AlertEmitter;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown unit: {0}")]
    UnknownUnit(String),
    #[error("save for unit {unit_id} conflicted {attempts} times, giving up")]
    Contention { unit_id: String, attempts: usize },
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub struct EventDispatcher {
    repo: Arc<dyn UnitRepository>,
    stats: Arc<DurationStatsEngine>,
    emitter: Arc<AlertEmitter>,
    save_attempts: usize,
}

impl EventDispatcher {
    pub fn new(
        repo: Arc<dyn UnitRepository>,
        stats: Arc<DurationStatsEngine>,
        emitter: Arc<AlertEmitter>,
        save_attempts: usize,
    ) -> Self {
        Self {
            repo,
            stats,
            emitter,
            save_attempts: save_attempts.max(1),
        }
    }

    /// Applies `event` to the named unit at instant `now` and returns the
    /// resulting record. Duration samples and alert intents are only acted
    /// on after the save succeeds, so a conflicting writer never causes a
    /// duplicate alert or sample.
    pub async fn dispatch(
        &self,
        unit_id: &str,
        event: &UnitEvent,
        now: DateTime<Utc>,
    ) -> Result<MonitoredUnit, DispatchError> {
        for attempt in 1..=self.save_attempts {
            let unit = self
                .repo
                .load(unit_id)?
                .ok_or_else(|| DispatchError::UnknownUnit(unit_id.to_string()))?;

            let transition = machine::apply(&unit, event, now)?;
            if !transition.changed {
                return Ok(transition.unit);
            }

            match self.repo.save(&transition.unit, unit.version)? {
                SaveOutcome::Saved => {
                    if let Some(sample_ms) = transition.duration_sample_ms {
                        self.record_sample(&transition.unit, sample_ms, now);
                    }
                    if !transition.alerts.is_empty() {
                        self.emitter
                            .emit_all(&transition.unit, &transition.alerts, now)
                            .await;
                    }
                    return Ok(transition.unit);
                }
                SaveOutcome::Conflict => {
                    tracing::debug!(unit_id, attempt, "Version conflict, re-applying event");
                }
            }
        }

        Err(DispatchError::Contention {
            unit_id: unit_id.to_string(),
            attempts: self.save_attempts,
        })
    }

    fn record_sample(&self, unit: &MonitoredUnit, sample_ms: i64, now: DateTime<Utc>) {
        self.stats.record(&unit.id, sample_ms, now);
        if let Some(trend) = self.stats.trend(&unit.id, unit.anomaly_sensitivity) {
            if trend.is_anomaly {
                tracing::warn!(
                    unit_id = %unit.id,
                    unit = %unit.name,
                    duration_ms = sample_ms,
                    z_score = ?trend.z_score,
                    "Run duration anomaly"
                );
            }
        }
    }
}
