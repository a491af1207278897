//! Duration statistics and anomaly detection for cron jobs.
//!
//! Two independent anomaly signals:
//!
//! 1. z-score of the most recent duration against the rolling baseline,
//!    with a cutoff derived from the unit's configured sensitivity;
//! 2. drift: the short-term moving average sitting monotonically further
//!    from the baseline mean by more than a relative margin, which catches
//!    slow degradation no single sample would flag.
//!
//! Units below [`MIN_SAMPLES`] never report an anomaly: an insufficient
//! baseline must not produce false positives.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use upmon_common::types::{AnomalySensitivity, DurationStats, DurationTrend, TrendDirection};

use crate::window::SampleWindow;

/// Samples kept raw for percentile queries.
pub const WINDOW_SAMPLES: usize = 100;
/// Baseline aggregate span.
pub const BASELINE_SPAN_SECS: i64 = 7 * 24 * 3600;
/// Below this many samples no anomaly is ever reported.
pub const MIN_SAMPLES: usize = 5;
/// Samples in the short-term moving average used for trend/drift.
const TREND_SAMPLES: usize = 5;
/// Relative band around the baseline mean inside which the trend counts
/// as stable.
const STABLE_BAND: f64 = 0.05;

/// z-score cutoff per sensitivity: higher sensitivity, lower cutoff.
fn z_threshold(sensitivity: AnomalySensitivity) -> f64 {
    match sensitivity {
        AnomalySensitivity::High => 2.0,
        AnomalySensitivity::Normal => 3.0,
        AnomalySensitivity::Low => 4.0,
    }
}

/// Relative deviation of the moving average from the baseline mean that
/// counts as drift, per sensitivity.
fn drift_threshold(sensitivity: AnomalySensitivity) -> f64 {
    match sensitivity {
        AnomalySensitivity::High => 0.25,
        AnomalySensitivity::Normal => 0.5,
        AnomalySensitivity::Low => 1.0,
    }
}

/// Rolling duration samples and anomaly flags, keyed by unit ID.
///
/// Aggregates are logically per-unit; the map-level mutex gives them the
/// same serialization the persisted unit record gets from the repository's
/// version check.
pub struct DurationStatsEngine {
    units: Mutex<HashMap<String, SampleWindow>>,
}

impl Default for DurationStatsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DurationStatsEngine {
    pub fn new() -> Self {
        Self {
            units: Mutex::new(HashMap::new()),
        }
    }

    /// Records one measured run duration for a unit.
    pub fn record(&self, unit_id: &str, duration_ms: i64, now: DateTime<Utc>) {
        let mut units = self.units.lock().unwrap();
        units
            .entry(unit_id.to_string())
            .or_insert_with(|| SampleWindow::new(WINDOW_SAMPLES, BASELINE_SPAN_SECS))
            .push(duration_ms, now);
    }

    /// Percentile summary over the retained window. `None` before the
    /// first sample.
    pub fn stats(&self, unit_id: &str) -> Option<DurationStats> {
        let units = self.units.lock().unwrap();
        let window = units.get(unit_id)?;
        if window.is_empty() {
            return None;
        }
        Some(DurationStats {
            avg_ms: window.avg(),
            p50_ms: window.percentile(50.0)?,
            p95_ms: window.percentile(95.0)?,
            p99_ms: window.percentile(99.0)?,
            sample_count: window.len(),
        })
    }

    /// Short-term trend and anomaly verdict. `None` before the first
    /// sample.
    pub fn trend(&self, unit_id: &str, sensitivity: AnomalySensitivity) -> Option<DurationTrend> {
        let units = self.units.lock().unwrap();
        let window = units.get(unit_id)?;
        let latest = window.latest()?;
        let last5 = window.last_n(TREND_SAMPLES);

        let baseline = window.baseline();
        let mean = baseline.mean();
        let ma5 = last5.iter().sum::<i64>() as f64 / last5.len() as f64;

        let direction = if mean > 0.0 && ma5 > mean * (1.0 + STABLE_BAND) {
            TrendDirection::Increasing
        } else if mean > 0.0 && ma5 < mean * (1.0 - STABLE_BAND) {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        };

        let z_score = baseline.std_dev().and_then(|std| {
            if std > f64::EPSILON {
                Some((latest as f64 - mean) / std)
            } else {
                None
            }
        });

        let enough_samples = window.len() >= MIN_SAMPLES;
        let z_anomaly = matches!(z_score, Some(z) if z.abs() > z_threshold(sensitivity));
        let drift_anomaly = enough_samples && is_drift(&last5, ma5, mean, sensitivity);
        let is_anomaly = enough_samples && (z_anomaly || drift_anomaly);

        Some(DurationTrend {
            last5_ms: last5,
            direction,
            is_anomaly,
            z_score,
        })
    }
}

/// Drift: every step of the recent window sits at least as far from the
/// baseline mean as the previous one, on the same side, and the moving
/// average has left the mean by more than the sensitivity's margin.
fn is_drift(last5: &[i64], ma5: f64, mean: f64, sensitivity: AnomalySensitivity) -> bool {
    if last5.len() < TREND_SAMPLES || mean <= f64::EPSILON {
        return false;
    }
    let relative = (ma5 - mean).abs() / mean;
    if relative <= drift_threshold(sensitivity) {
        return false;
    }
    let sign = (last5[0] as f64 - mean).signum();
    let mut prev_distance = -1.0;
    for &sample in last5 {
        let delta = sample as f64 - mean;
        if delta.signum() != sign {
            return false;
        }
        let distance = delta.abs();
        if distance < prev_distance {
            return false;
        }
        prev_distance = distance;
    }
    true
}
