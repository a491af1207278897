use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Liveness status of a monitored unit.
///
/// `Paused` is sticky: no timeout logic applies until an explicit resume,
/// which re-arms the unit through `New`.
///
/// # Examples
///
/// ```
/// use upmon_common::types::UnitStatus;
///
/// let status: UnitStatus = "late".parse().unwrap();
/// assert_eq!(status, UnitStatus::Late);
/// assert_eq!(status.to_string(), "late");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    New,
    Up,
    Late,
    Down,
    Paused,
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitStatus::New => write!(f, "new"),
            UnitStatus::Up => write!(f, "up"),
            UnitStatus::Late => write!(f, "late"),
            UnitStatus::Down => write!(f, "down"),
            UnitStatus::Paused => write!(f, "paused"),
        }
    }
}

impl std::str::FromStr for UnitStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "new" => Ok(UnitStatus::New),
            "up" => Ok(UnitStatus::Up),
            "late" => Ok(UnitStatus::Late),
            "down" => Ok(UnitStatus::Down),
            "paused" => Ok(UnitStatus::Paused),
            _ => Err(format!("unknown unit status: {s}")),
        }
    }
}

/// The liveness model a unit uses.
///
/// Cron jobs push pings to the service; HTTP monitors are polled by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    CronJob,
    HttpMonitor,
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitKind::CronJob => write!(f, "cron_job"),
            UnitKind::HttpMonitor => write!(f, "http_monitor"),
        }
    }
}

impl std::str::FromStr for UnitKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cron_job" => Ok(UnitKind::CronJob),
            "http_monitor" => Ok(UnitKind::HttpMonitor),
            _ => Err(format!("unknown unit kind: {s}")),
        }
    }
}

/// Schedule definition for a monitored unit.
///
/// `Period` and `Cron` apply to cron jobs; `Interval` applies to HTTP
/// monitors, measured from poll completion so probe latency never
/// compounds into interval drift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleKind {
    Period { seconds: u64 },
    Cron { expression: String },
    Interval { seconds: u64 },
}

/// How aggressively duration anomalies are flagged for a cron job.
///
/// Higher sensitivity means a lower z-score cutoff, so smaller deviations
/// from the baseline are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySensitivity {
    Low,
    Normal,
    High,
}

impl std::fmt::Display for AnomalySensitivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnomalySensitivity::Low => write!(f, "low"),
            AnomalySensitivity::Normal => write!(f, "normal"),
            AnomalySensitivity::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for AnomalySensitivity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(AnomalySensitivity::Low),
            "normal" => Ok(AnomalySensitivity::Normal),
            "high" => Ok(AnomalySensitivity::High),
            _ => Err(format!("unknown anomaly sensitivity: {s}")),
        }
    }
}

/// Probe configuration for an HTTP monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub url: String,
    /// Seconds before an in-flight probe is abandoned and counted as a
    /// failure. Retries, if any, belong to the prober collaborator.
    pub timeout_secs: u64,
    /// Accepted status codes. Empty means any 2xx.
    #[serde(default)]
    pub expected_status: Vec<u16>,
    /// Substring the response body must contain, if set.
    #[serde(default)]
    pub body_contains: Option<String>,
}

/// A monitored unit: the superset of a cron job and an HTTP monitor.
///
/// Mutated exclusively by ping/poll events and the sweep's timeout
/// detection; deletion is an external CRUD concern. `version` backs the
/// repository's optimistic concurrency check and is bumped on every save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredUnit {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub kind: UnitKind,
    pub schedule: ScheduleKind,
    pub grace_seconds: u64,
    pub status: UnitStatus,
    /// Last successful ping (cron jobs) or poll (HTTP monitors).
    pub last_seen_at: Option<DateTime<Utc>>,
    /// Last START ping, cron jobs only; cleared once a duration sample is
    /// taken or a FAIL ping ends the run.
    pub last_started_at: Option<DateTime<Utc>>,
    /// Last completed poll, success or failure. HTTP monitors only.
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_response_ms: Option<i64>,
    /// Absolute deadline: next expected ping (cron jobs) or next due poll
    /// (HTTP monitors). Null only while paused or before the schedule has
    /// been armed.
    pub next_expected_at: Option<DateTime<Utc>>,
    /// Set only when an alert intent was actually emitted; gates reminder
    /// cadence.
    pub last_alert_at: Option<DateTime<Utc>>,
    /// Armed by the first failed poll observed while already LATE; a later
    /// failed poll past this anchor plus grace confirms DOWN. HTTP
    /// monitors only.
    pub failing_since: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub reminder_interval_hours: Option<u32>,
    pub alert_on_recovery: bool,
    pub anomaly_sensitivity: AnomalySensitivity,
    pub probe: Option<ProbeConfig>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Kind of an inbound push ping from a cron job client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PingKind {
    /// Marks the beginning of a run; duration tracking only.
    Start,
    /// Proves liveness and re-arms the schedule.
    Success,
    /// Informational; never resurrects status (only absence-of-signal is
    /// authoritative for liveness).
    Fail,
}

impl std::fmt::Display for PingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PingKind::Start => write!(f, "start"),
            PingKind::Success => write!(f, "success"),
            PingKind::Fail => write!(f, "fail"),
        }
    }
}

/// Outcome of one HTTP probe, supplied by the prober collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollOutcome {
    pub success: bool,
    pub status_code: Option<u16>,
    pub response_ms: Option<i64>,
    pub error: Option<String>,
}

/// What an alert intent is about.
///
/// # Examples
///
/// ```
/// use upmon_common::types::AlertKind;
///
/// assert_eq!(AlertKind::StillDown.to_string(), "still_down");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Down,
    Up,
    StillDown,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertKind::Down => write!(f, "down"),
            AlertKind::Up => write!(f, "up"),
            AlertKind::StillDown => write!(f, "still_down"),
        }
    }
}

/// Context attached to an alert intent for downstream enrichment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertContext {
    pub duration_trend: Option<DurationTrend>,
    pub last_error: Option<String>,
    pub response_ms: Option<i64>,
}

/// Ephemeral alert-intent record handed to the notification subsystem.
/// Never persisted by the engine itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertIntent {
    pub unit_id: String,
    pub unit_name: String,
    pub kind: AlertKind,
    pub message: String,
    pub context: AlertContext,
    pub timestamp: DateTime<Utc>,
}

/// Aggregated duration statistics over the bounded recent window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurationStats {
    pub avg_ms: f64,
    pub p50_ms: i64,
    pub p95_ms: i64,
    pub p99_ms: i64,
    pub sample_count: usize,
}

/// Short-term duration trend relative to the rolling baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurationTrend {
    /// Most recent durations, newest last.
    pub last5_ms: Vec<i64>,
    pub direction: TrendDirection,
    pub is_anomaly: bool,
    pub z_score: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}
