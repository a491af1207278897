/// Errors produced while validating or evaluating schedules.
///
/// Schedule problems are rejected at unit create/update time through
/// [`crate::schedule::validate_schedule`], so the evaluation path inside
/// the state machine is effectively infallible once a unit exists.
///
/// # Examples
///
/// ```rust
/// use upmon_engine::error::ScheduleError;
///
/// let err = ScheduleError::NonPositivePeriod { seconds: 0 };
/// assert!(err.to_string().contains("period"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// The cron expression could not be parsed.
    #[error("Schedule: invalid cron expression '{expression}': {source}")]
    InvalidCron {
        expression: String,
        source: cron::error::Error,
    },

    /// A period or interval schedule carried a zero-second duration.
    #[error("Schedule: period/interval must be positive, got {seconds}")]
    NonPositivePeriod { seconds: u64 },

    /// The cron expression has no future occurrence (e.g. an impossible
    /// day-of-month/month combination).
    #[error("Schedule: cron expression '{expression}' never fires")]
    NoNextOccurrence { expression: String },
}

/// Convenience `Result` alias for schedule operations.
pub type Result<T> = std::result::Result<T, ScheduleError>;
