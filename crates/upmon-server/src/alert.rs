//! Alert intent construction and delivery.
//!
//! The engine only decides *that* an alert fires; this module turns the
//! decision into an [`AlertIntent`] enriched with duration context and
//! hands it to every configured sink. Sink failures are logged and never
//! propagate back into the state machine.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use upmon_common::types::{AlertContext, AlertIntent, AlertKind, MonitoredUnit};
use upmon_engine::stats::DurationStatsEngine;

/// Delivery backend for alert intents.
#[async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &str;

    async fn emit(&self, intent: &AlertIntent) -> anyhow::Result<()>;
}

/// Writes alerts to the structured log. Always configured.
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn emit(&self, intent: &AlertIntent) -> anyhow::Result<()> {
        match intent.kind {
            AlertKind::Up => tracing::info!(
                unit_id = %intent.unit_id,
                unit = %intent.unit_name,
                "{}",
                intent.message
            ),
            AlertKind::Down | AlertKind::StillDown => tracing::warn!(
                unit_id = %intent.unit_id,
                unit = %intent.unit_name,
                "{}",
                intent.message
            ),
        }
        Ok(())
    }
}

/// POSTs the intent as JSON to a configured URL.
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: String, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn emit(&self, intent: &AlertIntent) -> anyhow::Result<()> {
        let resp = self.client.post(&self.url).json(intent).send().await?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("webhook returned {}", status);
        }
        Ok(())
    }
}

/// Fans alert kinds out to every sink, enriching each intent with the
/// unit's recent duration trend.
pub struct AlertEmitter {
    sinks: Vec<Box<dyn AlertSink>>,
    stats: Arc<DurationStatsEngine>,
}

impl AlertEmitter {
    pub fn new(sinks: Vec<Box<dyn AlertSink>>, stats: Arc<DurationStatsEngine>) -> Self {
        Self { sinks, stats }
    }

    pub async fn emit_all(&self, unit: &MonitoredUnit, kinds: &[AlertKind], now: DateTime<Utc>) {
        for kind in kinds {
            let intent = self.build_intent(unit, *kind, now);
            for sink in &self.sinks {
                if let Err(e) = sink.emit(&intent).await {
                    tracing::error!(
                        sink = sink.name(),
                        unit_id = %unit.id,
                        error = %e,
                        "Alert delivery failed"
                    );
                }
            }
        }
    }

    fn build_intent(&self, unit: &MonitoredUnit, kind: AlertKind, now: DateTime<Utc>) -> AlertIntent {
        AlertIntent {
            unit_id: unit.id.clone(),
            unit_name: unit.name.clone(),
            kind,
            message: alert_message(unit, kind),
            context: AlertContext {
                duration_trend: self.stats.trend(&unit.id, unit.anomaly_sensitivity),
                last_error: unit.last_error.clone(),
                response_ms: unit.last_response_ms,
            },
            timestamp: now,
        }
    }
}

fn alert_message(unit: &MonitoredUnit, kind: AlertKind) -> String {
    match kind {
        AlertKind::Down => match (&unit.last_error, unit.last_seen_at) {
            (Some(err), _) => format!("Unit '{}' is DOWN: {}", unit.name, err),
            (None, Some(seen)) => format!(
                "Unit '{}' is DOWN, no signal since {}",
                unit.name,
                seen.to_rfc3339()
            ),
            (None, None) => format!("Unit '{}' is DOWN, never reported", unit.name),
        },
        AlertKind::Up => format!("Unit '{}' recovered", unit.name),
        AlertKind::StillDown => match unit.last_seen_at {
            Some(seen) => format!(
                "Unit '{}' is still DOWN, last signal {}",
                unit.name,
                seen.to_rfc3339()
            ),
            None => format!("Unit '{}' is still DOWN, never reported", unit.name),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use upmon_common::types::{AnomalySensitivity, ScheduleKind, UnitKind, UnitStatus};

    fn unit() -> MonitoredUnit {
        let t = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        MonitoredUnit {
            id: "u1".into(),
            project_id: "p1".into(),
            name: "backup".into(),
            kind: UnitKind::CronJob,
            schedule: ScheduleKind::Period { seconds: 3600 },
            grace_seconds: 300,
            status: UnitStatus::Down,
            last_seen_at: Some(t),
            last_started_at: None,
            last_checked_at: None,
            last_response_ms: None,
            next_expected_at: None,
            last_alert_at: None,
            failing_since: None,
            last_error: None,
            reminder_interval_hours: None,
            alert_on_recovery: true,
            anomaly_sensitivity: AnomalySensitivity::Normal,
            probe: None,
            version: 1,
            created_at: t,
            updated_at: t,
        }
    }

    #[test]
    fn down_message_prefers_probe_error_over_last_seen() {
        let mut u = unit();
        u.last_error = Some("connect timeout".into());
        let msg = alert_message(&u, AlertKind::Down);
        assert!(msg.contains("connect timeout"));

        u.last_error = None;
        let msg = alert_message(&u, AlertKind::Down);
        assert!(msg.contains("no signal since 2025-06-01T00:00:00+00:00"));
    }

    #[test]
    fn recovery_and_reminder_messages_name_the_unit() {
        let u = unit();
        assert_eq!(alert_message(&u, AlertKind::Up), "Unit 'backup' recovered");
        assert!(alert_message(&u, AlertKind::StillDown).starts_with("Unit 'backup' is still DOWN"));
    }
}
