use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use upmon_common::types::{
    AlertIntent, AlertKind, AnomalySensitivity, MonitoredUnit, PingKind, PollOutcome, ProbeConfig,
    ScheduleKind, UnitKind, UnitStatus,
};
use upmon_engine::machine::UnitEvent;
use upmon_engine::stats::DurationStatsEngine;
use upmon_storage::unit_store::SqliteUnitRepository;
use upmon_storage::{SaveOutcome, UnitRepository};

use crate::alert::{AlertEmitter, AlertSink};
use crate::config::ServerConfig;
use crate::dispatch::{DispatchError, EventDispatcher};
use crate::sweep::prober::Prober;
use crate::sweep::scheduler::SweepScheduler;

struct CaptureSink {
    intents: Mutex<Vec<AlertIntent>>,
}

#[async_trait]
impl AlertSink for CaptureSink {
    fn name(&self) -> &str {
        "capture"
    }

    async fn emit(&self, intent: &AlertIntent) -> anyhow::Result<()> {
        self.intents.lock().unwrap().push(intent.clone());
        Ok(())
    }
}

/// Prober that always reports the same scripted outcome.
struct ScriptedProber {
    outcome: PollOutcome,
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn poll(&self, _probe: &ProbeConfig) -> PollOutcome {
        self.outcome.clone()
    }
}

struct Harness {
    repo: Arc<dyn UnitRepository>,
    stats: Arc<DurationStatsEngine>,
    dispatcher: Arc<EventDispatcher>,
    intents: Arc<CaptureSink>,
}

fn harness() -> Harness {
    let repo: Arc<dyn UnitRepository> = Arc::new(SqliteUnitRepository::in_memory().unwrap());
    let stats = Arc::new(DurationStatsEngine::new());
    let sink = Arc::new(CaptureSink {
        intents: Mutex::new(Vec::new()),
    });
    let emitter = Arc::new(AlertEmitter::new(
        vec![Box::new(ForwardSink(sink.clone()))],
        stats.clone(),
    ));
    let dispatcher = Arc::new(EventDispatcher::new(
        repo.clone(),
        stats.clone(),
        emitter,
        5,
    ));
    Harness {
        repo,
        stats,
        dispatcher,
        intents: sink,
    }
}

/// Lets the harness keep a handle on the sink while the emitter owns a box.
struct ForwardSink(Arc<CaptureSink>);

#[async_trait]
impl AlertSink for ForwardSink {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn emit(&self, intent: &AlertIntent) -> anyhow::Result<()> {
        self.0.emit(intent).await
    }
}

fn cron_unit(id: &str) -> MonitoredUnit {
    let now = Utc::now();
    MonitoredUnit {
        id: id.to_string(),
        project_id: "proj-1".into(),
        name: format!("job-{id}"),
        kind: UnitKind::CronJob,
        schedule: ScheduleKind::Period { seconds: 3600 },
        grace_seconds: 300,
        status: UnitStatus::New,
        last_seen_at: None,
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
        created_at: now,
        updated_at: now,
    }
}

fn http_unit(id: &str) -> MonitoredUnit {
    let mut unit = cron_unit(id);
    unit.kind = UnitKind::HttpMonitor;
    unit.schedule = ScheduleKind::Interval { seconds: 60 };
    unit.probe = Some(ProbeConfig {
        url: "http://localhost/health".into(),
        timeout_secs: 5,
        expected_status: Vec::new(),
        body_contains: None,
    });
    unit
}

fn failed_poll() -> PollOutcome {
    PollOutcome {
        success: false,
        status_code: Some(503),
        response_ms: Some(12),
        error: Some("unexpected status 503".into()),
    }
}

fn ok_poll() -> PollOutcome {
    PollOutcome {
        success: true,
        status_code: Some(200),
        response_ms: Some(8),
        error: None,
    }
}

#[tokio::test]
async fn dispatch_persists_ping_transition() {
    let h = harness();
    h.repo.insert(&cron_unit("u1")).unwrap();

    let unit = h
        .dispatcher
        .dispatch("u1", &UnitEvent::Ping(PingKind::Success), Utc::now())
        .await
        .unwrap();
    assert_eq!(unit.status, UnitStatus::Up);
    assert!(unit.next_expected_at.is_some());

    let stored = h.repo.load("u1").unwrap().unwrap();
    assert_eq!(stored.status, UnitStatus::Up);
    assert_eq!(stored.version, 2);
}

#[tokio::test]
async fn dispatch_rejects_unknown_unit() {
    let h = harness();
    let err = h
        .dispatcher
        .dispatch("nope", &UnitEvent::Ping(PingKind::Success), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::UnknownUnit(_)));
}

#[tokio::test]
async fn no_op_events_skip_the_save() {
    let h = harness();
    h.repo.insert(&cron_unit("u1")).unwrap();

    // A NEW unit has no deadline, so the sweep events are no-ops.
    h.dispatcher
        .dispatch("u1", &UnitEvent::MissedDeadline, Utc::now())
        .await
        .unwrap();
    let stored = h.repo.load("u1").unwrap().unwrap();
    assert_eq!(stored.status, UnitStatus::New);
    assert_eq!(stored.version, 1);
}

#[tokio::test]
async fn down_transition_emits_exactly_one_alert() {
    let h = harness();
    let mut unit = cron_unit("u1");
    unit.status = UnitStatus::Up;
    unit.next_expected_at = Some(Utc::now() - Duration::hours(2));
    h.repo.insert(&unit).unwrap();

    let now = Utc::now();
    h.dispatcher
        .dispatch("u1", &UnitEvent::MissedDeadline, now)
        .await
        .unwrap();
    h.dispatcher
        .dispatch("u1", &UnitEvent::GraceExceeded, now)
        .await
        .unwrap();
    // Idempotent re-dispatch while DOWN.
    h.dispatcher
        .dispatch("u1", &UnitEvent::GraceExceeded, now)
        .await
        .unwrap();

    let intents = h.intents.intents.lock().unwrap();
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].kind, AlertKind::Down);
    assert_eq!(intents[0].unit_id, "u1");
}

#[tokio::test]
async fn matched_start_success_records_a_duration_sample() {
    let h = harness();
    h.repo.insert(&cron_unit("u1")).unwrap();

    let started = Utc::now() - Duration::seconds(42);
    h.dispatcher
        .dispatch("u1", &UnitEvent::Ping(PingKind::Start), started)
        .await
        .unwrap();
    h.dispatcher
        .dispatch(
            "u1",
            &UnitEvent::Ping(PingKind::Success),
            started + Duration::seconds(42),
        )
        .await
        .unwrap();

    let stats = h.stats.stats("u1").unwrap();
    assert_eq!(stats.sample_count, 1);
    assert_eq!(stats.p50_ms, 42_000);
}

#[tokio::test]
async fn dispatch_retries_through_a_version_conflict() {
    struct ConflictOnce {
        inner: SqliteUnitRepository,
        tripped: AtomicBool,
    }

    impl UnitRepository for ConflictOnce {
        fn insert(&self, unit: &MonitoredUnit) -> upmon_storage::error::Result<()> {
            self.inner.insert(unit)
        }
        fn load(&self, unit_id: &str) -> upmon_storage::error::Result<Option<MonitoredUnit>> {
            self.inner.load(unit_id)
        }
        fn save(
            &self,
            unit: &MonitoredUnit,
            expected_version: i64,
        ) -> upmon_storage::error::Result<SaveOutcome> {
            if !self.tripped.swap(true, Ordering::SeqCst) {
                return Ok(SaveOutcome::Conflict);
            }
            self.inner.save(unit, expected_version)
        }
        fn find_due(
            &self,
            kind: UnitKind,
            now: chrono::DateTime<Utc>,
        ) -> upmon_storage::error::Result<Vec<MonitoredUnit>> {
            self.inner.find_due(kind, now)
        }
        fn list(&self) -> upmon_storage::error::Result<Vec<MonitoredUnit>> {
            self.inner.list()
        }
        fn delete(&self, unit_id: &str) -> upmon_storage::error::Result<bool> {
            self.inner.delete(unit_id)
        }
    }

    let repo: Arc<dyn UnitRepository> = Arc::new(ConflictOnce {
        inner: SqliteUnitRepository::in_memory().unwrap(),
        tripped: AtomicBool::new(false),
    });
    let stats = Arc::new(DurationStatsEngine::new());
    let emitter = Arc::new(AlertEmitter::new(Vec::new(), stats.clone()));
    let dispatcher = EventDispatcher::new(repo.clone(), stats, emitter, 3);

    repo.insert(&cron_unit("u1")).unwrap();
    let unit = dispatcher
        .dispatch("u1", &UnitEvent::Ping(PingKind::Success), Utc::now())
        .await
        .unwrap();
    assert_eq!(unit.status, UnitStatus::Up);
    assert_eq!(repo.load("u1").unwrap().unwrap().version, 2);
}

#[tokio::test]
async fn sweep_walks_an_overdue_cron_job_to_down() {
    let h = harness();
    let mut unit = cron_unit("u1");
    unit.status = UnitStatus::Up;
    unit.next_expected_at = Some(Utc::now() - Duration::hours(2));
    h.repo.insert(&unit).unwrap();

    let scheduler = SweepScheduler::new(
        h.repo.clone(),
        h.dispatcher.clone(),
        Arc::new(ScriptedProber { outcome: ok_poll() }),
        10,
        4,
    );

    scheduler.sweep_cron_jobs().await.unwrap();
    assert_eq!(
        h.repo.load("u1").unwrap().unwrap().status,
        UnitStatus::Late
    );

    scheduler.sweep_cron_jobs().await.unwrap();
    let stored = h.repo.load("u1").unwrap().unwrap();
    assert_eq!(stored.status, UnitStatus::Down);
    assert!(stored.last_alert_at.is_some());
    assert_eq!(h.intents.intents.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn failing_probe_marks_monitor_late_and_records_the_error() {
    let h = harness();
    let mut unit = http_unit("m1");
    unit.status = UnitStatus::Up;
    unit.next_expected_at = Some(Utc::now() - Duration::minutes(5));
    h.repo.insert(&unit).unwrap();

    let scheduler = SweepScheduler::new(
        h.repo.clone(),
        h.dispatcher.clone(),
        Arc::new(ScriptedProber {
            outcome: failed_poll(),
        }),
        10,
        4,
    );
    scheduler.sweep_http_monitors().await.unwrap();

    let stored = h.repo.load("m1").unwrap().unwrap();
    assert_eq!(stored.status, UnitStatus::Late);
    assert_eq!(stored.last_error.as_deref(), Some("unexpected status 503"));
    // Deadline re-armed in the future, so the next tick skips it.
    assert!(stored.next_expected_at.unwrap() > Utc::now() - Duration::seconds(5));
}

#[tokio::test]
async fn successful_probe_re_arms_from_completion() {
    let h = harness();
    let mut unit = http_unit("m1");
    unit.status = UnitStatus::Late;
    unit.next_expected_at = Some(Utc::now() - Duration::minutes(5));
    h.repo.insert(&unit).unwrap();

    let before = Utc::now();
    let scheduler = SweepScheduler::new(
        h.repo.clone(),
        h.dispatcher.clone(),
        Arc::new(ScriptedProber { outcome: ok_poll() }),
        10,
        4,
    );
    scheduler.sweep_http_monitors().await.unwrap();

    let stored = h.repo.load("m1").unwrap().unwrap();
    assert_eq!(stored.status, UnitStatus::Up);
    assert!(stored.last_error.is_none());
    let deadline = stored.next_expected_at.unwrap();
    assert!(deadline >= before + Duration::seconds(60));
}

#[tokio::test]
async fn sweep_skips_monitors_that_lost_their_probe_config() {
    let h = harness();
    let mut unit = http_unit("m1");
    unit.status = UnitStatus::Up;
    unit.next_expected_at = Some(Utc::now() - Duration::minutes(5));
    unit.probe = None;
    h.repo.insert(&unit).unwrap();

    let scheduler = SweepScheduler::new(
        h.repo.clone(),
        h.dispatcher.clone(),
        Arc::new(ScriptedProber {
            outcome: failed_poll(),
        }),
        10,
        4,
    );
    scheduler.sweep_http_monitors().await.unwrap();

    // Untouched: no probe means no poll and no transition.
    assert_eq!(h.repo.load("m1").unwrap().unwrap().status, UnitStatus::Up);
}

#[test]
fn config_defaults_fill_missing_sections() {
    let config: ServerConfig = toml::from_str("http_port = 9999").unwrap();
    assert_eq!(config.http_port, 9999);
    assert_eq!(config.data_dir, "data");
    assert!(config.sweep.enabled);
    assert_eq!(config.sweep.tick_secs, 10);
    assert_eq!(config.sweep.max_concurrent_probes, 10);
    assert!(config.alerts.webhook_url.is_none());
}

#[test]
fn config_nested_overrides_apply() {
    let config: ServerConfig = toml::from_str(
        r#"
        data_dir = "/var/lib/upmon"

        [sweep]
        tick_secs = 30
        max_concurrent_probes = 2

        [alerts]
        webhook_url = "https://hooks.example.com/upmon"
        "#,
    )
    .unwrap();
    assert_eq!(config.data_dir, "/var/lib/upmon");
    assert_eq!(config.sweep.tick_secs, 30);
    assert_eq!(config.sweep.max_concurrent_probes, 2);
    assert!(config.sweep.enabled);
    assert_eq!(
        config.alerts.webhook_url.as_deref(),
        Some("https://hooks.example.com/upmon")
    );
}
