use crate::unit_store::SqliteUnitRepository;
use crate::{SaveOutcome, UnitRepository};
use chrono::{Duration, TimeZone, Utc};
use tempfile::TempDir;
use upmon_common::types::{
    AnomalySensitivity, MonitoredUnit, ProbeConfig, ScheduleKind, UnitKind, UnitStatus,
};

fn setup() -> (TempDir, SqliteUnitRepository) {
    upmon_common::id::init(1, 1);
    let dir = TempDir::new().unwrap();
    let repo = SqliteUnitRepository::new(dir.path()).unwrap();
    (dir, repo)
}

fn make_unit(id: &str, kind: UnitKind) -> MonitoredUnit {
    let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let (schedule, probe) = match kind {
        UnitKind::CronJob => (ScheduleKind::Period { seconds: 3600 }, None),
        UnitKind::HttpMonitor => (
            ScheduleKind::Interval { seconds: 60 },
            Some(ProbeConfig {
                url: "https://example.com/health".to_string(),
                timeout_secs: 10,
                expected_status: vec![200],
                body_contains: None,
            }),
        ),
    };
    MonitoredUnit {
        id: id.to_string(),
        project_id: "proj-1".to_string(),
        name: format!("unit {id}"),
        kind,
        schedule,
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
        reminder_interval_hours: Some(6),
        alert_on_recovery: true,
        anomaly_sensitivity: AnomalySensitivity::Normal,
        probe,
        version: 1,
        created_at: created,
        updated_at: created,
    }
}

#[test]
fn insert_and_load_round_trip() {
    let (_dir, repo) = setup();
    let unit = make_unit("u1", UnitKind::HttpMonitor);
    repo.insert(&unit).unwrap();

    let loaded = repo.load("u1").unwrap().expect("unit exists");
    assert_eq!(loaded.id, unit.id);
    assert_eq!(loaded.kind, UnitKind::HttpMonitor);
    assert_eq!(loaded.schedule, unit.schedule);
    assert_eq!(loaded.status, UnitStatus::New);
    assert_eq!(loaded.probe, unit.probe);
    assert_eq!(loaded.version, 1);
    assert_eq!(loaded.reminder_interval_hours, Some(6));

    assert!(repo.load("missing").unwrap().is_none());
}

#[test]
fn save_bumps_version() {
    let (_dir, repo) = setup();
    let mut unit = make_unit("u1", UnitKind::CronJob);
    repo.insert(&unit).unwrap();

    unit.status = UnitStatus::Up;
    unit.last_seen_at = Some(Utc::now());
    unit.next_expected_at = Some(Utc::now() + Duration::hours(1));
    assert_eq!(repo.save(&unit, 1).unwrap(), SaveOutcome::Saved);

    let loaded = repo.load("u1").unwrap().unwrap();
    assert_eq!(loaded.status, UnitStatus::Up);
    assert_eq!(loaded.version, 2);
}

#[test]
fn save_with_stale_version_conflicts() {
    let (_dir, repo) = setup();
    let mut unit = make_unit("u1", UnitKind::CronJob);
    repo.insert(&unit).unwrap();

    unit.status = UnitStatus::Up;
    assert_eq!(repo.save(&unit, 1).unwrap(), SaveOutcome::Saved);

    // A second writer still holding version 1 must not clobber the row.
    let mut stale = unit.clone();
    stale.status = UnitStatus::Down;
    assert_eq!(repo.save(&stale, 1).unwrap(), SaveOutcome::Conflict);

    let loaded = repo.load("u1").unwrap().unwrap();
    assert_eq!(loaded.status, UnitStatus::Up);
    assert_eq!(loaded.version, 2);
}

#[test]
fn find_due_returns_only_overdue_units() {
    let (_dir, repo) = setup();
    let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();

    let mut overdue = make_unit("overdue", UnitKind::CronJob);
    overdue.status = UnitStatus::Up;
    overdue.next_expected_at = Some(now - Duration::seconds(30));
    repo.insert(&overdue).unwrap();

    let mut future = make_unit("future", UnitKind::CronJob);
    future.status = UnitStatus::Up;
    future.next_expected_at = Some(now + Duration::hours(1));
    repo.insert(&future).unwrap();

    let mut unarmed = make_unit("unarmed", UnitKind::CronJob);
    unarmed.next_expected_at = None;
    repo.insert(&unarmed).unwrap();

    let mut paused = make_unit("paused", UnitKind::CronJob);
    paused.status = UnitStatus::Paused;
    paused.next_expected_at = Some(now - Duration::hours(1));
    repo.insert(&paused).unwrap();

    let mut http = make_unit("http", UnitKind::HttpMonitor);
    http.next_expected_at = Some(now - Duration::seconds(5));
    repo.insert(&http).unwrap();

    let due = repo.find_due(UnitKind::CronJob, now).unwrap();
    let ids: Vec<&str> = due.iter().map(|u| u.id.as_str()).collect();
    assert_eq!(ids, vec!["overdue"], "kind, pause, and deadline all filter");

    let due_http = repo.find_due(UnitKind::HttpMonitor, now).unwrap();
    assert_eq!(due_http.len(), 1);
    assert_eq!(due_http[0].id, "http");
}

#[test]
fn find_due_orders_by_deadline() {
    let (_dir, repo) = setup();
    let now = Utc::now();
    for (id, secs_ago) in [("a", 10), ("b", 300), ("c", 60)] {
        let mut unit = make_unit(id, UnitKind::CronJob);
        unit.status = UnitStatus::Up;
        unit.next_expected_at = Some(now - Duration::seconds(secs_ago));
        repo.insert(&unit).unwrap();
    }
    let due = repo.find_due(UnitKind::CronJob, now).unwrap();
    let ids: Vec<&str> = due.iter().map(|u| u.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "c", "a"], "most overdue first");
}

#[test]
fn delete_reports_whether_row_existed() {
    let (_dir, repo) = setup();
    repo.insert(&make_unit("u1", UnitKind::CronJob)).unwrap();
    assert!(repo.delete("u1").unwrap());
    assert!(!repo.delete("u1").unwrap());
    assert!(repo.load("u1").unwrap().is_none());
}

#[test]
fn list_returns_all_units() {
    let (_dir, repo) = setup();
    repo.insert(&make_unit("u1", UnitKind::CronJob)).unwrap();
    repo.insert(&make_unit("u2", UnitKind::HttpMonitor)).unwrap();
    let all = repo.list().unwrap();
    assert_eq!(all.len(), 2);
}
