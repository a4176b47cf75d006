#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use ledger_app::{AccountingSettings, AppConfig, AppState, RetrySettings};
use ledger_core::{ResourceKind, SizeSnapshot, StatusReading, UsageReading};
use ledger_db::format_ts;
use tempfile::TempDir;

pub struct TestApp {
    pub _dir: TempDir,
    pub state: AppState,
}

pub fn setup_app() -> TestApp {
    setup_app_with(AccountingSettings::default())
}

pub fn setup_app_with(mut settings: AccountingSettings) -> TestApp {
    let dir = tempfile::tempdir().expect("temp dir");
    settings.retry = RetrySettings {
        max_attempts: 3,
        base_backoff_ms: 1,
    };
    let state = AppState::new(AppConfig {
        db_path: dir.path().join("ledger.sqlite"),
        rules_path: Some(dir.path().join("renewal-rules.json")),
        settings,
    });
    state.initialize().expect("initialize");
    TestApp { _dir: dir, state }
}

pub fn at(hours: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hours)
}

pub fn reading(
    id: &str,
    user: &str,
    status: &str,
    cpu: u32,
    launched: DateTime<Utc>,
) -> StatusReading {
    StatusReading {
        resource_id: id.to_string(),
        kind: ResourceKind::Instance,
        status: status.to_string(),
        task: None,
        size: SizeSnapshot {
            name: format!("m1.cpu{cpu}"),
            cpu,
        },
        attachment: None,
        observed_at: launched,
        first_observation: true,
        created_by: Some(user.to_string()),
        launched_at: Some(format_ts(launched)),
    }
}

/// Applies one reading taken at `now`, failing the test on any issue.
pub fn observe(app: &TestApp, mut reading: StatusReading, now: DateTime<Utc>) {
    reading.observed_at = now;
    let stats = app
        .state
        .services
        .status
        .observe(&[reading], now)
        .expect("observe");
    assert!(stats.issues.is_empty(), "{:?}", stats.issues);
}

/// An instance of `user` charged to `source`: seen building at `launch` and
/// active in the same instant, suspended at `suspend` when given.
pub fn charged_instance(
    app: &TestApp,
    id: &str,
    user: &str,
    source: &str,
    cpu: u32,
    launch: i64,
    suspend: Option<i64>,
) {
    observe(app, reading(id, user, "build", cpu, at(launch)), at(launch));
    let mut active = reading(id, user, "active", cpu, at(launch));
    active.first_observation = false;
    observe(app, active.clone(), at(launch));
    if let Some(suspend) = suspend {
        active.status = "suspended".to_string();
        observe(app, active, at(suspend));
    }
    app.state
        .services
        .allocations
        .assign_resource(id, Some(source))
        .expect("assign");
}

pub fn usage(source: &str, compute_used: f64, as_of: DateTime<Utc>) -> UsageReading {
    UsageReading {
        source_name: source.to_string(),
        compute_used,
        as_of,
    }
}
