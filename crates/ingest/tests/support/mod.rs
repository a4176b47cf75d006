#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use ingest::{RetryPolicy, StatusResolver};
use ledger_core::{Attachment, ResourceKind, SizeSnapshot, StatusInterval, StatusReading};
use ledger_db::{Db, format_ts};
use tempfile::TempDir;

pub struct TestDb {
    pub _dir: TempDir,
    pub db: Db,
    pub path: PathBuf,
}

pub fn setup_db() -> TestDb {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("ingest.sqlite");
    let mut db = Db::open(&path).expect("open db");
    db.migrate().expect("migrate db");
    TestDb {
        _dir: dir,
        db,
        path,
    }
}

pub fn at(hours: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hours)
}

pub fn resolver() -> StatusResolver {
    StatusResolver::new(RetryPolicy {
        max_attempts: 3,
        base_backoff: StdDuration::from_millis(1),
    })
}

pub fn instance_reading(id: &str, status: &str, cpu: u32, launched: DateTime<Utc>) -> StatusReading {
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
        first_observation: false,
        created_by: Some("alice".to_string()),
        launched_at: Some(format_ts(launched)),
    }
}

pub fn volume_reading(
    id: &str,
    status: &str,
    instance: Option<&str>,
    launched: DateTime<Utc>,
) -> StatusReading {
    StatusReading {
        kind: ResourceKind::Volume,
        size: SizeSnapshot {
            name: "vol-10g".to_string(),
            cpu: 0,
        },
        attachment: Some(Attachment {
            device: instance.map(|_| "/dev/vdb".to_string()),
            instance_alias: instance.map(str::to_string),
        }),
        ..instance_reading(id, status, 0, launched)
    }
}

/// Marks a reading as taken at `observed_at`.
pub fn seen(mut reading: StatusReading, observed_at: DateTime<Utc>) -> StatusReading {
    reading.observed_at = observed_at;
    reading
}

pub fn assert_strictly_ordered(intervals: &[StatusInterval]) {
    for pair in intervals.windows(2) {
        assert!(
            pair[0].start_date < pair[1].start_date,
            "starts not strictly ordered: {:?}",
            pair
        );
        assert_eq!(pair[0].end_date, Some(pair[1].start_date), "gap or overlap");
    }
}
