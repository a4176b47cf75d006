#![allow(dead_code)]

use std::path::PathBuf;

use chrono::{DateTime, Duration, TimeZone, Utc};
use ledger_core::{
    AllocationSource, AllocationSourceInput, CanonicalStatus, NewInterval, Resource,
    ResourceInput, ResourceKind, SizeSnapshot, StatusInterval, TransitionPlan,
};
use ledger_db::Db;
use tempfile::TempDir;

pub struct TestDb {
    pub _dir: TempDir,
    pub db: Db,
    pub path: PathBuf,
}

pub fn setup_db() -> TestDb {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("test.sqlite");
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

pub fn size(cpu: u32) -> SizeSnapshot {
    SizeSnapshot {
        name: format!("m1.cpu{cpu}"),
        cpu,
    }
}

pub fn make_resource(db: &Db, identifier: &str, created_by: &str, start: DateTime<Utc>) -> Resource {
    db.get_or_create_resource(&ResourceInput {
        kind: ResourceKind::Instance,
        identifier: identifier.to_string(),
        created_by: created_by.to_string(),
        start_date: start,
    })
    .expect("resource")
}

pub fn open_plan(status: CanonicalStatus, cpu: u32, start: DateTime<Utc>) -> TransitionPlan {
    TransitionPlan {
        open: Some(NewInterval {
            status,
            size: size(cpu),
            attachment: None,
            start_date: start,
        }),
        ..TransitionPlan::default()
    }
}

pub fn transition_plan(status: CanonicalStatus, cpu: u32, at: DateTime<Utc>) -> TransitionPlan {
    TransitionPlan {
        close_at: Some(at),
        ..open_plan(status, cpu, at)
    }
}

/// Applies a plan using the resource's current version.
pub fn apply(db: &mut Db, resource_id: i64, plan: &TransitionPlan) {
    let version = db.get_resource(resource_id).expect("resource").version;
    db.apply_transition(resource_id, version, plan)
        .expect("apply transition");
}

pub fn make_source(db: &Db, name: &str, end: Option<DateTime<Utc>>) -> AllocationSource {
    db.upsert_allocation_source(&AllocationSourceInput {
        name: name.to_string(),
        compute_allowed: 1000.0,
        start_date: at(0),
        end_date: end,
    })
    .expect("source")
}

pub fn assert_non_overlapping(intervals: &[StatusInterval]) {
    let open = intervals.iter().filter(|interval| interval.is_open()).count();
    assert!(open <= 1, "more than one open interval");
    for pair in intervals.windows(2) {
        assert!(
            pair[0].start_date < pair[1].start_date,
            "starts not strictly ordered"
        );
        let end = pair[0].end_date.expect("only the last interval may be open");
        assert!(end <= pair[1].start_date, "intervals overlap");
    }
}
