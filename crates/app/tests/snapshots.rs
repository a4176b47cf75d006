mod support;

use ledger_app::BillingFeed;
use support::{at, charged_instance, setup_app, usage, TestApp};

fn two_user_source(app: &TestApp, name: &str) {
    let allocations = &app.state.services.allocations;
    allocations
        .upsert_source(name, 1000.0, at(0), None)
        .expect("source");
    allocations.add_user(name, "alice").expect("alice");
    allocations.add_user(name, "bob").expect("bob");
    charged_instance(app, &format!("{name}-a"), "alice", name, 2, 0, Some(10));
    charged_instance(app, &format!("{name}-b"), "bob", name, 1, 0, None);
}

#[test]
fn run_writes_user_and_source_snapshots() {
    let app = setup_app();
    two_user_source(&app, "TG-A");
    let feed = BillingFeed::from_readings(vec![usage("TG-A", 100.0, at(20))]);

    let report = app
        .state
        .services
        .snapshots
        .run(at(0), at(20), &feed, at(20))
        .expect("run");
    assert_eq!(report.sources_updated, 1);
    assert_eq!(report.user_snapshots, 2);
    assert!(report.issues.is_empty(), "{:?}", report.issues);

    let db = app.state.open_db().expect("db");
    let source = db
        .allocation_source_by_name("TG-A")
        .expect("load")
        .expect("source");
    let alice = db.user_snapshot(source.id, "alice").expect("load").expect("alice");
    assert!((alice.compute_used - 20.0).abs() < 1e-9);
    assert!((alice.burn_rate - 1.0).abs() < 1e-9);
    let bob = db.user_snapshot(source.id, "bob").expect("load").expect("bob");
    assert!((bob.compute_used - 20.0).abs() < 1e-9);

    let rollup = db.source_snapshot(source.id).expect("load").expect("rollup");
    // Cumulative usage is billing's figure; the rate is the sum of users' rates.
    assert_eq!(rollup.compute_used, 100.0);
    assert!((rollup.global_burn_rate - 2.0).abs() < 1e-9);
    assert_eq!(rollup.last_renewed, at(0));
}

#[test]
fn malformed_reading_only_skips_its_source() {
    let app = setup_app();
    for name in ["TG-A", "TG-B", "TG-C"] {
        two_user_source(&app, name);
    }
    let feed = BillingFeed::from_readings(vec![
        usage("TG-A", 10.0, at(20)),
        usage("TG-B", -5.0, at(20)),
        usage("TG-C", 30.0, at(20)),
    ]);

    let report = app
        .state
        .services
        .snapshots
        .run(at(0), at(20), &feed, at(20))
        .expect("run");
    assert_eq!(report.sources_seen, 3);
    assert_eq!(report.sources_updated, 2);
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].source_name, "TG-B");

    let db = app.state.open_db().expect("db");
    for (name, written) in [("TG-A", true), ("TG-B", false), ("TG-C", true)] {
        let source = db.allocation_source_by_name(name).expect("load").expect("source");
        assert_eq!(db.source_snapshot(source.id).expect("load").is_some(), written);
        assert_eq!(db.user_snapshots(source.id).expect("load").len(), if written { 2 } else { 0 });
    }
}

#[test]
fn renewal_restarts_accounting() {
    let app = setup_app();
    two_user_source(&app, "TG-A");
    let db = app.state.open_db().expect("db");
    db.record_renewal("TG-A", at(5)).expect("renewal");

    let feed = BillingFeed::from_readings(vec![usage("TG-A", 7.0, at(20))]);
    app.state
        .services
        .snapshots
        .run(at(0), at(20), &feed, at(20))
        .expect("run");

    let source = db.allocation_source_by_name("TG-A").expect("load").expect("source");
    let alice = db.user_snapshot(source.id, "alice").expect("load").expect("alice");
    assert!((alice.compute_used - 10.0).abs() < 1e-9);
    let bob = db.user_snapshot(source.id, "bob").expect("load").expect("bob");
    assert!((bob.compute_used - 15.0).abs() < 1e-9);
    let rollup = db.source_snapshot(source.id).expect("load").expect("rollup");
    assert_eq!(rollup.last_renewed, at(5));
}

#[test]
fn rerunning_is_idempotent() {
    let app = setup_app();
    two_user_source(&app, "TG-A");
    let feed = BillingFeed::from_readings(vec![usage("TG-A", 50.0, at(20))]);
    let engine = &app.state.services.snapshots;
    engine.run(at(0), at(20), &feed, at(20)).expect("first run");
    let db = app.state.open_db().expect("db");
    let source = db.allocation_source_by_name("TG-A").expect("load").expect("source");
    let first = db.user_snapshots(source.id).expect("load");

    engine.run(at(0), at(20), &feed, at(20)).expect("second run");
    let second = db.user_snapshots(source.id).expect("load");
    assert_eq!(first, second);
}

#[test]
fn missing_reading_keeps_previous_usage_and_unknown_sources_are_reported() {
    let app = setup_app();
    two_user_source(&app, "TG-A");
    let engine = &app.state.services.snapshots;
    let feed = BillingFeed::from_readings(vec![usage("TG-A", 42.0, at(10))]);
    engine.run(at(0), at(10), &feed, at(10)).expect("first run");

    let feed = BillingFeed::from_readings(vec![usage("TG-GHOST", 1.0, at(20))]);
    let report = engine.run(at(0), at(20), &feed, at(20)).expect("second run");
    assert_eq!(report.sources_updated, 1);
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].source_name, "TG-GHOST");

    let db = app.state.open_db().expect("db");
    let source = db.allocation_source_by_name("TG-A").expect("load").expect("source");
    let rollup = db.source_snapshot(source.id).expect("load").expect("rollup");
    assert_eq!(rollup.compute_used, 42.0);
    assert_eq!(rollup.updated_at, at(20));
}
