mod support;

use chrono::Duration;
use ledger_app::AppError;
use rules::RuleError;
use support::{at, setup_app, TestApp};

/// Source ending `end_in_days` after `now`, with a snapshot renewed
/// `renewed_days_ago` before `now`.
fn source_with_snapshot(app: &TestApp, name: &str, end_in_days: i64, renewed_days_ago: i64) {
    let now = at(0);
    let source = app
        .state
        .services
        .allocations
        .upsert_source(
            name,
            100.0,
            now - Duration::days(365),
            Some(now + Duration::days(end_in_days)),
        )
        .expect("source");
    let db = app.state.open_db().expect("db");
    db.upsert_source_snapshot(
        source.id,
        10.0,
        0.5,
        now - Duration::days(renewed_days_ago),
        now,
    )
    .expect("snapshot");
}

#[test]
fn valid_pending_source_is_renewed_once() {
    let app = setup_app();
    source_with_snapshot(&app, "TG-DUE", 10, 31);
    let renewals = &app.state.services.renewals;

    let outcome = renewals.evaluate("TG-DUE", at(0)).expect("evaluate");
    assert!(outcome.renewed);
    assert_eq!(outcome.rules.len(), 1);
    assert_eq!(outcome.rules[0].actions_run, vec!["renew_allocation_source"]);

    let db = app.state.open_db().expect("db");
    assert_eq!(db.count_renewals("TG-DUE").expect("count"), 1);
    assert_eq!(db.latest_renewal("TG-DUE").expect("latest"), Some(at(0)));

    // The clock restarted, so the next evaluation does nothing.
    let outcome = renewals
        .evaluate("TG-DUE", at(0) + Duration::days(1))
        .expect("evaluate again");
    assert!(!outcome.renewed);
    assert_eq!(db.count_renewals("TG-DUE").expect("count"), 1);
}

#[test]
fn renewal_needs_both_conditions() {
    let app = setup_app();
    source_with_snapshot(&app, "TG-EXPIRED", -1, 31);
    source_with_snapshot(&app, "TG-RECENT", 10, 5);
    let renewals = &app.state.services.renewals;

    assert!(!renewals.evaluate("TG-EXPIRED", at(0)).expect("evaluate").renewed);
    assert!(!renewals.evaluate("TG-RECENT", at(0)).expect("evaluate").renewed);
    let db = app.state.open_db().expect("db");
    assert_eq!(db.count_renewals("TG-EXPIRED").expect("count"), 0);
    assert_eq!(db.count_renewals("TG-RECENT").expect("count"), 0);
}

#[test]
fn unknown_source_is_a_caller_error() {
    let app = setup_app();
    let err = app
        .state
        .services
        .renewals
        .evaluate("TG-NOPE", at(0))
        .expect_err("unknown source");
    assert!(matches!(err, AppError::Rules(RuleError::InvalidContext(_))));
}

#[test]
fn evaluate_all_renews_due_sources() {
    let app = setup_app();
    source_with_snapshot(&app, "TG-DUE", 10, 40);
    source_with_snapshot(&app, "TG-RECENT", 10, 1);
    app.state
        .services
        .allocations
        .upsert_source("TG-FRESH", 100.0, at(0), None)
        .expect("source without snapshot");

    let report = app
        .state
        .services
        .renewals
        .evaluate_all(at(0))
        .expect("evaluate all");
    assert_eq!(report.evaluated, 3);
    assert_eq!(report.renewed, vec!["TG-DUE".to_string()]);
    assert!(report.issues.is_empty(), "{:?}", report.issues);
}

#[test]
fn rules_file_on_disk_replaces_defaults() {
    let app = setup_app();
    source_with_snapshot(&app, "TG-DUE", 10, 40);
    let path = app.state.config.rules_path.clone().expect("rules path");
    std::fs::write(
        &path,
        r#"[{"conditions": {"all": [
            {"name": "is_valid", "operator": "equal_to", "value": false}
        ]}, "actions": [{"name": "renew_allocation_source"}]}]"#,
    )
    .expect("write rules");

    let outcome = app
        .state
        .services
        .renewals
        .evaluate("TG-DUE", at(0))
        .expect("evaluate");
    assert!(!outcome.renewed);
}
