mod support;

use rusqlite::Connection;
use support::setup_db;

#[test]
fn migrate_is_idempotent() {
    let mut test_db = setup_db();
    test_db.db.migrate().expect("second migrate");

    let conn = Connection::open(&test_db.path).expect("open conn");
    let tables: Vec<String> = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .expect("prepare")
        .query_map([], |row| row.get(0))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("collect");
    for expected in [
        "allocation_renewal_event",
        "allocation_source",
        "allocation_source_snapshot",
        "allocation_source_user",
        "app_setting",
        "resource",
        "status_interval",
        "user_allocation_snapshot",
    ] {
        assert!(tables.iter().any(|name| name == expected), "missing {expected}");
    }
}

#[test]
fn status_interval_rejects_inverted_rows() {
    let test_db = setup_db();
    let conn = Connection::open(&test_db.path).expect("open conn");
    conn.execute(
        r#"
        INSERT INTO resource (kind, identifier, created_by, start_date)
        VALUES ('instance', 'i-raw', 'alice', '2025-01-01T00:00:00.000Z')
        "#,
        [],
    )
    .expect("insert resource");
    let inserted = conn.execute(
        r#"
        INSERT INTO status_interval (resource_id, status, size_name, cpu, start_date, end_date)
        VALUES (1, 'active', 'm1.small', 1, '2025-01-02T00:00:00.000Z', '2025-01-01T00:00:00.000Z')
        "#,
        [],
    );
    assert!(inserted.is_err());
}

#[test]
fn accounting_epoch_setting_round_trips() {
    let test_db = setup_db();
    assert!(test_db.db.get_accounting_epoch().expect("epoch").is_none());
    let epoch = support::at(0);
    test_db.db.set_accounting_epoch(epoch).expect("set epoch");
    assert_eq!(test_db.db.get_accounting_epoch().expect("epoch"), Some(epoch));
}
