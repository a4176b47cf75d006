use chrono::{DateTime, Utc};
use ledger_core::{NewInterval, StatusInterval, TransitionPlan, Window};
use rusqlite::{OptionalExtension, Transaction, TransactionBehavior, ffi, params};

use crate::Db;
use crate::error::{DbError, Result};
use crate::helpers::{INTERVAL_COLUMNS, format_opt_ts, format_ts, row_to_interval};
use crate::types::AppliedTransition;

impl Db {
    /// Full history for a resource, oldest first.
    pub fn intervals(&self, resource_id: i64) -> Result<Vec<StatusInterval>> {
        let sql = format!(
            r#"
            SELECT {INTERVAL_COLUMNS}
            FROM status_interval
            WHERE resource_id = ?1
            ORDER BY start_date ASC, id ASC
            "#
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![resource_id], row_to_interval)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// History filtered by interval start: inside `[start, end]` when both are
    /// given, after `start` or ending before `end` when only one is.
    pub fn intervals_between(
        &self,
        resource_id: i64,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<StatusInterval>> {
        let sql = format!(
            r#"
            SELECT {INTERVAL_COLUMNS}
            FROM status_interval
            WHERE resource_id = ?1
              AND (
                (?2 IS NOT NULL AND ?3 IS NOT NULL AND start_date >= ?2 AND start_date <= ?3)
                OR (?2 IS NOT NULL AND ?3 IS NULL AND start_date > ?2)
                OR (?2 IS NULL AND ?3 IS NOT NULL AND end_date IS NOT NULL AND end_date < ?3)
                OR (?2 IS NULL AND ?3 IS NULL)
              )
            ORDER BY start_date ASC, id ASC
            "#
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![resource_id, format_opt_ts(start), format_opt_ts(end)],
            row_to_interval,
        )?;
        let intervals = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(intervals)
    }

    /// Intervals with any overlap with `window`, oldest first.
    pub fn intervals_overlapping(
        &self,
        resource_id: i64,
        window: &Window,
    ) -> Result<Vec<StatusInterval>> {
        let sql = format!(
            r#"
            SELECT {INTERVAL_COLUMNS}
            FROM status_interval
            WHERE resource_id = ?1
              AND start_date < ?3
              AND (end_date IS NULL OR end_date > ?2)
            ORDER BY start_date ASC, id ASC
            "#
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                resource_id,
                format_ts(window.start),
                format_ts(window.end)
            ],
            row_to_interval,
        )?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn open_interval(&self, resource_id: i64) -> Result<Option<StatusInterval>> {
        let sql = format!(
            "SELECT {INTERVAL_COLUMNS} FROM status_interval WHERE resource_id = ?1 AND end_date IS NULL"
        );
        Ok(self
            .conn
            .query_row(&sql, params![resource_id], row_to_interval)
            .optional()?)
    }

    pub fn has_history(&self, resource_id: i64) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM status_interval WHERE resource_id = ?1",
            params![resource_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Applies a transition plan atomically, provided nobody else changed the
    /// resource since `expected_version` was read.
    ///
    /// Returns [`DbError::Conflict`] when the version moved or the single-open
    /// invariant would be violated; nothing is written in that case.
    pub fn apply_transition(
        &mut self,
        resource_id: i64,
        expected_version: i64,
        plan: &TransitionPlan,
    ) -> Result<AppliedTransition> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let bumped = tx.execute(
            r#"
            UPDATE resource
            SET version = version + 1,
                end_date = CASE WHEN ?3 THEN NULL ELSE end_date END
            WHERE id = ?1 AND version = ?2
            "#,
            params![resource_id, expected_version, plan.revive],
        )?;
        if bumped == 0 {
            return Err(DbError::Conflict(format!("resource id {resource_id}")));
        }

        let mut applied = AppliedTransition {
            revived: plan.revive,
            ..AppliedTransition::default()
        };
        if let Some(seed) = &plan.seed {
            applied.seeded = Some(insert_interval(&tx, resource_id, seed)?);
        }
        if let Some(size) = &plan.resize
            && let Some(open_id) = open_interval_id(&tx, resource_id)?
        {
            tx.execute(
                "UPDATE status_interval SET size_name = ?2, cpu = ?3 WHERE id = ?1",
                params![open_id, size.name, size.cpu],
            )?;
            applied.resized = Some(open_id);
        }
        if let Some(state) = &plan.restate
            && let Some(open_id) = open_interval_id(&tx, resource_id)?
        {
            let (device, instance_alias) = attachment_columns(state);
            tx.execute(
                r#"
                UPDATE status_interval
                SET status = ?2, size_name = ?3, cpu = ?4, device = ?5, instance_alias = ?6
                WHERE id = ?1
                "#,
                params![
                    open_id,
                    state.status.as_str(),
                    state.size.name,
                    state.size.cpu,
                    device,
                    instance_alias
                ],
            )?;
            applied.restated = Some(open_id);
        }
        if let Some(close_at) = plan.close_at {
            applied.closed = close_open(&tx, resource_id, close_at)?;
        }
        if let Some(next) = &plan.open {
            applied.opened = Some(insert_interval(&tx, resource_id, next)?);
        }
        tx.commit()?;
        Ok(applied)
    }

    /// Closes every open interval of a destroyed resource and stamps its end date.
    pub fn end_date_all(&mut self, resource_id: i64, at: DateTime<Utc>) -> Result<usize> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let closed = tx.execute(
            r#"
            UPDATE status_interval
            SET end_date = CASE WHEN start_date > ?2 THEN start_date ELSE ?2 END
            WHERE resource_id = ?1 AND end_date IS NULL
            "#,
            params![resource_id, format_ts(at)],
        )?;
        let updated = tx.execute(
            r#"
            UPDATE resource
            SET version = version + 1, end_date = COALESCE(end_date, ?2)
            WHERE id = ?1
            "#,
            params![resource_id, format_ts(at)],
        )?;
        if updated == 0 {
            return Err(DbError::NotFound(format!("resource id {resource_id}")));
        }
        tx.commit()?;
        Ok(closed)
    }
}

fn attachment_columns(state: &NewInterval) -> (Option<String>, Option<String>) {
    match &state.attachment {
        Some(attachment) => (
            attachment.device.clone(),
            attachment.instance_alias.clone(),
        ),
        None => (None, None),
    }
}

fn open_interval_id(tx: &Transaction<'_>, resource_id: i64) -> Result<Option<i64>> {
    Ok(tx
        .query_row(
            "SELECT id FROM status_interval WHERE resource_id = ?1 AND end_date IS NULL",
            params![resource_id],
            |row| row.get(0),
        )
        .optional()?)
}

/// A second open interval for one resource violates the partial unique index.
fn is_open_interval_clash(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn insert_interval(tx: &Transaction<'_>, resource_id: i64, next: &NewInterval) -> Result<i64> {
    let (device, instance_alias) = attachment_columns(next);
    let inserted = tx.execute(
        r#"
        INSERT INTO status_interval (
          resource_id, status, size_name, cpu, device, instance_alias, start_date
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            resource_id,
            next.status.as_str(),
            next.size.name,
            next.size.cpu,
            device,
            instance_alias,
            format_ts(next.start_date)
        ],
    );
    match inserted {
        Ok(_) => Ok(tx.last_insert_rowid()),
        Err(err) if is_open_interval_clash(&err) => Err(DbError::Conflict(format!(
            "open interval for resource id {resource_id}"
        ))),
        Err(err) => Err(err.into()),
    }
}

fn close_open(tx: &Transaction<'_>, resource_id: i64, at: DateTime<Utc>) -> Result<Option<i64>> {
    let open_id = open_interval_id(tx, resource_id)?;
    if let Some(open_id) = open_id {
        tx.execute(
            "UPDATE status_interval SET end_date = ?2 WHERE id = ?1",
            params![open_id, format_ts(at)],
        )?;
    }
    Ok(open_id)
}
