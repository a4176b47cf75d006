use std::collections::HashMap;

use chrono::{DateTime, Utc};
use ledger_core::{AllocationSource, AllocationSourceSnapshot, UserAllocationSnapshot};
use rusqlite::{OptionalExtension, TransactionBehavior, params};

use crate::Db;
use crate::error::{DbError, Result};
use crate::helpers::{format_ts, get_ts};

impl Db {
    /// Inserts or replaces the snapshot for one (source, user) pair.
    pub fn upsert_user_snapshot(&self, snapshot: &UserAllocationSnapshot) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO user_allocation_snapshot (
              allocation_source_id, username, compute_used, burn_rate, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(allocation_source_id, username) DO UPDATE SET
              compute_used = excluded.compute_used,
              burn_rate = excluded.burn_rate,
              updated_at = excluded.updated_at
            "#,
            params![
                snapshot.allocation_source_id,
                snapshot.username,
                snapshot.compute_used,
                snapshot.burn_rate,
                format_ts(snapshot.updated_at)
            ],
        )?;
        Ok(())
    }

    pub fn user_snapshot(
        &self,
        allocation_source_id: i64,
        username: &str,
    ) -> Result<Option<UserAllocationSnapshot>> {
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT allocation_source_id, username, compute_used, burn_rate, updated_at
                FROM user_allocation_snapshot
                WHERE allocation_source_id = ?1 AND username = ?2
                "#,
                params![allocation_source_id, username],
                |row| {
                    Ok(UserAllocationSnapshot {
                        allocation_source_id: row.get(0)?,
                        username: row.get(1)?,
                        compute_used: row.get(2)?,
                        burn_rate: row.get(3)?,
                        updated_at: get_ts(row, 4)?,
                    })
                },
            )
            .optional()?)
    }

    pub fn user_snapshots(&self, allocation_source_id: i64) -> Result<Vec<UserAllocationSnapshot>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT allocation_source_id, username, compute_used, burn_rate, updated_at
            FROM user_allocation_snapshot
            WHERE allocation_source_id = ?1
            ORDER BY username ASC
            "#,
        )?;
        let rows = stmt.query_map(params![allocation_source_id], |row| {
            Ok(UserAllocationSnapshot {
                allocation_source_id: row.get(0)?,
                username: row.get(1)?,
                compute_used: row.get(2)?,
                burn_rate: row.get(3)?,
                updated_at: get_ts(row, 4)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Upserts the source rollup. `last_renewed` is only written when the row
    /// is first created; afterwards it changes through renewals alone.
    pub fn upsert_source_snapshot(
        &self,
        allocation_source_id: i64,
        compute_used: f64,
        global_burn_rate: f64,
        initial_last_renewed: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO allocation_source_snapshot (
              allocation_source_id, compute_used, global_burn_rate, last_renewed, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(allocation_source_id) DO UPDATE SET
              compute_used = excluded.compute_used,
              global_burn_rate = excluded.global_burn_rate,
              updated_at = excluded.updated_at
            "#,
            params![
                allocation_source_id,
                compute_used,
                global_burn_rate,
                format_ts(initial_last_renewed),
                format_ts(updated_at)
            ],
        )?;
        Ok(())
    }

    pub fn source_snapshot(
        &self,
        allocation_source_id: i64,
    ) -> Result<Option<AllocationSourceSnapshot>> {
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT allocation_source_id, compute_used, global_burn_rate, last_renewed, updated_at
                FROM allocation_source_snapshot
                WHERE allocation_source_id = ?1
                "#,
                params![allocation_source_id],
                |row| {
                    Ok(AllocationSourceSnapshot {
                        allocation_source_id: row.get(0)?,
                        compute_used: row.get(1)?,
                        global_burn_rate: row.get(2)?,
                        last_renewed: get_ts(row, 3)?,
                        updated_at: get_ts(row, 4)?,
                    })
                },
            )
            .optional()?)
    }

    /// Records a renewal: appends to the event log and restarts the
    /// snapshot's renewal clock in one transaction. Fails when the source has
    /// no snapshot yet.
    pub fn renew_allocation_source(
        &mut self,
        source: &AllocationSource,
        renewed_at: DateTime<Utc>,
    ) -> Result<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let updated = tx.execute(
            r#"
            UPDATE allocation_source_snapshot
            SET last_renewed = ?2
            WHERE allocation_source_id = ?1
            "#,
            params![source.id, format_ts(renewed_at)],
        )?;
        if updated == 0 {
            return Err(DbError::NotFound(format!(
                "allocation source {} has no snapshot",
                source.name
            )));
        }
        tx.execute(
            "INSERT INTO allocation_renewal_event (source_name, renewed_at) VALUES (?1, ?2)",
            params![source.name, format_ts(renewed_at)],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Appends a renewal observed outside the ledger (e.g. replayed from an event feed).
    pub fn record_renewal(&self, source_name: &str, renewed_at: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "INSERT INTO allocation_renewal_event (source_name, renewed_at) VALUES (?1, ?2)",
            params![source_name, format_ts(renewed_at)],
        )?;
        Ok(())
    }

    pub fn latest_renewal(&self, source_name: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT renewed_at
                FROM allocation_renewal_event
                WHERE source_name = ?1
                ORDER BY renewed_at DESC, id DESC
                LIMIT 1
                "#,
                params![source_name],
                |row| get_ts(row, 0),
            )
            .optional()?)
    }

    /// Most recent renewal per source name.
    pub fn latest_renewals(&self) -> Result<HashMap<String, DateTime<Utc>>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT source_name, MAX(renewed_at)
            FROM allocation_renewal_event
            GROUP BY source_name
            "#,
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, get_ts(row, 1)?)))?;
        Ok(rows.collect::<std::result::Result<HashMap<_, _>, _>>()?)
    }

    pub fn count_renewals(&self, source_name: &str) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM allocation_renewal_event WHERE source_name = ?1",
            params![source_name],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}
