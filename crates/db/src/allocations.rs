use ledger_core::{AllocationSource, AllocationSourceInput};
use rusqlite::{OptionalExtension, params};

use crate::Db;
use crate::error::{DbError, Result};
use crate::helpers::{SOURCE_COLUMNS, format_opt_ts, format_ts, row_to_allocation_source};

impl Db {
    pub fn upsert_allocation_source(
        &self,
        input: &AllocationSourceInput,
    ) -> Result<AllocationSource> {
        if input.name.trim().is_empty() {
            return Err(DbError::Validation(
                "allocation source name is required".into(),
            ));
        }
        if !input.compute_allowed.is_finite() || input.compute_allowed < 0.0 {
            return Err(DbError::Validation(format!(
                "invalid compute allowance for {}",
                input.name
            )));
        }
        self.conn.execute(
            r#"
            INSERT INTO allocation_source (name, compute_allowed, start_date, end_date)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(name) DO UPDATE SET
              compute_allowed = excluded.compute_allowed,
              start_date = excluded.start_date,
              end_date = excluded.end_date
            "#,
            params![
                input.name,
                input.compute_allowed,
                format_ts(input.start_date),
                format_opt_ts(input.end_date)
            ],
        )?;
        self.allocation_source_by_name(&input.name)?
            .ok_or_else(|| DbError::NotFound(format!("allocation source {}", input.name)))
    }

    pub fn list_allocation_sources(&self) -> Result<Vec<AllocationSource>> {
        let sql = format!("SELECT {SOURCE_COLUMNS} FROM allocation_source ORDER BY id ASC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_allocation_source)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn allocation_source_by_name(&self, name: &str) -> Result<Option<AllocationSource>> {
        let sql = format!("SELECT {SOURCE_COLUMNS} FROM allocation_source WHERE name = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![name], row_to_allocation_source)
            .optional()?)
    }

    pub fn allocation_source(&self, id: i64) -> Result<Option<AllocationSource>> {
        let sql = format!("SELECT {SOURCE_COLUMNS} FROM allocation_source WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], row_to_allocation_source)
            .optional()?)
    }

    pub fn add_source_user(&self, allocation_source_id: i64, username: &str) -> Result<()> {
        if username.trim().is_empty() {
            return Err(DbError::Validation("username is required".into()));
        }
        self.conn.execute(
            r#"
            INSERT OR IGNORE INTO allocation_source_user (allocation_source_id, username)
            VALUES (?1, ?2)
            "#,
            params![allocation_source_id, username],
        )?;
        Ok(())
    }

    pub fn remove_source_user(&self, allocation_source_id: i64, username: &str) -> Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM allocation_source_user WHERE allocation_source_id = ?1 AND username = ?2",
            params![allocation_source_id, username],
        )?;
        Ok(removed > 0)
    }

    pub fn source_users(&self, allocation_source_id: i64) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT username
            FROM allocation_source_user
            WHERE allocation_source_id = ?1
            ORDER BY username ASC
            "#,
        )?;
        let rows = stmt.query_map(params![allocation_source_id], |row| row.get(0))?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}
