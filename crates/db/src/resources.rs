use ledger_core::{Resource, ResourceInput};
use rusqlite::{OptionalExtension, params};

use crate::Db;
use crate::error::{DbError, Result};
use crate::helpers::{RESOURCE_COLUMNS, format_ts, row_to_resource};

impl Db {
    /// Returns the existing resource for `input.identifier`, creating it if absent.
    pub fn get_or_create_resource(&self, input: &ResourceInput) -> Result<Resource> {
        if input.identifier.trim().is_empty() {
            return Err(DbError::Validation("resource identifier is required".into()));
        }
        if input.created_by.trim().is_empty() {
            return Err(DbError::Validation("resource creator is required".into()));
        }
        self.conn.execute(
            r#"
            INSERT INTO resource (kind, identifier, created_by, start_date)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(identifier) DO NOTHING
            "#,
            params![
                input.kind.as_str(),
                input.identifier,
                input.created_by,
                format_ts(input.start_date)
            ],
        )?;
        self.find_resource(&input.identifier)?
            .ok_or_else(|| DbError::NotFound(format!("resource {}", input.identifier)))
    }

    pub fn find_resource(&self, identifier: &str) -> Result<Option<Resource>> {
        let sql = format!("SELECT {RESOURCE_COLUMNS} FROM resource WHERE identifier = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![identifier], row_to_resource)
            .optional()?)
    }

    pub fn get_resource(&self, resource_id: i64) -> Result<Resource> {
        let sql = format!("SELECT {RESOURCE_COLUMNS} FROM resource WHERE id = ?1");
        self.conn
            .query_row(&sql, params![resource_id], row_to_resource)
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("resource id {resource_id}")))
    }

    /// Attributes a resource's usage to an allocation source (or detaches it).
    pub fn assign_allocation_source(
        &self,
        resource_id: i64,
        allocation_source_id: Option<i64>,
    ) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE resource SET allocation_source_id = ?2 WHERE id = ?1",
            params![resource_id, allocation_source_id],
        )?;
        if updated == 0 {
            return Err(DbError::NotFound(format!("resource id {resource_id}")));
        }
        Ok(())
    }

    pub fn resources_for_user_source(
        &self,
        username: &str,
        allocation_source_id: i64,
    ) -> Result<Vec<Resource>> {
        let sql = format!(
            r#"
            SELECT {RESOURCE_COLUMNS}
            FROM resource
            WHERE created_by = ?1 AND allocation_source_id = ?2
            ORDER BY start_date ASC, id ASC
            "#
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![username, allocation_source_id], row_to_resource)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}
