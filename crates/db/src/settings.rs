use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::Db;
use crate::error::Result;
use crate::helpers::format_ts;

const ACCOUNTING_EPOCH_KEY: &str = "accounting_epoch";

impl Db {
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM app_setting WHERE key = ?1")?;
        let mut rows = stmt.query([key])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get::<_, String>(0)?))
        } else {
            Ok(None)
        }
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO app_setting (key, value)
            VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
            params![key, value],
        )?;
        Ok(())
    }

    /// Default start of usage accounting for sources that were never renewed.
    pub fn get_accounting_epoch(&self) -> Result<Option<DateTime<Utc>>> {
        match self.get_setting(ACCOUNTING_EPOCH_KEY)? {
            Some(value) => Ok(Some(
                DateTime::parse_from_rfc3339(&value)?.with_timezone(&Utc),
            )),
            None => Ok(None),
        }
    }

    pub fn set_accounting_epoch(&self, epoch: DateTime<Utc>) -> Result<()> {
        self.set_setting(ACCOUNTING_EPOCH_KEY, &format_ts(epoch))
    }
}
