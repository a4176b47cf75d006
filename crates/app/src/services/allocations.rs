use chrono::{DateTime, Utc};
use ledger_core::{AllocationSource, AllocationSourceInput};
use ledger_db::Db;

use crate::error::{AppError, Result};
use crate::services::{SharedConfig, open_db};

/// Allocation sources, their users, and which source a resource charges.
#[derive(Clone)]
pub struct AllocationService {
    config: SharedConfig,
}

impl AllocationService {
    pub(super) fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    fn db(&self) -> Result<Db> {
        open_db(&self.config)
    }

    pub fn upsert_source(
        &self,
        name: &str,
        compute_allowed: f64,
        start_date: DateTime<Utc>,
        end_date: Option<DateTime<Utc>>,
    ) -> Result<AllocationSource> {
        if let Some(end_date) = end_date
            && end_date < start_date
        {
            return Err(AppError::InvalidInput(format!(
                "allocation source {} ends before it starts",
                name
            )));
        }
        let db = self.db()?;
        Ok(db.upsert_allocation_source(&AllocationSourceInput {
            name: name.to_string(),
            compute_allowed,
            start_date,
            end_date,
        })?)
    }

    pub fn list_sources(&self) -> Result<Vec<AllocationSource>> {
        Ok(self.db()?.list_allocation_sources()?)
    }

    pub fn add_user(&self, source_name: &str, username: &str) -> Result<()> {
        let db = self.db()?;
        let source = require_source(&db, source_name)?;
        Ok(db.add_source_user(source.id, username)?)
    }

    pub fn remove_user(&self, source_name: &str, username: &str) -> Result<bool> {
        let db = self.db()?;
        let source = require_source(&db, source_name)?;
        Ok(db.remove_source_user(source.id, username)?)
    }

    /// Charges a resource's usage to `source_name`, or detaches it with `None`.
    pub fn assign_resource(&self, identifier: &str, source_name: Option<&str>) -> Result<()> {
        let db = self.db()?;
        let resource = db
            .find_resource(identifier)?
            .ok_or_else(|| AppError::NotFound(format!("resource {}", identifier)))?;
        let source_id = match source_name {
            Some(name) => Some(require_source(&db, name)?.id),
            None => None,
        };
        Ok(db.assign_allocation_source(resource.id, source_id)?)
    }
}

fn require_source(db: &Db, name: &str) -> Result<AllocationSource> {
    db.allocation_source_by_name(name)?
        .ok_or_else(|| AppError::NotFound(format!("allocation source {}", name)))
}
