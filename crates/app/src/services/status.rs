use std::path::Path;

use chrono::{DateTime, Utc};
use ingest::{IngestStats, StatusResolver};
use ledger_core::StatusReading;
use ledger_db::Db;

use crate::error::Result;
use crate::services::{SharedConfig, open_db};

/// Entry point for poller readings and destruction notices.
#[derive(Clone)]
pub struct StatusService {
    config: SharedConfig,
}

impl StatusService {
    pub(super) fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    fn db(&self) -> Result<Db> {
        open_db(&self.config)
    }

    fn resolver(&self) -> StatusResolver {
        StatusResolver::new(self.config.settings.retry.policy())
    }

    pub fn observe(&self, readings: &[StatusReading], now: DateTime<Utc>) -> Result<IngestStats> {
        let mut db = self.db()?;
        Ok(ingest::ingest_readings(
            &mut db,
            &self.resolver(),
            readings,
            now,
        ))
    }

    pub fn observe_file(&self, path: &Path, now: DateTime<Utc>) -> Result<IngestStats> {
        let mut db = self.db()?;
        Ok(ingest::ingest_readings_file(
            &mut db,
            &self.resolver(),
            path,
            now,
        )?)
    }

    /// Closes the resource's open interval; returns how many were closed.
    pub fn destroy(&self, identifier: &str, at: DateTime<Utc>) -> Result<usize> {
        let mut db = self.db()?;
        Ok(self.resolver().record_destroyed(&mut db, identifier, at)?)
    }
}
