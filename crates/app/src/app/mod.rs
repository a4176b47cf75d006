use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ledger_db::Db;

use crate::config::AccountingSettings;
use crate::error::Result;
use crate::services::AppServices;

/// Paths and accounting knobs for one ledger.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub db_path: PathBuf,
    /// Renewal rules on disk; the bundled rules apply when absent.
    pub rules_path: Option<PathBuf>,
    pub settings: AccountingSettings,
}

/// Application state shared by frontends.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub services: AppServices,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let services = AppServices::new(&config);
        Self { config, services }
    }

    pub fn setup_db(&self) -> Result<()> {
        setup_db(&self.config.db_path)
    }

    pub fn initialize(&self) -> Result<()> {
        self.setup_db()?;
        if let Some(epoch) = self.config.settings.accounting_epoch {
            self.open_db()?.set_accounting_epoch(epoch)?;
        }
        Ok(())
    }

    pub fn open_db(&self) -> Result<Db> {
        Ok(Db::open(&self.config.db_path)?)
    }

    /// Where accounting starts for sources that were never renewed.
    pub fn accounting_epoch(&self) -> Result<Option<DateTime<Utc>>> {
        match self.config.settings.accounting_epoch {
            Some(epoch) => Ok(Some(epoch)),
            None => Ok(self.open_db()?.get_accounting_epoch()?),
        }
    }
}

pub fn setup_db(path: &Path) -> Result<()> {
    let mut db = Db::open(path)?;
    db.migrate()?;
    Ok(())
}
