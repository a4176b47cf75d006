mod allocations;
mod billing;
mod renewal;
mod snapshots;
mod status;
mod usage;

use std::sync::Arc;

use crate::app::AppConfig;
use crate::error::Result;
use ledger_db::Db;

pub use allocations::AllocationService;
pub use billing::{BillingFeed, MalformedUsage, usage_from_billing};
pub use renewal::{
    IsPendingRenewal, IsValid, RenewAllocationSource, RenewalContext, RenewalIssue, RenewalOutcome,
    RenewalReport, RenewalService, renewal_registry,
};
pub use snapshots::{SnapshotEngine, SnapshotIssue, SnapshotReport};
pub use status::StatusService;
pub use usage::{UsageAccountant, UserUsage};

type SharedConfig = Arc<AppConfig>;

/// Service registry for app-level operations.
#[derive(Clone)]
pub struct AppServices {
    pub allocations: AllocationService,
    pub usage: UsageAccountant,
    pub snapshots: SnapshotEngine,
    pub renewals: RenewalService,
    pub status: StatusService,
}

impl AppServices {
    pub fn new(config: &AppConfig) -> Self {
        let shared = Arc::new(config.clone());
        Self {
            allocations: AllocationService::new(shared.clone()),
            usage: UsageAccountant::new(shared.clone()),
            snapshots: SnapshotEngine::new(shared.clone()),
            renewals: RenewalService::new(shared.clone()),
            status: StatusService::new(shared),
        }
    }
}

fn open_db(config: &SharedConfig) -> Result<Db> {
    Ok(Db::open(&config.db_path)?)
}
