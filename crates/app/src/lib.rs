pub mod app;
pub mod config;
pub mod error;
pub mod renewal_rules;
pub mod services;
pub mod startup;
pub mod util;

pub use app::{AppConfig, AppState};
pub use config::{AccountingSettings, RetrySettings, WindowParams};
pub use error::{AppError, Result};
pub use renewal_rules::{load_default_renewal_rules, load_renewal_rules, write_renewal_rules};
pub use services::{
    AllocationService, AppServices, BillingFeed, MalformedUsage, RenewalOutcome, RenewalReport,
    RenewalService, SnapshotEngine, SnapshotIssue, SnapshotReport, StatusService,
    UsageAccountant, UserUsage, usage_from_billing,
};
pub use startup::{AppPaths, ensure_app_data_dir};
pub use util::time::{parse_timestamp, resolve_window};
