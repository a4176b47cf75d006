use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use ledger_core::{
    AccountingError, AllocationSource, StatusInterval, UserAllocationSnapshot, Window,
};
use ledger_db::Db;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, info_span, warn};

use crate::error::Result;
use crate::services::billing::BillingFeed;
use crate::services::usage::{load_user_history, user_rollup};
use crate::services::{SharedConfig, open_db};

/// Summary of one snapshot run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SnapshotReport {
    pub sources_seen: usize,
    pub sources_updated: usize,
    pub user_snapshots: usize,
    pub issues: Vec<SnapshotIssue>,
}

/// A source or user skipped during a run.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotIssue {
    pub source_name: String,
    pub username: Option<String>,
    pub message: String,
}

impl SnapshotIssue {
    fn source(source_name: &str, message: impl Into<String>) -> Self {
        Self {
            source_name: source_name.to_string(),
            username: None,
            message: message.into(),
        }
    }
}

struct SourceWorkload {
    source: AllocationSource,
    window: Window,
    last_renewed: DateTime<Utc>,
    users: Vec<(String, Vec<Vec<StatusInterval>>)>,
}

struct SourceRollup {
    source: AllocationSource,
    last_renewed: DateTime<Utc>,
    users: Vec<(String, std::result::Result<(f64, f64), AccountingError>)>,
}

/// Periodic job that refreshes per-user and per-source allocation snapshots.
#[derive(Clone)]
pub struct SnapshotEngine {
    config: SharedConfig,
}

impl SnapshotEngine {
    pub(super) fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    fn db(&self) -> Result<Db> {
        open_db(&self.config)
    }

    /// Recomputes every allocation source over `[start, end)`.
    ///
    /// A source renewed at `X` is accounted from `X` instead of `start`. The
    /// source's cumulative usage comes from `feed`; its burn rate is the sum of
    /// its users' rates. A failure is confined to the source or user it
    /// concerns and reported in [`SnapshotReport::issues`].
    pub fn run(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        feed: &BillingFeed,
        now: DateTime<Utc>,
    ) -> Result<SnapshotReport> {
        let span = info_span!("snapshot_run", start = %start, end = %end);
        let _guard = span.enter();

        let db = self.db()?;
        let sources = db.list_allocation_sources()?;
        let renewals = db.latest_renewals()?;
        let mut report = SnapshotReport {
            sources_seen: sources.len(),
            ..SnapshotReport::default()
        };

        let known: HashSet<&str> = sources.iter().map(|source| source.name.as_str()).collect();
        for reading in &feed.readings {
            if !known.contains(reading.source_name.as_str()) {
                warn!(source = %reading.source_name, "usage reading for unknown allocation source");
                report.issues.push(SnapshotIssue::source(
                    &reading.source_name,
                    "allocation source is not known to the ledger",
                ));
            }
        }
        for malformed in &feed.malformed {
            if !known.contains(malformed.source_name.as_str()) {
                report.issues.push(SnapshotIssue::source(
                    &malformed.source_name,
                    format!("malformed usage reading: {}", malformed.reason),
                ));
            }
        }

        let mut workloads = Vec::with_capacity(sources.len());
        for source in sources {
            if let Some(malformed) = feed.malformed_for(&source.name) {
                warn!(source = %source.name, reason = %malformed.reason, "skipping source with malformed usage");
                report.issues.push(SnapshotIssue::source(
                    &source.name,
                    format!("malformed usage reading: {}", malformed.reason),
                ));
                continue;
            }
            let renewed_at = renewals.get(&source.name).copied();
            let window = Window::new(renewed_at.unwrap_or(start), end);
            let last_renewed = renewed_at.unwrap_or(source.start_date);
            match load_workload(&db, source.clone(), window, last_renewed) {
                Ok(workload) => workloads.push(workload),
                Err(err) => {
                    warn!(source = %source.name, error = %err, "skipping source");
                    report
                        .issues
                        .push(SnapshotIssue::source(&source.name, err.to_string()));
                }
            }
        }

        let burn_window = self.config.settings.burn_window();
        let rollups: Vec<SourceRollup> = workloads
            .into_par_iter()
            .map(|workload| compute_rollup(workload, burn_window, now))
            .collect();

        for rollup in rollups {
            self.persist(&db, rollup, feed, now, &mut report);
        }
        info!(
            sources = report.sources_seen,
            updated = report.sources_updated,
            users = report.user_snapshots,
            issues = report.issues.len(),
            "snapshot run finished"
        );
        Ok(report)
    }

    fn persist(
        &self,
        db: &Db,
        rollup: SourceRollup,
        feed: &BillingFeed,
        now: DateTime<Utc>,
        report: &mut SnapshotReport,
    ) {
        let source = rollup.source;
        let mut global_burn_rate = 0.0;
        for (username, result) in rollup.users {
            let (compute_used, burn_rate) = match result {
                Ok(values) => values,
                Err(err) => {
                    warn!(source = %source.name, user = %username, error = %err, "skipping user");
                    report.issues.push(SnapshotIssue {
                        source_name: source.name.clone(),
                        username: Some(username),
                        message: err.to_string(),
                    });
                    continue;
                }
            };
            let snapshot = UserAllocationSnapshot {
                allocation_source_id: source.id,
                username: username.clone(),
                compute_used,
                burn_rate,
                updated_at: now,
            };
            match db.upsert_user_snapshot(&snapshot) {
                Ok(()) => {
                    global_burn_rate += burn_rate;
                    report.user_snapshots += 1;
                }
                Err(err) => report.issues.push(SnapshotIssue {
                    source_name: source.name.clone(),
                    username: Some(username),
                    message: err.to_string(),
                }),
            }
        }

        let compute_used = match feed.latest(&source.name) {
            Some(reading) => Ok(reading.compute_used),
            None => db
                .source_snapshot(source.id)
                .map(|previous| previous.map_or(0.0, |snapshot| snapshot.compute_used)),
        };
        let written = compute_used.and_then(|compute_used| {
            db.upsert_source_snapshot(
                source.id,
                compute_used,
                global_burn_rate,
                rollup.last_renewed,
                now,
            )
        });
        match written {
            Ok(()) => {
                report.sources_updated += 1;
                info!(source = %source.name, global_burn_rate, "source snapshot updated");
            }
            Err(err) => {
                warn!(source = %source.name, error = %err, "source snapshot not written");
                report
                    .issues
                    .push(SnapshotIssue::source(&source.name, err.to_string()));
            }
        }
    }
}

fn load_workload(
    db: &Db,
    source: AllocationSource,
    window: Window,
    last_renewed: DateTime<Utc>,
) -> Result<SourceWorkload> {
    let mut users = Vec::new();
    for username in db.source_users(source.id)? {
        let history = load_user_history(db, &username, source.id, &window)?;
        users.push((username, history));
    }
    Ok(SourceWorkload {
        source,
        window,
        last_renewed,
        users,
    })
}

fn compute_rollup(
    workload: SourceWorkload,
    burn_window: Option<Duration>,
    now: DateTime<Utc>,
) -> SourceRollup {
    let window = workload.window;
    let users = workload
        .users
        .into_iter()
        .map(|(username, history)| {
            let result = user_rollup(&history, &window, burn_window, now);
            (username, result)
        })
        .collect();
    SourceRollup {
        source: workload.source,
        last_renewed: workload.last_renewed,
        users,
    }
}
