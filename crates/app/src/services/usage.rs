use chrono::{DateTime, Duration, Utc};
use ledger_core::{
    AccountingError, Resource, StatusInterval, Window, active_cpu_time, burn_rate, cpu_hours,
};
use ledger_db::Db;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::services::{SharedConfig, open_db};

/// Usage of one user against one allocation source over a window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserUsage {
    pub username: String,
    pub allocation_source: String,
    pub window: Window,
    /// CPU-hours.
    pub compute_used: f64,
    /// CPU-hours per wall-clock hour.
    pub burn_rate: f64,
}

#[derive(Clone)]
pub struct UsageAccountant {
    config: SharedConfig,
}

impl UsageAccountant {
    pub(super) fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    fn db(&self) -> Result<Db> {
        open_db(&self.config)
    }

    /// CPU-weighted active time of a resource. Without a window, covers
    /// `[creation, now)`.
    pub fn active_time(
        &self,
        identifier: &str,
        window: Option<Window>,
        now: DateTime<Utc>,
    ) -> Result<Duration> {
        let db = self.db()?;
        let resource = find_resource(&db, identifier)?;
        resource_active_time(&db, &resource, window, now)
    }

    pub fn active_hours(
        &self,
        identifier: &str,
        window: Option<Window>,
        now: DateTime<Utc>,
    ) -> Result<f64> {
        Ok(cpu_hours(self.active_time(identifier, window, now)?))
    }

    pub fn user_usage(
        &self,
        username: &str,
        source_name: &str,
        window: Window,
        now: DateTime<Utc>,
    ) -> Result<UserUsage> {
        let db = self.db()?;
        let source = db
            .allocation_source_by_name(source_name)?
            .ok_or_else(|| AppError::NotFound(format!("allocation source {}", source_name)))?;
        let history = load_user_history(&db, username, source.id, &window)?;
        let (compute_used, burn_rate) =
            user_rollup(&history, &window, self.config.settings.burn_window(), now)?;
        Ok(UserUsage {
            username: username.to_string(),
            allocation_source: source.name,
            window,
            compute_used,
            burn_rate,
        })
    }

    pub fn burn_rate(
        &self,
        username: &str,
        source_name: &str,
        window: Window,
        now: DateTime<Utc>,
    ) -> Result<f64> {
        Ok(self.user_usage(username, source_name, window, now)?.burn_rate)
    }
}

fn find_resource(db: &Db, identifier: &str) -> Result<Resource> {
    db.find_resource(identifier)?
        .ok_or_else(|| AppError::NotFound(format!("resource {}", identifier)))
}

pub(crate) fn resource_active_time(
    db: &Db,
    resource: &Resource,
    window: Option<Window>,
    now: DateTime<Utc>,
) -> Result<Duration> {
    let window = window.unwrap_or_else(|| Window::new(resource.start_date, now));
    let intervals = db.intervals_overlapping(resource.id, &window)?;
    Ok(active_cpu_time(&intervals, &window, now)?)
}

/// Interval histories, one per resource the user charged to the source,
/// restricted to what overlaps `window`.
pub(crate) fn load_user_history(
    db: &Db,
    username: &str,
    allocation_source_id: i64,
    window: &Window,
) -> Result<Vec<Vec<StatusInterval>>> {
    db.resources_for_user_source(username, allocation_source_id)?
        .iter()
        .map(|resource| Ok(db.intervals_overlapping(resource.id, window)?))
        .collect()
}

fn usage_between(
    history: &[Vec<StatusInterval>],
    window: &Window,
    now: DateTime<Utc>,
) -> std::result::Result<Duration, AccountingError> {
    history.iter().try_fold(Duration::zero(), |total, intervals| {
        total
            .checked_add(&active_cpu_time(intervals, window, now)?)
            .ok_or(AccountingError::Overflow)
    })
}

/// Cumulative usage over `window` in CPU-hours, plus the burn rate over the
/// trailing `burn_window` (or the whole window).
pub(crate) fn user_rollup(
    history: &[Vec<StatusInterval>],
    window: &Window,
    burn_window: Option<Duration>,
    now: DateTime<Utc>,
) -> std::result::Result<(f64, f64), AccountingError> {
    let usage_at_end = usage_between(history, window, now)?;
    let rate_start = burn_window
        .map(|span| (window.end - span).max(window.start))
        .unwrap_or(window.start);
    let usage_at_start = usage_between(history, &Window::new(window.start, rate_start), now)?;
    let rate = burn_rate(usage_at_start, usage_at_end, window.end - rate_start)?;
    let compute_used = cpu_hours(usage_at_end);
    if compute_used < 0.0 {
        return Err(AccountingError::NegativeUsage {
            delta_hours: compute_used,
        });
    }
    Ok((compute_used, rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ledger_core::{CanonicalStatus, SizeSnapshot};

    fn t(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hour)
    }

    fn active(cpu: u32, start: i64, end: Option<i64>) -> StatusInterval {
        StatusInterval {
            id: start,
            resource_id: 1,
            status: CanonicalStatus::Active,
            size: SizeSnapshot {
                name: "m1".to_string(),
                cpu,
            },
            attachment: None,
            start_date: t(start),
            end_date: end.map(t),
        }
    }

    #[test]
    fn rollup_sums_resources_and_rates_whole_window() {
        let history = vec![vec![active(2, 0, Some(10))], vec![active(1, 5, None)]];
        let window = Window::new(t(0), t(20));
        let (used, rate) = user_rollup(&history, &window, None, t(20)).unwrap();
        assert_eq!(used, 2.0 * 10.0 + 15.0);
        assert!((rate - 35.0 / 20.0).abs() < 1e-9);
    }

    #[test]
    fn rollup_rates_over_trailing_window() {
        let history = vec![vec![active(2, 0, Some(10))], vec![active(1, 5, None)]];
        let window = Window::new(t(0), t(20));
        let (used, rate) = user_rollup(&history, &window, Some(Duration::hours(5)), t(20)).unwrap();
        assert_eq!(used, 35.0);
        // Only the 1-cpu resource runs during the last five hours.
        assert!((rate - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rollup_of_empty_window_is_zero() {
        let history = vec![vec![active(4, 0, None)]];
        let window = Window::new(t(3), t(3));
        assert_eq!(user_rollup(&history, &window, None, t(9)).unwrap(), (0.0, 0.0));
    }
}
