use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::StatusInterval;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Debug, Error, PartialEq)]
pub enum AccountingError {
    #[error("interval {interval_id} ends before it starts")]
    InvertedInterval { interval_id: i64 },
    #[error("usage decreased between samples ({delta_hours:.4} cpu-hours)")]
    NegativeUsage { delta_hours: f64 },
    #[error("cpu-time overflowed")]
    Overflow,
}

/// Half-open time window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Intersects `[start, end)` with the window; `None` when nothing remains.
    pub fn clip(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let clipped_start = start.max(self.start);
        let clipped_end = end.min(self.end);
        (clipped_end > clipped_start).then_some((clipped_start, clipped_end))
    }
}

/// CPU-weighted time spent `active` inside `window`.
///
/// Open intervals run until `now`. Non-active intervals contribute nothing.
pub fn active_cpu_time(
    intervals: &[StatusInterval],
    window: &Window,
    now: DateTime<Utc>,
) -> Result<Duration, AccountingError> {
    let mut total = Duration::zero();
    for interval in intervals {
        if let Some(end_date) = interval.end_date
            && end_date < interval.start_date
        {
            return Err(AccountingError::InvertedInterval {
                interval_id: interval.id,
            });
        }
        if !interval.is_active() {
            continue;
        }
        let end = interval.end_date.unwrap_or(now);
        let Some((start, end)) = window.clip(interval.start_date, end) else {
            continue;
        };
        let cpu = i32::try_from(interval.size.cpu).map_err(|_| AccountingError::Overflow)?;
        let cpu_time = (end - start)
            .checked_mul(cpu)
            .ok_or(AccountingError::Overflow)?;
        total = total
            .checked_add(&cpu_time)
            .ok_or(AccountingError::Overflow)?;
    }
    Ok(total)
}

pub fn cpu_hours(cpu_time: Duration) -> f64 {
    cpu_time.num_milliseconds() as f64 / MILLIS_PER_HOUR
}

/// CPU-hours accrued per wall-clock hour between two cumulative samples.
///
/// Zero elapsed time yields a zero rate.
pub fn burn_rate(
    usage_at_start: Duration,
    usage_at_end: Duration,
    elapsed: Duration,
) -> Result<f64, AccountingError> {
    let delta = usage_at_end - usage_at_start;
    if delta < Duration::zero() {
        return Err(AccountingError::NegativeUsage {
            delta_hours: cpu_hours(delta),
        });
    }
    if elapsed <= Duration::zero() {
        return Ok(0.0);
    }
    Ok(cpu_hours(delta) / (elapsed.num_milliseconds() as f64 / MILLIS_PER_HOUR))
}
