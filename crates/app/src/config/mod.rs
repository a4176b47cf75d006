use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use ingest::RetryPolicy;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_backoff_ms: policy.base_backoff.as_millis() as u64,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_backoff: StdDuration::from_millis(self.base_backoff_ms),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AccountingSettings {
    /// Accounting start for sources that were never renewed. Falls back to the
    /// value stored in the database, then to the run's own start.
    pub accounting_epoch: Option<DateTime<Utc>>,
    pub renewal_period_days: i64,
    /// Trailing window used for burn rates. `None`, zero or an unrepresentable
    /// span uses the whole accounting window.
    pub burn_window_hours: Option<i64>,
    pub stop_on_first_trigger: bool,
    pub retry: RetrySettings,
}

impl Default for AccountingSettings {
    fn default() -> Self {
        Self {
            accounting_epoch: None,
            renewal_period_days: 30,
            burn_window_hours: None,
            stop_on_first_trigger: false,
            retry: RetrySettings::default(),
        }
    }
}

impl AccountingSettings {
    pub fn burn_window(&self) -> Option<Duration> {
        self.burn_window_hours
            .filter(|hours| *hours > 0)
            .and_then(Duration::try_hours)
    }
}

/// Raw window bounds as supplied by a caller, RFC 3339 strings.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct WindowParams {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_hours(hours: Option<i64>) -> AccountingSettings {
        AccountingSettings {
            burn_window_hours: hours,
            ..AccountingSettings::default()
        }
    }

    #[test]
    fn burn_window_accepts_positive_hours() {
        assert_eq!(with_hours(Some(5)).burn_window(), Some(Duration::hours(5)));
    }

    #[test]
    fn burn_window_falls_back_to_whole_window() {
        assert_eq!(with_hours(None).burn_window(), None);
        assert_eq!(with_hours(Some(0)).burn_window(), None);
        assert_eq!(with_hours(Some(-3)).burn_window(), None);
        assert_eq!(with_hours(Some(i64::MAX)).burn_window(), None);
    }
}
