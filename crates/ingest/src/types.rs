use std::io;
use std::time::Duration;

use serde::Serialize;

/// Summary returned after applying a batch of status readings.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestStats {
    pub readings_seen: usize,
    pub intervals_created: usize,
    pub resized: usize,
    /// Open intervals rewritten in place by a change seen at their start.
    pub restated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub issues: Vec<IngestIssue>,
}

/// Non-fatal issues encountered during ingest.
#[derive(Debug, Clone, Serialize)]
pub struct IngestIssue {
    pub resource_id: String,
    pub message: String,
}

/// Bounded retry around the per-resource critical section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff before retry number `attempt` (1-based), capped at 32x.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(5);
        self.base_backoff.saturating_mul(1u32 << shift)
    }
}

/// Errors emitted by the ingest pipeline.
#[derive(Debug)]
pub enum IngestError {
    Io(io::Error),
    Json(serde_json::Error),
    Db(ledger_db::DbError),
    /// The reading names a resource the ledger cannot create (no creator).
    UnknownResource(String),
    /// No launch timestamp was supplied for a resource seen for the first time.
    MissingLaunchTime(String),
    InvalidTimestamp { resource_id: String, value: String },
    /// Persistent contention; the reading is dropped for this cycle.
    Contention { resource_id: String, attempts: u32 },
}

impl IngestError {
    pub fn is_contention(&self) -> bool {
        matches!(self, Self::Contention { .. })
    }
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {}", err),
            Self::Json(err) => write!(f, "json error: {}", err),
            Self::Db(err) => write!(f, "db error: {}", err),
            Self::UnknownResource(id) => write!(f, "unknown resource {} has no creator", id),
            Self::MissingLaunchTime(id) => write!(f, "resource {} has no launch time", id),
            Self::InvalidTimestamp { resource_id, value } => {
                write!(f, "resource {} has invalid launch time {:?}", resource_id, value)
            }
            Self::Contention {
                resource_id,
                attempts,
            } => write!(
                f,
                "gave up on resource {} after {} contended attempts",
                resource_id, attempts
            ),
        }
    }
}

impl std::error::Error for IngestError {}

impl From<io::Error> for IngestError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

impl From<ledger_db::DbError> for IngestError {
    fn from(err: ledger_db::DbError) -> Self {
        Self::Db(err)
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_backoff: Duration::from_millis(4),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(4));
        assert_eq!(policy.backoff(2), Duration::from_millis(8));
        assert_eq!(policy.backoff(4), Duration::from_millis(32));
        assert_eq!(policy.backoff(9), Duration::from_millis(128));
    }
}
