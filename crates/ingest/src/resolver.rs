use std::thread;

use chrono::{DateTime, Utc};
use ledger_core::{
    CanonicalStatus, Observation, ResourceInput, ResourceKind, StatusReading,
    parse_launch_time, plan_transition, resolve_status,
};
use ledger_db::{AppliedTransition, Db, DbError};
use tracing::{debug, info, warn};

use crate::types::{IngestError, Result, RetryPolicy};

/// What a single reading did to a resource's history.
#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    /// The reading carries no usable state (e.g. a volume reporting `unknown`).
    Ignored,
    Unchanged,
    Applied {
        previous: Option<CanonicalStatus>,
        status: CanonicalStatus,
        applied: AppliedTransition,
    },
}

/// Turns status readings into interval mutations, one resource at a time.
///
/// Every mutation is a read-plan-write cycle guarded by the resource version;
/// a concurrent writer makes the write fail with a conflict and the whole
/// cycle is retried under the configured [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct StatusResolver {
    retry: RetryPolicy,
}

impl StatusResolver {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    pub fn observe(
        &self,
        db: &mut Db,
        reading: &StatusReading,
        now: DateTime<Utc>,
    ) -> Result<Observed> {
        let status = resolve_status(&reading.status, reading.task.as_deref());
        if reading.kind == ResourceKind::Volume && status == CanonicalStatus::Unknown {
            debug!(resource = %reading.resource_id, "ignoring volume in unknown state");
            return Ok(Observed::Ignored);
        }
        // Conversion failures are final, so they are settled before any write.
        let input = match db.find_resource(&reading.resource_id)? {
            Some(_) => None,
            None => Some(resource_input(reading)?),
        };
        let attachment = reading
            .attachment
            .as_ref()
            .filter(|attachment| !attachment.is_empty());

        self.with_retry(&reading.resource_id, || {
            let resource = match (db.find_resource(&reading.resource_id)?, &input) {
                (Some(resource), _) => resource,
                (None, Some(input)) => db.get_or_create_resource(input)?,
                (None, None) => {
                    return Err(DbError::NotFound(format!(
                        "resource {}",
                        reading.resource_id
                    )));
                }
            };
            if let Some(end_date) = resource.end_date
                && reading.observed_at <= end_date
            {
                debug!(
                    resource = %resource.identifier,
                    observed_at = %reading.observed_at,
                    destroyed_at = %end_date,
                    "ignoring reading taken before destruction"
                );
                return Ok(Observed::Ignored);
            }
            let open = db.open_interval(resource.id)?;
            let has_history = open.is_some() || db.has_history(resource.id)?;
            let observation = Observation {
                status: status.clone(),
                size: &reading.size,
                attachment,
                first_observation: reading.first_observation,
                observed_at: reading.observed_at,
            };
            let plan = plan_transition(&resource, has_history, open.as_ref(), &observation, now);
            if plan.is_noop() {
                return Ok(Observed::Unchanged);
            }
            let applied = db.apply_transition(resource.id, resource.version, &plan)?;
            let at = plan.effective_at().unwrap_or(now);
            if plan.revive {
                info!(resource = %resource.identifier, at = %at, "resource revived");
            }
            if let Some(seed) = &plan.seed {
                debug!(
                    resource = %resource.identifier,
                    status = %seed.status,
                    from = %seed.start_date,
                    "seeded first interval"
                );
            }
            let previous = open.map(|interval| interval.status);
            if plan.open.is_some() || plan.restate.is_some() {
                info!(
                    user = %resource.created_by,
                    resource = %resource.identifier,
                    old = previous.as_ref().map(CanonicalStatus::as_str).unwrap_or("none"),
                    new = %status,
                    at = %at,
                    "status update"
                );
            }
            Ok(Observed::Applied {
                previous,
                status: status.clone(),
                applied,
            })
        })
    }

    /// Closes a destroyed resource's open interval and stamps its end date.
    pub fn record_destroyed(
        &self,
        db: &mut Db,
        identifier: &str,
        at: DateTime<Utc>,
    ) -> Result<usize> {
        let resource = db
            .find_resource(identifier)?
            .ok_or_else(|| IngestError::UnknownResource(identifier.to_string()))?;
        let closed = self.with_retry(identifier, || Ok(db.end_date_all(resource.id, at)?))?;
        info!(
            user = %resource.created_by,
            resource = %resource.identifier,
            closed,
            at = %at,
            "resource destroyed"
        );
        Ok(closed)
    }

    fn with_retry<T>(
        &self,
        resource_id: &str,
        mut op: impl FnMut() -> std::result::Result<T, DbError>,
    ) -> Result<T> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_contention() && attempt < max_attempts => {
                    debug!(resource = %resource_id, attempt, error = %err, "retrying contended update");
                    thread::sleep(self.retry.backoff(attempt));
                    attempt += 1;
                }
                Err(err) if err.is_contention() => {
                    warn!(resource = %resource_id, attempts = attempt, "abandoning contended update");
                    return Err(IngestError::Contention {
                        resource_id: resource_id.to_string(),
                        attempts: attempt,
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// Builds the ledger identity for a resource seen for the first time.
///
/// The launch time is never guessed: without one the conversion fails.
pub fn resource_input(reading: &StatusReading) -> Result<ResourceInput> {
    let created_by = reading
        .created_by
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| IngestError::UnknownResource(reading.resource_id.clone()))?;
    let raw = reading
        .launched_at
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| IngestError::MissingLaunchTime(reading.resource_id.clone()))?;
    let start_date = parse_launch_time(raw).map_err(|_| IngestError::InvalidTimestamp {
        resource_id: reading.resource_id.clone(),
        value: raw.to_string(),
    })?;
    Ok(ResourceInput {
        kind: reading.kind,
        identifier: reading.resource_id.clone(),
        created_by: created_by.to_string(),
        start_date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ledger_core::SizeSnapshot;

    fn reading() -> StatusReading {
        StatusReading {
            resource_id: "i-1".to_string(),
            kind: ResourceKind::Instance,
            status: "active".to_string(),
            task: None,
            size: SizeSnapshot {
                name: "m1.small".to_string(),
                cpu: 1,
            },
            attachment: None,
            observed_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            first_observation: false,
            created_by: Some("alice".to_string()),
            launched_at: Some("2024-12-31T10:00:00Z".to_string()),
        }
    }

    #[test]
    fn resource_input_parses_launch_time() {
        let input = resource_input(&reading()).unwrap();
        assert_eq!(input.created_by, "alice");
        assert_eq!(
            input.start_date,
            Utc.with_ymd_and_hms(2024, 12, 31, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn resource_input_requires_launch_time() {
        let mut reading = reading();
        reading.launched_at = None;
        assert!(matches!(
            resource_input(&reading),
            Err(IngestError::MissingLaunchTime(_))
        ));
        reading.launched_at = Some("yesterday".to_string());
        assert!(matches!(
            resource_input(&reading),
            Err(IngestError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn resource_input_requires_creator() {
        let mut reading = reading();
        reading.created_by = Some(" ".to_string());
        assert!(matches!(
            resource_input(&reading),
            Err(IngestError::UnknownResource(_))
        ));
    }

    fn quick_resolver(max_attempts: u32) -> StatusResolver {
        StatusResolver::new(RetryPolicy {
            max_attempts,
            base_backoff: std::time::Duration::from_millis(1),
        })
    }

    #[test]
    fn transient_conflict_is_retried_until_it_clears() {
        let mut calls = 0;
        let value = quick_resolver(3)
            .with_retry("i-1", || {
                calls += 1;
                if calls < 3 {
                    Err(DbError::Conflict("resource id 1".to_string()))
                } else {
                    Ok(calls)
                }
            })
            .unwrap();
        assert_eq!(value, 3);
    }

    #[test]
    fn non_contention_errors_are_not_retried() {
        let mut calls = 0;
        let err = quick_resolver(5)
            .with_retry("i-1", || -> std::result::Result<(), DbError> {
                calls += 1;
                Err(DbError::Validation("bad row".to_string()))
            })
            .unwrap_err();
        assert_eq!(calls, 1);
        assert!(matches!(err, IngestError::Db(DbError::Validation(_))));
    }
}
