use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::{DateTime, Utc};
use ledger_core::StatusReading;
use ledger_db::Db;
use tracing::{info, info_span, warn};

use crate::readings::readings_from_reader;
use crate::resolver::{Observed, StatusResolver};
use crate::types::{IngestIssue, IngestStats, Result};

/// Applies a batch of readings in the order they were observed. A failing
/// reading is recorded as an issue and never aborts the rest of the batch.
pub fn ingest_readings(
    db: &mut Db,
    resolver: &StatusResolver,
    readings: &[StatusReading],
    now: DateTime<Utc>,
) -> IngestStats {
    let span = info_span!("ingest_batch", readings = readings.len());
    let _guard = span.enter();

    // Stable, so readings sharing an instant keep their input order.
    let mut ordered: Vec<&StatusReading> = readings.iter().collect();
    ordered.sort_by_key(|reading| reading.observed_at);

    let mut stats = IngestStats::default();
    for reading in ordered {
        stats.readings_seen += 1;
        match resolver.observe(db, reading, now) {
            Ok(Observed::Ignored) => stats.skipped += 1,
            Ok(Observed::Unchanged) => stats.unchanged += 1,
            Ok(Observed::Applied { applied, .. }) => {
                if applied.created_interval() {
                    stats.intervals_created += 1;
                } else if applied.restated.is_some() {
                    stats.restated += 1;
                } else if applied.resized.is_some() {
                    stats.resized += 1;
                }
            }
            Err(err) => {
                warn!(resource = %reading.resource_id, error = %err, "reading skipped");
                stats.skipped += 1;
                stats.issues.push(IngestIssue {
                    resource_id: reading.resource_id.clone(),
                    message: err.to_string(),
                });
            }
        }
    }
    info!(
        seen = stats.readings_seen,
        created = stats.intervals_created,
        restated = stats.restated,
        unchanged = stats.unchanged,
        skipped = stats.skipped,
        "ingest batch finished"
    );
    stats
}

/// Reads newline-delimited JSON readings from `path` and applies them.
pub fn ingest_readings_file(
    db: &mut Db,
    resolver: &StatusResolver,
    path: &Path,
    now: DateTime<Utc>,
) -> Result<IngestStats> {
    let file = File::open(path)?;
    let (readings, parse_issues) = readings_from_reader(BufReader::new(file));
    let mut stats = ingest_readings(db, resolver, &readings, now);
    stats.skipped += parse_issues.len();
    stats.issues.splice(0..0, parse_issues);
    Ok(stats)
}
