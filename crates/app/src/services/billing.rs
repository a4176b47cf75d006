use chrono::{DateTime, Utc};
use ledger_core::UsageReading;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// A billing record that could not be turned into a usage reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MalformedUsage {
    pub source_name: String,
    pub reason: String,
}

/// Authoritative usage readings for one snapshot run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BillingFeed {
    pub readings: Vec<UsageReading>,
    pub malformed: Vec<MalformedUsage>,
}

impl BillingFeed {
    /// Splits readings into usable ones and malformed ones.
    pub fn from_readings(readings: Vec<UsageReading>) -> Self {
        let mut feed = Self::default();
        for reading in readings {
            if reading.is_well_formed() {
                feed.readings.push(reading);
            } else {
                feed.malformed.push(MalformedUsage {
                    reason: format!("invalid compute used {}", reading.compute_used),
                    source_name: reading.source_name,
                });
            }
        }
        feed
    }

    pub fn malformed_for(&self, source_name: &str) -> Option<&MalformedUsage> {
        self.malformed
            .iter()
            .find(|entry| entry.source_name == source_name)
    }

    /// Latest well-formed reading for a source.
    pub fn latest(&self, source_name: &str) -> Option<&UsageReading> {
        self.readings
            .iter()
            .filter(|reading| reading.source_name == source_name)
            .max_by_key(|reading| reading.as_of)
    }
}

#[derive(Debug, Deserialize)]
struct BillingProject {
    #[serde(rename = "chargeCode")]
    charge_code: Option<String>,
    #[serde(default)]
    allocations: Vec<Value>,
}

/// Parses a billing project listing. The cumulative usage of a project is
/// `computeUsed` on the last entry of its `allocations` list.
pub fn usage_from_billing(raw: &str, as_of: DateTime<Utc>) -> Result<BillingFeed> {
    let projects: Vec<BillingProject> = serde_json::from_str(raw)?;
    let mut feed = BillingFeed::default();
    for (idx, project) in projects.into_iter().enumerate() {
        let Some(source_name) = project
            .charge_code
            .map(|code| code.trim().to_string())
            .filter(|code| !code.is_empty())
        else {
            feed.malformed.push(MalformedUsage {
                source_name: format!("project #{}", idx),
                reason: "missing chargeCode".to_string(),
            });
            continue;
        };
        let compute_used = project
            .allocations
            .last()
            .and_then(|allocation| allocation.get("computeUsed"))
            .and_then(Value::as_f64);
        match compute_used {
            Some(compute_used) if compute_used.is_finite() && compute_used >= 0.0 => {
                feed.readings.push(UsageReading {
                    source_name,
                    compute_used,
                    as_of,
                });
            }
            Some(compute_used) => feed.malformed.push(MalformedUsage {
                source_name,
                reason: format!("invalid compute used {}", compute_used),
            }),
            None => feed.malformed.push(MalformedUsage {
                source_name,
                reason: "no allocation with computeUsed".to_string(),
            }),
        }
    }
    Ok(feed)
}
