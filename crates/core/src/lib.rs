mod accounting;
mod status;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use accounting::{AccountingError, Window, active_cpu_time, burn_rate, cpu_hours};
pub use status::{
    CanonicalStatus, NewInterval, Observation, TaskHint, TransitionPlan, parse_launch_time,
    plan_transition, resolve_status,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    #[default]
    Instance,
    Volume,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instance => "instance",
            Self::Volume => "volume",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "instance" => Some(Self::Instance),
            "volume" => Some(Self::Volume),
            _ => None,
        }
    }
}

/// Size descriptor recorded with every interval. Volumes report `cpu: 0`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeSnapshot {
    pub name: String,
    pub cpu: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub device: Option<String>,
    pub instance_alias: Option<String>,
}

impl Attachment {
    pub fn is_empty(&self) -> bool {
        self.device.is_none() && self.instance_alias.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: i64,
    pub kind: ResourceKind,
    pub identifier: String,
    pub created_by: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub allocation_source_id: Option<i64>,
    /// Bumped on every interval mutation; writers compare-and-swap on it.
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceInput {
    pub kind: ResourceKind,
    pub identifier: String,
    pub created_by: String,
    pub start_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusInterval {
    pub id: i64,
    pub resource_id: i64,
    pub status: CanonicalStatus,
    pub size: SizeSnapshot,
    pub attachment: Option<Attachment>,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

impl StatusInterval {
    pub fn is_open(&self) -> bool {
        self.end_date.is_none()
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// One point-in-time observation of a resource, as delivered by a poller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReading {
    pub resource_id: String,
    #[serde(default)]
    pub kind: ResourceKind,
    pub status: String,
    #[serde(default)]
    pub task: Option<String>,
    pub size: SizeSnapshot,
    #[serde(default)]
    pub attachment: Option<Attachment>,
    pub observed_at: DateTime<Utc>,
    #[serde(default)]
    pub first_observation: bool,
    #[serde(default)]
    pub created_by: Option<String>,
    /// Raw launch timestamp as reported by the provider.
    #[serde(default)]
    pub launched_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationSource {
    pub id: i64,
    pub name: String,
    /// Compute ceiling in CPU-hours.
    pub compute_allowed: f64,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationSourceInput {
    pub name: String,
    pub compute_allowed: f64,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationSourceSnapshot {
    pub allocation_source_id: i64,
    pub compute_used: f64,
    pub global_burn_rate: f64,
    pub last_renewed: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAllocationSnapshot {
    pub allocation_source_id: i64,
    pub username: String,
    pub compute_used: f64,
    pub burn_rate: f64,
    pub updated_at: DateTime<Utc>,
}

/// Authoritative cumulative usage for a source, as reported by billing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReading {
    pub source_name: String,
    pub compute_used: f64,
    pub as_of: DateTime<Utc>,
}

impl UsageReading {
    pub fn is_well_formed(&self) -> bool {
        !self.source_name.trim().is_empty()
            && self.compute_used.is_finite()
            && self.compute_used >= 0.0
    }
}
