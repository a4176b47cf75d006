use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Attachment, Resource, SizeSnapshot, StatusInterval};

/// Normalized lifecycle state of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CanonicalStatus {
    Active,
    Build,
    Pending,
    Running,
    Suspended,
    Shutoff,
    Error,
    Deleted,
    Available,
    InUse,
    Attaching,
    Detaching,
    Unknown,
    Other(String),
}

impl CanonicalStatus {
    pub fn from_name(name: &str) -> Self {
        let name = name.trim().to_ascii_lowercase();
        match name.as_str() {
            "active" => Self::Active,
            "build" => Self::Build,
            "pending" => Self::Pending,
            "running" => Self::Running,
            "suspended" => Self::Suspended,
            "shutoff" => Self::Shutoff,
            "error" => Self::Error,
            "deleted" => Self::Deleted,
            "available" => Self::Available,
            "in-use" => Self::InUse,
            "attaching" => Self::Attaching,
            "detaching" => Self::Detaching,
            "unknown" | "" => Self::Unknown,
            _ => Self::Other(name),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "active",
            Self::Build => "build",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Suspended => "suspended",
            Self::Shutoff => "shutoff",
            Self::Error => "error",
            Self::Deleted => "deleted",
            Self::Available => "available",
            Self::InUse => "in-use",
            Self::Attaching => "attaching",
            Self::Detaching => "detaching",
            Self::Unknown => "unknown",
            Self::Other(name) => name,
        }
    }

    /// Only `active` time is billed.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Statuses a freshly launched resource may legitimately report.
    pub fn is_initial(&self) -> bool {
        matches!(self, Self::Build | Self::Pending | Self::Running)
    }
}

impl From<String> for CanonicalStatus {
    fn from(value: String) -> Self {
        Self::from_name(&value)
    }
}

impl From<CanonicalStatus> for String {
    fn from(value: CanonicalStatus) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for CanonicalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider task names that override the reported status while in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskHint {
    Resuming,
    Suspending,
    PoweringOn,
    PoweringOff,
    Initializing,
    Scheduling,
    Spawning,
    Networking,
    Deploying,
    DeployError,
}

impl TaskHint {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "resuming" => Some(Self::Resuming),
            "suspending" => Some(Self::Suspending),
            "powering-on" => Some(Self::PoweringOn),
            "powering-off" => Some(Self::PoweringOff),
            "initializing" => Some(Self::Initializing),
            "scheduling" => Some(Self::Scheduling),
            "spawning" => Some(Self::Spawning),
            "networking" => Some(Self::Networking),
            "deploying" => Some(Self::Deploying),
            "deploy_error" => Some(Self::DeployError),
            _ => None,
        }
    }

    pub fn status(self) -> CanonicalStatus {
        match self {
            Self::Resuming | Self::PoweringOn => CanonicalStatus::Active,
            Self::Suspending | Self::PoweringOff => CanonicalStatus::Suspended,
            Self::Initializing
            | Self::Scheduling
            | Self::Spawning
            | Self::Networking
            | Self::Deploying
            | Self::DeployError => CanonicalStatus::Build,
        }
    }
}

/// Applies the task override table; unrecognized tasks leave the raw status alone.
pub fn resolve_status(raw_status: &str, task: Option<&str>) -> CanonicalStatus {
    match task.and_then(TaskHint::parse) {
        Some(hint) => hint.status(),
        None => CanonicalStatus::from_name(raw_status),
    }
}

#[derive(Debug, Clone)]
pub struct Observation<'a> {
    pub status: CanonicalStatus,
    pub size: &'a SizeSnapshot,
    pub attachment: Option<&'a Attachment>,
    pub first_observation: bool,
    /// When the poller saw this state.
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewInterval {
    pub status: CanonicalStatus,
    pub size: SizeSnapshot,
    pub attachment: Option<Attachment>,
    pub start_date: DateTime<Utc>,
}

/// Mutations required to bring a resource's history in line with an observation.
///
/// Applied in order: `revive`, `seed`, `resize` or `restate`, close the
/// current open interval at `close_at`, then `open`. `close_at` and
/// `open.start_date` are always the same instant, strictly after the start of
/// the interval being closed, so consecutive intervals never leave a gap and
/// starts stay strictly increasing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionPlan {
    /// Clear the resource's end date: it was seen alive after destruction.
    pub revive: bool,
    pub seed: Option<NewInterval>,
    pub resize: Option<SizeSnapshot>,
    /// Overwrite the open interval's state in place. Used when the change
    /// lands exactly on the open interval's start.
    pub restate: Option<NewInterval>,
    pub close_at: Option<DateTime<Utc>>,
    pub open: Option<NewInterval>,
}

impl TransitionPlan {
    pub fn is_noop(&self) -> bool {
        !self.revive
            && self.seed.is_none()
            && self.resize.is_none()
            && self.restate.is_none()
            && self.open.is_none()
    }

    /// Start of the interval left open once the plan is applied.
    pub fn effective_at(&self) -> Option<DateTime<Utc>> {
        self.open
            .as_ref()
            .or(self.restate.as_ref())
            .or(self.seed.as_ref())
            .map(|interval| interval.start_date)
    }
}

/// Decides how an observation changes a resource's interval history.
///
/// With no history at all, the first interval starts at the resource's
/// launch time. Unless this is the resource's first-ever update and it
/// reports an initial status, that first interval is assumed `active`: a
/// resource first seen long after launch is treated as having run the whole
/// time. This is a deliberate approximation, not a reconstruction.
///
/// A change takes effect at the observation's own timestamp, never later
/// than `now` and never earlier than the start of the interval it replaces.
pub fn plan_transition(
    resource: &Resource,
    has_history: bool,
    open: Option<&StatusInterval>,
    observation: &Observation<'_>,
    now: DateTime<Utc>,
) -> TransitionPlan {
    let mut plan = TransitionPlan {
        revive: resource.end_date.is_some(),
        ..TransitionPlan::default()
    };
    let observed_at = observation.observed_at.min(now);
    let current_attachment = observation.attachment.cloned();

    let (current, floor) = match open {
        Some(interval) => {
            if interval.size != *observation.size {
                plan.resize = Some(observation.size.clone());
            }
            (
                Some((interval.status.clone(), interval.attachment.clone())),
                interval.start_date,
            )
        }
        None if !has_history => {
            let first_status = if observation.first_observation && observation.status.is_initial()
            {
                observation.status.clone()
            } else {
                CanonicalStatus::Active
            };
            let seed = NewInterval {
                status: first_status.clone(),
                size: observation.size.clone(),
                attachment: current_attachment.clone(),
                start_date: resource.start_date.min(observed_at),
            };
            let floor = seed.start_date;
            plan.seed = Some(seed);
            (Some((first_status, current_attachment.clone())), floor)
        }
        // Closed history: reopen after the destruction that closed it.
        None => (None, resource.end_date.unwrap_or(observed_at)),
    };

    let at = observed_at.max(floor);
    let next = NewInterval {
        status: observation.status.clone(),
        size: observation.size.clone(),
        attachment: current_attachment.clone(),
        start_date: at,
    };
    let Some((status, attachment)) = current else {
        plan.open = Some(next);
        return plan;
    };
    if status == observation.status && attachment == current_attachment {
        return plan;
    }
    if at > floor {
        plan.close_at = Some(at);
        plan.open = Some(next);
    } else if let Some(seed) = plan.seed.as_mut() {
        *seed = next;
    } else {
        plan.resize = None;
        plan.restate = Some(next);
    }
    plan
}

/// Parses a provider launch timestamp. Fractional seconds are optional.
pub fn parse_launch_time(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let raw = raw.trim();
    match NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.fZ") {
        Ok(naive) => Ok(naive.and_utc()),
        Err(_) => Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc)),
    }
}
