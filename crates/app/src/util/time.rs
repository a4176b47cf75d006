use chrono::{DateTime, Utc};
use ledger_core::Window;

use crate::config::WindowParams;
use crate::error::{AppError, Result};

/// Resolves caller-supplied bounds, defaulting the start to `default_start`
/// and the end to `now`.
pub fn resolve_window(
    params: &WindowParams,
    default_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Window> {
    let start = match params.start.as_deref() {
        Some(value) => parse_timestamp(value)?,
        None => default_start,
    };
    let end = match params.end.as_deref() {
        Some(value) => parse_timestamp(value)?,
        None => now,
    };
    if end < start {
        return Err(AppError::InvalidInput(format!(
            "window ends ({}) before it starts ({})",
            end, start
        )));
    }
    Ok(Window::new(start, end))
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(value.trim())
        .map_err(|err| AppError::InvalidInput(format!("invalid datetime: {}", err)))?;
    Ok(parsed.with_timezone(&Utc))
}
