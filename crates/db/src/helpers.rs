use chrono::{DateTime, SecondsFormat, Utc};
use ledger_core::{
    AllocationSource, Attachment, CanonicalStatus, Resource, ResourceKind, SizeSnapshot,
    StatusInterval,
};
use rusqlite::Row;
use rusqlite::types::Type;

pub(crate) const RESOURCE_COLUMNS: &str =
    "id, kind, identifier, created_by, start_date, end_date, allocation_source_id, version";

pub(crate) const INTERVAL_COLUMNS: &str =
    "id, resource_id, status, size_name, cpu, device, instance_alias, start_date, end_date";

pub(crate) const SOURCE_COLUMNS: &str = "id, name, compute_allowed, start_date, end_date";

/// Timestamps are stored as fixed-width UTC strings so they order lexically.
pub fn format_ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn format_opt_ts(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(format_ts)
}

pub(crate) fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(idx, &raw)
}

pub(crate) fn get_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|value| parse_ts(idx, &value)).transpose()
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

pub(crate) fn row_to_resource(row: &Row<'_>) -> rusqlite::Result<Resource> {
    let kind: String = row.get(1)?;
    let kind = ResourceKind::parse(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            Type::Text,
            format!("unknown resource kind {kind}").into(),
        )
    })?;
    Ok(Resource {
        id: row.get(0)?,
        kind,
        identifier: row.get(2)?,
        created_by: row.get(3)?,
        start_date: get_ts(row, 4)?,
        end_date: get_opt_ts(row, 5)?,
        allocation_source_id: row.get(6)?,
        version: row.get(7)?,
    })
}

pub(crate) fn row_to_interval(row: &Row<'_>) -> rusqlite::Result<StatusInterval> {
    let status: String = row.get(2)?;
    let device: Option<String> = row.get(5)?;
    let instance_alias: Option<String> = row.get(6)?;
    let attachment = Attachment {
        device,
        instance_alias,
    };
    Ok(StatusInterval {
        id: row.get(0)?,
        resource_id: row.get(1)?,
        status: CanonicalStatus::from_name(&status),
        size: SizeSnapshot {
            name: row.get(3)?,
            cpu: row.get::<_, i64>(4)?.max(0) as u32,
        },
        attachment: (!attachment.is_empty()).then_some(attachment),
        start_date: get_ts(row, 7)?,
        end_date: get_opt_ts(row, 8)?,
    })
}

pub(crate) fn row_to_allocation_source(row: &Row<'_>) -> rusqlite::Result<AllocationSource> {
    Ok(AllocationSource {
        id: row.get(0)?,
        name: row.get(1)?,
        compute_allowed: row.get(2)?,
        start_date: get_ts(row, 3)?,
        end_date: get_opt_ts(row, 4)?,
    })
}
