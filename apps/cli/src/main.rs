mod args;
mod config;
mod dirs;

use std::fs;
use std::io;

use chrono::{DateTime, Utc};
use ledger_app::{
    AppConfig, AppError, AppPaths, AppState, BillingFeed, WindowParams, ensure_app_data_dir,
    parse_timestamp, resolve_window, usage_from_billing,
};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::args::Command;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = args::parse_args().map_err(|err| {
        eprintln!("{err}");
        args::print_help();
        io::Error::new(io::ErrorKind::InvalidInput, "invalid arguments")
    })?;

    let loaded = config::load_or_create(args.config.as_deref()).map_err(io::Error::other)?;
    if loaded.created {
        info!(path = %loaded.file.display(), "created default config");
    }

    let data_dir = match args.data_dir.clone().or(loaded.config.data_dir.clone()) {
        Some(dir) => dir,
        None => dirs::resolve_data_dir().map_err(io::Error::other)?,
    };
    let paths = AppPaths::new(data_dir);
    ensure_app_data_dir(&paths)?;

    let app_state = AppState::new(AppConfig {
        db_path: paths.db_path.clone(),
        rules_path: Some(
            loaded
                .config
                .rules_path
                .clone()
                .unwrap_or(paths.rules_path.clone()),
        ),
        settings: loaded.config.accounting.clone(),
    });
    app_state.initialize()?;

    run(&app_state, args.command, Utc::now())?;
    Ok(())
}

fn run(state: &AppState, command: Command, now: DateTime<Utc>) -> ledger_app::Result<()> {
    let services = &state.services;
    match command {
        Command::Observe { path } => {
            let stats = services.status.observe_file(&path, now)?;
            for issue in &stats.issues {
                warn!(resource = %issue.resource_id, "{}", issue.message);
            }
            print_json(&stats)
        }
        Command::Destroy { resource, at } => {
            let at = optional_timestamp(at.as_deref())?.unwrap_or(now);
            let closed = services.status.destroy(&resource, at)?;
            print_json(&json!({ "resource": resource, "closed_intervals": closed, "at": at }))
        }
        Command::ResourceUsage {
            resource,
            start,
            end,
        } => {
            let window = if start.is_none() && end.is_none() {
                None
            } else {
                let created = state
                    .open_db()?
                    .find_resource(&resource)?
                    .ok_or_else(|| AppError::NotFound(format!("resource {}", resource)))?
                    .start_date;
                Some(resolve_window(&WindowParams { start, end }, created, now)?)
            };
            let hours = services.usage.active_hours(&resource, window, now)?;
            print_json(&json!({ "resource": resource, "window": window, "cpu_hours": hours }))
        }
        Command::UserUsage {
            user,
            source,
            start,
            end,
        } => {
            let default_start = match state.accounting_epoch()? {
                Some(epoch) => epoch,
                None => {
                    state
                        .open_db()?
                        .allocation_source_by_name(&source)?
                        .ok_or_else(|| {
                            AppError::NotFound(format!("allocation source {}", source))
                        })?
                        .start_date
                }
            };
            let window = resolve_window(&WindowParams { start, end }, default_start, now)?;
            print_json(&services.usage.user_usage(&user, &source, window, now)?)
        }
        Command::Snapshot {
            billing,
            start,
            end,
        } => {
            let start = match optional_timestamp(start.as_deref())? {
                Some(start) => start,
                None => state.accounting_epoch()?.ok_or_else(|| {
                    AppError::InvalidInput(
                        "snapshot: pass --start or set accounting.accounting_epoch".to_string(),
                    )
                })?,
            };
            let end = optional_timestamp(end.as_deref())?.unwrap_or(now);
            let feed = match billing {
                Some(path) => usage_from_billing(&fs::read_to_string(&path)?, now)?,
                None => BillingFeed::default(),
            };
            let report = services.snapshots.run(start, end, &feed, now)?;
            print_json(&report)
        }
        Command::Renew {
            source: Some(source),
        } => print_json(&services.renewals.evaluate(&source, now)?),
        Command::Renew { source: None } => print_json(&services.renewals.evaluate_all(now)?),
        Command::SourceAdd {
            name,
            allowed,
            start,
            end,
        } => {
            let start = optional_timestamp(start.as_deref())?.unwrap_or(now);
            let end = optional_timestamp(end.as_deref())?;
            print_json(&services.allocations.upsert_source(&name, allowed, start, end)?)
        }
        Command::SourceList => print_json(&services.allocations.list_sources()?),
        Command::SourceUser { source, user } => {
            services.allocations.add_user(&source, &user)?;
            print_json(&json!({ "source": source, "user": user }))
        }
        Command::SourceRemoveUser { source, user } => {
            let removed = services.allocations.remove_user(&source, &user)?;
            print_json(&json!({ "source": source, "user": user, "removed": removed }))
        }
        Command::Assign { resource, source } => {
            services.allocations.assign_resource(&resource, Some(&source))?;
            print_json(&json!({ "resource": resource, "source": source }))
        }
    }
}

fn optional_timestamp(value: Option<&str>) -> ledger_app::Result<Option<DateTime<Utc>>> {
    value.map(parse_timestamp).transpose()
}

fn print_json<T: Serialize>(value: &T) -> ledger_app::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
