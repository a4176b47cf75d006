use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Apply newline-delimited JSON status readings.
    Observe { path: PathBuf },
    Destroy { resource: String, at: Option<String> },
    ResourceUsage {
        resource: String,
        start: Option<String>,
        end: Option<String>,
    },
    UserUsage {
        user: String,
        source: String,
        start: Option<String>,
        end: Option<String>,
    },
    Snapshot {
        billing: Option<PathBuf>,
        start: Option<String>,
        end: Option<String>,
    },
    Renew { source: Option<String> },
    SourceAdd {
        name: String,
        allowed: f64,
        start: Option<String>,
        end: Option<String>,
    },
    SourceList,
    SourceUser { source: String, user: String },
    SourceRemoveUser { source: String, user: String },
    Assign { resource: String, source: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub command: Command,
}

#[derive(Debug, Default)]
struct Flags {
    start: Option<String>,
    end: Option<String>,
    at: Option<String>,
    user: Option<String>,
    source: Option<String>,
    resource: Option<String>,
    billing: Option<PathBuf>,
    allowed: Option<f64>,
}

pub fn parse_args() -> Result<CliArgs, String> {
    parse_from(env::args().skip(1))
}

pub fn parse_from(args: impl IntoIterator<Item = String>) -> Result<CliArgs, String> {
    let mut args = args.into_iter();
    let mut config = None;
    let mut data_dir = None;
    let mut positional = Vec::new();
    let mut flags = Flags::default();

    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .ok_or_else(|| format!("missing value for {name}"))
        };
        match arg.as_str() {
            "--config" => config = Some(PathBuf::from(value("--config")?)),
            "--data-dir" => data_dir = Some(PathBuf::from(value("--data-dir")?)),
            "--start" => flags.start = Some(value("--start")?),
            "--end" => flags.end = Some(value("--end")?),
            "--at" => flags.at = Some(value("--at")?),
            "--user" => flags.user = Some(value("--user")?),
            "--source" => flags.source = Some(value("--source")?),
            "--resource" => flags.resource = Some(value("--resource")?),
            "--billing" => flags.billing = Some(PathBuf::from(value("--billing")?)),
            "--allowed" => {
                let raw = value("--allowed")?;
                let allowed = raw
                    .parse::<f64>()
                    .map_err(|_| format!("invalid compute allowance: {raw}"))?;
                flags.allowed = Some(allowed);
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other if other.starts_with("--") => {
                return Err(format!("unknown argument: {other}"));
            }
            _ => positional.push(arg.clone()),
        }
    }

    let command = build_command(positional, flags)?;
    Ok(CliArgs {
        config,
        data_dir,
        command,
    })
}

fn build_command(positional: Vec<String>, flags: Flags) -> Result<Command, String> {
    let mut positional = positional.into_iter();
    let name = positional
        .next()
        .ok_or_else(|| "missing command".to_string())?;
    let mut next = |what: &str| {
        positional
            .next()
            .ok_or_else(|| format!("{name}: missing {what}"))
    };
    let command = match name.as_str() {
        "observe" => Command::Observe {
            path: PathBuf::from(next("readings file")?),
        },
        "destroy" => Command::Destroy {
            resource: next("resource id")?,
            at: flags.at,
        },
        "usage" => match (flags.resource, flags.user, flags.source) {
            (Some(resource), None, None) => Command::ResourceUsage {
                resource,
                start: flags.start,
                end: flags.end,
            },
            (None, Some(user), Some(source)) => Command::UserUsage {
                user,
                source,
                start: flags.start,
                end: flags.end,
            },
            _ => {
                return Err(
                    "usage: pass either --resource <id> or --user <name> --source <name>"
                        .to_string(),
                );
            }
        },
        "snapshot" => Command::Snapshot {
            billing: flags.billing,
            start: flags.start,
            end: flags.end,
        },
        "renew" => Command::Renew {
            source: flags.source,
        },
        "source" => match next("subcommand")?.as_str() {
            "add" => Command::SourceAdd {
                name: next("source name")?,
                allowed: flags
                    .allowed
                    .ok_or_else(|| "source add: missing --allowed".to_string())?,
                start: flags.start,
                end: flags.end,
            },
            "list" => Command::SourceList,
            "user" => Command::SourceUser {
                source: next("source name")?,
                user: next("username")?,
            },
            "remove-user" => Command::SourceRemoveUser {
                source: next("source name")?,
                user: next("username")?,
            },
            other => return Err(format!("unknown source subcommand: {other}")),
        },
        "assign" => Command::Assign {
            resource: next("resource id")?,
            source: next("source name")?,
        },
        other => return Err(format!("unknown command: {other}")),
    };
    Ok(command)
}

pub fn print_help() {
    println!(
        "Usage Ledger CLI\n\n\
Usage:\n  usage-ledger [--config <path>] [--data-dir <dir>] <command>\n\n\
Commands:\n  observe <readings.jsonl>                      Apply status readings\n  destroy <resource> [--at <ts>]                Close a destroyed resource's history\n  usage --resource <id> [--start] [--end]       CPU-hours of one resource\n  usage --user <name> --source <name> [...]     Usage and burn rate of a user\n  snapshot [--billing <file>] [--start] [--end] Refresh allocation snapshots\n  renew [--source <name>]                       Evaluate renewal rules\n  source add <name> --allowed <h> [--start] [--end]\n  source list\n  source user <source> <username>\n  source remove-user <source> <username>\n  assign <resource> <source>\n\n\
Options:\n  --config <path>    Config file (default: ~/.config/usage-ledger/config.toml)\n  --data-dir <dir>   Override the data directory\n  -h, --help         Show this help message\n\n\
Timestamps are RFC 3339. Set RUST_LOG to control log output.\n"
    );
}
