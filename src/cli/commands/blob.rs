//! Blob command implementation.

use super::{parse_range, print_json, CliContext};
use crate::blob::{BlobClient, PurgeTaskId, PurgeVersion};
use crate::keys::{parse_printable, KeyRange};
use crate::store::Version;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};

/// Range registry, granule, and purge operations.
#[derive(Args, Debug)]
pub struct BlobArgs {
    /// Tenant to scope the request to.
    #[arg(short, long, global = true)]
    pub tenant: Option<String>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: BlobCommand,
}

/// Blob subcommands. Keys accept `\xNN` escapes.
#[derive(Subcommand, Debug)]
pub enum BlobCommand {
    /// Register a range as Active.
    Activate { begin: String, end: String },
    /// Mark a registered range Inactive.
    Deactivate { begin: String, end: String },
    /// Check whether a range is fully served from the blob tier.
    Check {
        begin: String,
        end: String,
        /// Read version to check at (latest when omitted).
        #[arg(long)]
        version: Option<u64>,
    },
    /// List Active ranges intersecting a range.
    List {
        #[arg(default_value = "")]
        begin: String,
        #[arg(default_value = "\\xff")]
        end: String,
        /// Maximum number of ranges (0 = unlimited).
        #[arg(long, default_value_t = 0)]
        limit: usize,
        /// Include Inactive records.
        #[arg(long)]
        all: bool,
    },
    /// List granules intersecting a range.
    Granules {
        #[arg(default_value = "")]
        begin: String,
        #[arg(default_value = "\\xff")]
        end: String,
        #[arg(long, default_value_t = 0)]
        limit: usize,
    },
    /// Split a granule at the given keys.
    Split {
        begin: String,
        end: String,
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Request a purge of a range's history.
    Purge {
        begin: String,
        end: String,
        /// Purge history below this version (everything when omitted).
        #[arg(long)]
        before: Option<u64>,
        /// Destroy all history and stop serving the range.
        #[arg(long)]
        force: bool,
        /// Wait for the purge to complete.
        #[arg(long)]
        wait: bool,
    },
    /// Show a purge task's status, or every task when no id is given.
    PurgeStatus { id: Option<String> },
}

/// Run the blob command.
pub async fn run_blob(ctx: &CliContext, args: BlobArgs) -> Result<()> {
    let mut runtime = ctx.open_runtime().await?;
    let client = runtime.blob_client();
    let result = execute(&client, &args).await;
    runtime.stop().await?;
    result
}

async fn execute(client: &BlobClient, args: &BlobArgs) -> Result<()> {
    let tenant = args.tenant.as_deref();
    match &args.command {
        BlobCommand::Activate { begin, end } => {
            let range = parse_range(begin, end)?;
            let ok = client.activate(&range, tenant).await?;
            report(args.json, &ok, || {
                if ok {
                    format!("Activated {}", range)
                } else {
                    format!("Rejected {}: overlaps a registered range", range)
                }
            })
        }
        BlobCommand::Deactivate { begin, end } => {
            let range = parse_range(begin, end)?;
            let ok = client.deactivate(&range, tenant).await?;
            report(args.json, &ok, || {
                if ok {
                    format!("Deactivated {}", range)
                } else {
                    format!("Rejected {}: overlaps a registered range", range)
                }
            })
        }
        BlobCommand::Check { begin, end, version } => {
            let range = parse_range(begin, end)?;
            let witness = client.is_active(&range, tenant, version.map(Version::new)).await?;
            report(args.json, &witness, || match witness {
                Some(v) => format!("{} is active at {}", range, v),
                None => format!("{} is not active", range),
            })
        }
        BlobCommand::List { begin, end, limit, all } => {
            let query = parse_range(begin, end)?;
            if *all {
                let entries = client.entries(&query, tenant).await?;
                if args.json {
                    return print_json(&entries);
                }
                for entry in entries {
                    let purged = if entry.purged { " (purged)" } else { "" };
                    println!("{}  {}{}", entry.range, entry.state, purged);
                }
                return Ok(());
            }
            let ranges = client.list_active(&query, *limit, tenant).await?;
            print_ranges(args.json, &ranges)
        }
        BlobCommand::Granules { begin, end, limit } => {
            let query = parse_range(begin, end)?;
            let granules = client.granule_ranges(&query, *limit, tenant).await?;
            print_ranges(args.json, &granules)
        }
        BlobCommand::Split { begin, end, keys } => {
            let granule = parse_range(begin, end)?;
            let split_keys = keys
                .iter()
                .map(|k| parse_printable(k).with_context(|| format!("invalid split key {:?}", k)))
                .collect::<Result<Vec<_>>>()?;
            let ok = client.split_granule(&granule, &split_keys, tenant).await?;
            report(args.json, &ok, || {
                if ok {
                    format!("Split {} into {} granules", granule, split_keys.len() + 1)
                } else {
                    format!("{} is not a granule", granule)
                }
            })
        }
        BlobCommand::Purge { begin, end, before, force, wait } => {
            let range = parse_range(begin, end)?;
            let version = match before {
                Some(v) => PurgeVersion::Before(Version::new(*v)),
                None => PurgeVersion::All,
            };
            let id = client.request_purge(&range, version, *force, tenant).await?;
            if *wait {
                client.await_completion(id).await?;
            }
            report(args.json, &id.to_string(), || {
                let state = if *wait { "complete" } else { "requested" };
                format!("Purge {} of {} {}", id, range, state)
            })
        }
        BlobCommand::PurgeStatus { id: Some(id) } => {
            let id: PurgeTaskId = id.parse()?;
            let status = client.purge_status(id).await?;
            report(args.json, &status, || format!("{}: {:?}", id, status))
        }
        BlobCommand::PurgeStatus { id: None } => {
            let tasks = client.purge_tasks().await?;
            if args.json {
                return print_json(&tasks);
            }
            for task in tasks {
                println!(
                    "{}  {}  {}{}  {:?}",
                    task.id,
                    task.range,
                    task.version,
                    if task.force { " force" } else { "" },
                    task.status
                );
            }
            Ok(())
        }
    }
}

fn report<T: serde::Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> Result<()> {
    if json {
        print_json(value)
    } else {
        println!("{}", text());
        Ok(())
    }
}

fn print_ranges(json: bool, ranges: &[KeyRange]) -> Result<()> {
    if json {
        return print_json(&ranges);
    }
    for range in ranges {
        println!("{}", range);
    }
    Ok(())
}
