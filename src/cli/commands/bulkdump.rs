//! Bulk dump command implementation.

use super::{parse_range, print_json, CliContext};
use crate::bulkdump::{JobId, Transport};
use crate::core::runtime::Runtime;
use anyhow::Result;
use clap::{Args, Subcommand, ValueEnum};

/// Bulk dump job operations.
#[derive(Args, Debug)]
pub struct BulkDumpArgs {
    #[command(subcommand)]
    pub command: BulkDumpCommand,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum Switch {
    On,
    Off,
}

/// Bulk dump subcommands. Ranges must lie in the normal keyspace.
#[derive(Subcommand, Debug)]
pub enum BulkDumpCommand {
    /// Show or set the scheduler mode.
    Mode { value: Option<Switch> },
    /// Dump a range to a local directory.
    Local { begin: String, end: String, dir: String },
    /// Dump a range to a blob store URL.
    Blobstore { begin: String, end: String, url: String },
    /// Cancel the running job.
    Cancel { job: String },
    /// Show the running job and completed tasks in a range.
    Status {
        begin: String,
        end: String,
        #[arg(long)]
        json: bool,
    },
    /// Run the scheduler until the running job finishes.
    Run,
}

/// Run the bulkdump command.
pub async fn run_bulkdump(ctx: &CliContext, args: BulkDumpArgs) -> Result<()> {
    let mut runtime = ctx.open_runtime().await?;
    let result = execute(&runtime, args.command).await;
    runtime.stop().await?;
    result
}

async fn execute(runtime: &Runtime, command: BulkDumpCommand) -> Result<()> {
    let bulk = runtime.bulk_dump();
    match command {
        BulkDumpCommand::Mode { value: None } => {
            let state = if bulk.mode().await? { "enabled" } else { "disabled" };
            println!("Bulk dump is {}", state);
        }
        BulkDumpCommand::Mode { value: Some(switch) } => {
            let enabled = matches!(switch, Switch::On);
            let old = bulk.set_mode(enabled).await?;
            println!("Bulk dump mode {} -> {}", old, enabled);
        }
        BulkDumpCommand::Local { begin, end, dir } => {
            let id = bulk.submit_job(&parse_range(&begin, &end)?, &dir, Transport::Local).await?;
            println!("{}", id);
        }
        BulkDumpCommand::Blobstore { begin, end, url } => {
            let id = bulk
                .submit_job(&parse_range(&begin, &end)?, &url, Transport::BlobStore)
                .await?;
            println!("{}", id);
        }
        BulkDumpCommand::Cancel { job } => {
            let id: JobId = job.parse()?;
            bulk.cancel_job(id).await?;
            println!("Job {} has been cancelled. No new tasks will be spawned.", id);
        }
        BulkDumpCommand::Status { begin, end, json } => {
            let range = parse_range(&begin, &end)?;
            let job = bulk.job_status().await?;
            let completed = bulk.completed_task_count(&range).await?;
            if json {
                return print_json(&serde_json::json!({ "job": job, "completed_tasks": completed }));
            }
            match job {
                Some(job) => println!("Running bulk dumping job: {}", job.id),
                None => println!("No bulk dumping job is running"),
            }
            println!("Finished {} tasks", completed);
        }
        BulkDumpCommand::Run => {
            let completed = runtime.bulk_dump_scheduler().run_to_completion().await?;
            println!("Completed {} tasks", completed);
        }
    }
    Ok(())
}
