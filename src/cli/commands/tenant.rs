//! Tenant command implementation.

use super::{print_json, CliContext};
use crate::keys::printable;
use crate::tenant::StoreTenantDirectory;
use anyhow::Result;
use clap::{Args, Subcommand};

/// Tenant directory operations.
#[derive(Args, Debug)]
pub struct TenantArgs {
    #[command(subcommand)]
    pub command: TenantCommand,
}

/// Tenant subcommands.
#[derive(Subcommand, Debug)]
pub enum TenantCommand {
    /// Create a tenant (no-op if it exists).
    Create { name: String },
    /// List tenants.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Delete a tenant with no registered ranges.
    Delete { name: String },
}

/// Run the tenant command.
pub async fn run_tenant(ctx: &CliContext, args: TenantArgs) -> Result<()> {
    let mut runtime = ctx.open_runtime().await?;
    let db = runtime.database().clone();
    let directory = StoreTenantDirectory::new();

    let result = match args.command {
        TenantCommand::Create { name } => db
            .run(|tr| directory.create_tenant(tr, &name))
            .await
            .map(|entry| println!("Tenant {} (id {}, prefix {})", entry.name, entry.id, printable(&entry.prefix)))
            .map_err(anyhow::Error::from),
        TenantCommand::List { json } => match db.run(|tr| directory.list_tenants(tr)).await {
            Ok(tenants) if json => print_json(&tenants),
            Ok(tenants) => {
                for entry in tenants {
                    println!("{:>6}  {}  {}", entry.id, printable(&entry.prefix), entry.name);
                }
                Ok(())
            }
            Err(e) => Err(e.into()),
        },
        TenantCommand::Delete { name } => db
            .run(|tr| directory.delete_tenant(tr, &name))
            .await
            .map(|()| println!("Deleted tenant {}", name))
            .map_err(anyhow::Error::from),
    };

    runtime.stop().await?;
    result
}
