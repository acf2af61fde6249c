//! Granary - unified CLI entrypoint.
//!
//! Usage:
//!   granary init [--write-config]
//!   granary config validate|show|generate
//!   granary tenant create|list|delete
//!   granary blob activate|deactivate|check|list|granules|split|purge|purge-status
//!   granary bulkdump mode|local|blobstore|cancel|status|run
//!   granary workload [--duration N] [--scenario NAME]

use anyhow::Result;
use clap::Parser;
use granary::cli::commands::{
    run_blob, run_bulkdump, run_config, run_init, run_tenant, run_workload, CliContext,
    DEFAULT_CONFIG_PATH,
};
use granary::cli::{init_tracing, Cli, Commands};
use granary::config::ConfigOverrides;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = CliContext {
        config_path: cli
            .config
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
        overrides: ConfigOverrides {
            log_level: cli.log_level,
            storage_dir: cli.storage_dir,
            seed: None,
        },
    };

    let level = match ctx.load_config() {
        Ok(config) => config.telemetry.log_level,
        Err(_) => ctx.overrides.log_level.clone().unwrap_or_else(|| "info".to_string()),
    };
    init_tracing(&level);

    match cli.command {
        Commands::Init(args) => run_init(&ctx, args).await,
        Commands::Config(args) => run_config(&ctx, args),
        Commands::Tenant(args) => run_tenant(&ctx, args).await,
        Commands::Blob(args) => run_blob(&ctx, args).await,
        Commands::Bulkdump(args) => run_bulkdump(&ctx, args).await,
        Commands::Workload(args) => run_workload(&ctx, args).await,
    }
}
