//! Init command implementation.

use super::{ensure_parent, CliContext};
use anyhow::Result;
use clap::Args;

/// Initialize the storage directory and an empty snapshot.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Also write a default configuration file if none exists.
    #[arg(long)]
    pub write_config: bool,
}

/// Run the init command.
pub async fn run_init(ctx: &CliContext, args: InitArgs) -> Result<()> {
    if args.write_config && !ctx.config_path.exists() {
        ensure_parent(&ctx.config_path)?;
        std::fs::write(&ctx.config_path, crate::core::config::Config::default().to_toml()?)?;
        println!("Wrote default configuration: {:?}", ctx.config_path);
    }

    let config = ctx.load_config()?;
    std::fs::create_dir_all(&config.paths.storage_dir)?;
    println!("Initialized storage directory: {:?}", config.paths.storage_dir);

    let mut runtime = ctx.open_runtime().await?;
    runtime.stop().await?;
    if let Some(path) = runtime.snapshot_path() {
        println!("Snapshot: {:?}", path);
    }
    Ok(())
}
