//! Config command implementation.

use super::{ensure_parent, CliContext};
use crate::core::config::Config;
use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Configuration operations.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate the configuration file.
    Validate,
    /// Print the effective configuration with defaults filled in.
    Show {
        /// Output format (toml, json).
        #[arg(long, default_value = "toml")]
        format: String,
    },
    /// Write a configuration template with every default spelled out.
    Generate {
        /// Output file path. Prints to stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Run the config command.
pub fn run_config(ctx: &CliContext, args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommand::Validate => validate_config(ctx),
        ConfigCommand::Show { format } => show_config(ctx, &format),
        ConfigCommand::Generate { output } => generate_config(output),
    }
}

fn validate_config(ctx: &CliContext) -> Result<()> {
    if !ctx.config_path.exists() {
        anyhow::bail!("Config file not found: {:?}", ctx.config_path);
    }
    let config = Config::from_file(&ctx.config_path)?;
    println!("✓ Configuration is valid");
    if config.tenants.bootstrap.is_empty() {
        println!("  ⚠ Warning: no bootstrap tenants configured");
    }
    Ok(())
}

fn show_config(ctx: &CliContext, format: &str) -> Result<()> {
    let config = ctx.load_config()?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&config)?),
        "toml" => println!("{}", config.to_toml()?),
        other => anyhow::bail!("unknown format {:?}, expected toml or json", other),
    }
    Ok(())
}

fn generate_config(output: Option<PathBuf>) -> Result<()> {
    let template = format!("# Granary configuration\n\n{}", Config::default().to_toml()?);
    match output {
        Some(path) => {
            ensure_parent(&path)?;
            std::fs::write(&path, &template)?;
            println!("Generated config template: {:?}", path);
        }
        None => println!("{}", template),
    }
    Ok(())
}
