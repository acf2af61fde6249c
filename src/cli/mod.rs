//! Command-line interface.
//!
//! Every command opens the snapshot in the configured storage directory,
//! runs against it, and saves it back on success.

pub mod commands;

use clap::{Parser, Subcommand};

/// Granary - range-scoped blob granule registry.
#[derive(Parser, Debug)]
#[command(name = "granary")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Storage directory holding the snapshot.
    #[arg(long, global = true)]
    pub storage_dir: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the storage directory and an empty snapshot.
    Init(commands::InitArgs),
    /// Configuration operations.
    Config(commands::ConfigArgs),
    /// Tenant directory operations.
    Tenant(commands::TenantArgs),
    /// Range registry, granule, and purge operations.
    Blob(commands::BlobArgs),
    /// Bulk dump job operations.
    Bulkdump(commands::BulkDumpArgs),
    /// Run the randomized registry workload.
    Workload(commands::WorkloadArgs),
}

/// Initialize the tracing subscriber if the telemetry feature is enabled.
///
/// `RUST_LOG` takes precedence over `level`.
#[cfg(feature = "telemetry")]
pub fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[cfg(not(feature = "telemetry"))]
pub fn init_tracing(_level: &str) {}
