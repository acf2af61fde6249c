//! CLI command implementations.

mod blob;
mod bulkdump;
mod config;
mod init;
mod tenant;
mod workload;

pub use blob::{run_blob, BlobArgs};
pub use bulkdump::{run_bulkdump, BulkDumpArgs};
pub use config::{run_config, ConfigArgs};
pub use init::{run_init, InitArgs};
pub use tenant::{run_tenant, TenantArgs};
pub use workload::{run_workload, WorkloadArgs};

use crate::core::config::{Config, ConfigOverrides};
use crate::core::runtime::Runtime;
use crate::keys::{parse_printable, KeyRange};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/granary.toml";

/// Global options shared by every command.
#[derive(Debug, Clone)]
pub struct CliContext {
    pub config_path: PathBuf,
    pub overrides: ConfigOverrides,
}

impl CliContext {
    /// Load the config file, falling back to defaults when it is missing,
    /// then apply overrides.
    pub fn load_config(&self) -> Result<Config> {
        let mut config = if self.config_path.exists() {
            Config::from_file(&self.config_path)?
        } else {
            tracing::debug!(path = %self.config_path.display(), "config file not found, using defaults");
            Config::default()
        };
        config.apply_overrides(&self.overrides);
        config.validate()?;
        Ok(config)
    }

    /// Open and start a runtime over the configured snapshot.
    pub async fn open_runtime(&self) -> Result<Runtime> {
        let mut runtime = Runtime::new(self.load_config()?)?;
        runtime.start().await?;
        Ok(runtime)
    }
}

/// Parse a `begin end` pair in escaped key form.
pub(crate) fn parse_range(begin: &str, end: &str) -> Result<KeyRange> {
    let begin = parse_printable(begin).with_context(|| format!("invalid begin key {:?}", begin))?;
    let end = parse_printable(end).with_context(|| format!("invalid end key {:?}", end))?;
    Ok(KeyRange::new(begin, end)?)
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    Ok(())
}
