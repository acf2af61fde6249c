//! Configuration parsing and validation.
//!
//! Granary configuration is loaded from TOML files with CLI overrides.
//! Every section is optional and falls back to defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level Granary configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Transaction retry settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Purge worker settings.
    #[serde(default)]
    pub purge: PurgeConfig,

    /// Tenants created at startup.
    #[serde(default)]
    pub tenants: TenantsConfig,

    /// Workload driver settings.
    #[serde(default)]
    pub workload: WorkloadConfig,

    /// Logging configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Filesystem paths.
    #[serde(default)]
    pub paths: PathConfig,
}

/// Transaction retry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Give up after this many conflicts. Unbounded when unset.
    #[serde(default)]
    pub max_retries: Option<u32>,

    /// Initial retry backoff in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Backoff ceiling in milliseconds.
    #[serde(default = "default_max_retry_backoff_ms")]
    pub max_retry_backoff_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_retries: None,
            retry_backoff_ms: default_retry_backoff_ms(),
            max_retry_backoff_ms: default_max_retry_backoff_ms(),
        }
    }
}

/// Purge worker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeConfig {
    /// Pending-task poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Tasks executed per transaction.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
        }
    }
}

/// Tenants created at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantsConfig {
    #[serde(default)]
    pub bootstrap: Vec<String>,
}

/// Workload driver settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Client loop duration in seconds.
    #[serde(default = "default_test_duration_secs")]
    pub test_duration_secs: u64,

    /// Target registry operations per second.
    #[serde(default = "default_ops_per_second")]
    pub ops_per_second: u32,

    /// Ranges set up before the client loop starts.
    #[serde(default = "default_target_ranges")]
    pub target_ranges: usize,

    /// Lay ranges out back to back instead of at random.
    #[serde(default = "default_sequential")]
    pub sequential: bool,

    /// Key gap between sequential ranges.
    #[serde(default = "default_sequential_gap")]
    pub sequential_gap: u32,

    /// RNG seed. Drawn from entropy when unset.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Run inside a dedicated tenant.
    #[serde(default)]
    pub use_tenant: bool,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            test_duration_secs: default_test_duration_secs(),
            ops_per_second: default_ops_per_second(),
            target_ranges: default_target_ranges(),
            sequential: default_sequential(),
            sequential_gap: default_sequential_gap(),
            seed: None,
            use_tenant: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Filesystem path configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathConfig {
    /// Directory holding the store snapshot.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
        }
    }
}

// Default value functions

fn default_retry_backoff_ms() -> u64 {
    2
}

fn default_max_retry_backoff_ms() -> u64 {
    200
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_batch_size() -> usize {
    16
}

fn default_test_duration_secs() -> u64 {
    30
}

fn default_ops_per_second() -> u32 {
    100
}

fn default_target_ranges() -> usize {
    100
}

fn default_sequential() -> bool {
    true
}

fn default_sequential_gap() -> u32 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_storage_dir() -> String {
    "data".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to render config")
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref log_level) = overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
        if let Some(ref storage_dir) = overrides.storage_dir {
            self.paths.storage_dir = storage_dir.clone();
        }
        if let Some(seed) = overrides.seed {
            self.workload.seed = Some(seed);
        }
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_store()?;
        self.validate_purge()?;
        self.validate_tenants()?;
        self.validate_workload()?;
        self.validate_telemetry()?;
        Ok(())
    }

    fn validate_store(&self) -> Result<()> {
        if self.store.retry_backoff_ms > self.store.max_retry_backoff_ms {
            anyhow::bail!(
                "store.retry_backoff_ms ({}) cannot exceed store.max_retry_backoff_ms ({})",
                self.store.retry_backoff_ms,
                self.store.max_retry_backoff_ms
            );
        }
        Ok(())
    }

    fn validate_purge(&self) -> Result<()> {
        if self.purge.poll_interval_ms == 0 {
            anyhow::bail!("purge.poll_interval_ms must be > 0");
        }
        if self.purge.batch_size == 0 {
            anyhow::bail!("purge.batch_size must be > 0");
        }
        Ok(())
    }

    fn validate_tenants(&self) -> Result<()> {
        for name in &self.tenants.bootstrap {
            if name.is_empty() {
                anyhow::bail!("tenants.bootstrap contains an empty name");
            }
            if name.as_bytes()[0] == 0xff {
                anyhow::bail!("tenants.bootstrap name {:?} starts with \\xff", name);
            }
        }
        Ok(())
    }

    fn validate_workload(&self) -> Result<()> {
        if self.workload.ops_per_second == 0 {
            anyhow::bail!("workload.ops_per_second must be > 0");
        }
        if self.workload.target_ranges == 0 {
            anyhow::bail!("workload.target_ranges must be > 0");
        }
        if self.workload.sequential && self.workload.sequential_gap == 0 {
            anyhow::bail!("workload.sequential_gap must be > 0 when sequential is set");
        }
        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                valid_levels,
                self.telemetry.log_level
            );
        }
        Ok(())
    }
}

/// CLI override options that can be applied to configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override log level.
    pub log_level: Option<String>,
    /// Override storage directory.
    pub storage_dir: Option<String>,
    /// Override workload seed.
    pub seed: Option<u64>,
}
