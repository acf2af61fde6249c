//! Main runtime orchestration.
//!
//! The runtime coordinates component lifecycle:
//! - Start order: database (snapshot restore) → bootstrap tenants → purge worker
//! - Shutdown order: purge worker → database → snapshot save

use crate::blob::{BlobClient, PurgeWorker};
use crate::bulkdump::{BulkDump, BulkDumpScheduler};
use crate::core::config::Config;
use crate::store::{Database, SNAPSHOT_FILE_NAME};
use crate::tenant::StoreTenantDirectory;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Granary runtime holding all component handles.
pub struct Runtime {
    /// Configuration.
    config: Arc<Config>,

    /// Shared database handle.
    db: Database,

    /// Snapshot location, if persistent.
    snapshot_path: Option<PathBuf>,

    /// Purge worker task handle.
    worker: Option<JoinHandle<()>>,

    /// Whether the runtime is running.
    running: Arc<AtomicBool>,
}

impl Runtime {
    /// Create a runtime backed by the snapshot in `paths.storage_dir`.
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let storage_dir = PathBuf::from(&config.paths.storage_dir);
        let snapshot_path = storage_dir.join(SNAPSHOT_FILE_NAME);
        let db = Database::open(&snapshot_path, config.store.clone())
            .with_context(|| format!("failed to open database at {}", snapshot_path.display()))?;

        Ok(Self::with_database(config, db, Some(snapshot_path)))
    }

    /// Create a runtime over a fresh in-memory database.
    pub fn in_memory(config: Config) -> Result<Self> {
        config.validate().context("invalid configuration")?;
        let db = Database::new(config.store.clone());
        Ok(Self::with_database(config, db, None))
    }

    fn with_database(config: Config, db: Database, snapshot_path: Option<PathBuf>) -> Self {
        Self {
            config: Arc::new(config),
            db,
            snapshot_path,
            worker: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the database handle.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Snapshot file path, `None` for in-memory runtimes.
    pub fn snapshot_path(&self) -> Option<&PathBuf> {
        self.snapshot_path.as_ref()
    }

    /// Check if the runtime is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Registry client bound to this runtime's database.
    pub fn blob_client(&self) -> BlobClient {
        BlobClient::new(self.db.clone(), self.config.purge.clone())
    }

    /// Bulk dump job handle.
    pub fn bulk_dump(&self) -> BulkDump {
        BulkDump::new(self.db.clone())
    }

    /// Bulk dump scheduler.
    pub fn bulk_dump_scheduler(&self) -> BulkDumpScheduler {
        BulkDumpScheduler::new(self.db.clone())
    }

    /// Start background components.
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!(
            snapshot = ?self.snapshot_path,
            version = %self.db.committed_version(),
            "starting Granary runtime"
        );

        self.bootstrap_tenants().await?;

        let worker = PurgeWorker::new(self.db.clone(), self.config.purge.clone());
        self.worker = Some(worker.spawn());

        self.running.store(true, Ordering::Release);
        tracing::info!("Granary runtime started");
        Ok(())
    }

    /// Create every configured bootstrap tenant that does not exist yet.
    async fn bootstrap_tenants(&self) -> Result<()> {
        let directory = StoreTenantDirectory::new();
        for name in &self.config.tenants.bootstrap {
            let entry = self
                .db
                .run(|tr| directory.create_tenant(tr, name))
                .await
                .with_context(|| format!("failed to bootstrap tenant {}", name))?;
            tracing::debug!(tenant = %entry.name, id = entry.id, "bootstrap tenant ready");
        }
        Ok(())
    }

    /// Persist the database to its snapshot file.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        self.db.save(path)?;
        tracing::debug!(path = %path.display(), version = %self.db.committed_version(), "saved snapshot");
        Ok(())
    }

    /// Stop background components and persist state.
    pub async fn stop(&mut self) -> Result<()> {
        tracing::info!("stopping Granary runtime");
        self.db.shutdown();
        if let Some(handle) = self.worker.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "purge worker task panicked");
            }
        }
        self.running.store(false, Ordering::Release);
        self.save()
    }

    /// Run until SIGINT or an internal shutdown request.
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;

        let mut shutdown_rx = self.db.subscribe_shutdown();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("shutdown signal received (SIGINT)");
            }
            _ = async {
                while !*shutdown_rx.borrow() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            } => {
                tracing::info!("shutdown requested by component");
            }
        }

        self.stop().await
    }
}
