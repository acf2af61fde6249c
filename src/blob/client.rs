//! Asynchronous entry points over the registry, granule view, and purge
//! coordinator.
//!
//! Each call resolves the caller's tenant and runs its operation inside one
//! retried transaction, so it is atomic and serializable with respect to
//! every other call.

use super::granules::{self, History};
use super::purge::{PurgeCoordinator, PurgeStatus, PurgeTask, PurgeTaskId, PurgeVersion};
use super::registry::{RangeRegistry, RegistryEntry};
use super::GranuleView;
use crate::core::config::PurgeConfig;
use crate::core::error::{GranaryError, GranaryResult};
use crate::keys::KeyRange;
use crate::store::{Database, Version};
use crate::tenant::{resolve_scope, StoreTenantDirectory, TenantDirectory};
use std::sync::Arc;
use std::time::Duration;

/// Handle for registering ranges and managing their history.
#[derive(Clone)]
pub struct BlobClient {
    db: Database,
    directory: Arc<dyn TenantDirectory + Send + Sync>,
    config: PurgeConfig,
    registry: RangeRegistry,
    granules: GranuleView,
    purges: PurgeCoordinator,
}

impl BlobClient {
    /// Client resolving tenants through the store's own directory.
    pub fn new(db: Database, config: PurgeConfig) -> Self {
        Self::with_directory(db, Arc::new(StoreTenantDirectory::new()), config)
    }

    pub fn with_directory(
        db: Database,
        directory: Arc<dyn TenantDirectory + Send + Sync>,
        config: PurgeConfig,
    ) -> Self {
        Self {
            db,
            directory,
            config,
            registry: RangeRegistry::new(),
            granules: GranuleView::new(),
            purges: PurgeCoordinator::new(),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Register `range` as Active. See [`RangeRegistry::activate`].
    pub async fn activate(&self, range: &KeyRange, tenant: Option<&str>) -> GranaryResult<bool> {
        self.db
            .run(|tr| {
                let scope = resolve_scope(&*self.directory, tr, tenant)?;
                self.registry.activate(tr, &scope, range)
            })
            .await
    }

    /// Mark `range` Inactive. See [`RangeRegistry::deactivate`].
    pub async fn deactivate(&self, range: &KeyRange, tenant: Option<&str>) -> GranaryResult<bool> {
        self.db
            .run(|tr| {
                let scope = resolve_scope(&*self.directory, tr, tenant)?;
                self.registry.deactivate(tr, &scope, range)
            })
            .await
    }

    /// Whether `range` is fully served from the secondary tier.
    ///
    /// With no `read_version` the check runs at the latest version. An
    /// explicit version is checked against the range's state at that
    /// version, and rejected when a purge has since destroyed it.
    pub async fn is_active(
        &self,
        range: &KeyRange,
        tenant: Option<&str>,
        read_version: Option<Version>,
    ) -> GranaryResult<Option<Version>> {
        let Some(version) = read_version else {
            return self
                .db
                .run(|tr| {
                    let scope = resolve_scope(&*self.directory, tr, tenant)?;
                    self.registry.is_active(tr, &scope, range)
                })
                .await;
        };

        let (scope, history) = self
            .db
            .run(|tr| {
                let scope = resolve_scope(&*self.directory, tr, tenant)?;
                let absolute = scope.to_absolute(range)?;
                Ok((scope, granules::history(tr, &absolute)?))
            })
            .await?;
        match history {
            History::Destroyed => return Ok(None),
            History::Readable { floor } if version < floor => return Ok(None),
            History::Readable { .. } => {}
        }

        self.db
            .run(|tr| {
                tr.set_read_version(version);
                self.registry.is_active(tr, &scope, range)
            })
            .await
    }

    /// Active ranges intersecting `query`.
    pub async fn list_active(
        &self,
        query: &KeyRange,
        limit: usize,
        tenant: Option<&str>,
    ) -> GranaryResult<Vec<KeyRange>> {
        self.db
            .run(|tr| {
                let scope = resolve_scope(&*self.directory, tr, tenant)?;
                self.registry.list_active(tr, &scope, query, limit)
            })
            .await
    }

    /// Registry records intersecting `query`, in any state.
    pub async fn entries(&self, query: &KeyRange, tenant: Option<&str>) -> GranaryResult<Vec<RegistryEntry>> {
        self.db
            .run(|tr| {
                let scope = resolve_scope(&*self.directory, tr, tenant)?;
                self.registry.entries(tr, &scope, query)
            })
            .await
    }

    /// Granule tiling of the Active ranges intersecting `query`.
    pub async fn granule_ranges(
        &self,
        query: &KeyRange,
        limit: usize,
        tenant: Option<&str>,
    ) -> GranaryResult<Vec<KeyRange>> {
        self.db
            .run(|tr| {
                let scope = resolve_scope(&*self.directory, tr, tenant)?;
                self.granules.granule_ranges(tr, &scope, query, limit)
            })
            .await
    }

    /// Split an existing granule at `split_keys`.
    pub async fn split_granule(
        &self,
        granule: &KeyRange,
        split_keys: &[Vec<u8>],
        tenant: Option<&str>,
    ) -> GranaryResult<bool> {
        self.db
            .run(|tr| {
                let scope = resolve_scope(&*self.directory, tr, tenant)?;
                self.granules.split_granule(tr, &scope, granule, split_keys)
            })
            .await
    }

    /// Record a purge request. See [`PurgeCoordinator::request_purge`].
    pub async fn request_purge(
        &self,
        range: &KeyRange,
        version: PurgeVersion,
        force: bool,
        tenant: Option<&str>,
    ) -> GranaryResult<PurgeTaskId> {
        self.db
            .run(|tr| {
                let scope = resolve_scope(&*self.directory, tr, tenant)?;
                self.purges.request_purge(tr, &scope, range, version, force)
            })
            .await
    }

    /// Current status of a purge task.
    pub async fn purge_status(&self, id: PurgeTaskId) -> GranaryResult<PurgeStatus> {
        self.db.run(|tr| self.purges.purge_status(tr, id)).await
    }

    /// Every recorded purge task.
    pub async fn purge_tasks(&self) -> GranaryResult<Vec<PurgeTask>> {
        self.db.run(|tr| self.purges.tasks(tr)).await
    }

    /// Wait until the purge task `id` has executed.
    ///
    /// Fails with `NotFound` for an unknown id and with `Cancelled` when
    /// the database shuts down first.
    pub async fn await_completion(&self, id: PurgeTaskId) -> GranaryResult<()> {
        let mut commits = self.db.subscribe_commits();
        let mut shutdown = self.db.subscribe_shutdown();
        let poll = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            commits.borrow_and_update();
            if *shutdown.borrow_and_update() {
                return Err(GranaryError::Cancelled);
            }
            match self.purge_status(id).await? {
                PurgeStatus::Complete { .. } => return Ok(()),
                PurgeStatus::Pending => {}
            }

            tokio::select! {
                _ = shutdown.changed() => {}
                _ = commits.changed() => {}
                _ = tokio::time::sleep(poll) => {}
            }
        }
    }
}

impl std::fmt::Debug for BlobClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobClient")
            .field("db", &self.db)
            .field("config", &self.config)
            .finish()
    }
}
