//! Purge coordinator.
//!
//! A purge destroys history of a registered range, either up to a version
//! or entirely (force). Requests are validated against the granule layout
//! and recorded as durable tasks; the [`PurgeWorker`](super::PurgeWorker)
//! executes them asynchronously.
//!
//! Task layout:
//! - `\xff\x02/bgPurge/task/<id>` holds the [`PurgeTask`]
//! - `\xff\x02/bgPurge/intent/<digest>` maps a pending request to its task,
//!   so identical pending requests collapse onto one task

use super::granules::{GranuleRecord, GRANULES};
use super::registry::{RangeRecord, RANGES};
use crate::core::error::{GranaryError, GranaryResult};
use crate::keys::system::{system_key, PURGE_INTENT_PREFIX, PURGE_TASK_PREFIX};
use crate::keys::{strinc, KeyRange};
use crate::store::{Transaction, Version};
use crate::tenant::TenantScope;
use serde::{Deserialize, Serialize};
use std::hash::Hasher;
use twox_hash::XxHash64;

/// Opaque purge task handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PurgeTaskId(pub u64);

impl PurgeTaskId {
    fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    fn from_bytes(bytes: &[u8]) -> GranaryResult<Self> {
        let array: [u8; 8] = bytes.try_into().map_err(|_| GranaryError::Codec {
            message: format!("purge task id has {} bytes, expected 8", bytes.len()),
        })?;
        Ok(Self(u64::from_be_bytes(array)))
    }
}

impl std::fmt::Display for PurgeTaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "purge-{:016x}", self.0)
    }
}

impl std::str::FromStr for PurgeTaskId {
    type Err = GranaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix("purge-").unwrap_or(s);
        u64::from_str_radix(hex, 16)
            .map(Self)
            .map_err(|_| GranaryError::invalid_request(format!("invalid purge task id: {}", s)))
    }
}

/// Which history a purge destroys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PurgeVersion {
    /// Everything up to the version the purge executes at.
    All,
    /// Every version strictly below this one.
    Before(Version),
}

impl std::fmt::Display for PurgeVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Before(version) => write!(f, "before {}", version),
        }
    }
}

/// Lifecycle of a purge task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurgeStatus {
    Pending,
    /// Executed by a transaction reading at `at`.
    Complete { at: Version },
}

/// A durable purge request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeTask {
    pub id: PurgeTaskId,
    /// Absolute range being purged.
    pub range: KeyRange,
    pub tenant: Option<String>,
    pub version: PurgeVersion,
    pub force: bool,
    pub requested_at: Version,
    pub status: PurgeStatus,
}

impl PurgeTask {
    pub fn is_complete(&self) -> bool {
        matches!(self.status, PurgeStatus::Complete { .. })
    }
}

/// What one task execution changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeOutcome {
    pub granules_destroyed: usize,
    pub granules_floored: usize,
    pub ranges_purged: usize,
}

fn task_key(id: PurgeTaskId) -> Vec<u8> {
    system_key(PURGE_TASK_PREFIX, &id.to_bytes())
}

fn intent_key(range: &KeyRange, version: PurgeVersion, force: bool) -> GranaryResult<Vec<u8>> {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(&bincode::serialize(&(range, version, force))?);
    Ok(system_key(PURGE_INTENT_PREFIX, &hasher.finish().to_be_bytes()))
}

fn prefix_end(prefix: &[u8]) -> GranaryResult<Vec<u8>> {
    strinc(prefix).ok_or_else(|| GranaryError::internal("system prefix has no successor"))
}

/// Purge coordinator operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct PurgeCoordinator;

impl PurgeCoordinator {
    pub fn new() -> Self {
        Self
    }

    /// Record a purge of `range` and return its task id.
    ///
    /// Fails with `UnsupportedOperation` when the range cuts through a
    /// granule. An identical request that is still pending returns the
    /// pending id.
    pub fn request_purge(
        &self,
        tr: &mut Transaction,
        scope: &TenantScope,
        range: &KeyRange,
        version: PurgeVersion,
        force: bool,
    ) -> GranaryResult<PurgeTaskId> {
        let absolute = scope.to_absolute(range)?;
        check_alignment(tr, &absolute, range)?;

        let intent = intent_key(&absolute, version, force)?;
        if let Some(bytes) = tr.get(&intent)? {
            let id = PurgeTaskId::from_bytes(&bytes)?;
            tracing::debug!(task = %id, range = %range, "purge already pending");
            return Ok(id);
        }

        let id = PurgeTaskId(tr.database().next_id());
        let task = PurgeTask {
            id,
            range: absolute,
            tenant: scope.name().map(str::to_string),
            version,
            force,
            requested_at: tr.read_version()?,
            status: PurgeStatus::Pending,
        };
        tr.set(task_key(id), bincode::serialize(&task)?);
        tr.set(intent, id.to_bytes().to_vec());

        tracing::info!(
            task = %id,
            range = %range,
            scope = %scope,
            version = %version,
            force,
            "purge requested"
        );
        Ok(id)
    }

    /// Look up a task, pending or complete.
    pub fn task(&self, tr: &mut Transaction, id: PurgeTaskId) -> GranaryResult<Option<PurgeTask>> {
        match tr.get(&task_key(id))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Status of a task, failing with `NotFound` for an unknown id.
    pub fn purge_status(&self, tr: &mut Transaction, id: PurgeTaskId) -> GranaryResult<PurgeStatus> {
        self.task(tr, id)?
            .map(|task| task.status)
            .ok_or_else(|| GranaryError::not_found(format!("purge task {}", id)))
    }

    /// Pending tasks, at most `limit` of them (`0` = unlimited).
    pub fn pending(&self, tr: &mut Transaction, limit: usize) -> GranaryResult<Vec<PurgeTask>> {
        let end = prefix_end(PURGE_INTENT_PREFIX)?;
        let intents = tr.get_range(PURGE_INTENT_PREFIX, &end, limit, false)?;
        let mut tasks = Vec::with_capacity(intents.len());
        for (_, value) in intents {
            let id = PurgeTaskId::from_bytes(&value)?;
            let task = self
                .task(tr, id)?
                .ok_or_else(|| GranaryError::internal(format!("intent points at missing task {}", id)))?;
            tasks.push(task);
        }
        Ok(tasks)
    }

    /// Every recorded task, ordered by id.
    pub fn tasks(&self, tr: &mut Transaction) -> GranaryResult<Vec<PurgeTask>> {
        let end = prefix_end(PURGE_TASK_PREFIX)?;
        tr.get_range(PURGE_TASK_PREFIX, &end, 0, false)?
            .into_iter()
            .map(|(_, value)| bincode::deserialize(&value).map_err(GranaryError::from))
            .collect()
    }

    /// Execute a pending task and mark it complete.
    ///
    /// Only granules and records lying fully inside the task's range are
    /// touched; the layout may have changed since the request was checked.
    /// A force purge leaves destroyed granules in place and marks a record
    /// purged only when all of it lies inside the task's range.
    pub fn execute(&self, tr: &mut Transaction, task: &PurgeTask) -> GranaryResult<PurgeOutcome> {
        if task.is_complete() {
            return Ok(PurgeOutcome::default());
        }
        let at = tr.read_version()?;
        let mut outcome = PurgeOutcome::default();

        for (granule, record) in GRANULES.overlapping(tr, &task.range, 0)? {
            if !task.range.contains_range(&granule) {
                tracing::warn!(task = %task.id, granule = %granule, "granule no longer aligned, skipping");
                continue;
            }
            if record.destroyed {
                continue;
            }
            if task.force {
                GRANULES.put(tr, &granule, &GranuleRecord::destroyed_at(at))?;
                outcome.granules_destroyed += 1;
                continue;
            }
            let floor = match task.version {
                PurgeVersion::All => at,
                PurgeVersion::Before(version) => std::cmp::min(version, at),
            };
            if floor > record.purge_floor {
                GRANULES.put(tr, &granule, &GranuleRecord::live(floor))?;
                outcome.granules_floored += 1;
            }
        }

        if task.force {
            for (registered, record) in RANGES.overlapping(tr, &task.range, 0)? {
                if record.is_active() && task.range.contains_range(&registered) {
                    let purged = RangeRecord {
                        purged: true,
                        ..record
                    };
                    RANGES.put(tr, &registered, &purged)?;
                    outcome.ranges_purged += 1;
                }
            }
        }

        let complete = PurgeTask {
            status: PurgeStatus::Complete { at },
            ..task.clone()
        };
        tr.set(task_key(task.id), bincode::serialize(&complete)?);
        tr.clear(intent_key(&task.range, task.version, task.force)?);

        tracing::info!(
            task = %task.id,
            range = %task.range,
            force = task.force,
            destroyed = outcome.granules_destroyed,
            floored = outcome.granules_floored,
            purged = outcome.ranges_purged,
            "purge complete"
        );
        Ok(outcome)
    }
}

/// Reject a purge whose boundaries cut through a granule. Granules
/// destroyed by an earlier force purge still count.
fn check_alignment(tr: &mut Transaction, absolute: &KeyRange, requested: &KeyRange) -> GranaryResult<()> {
    let granules = GRANULES.overlapping(tr, absolute, 0)?;
    if let Some((granule, _)) = granules.iter().find(|(g, _)| !absolute.contains_range(g)) {
        return Err(GranaryError::unsupported(format!(
            "purge range {} is not aligned to granule {}",
            requested, granule
        )));
    }
    Ok(())
}
