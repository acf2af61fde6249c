//! Bulk dump jobs and their tasks.
//!
//! One job may be submitted at a time. Submission splits the job range into
//! tasks at granule boundaries (a range with no granules becomes a single
//! task). Tasks outlive their job so completed ranges stay queryable.

use crate::blob::granules::GRANULES;
use crate::core::error::{GranaryError, GranaryResult};
use crate::keys::system::{BULK_DUMP_JOB_KEY, BULK_DUMP_MODE_KEY, BULK_DUMP_TASK_PREFIX};
use crate::keys::KeyRange;
use crate::store::{Database, RangeKeyspace, Transaction, Version};
use serde::{Deserialize, Serialize};

/// Task table.
pub(crate) const TASKS: RangeKeyspace<BulkDumpTask> = RangeKeyspace::new(BULK_DUMP_TASK_PREFIX);

/// Bulk dump job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job-{:016x}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = GranaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix("job-").unwrap_or(s);
        u64::from_str_radix(hex, 16)
            .map(Self)
            .map_err(|_| GranaryError::invalid_request(format!("invalid job id: {}", s)))
    }
}

/// Where dumped files go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transport {
    /// A local directory.
    Local,
    /// A blob store URL.
    BlobStore,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::BlobStore => write!(f, "blobstore"),
        }
    }
}

/// A submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkDumpJob {
    pub id: JobId,
    pub range: KeyRange,
    pub root: String,
    pub transport: Transport,
    pub submitted_at: Version,
}

/// Task state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    Complete { manifest: String },
}

/// One slice of a job's range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkDumpTask {
    pub job: JobId,
    pub state: TaskState,
}

impl BulkDumpTask {
    pub fn is_complete(&self) -> bool {
        matches!(self.state, TaskState::Complete { .. })
    }
}

/// Transaction-level job operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkDumpJobs;

impl BulkDumpJobs {
    pub fn new() -> Self {
        Self
    }

    /// Whether the scheduler may run tasks.
    pub fn mode(&self, tr: &mut Transaction) -> GranaryResult<bool> {
        Ok(tr
            .get(BULK_DUMP_MODE_KEY)?
            .is_some_and(|value| value.first() == Some(&1)))
    }

    /// Enable or disable the scheduler, returning the previous mode.
    pub fn set_mode(&self, tr: &mut Transaction, enabled: bool) -> GranaryResult<bool> {
        let old = self.mode(tr)?;
        tr.set(BULK_DUMP_MODE_KEY, vec![u8::from(enabled)]);
        Ok(old)
    }

    /// The currently submitted job, if any.
    pub fn job(&self, tr: &mut Transaction) -> GranaryResult<Option<BulkDumpJob>> {
        match tr.get(BULK_DUMP_JOB_KEY)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Submit a job dumping `range` under `root`.
    pub fn submit(
        &self,
        tr: &mut Transaction,
        range: &KeyRange,
        root: &str,
        transport: Transport,
    ) -> GranaryResult<JobId> {
        if !range.is_normal() {
            return Err(GranaryError::invalid_range(format!(
                "bulk dump range {} reaches into the system keyspace",
                range
            )));
        }
        if root.is_empty() {
            return Err(GranaryError::invalid_request("bulk dump root must not be empty"));
        }
        if let Some(running) = self.job(tr)? {
            return Err(GranaryError::invalid_request(format!(
                "bulk dump job {} is already running",
                running.id
            )));
        }

        let job = BulkDumpJob {
            id: JobId(tr.database().next_id()),
            range: range.clone(),
            root: root.to_string(),
            transport,
            submitted_at: tr.read_version()?,
        };

        for (stale, _) in TASKS.overlapping(tr, range, 0)? {
            TASKS.remove(tr, stale.begin());
        }
        let slices = task_slices(tr, range)?;
        for slice in &slices {
            TASKS.put(
                tr,
                slice,
                &BulkDumpTask {
                    job: job.id,
                    state: TaskState::Pending,
                },
            )?;
        }
        tr.set(BULK_DUMP_JOB_KEY, bincode::serialize(&job)?);

        tracing::info!(
            job = %job.id,
            range = %range,
            transport = %transport,
            tasks = slices.len(),
            "submitted bulk dump job"
        );
        Ok(job.id)
    }

    /// Cancel the running job. Its pending tasks are dropped; completed
    /// ones are kept.
    pub fn cancel(&self, tr: &mut Transaction, id: JobId) -> GranaryResult<()> {
        let job = match self.job(tr)? {
            Some(job) if job.id == id => job,
            _ => return Err(GranaryError::not_found(format!("bulk dump job {}", id))),
        };
        for (range, task) in TASKS.overlapping(tr, &job.range, 0)? {
            if task.job == id && !task.is_complete() {
                TASKS.remove(tr, range.begin());
            }
        }
        tr.clear(BULK_DUMP_JOB_KEY);
        tracing::info!(job = %id, "cancelled bulk dump job");
        Ok(())
    }

    /// Number of completed tasks intersecting `range`.
    pub fn completed_task_count(&self, tr: &mut Transaction, range: &KeyRange) -> GranaryResult<usize> {
        Ok(TASKS
            .overlapping(tr, range, 0)?
            .iter()
            .filter(|(_, task)| task.is_complete())
            .count())
    }

    /// Tasks intersecting `range`.
    pub fn tasks(&self, tr: &mut Transaction, range: &KeyRange) -> GranaryResult<Vec<(KeyRange, BulkDumpTask)>> {
        TASKS.overlapping(tr, range, 0)
    }
}

/// Split `range` at the granule boundaries inside it.
fn task_slices(tr: &mut Transaction, range: &KeyRange) -> GranaryResult<Vec<KeyRange>> {
    let mut cuts: Vec<Vec<u8>> = Vec::new();
    for (granule, _) in GRANULES.overlapping(tr, range, 0)? {
        for bound in [granule.begin(), granule.end()] {
            if bound > range.begin() && bound < range.end() {
                cuts.push(bound.to_vec());
            }
        }
    }
    cuts.sort();
    cuts.dedup();

    let mut slices = Vec::with_capacity(cuts.len() + 1);
    let mut begin = range.begin().to_vec();
    for cut in cuts {
        slices.push(KeyRange::new(std::mem::replace(&mut begin, cut.clone()), cut)?);
    }
    slices.push(KeyRange::new(begin, range.end().to_vec())?);
    Ok(slices)
}

/// Async handle over [`BulkDumpJobs`].
#[derive(Debug, Clone)]
pub struct BulkDump {
    db: Database,
    jobs: BulkDumpJobs,
}

impl BulkDump {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            jobs: BulkDumpJobs::new(),
        }
    }

    pub async fn mode(&self) -> GranaryResult<bool> {
        self.db.run(|tr| self.jobs.mode(tr)).await
    }

    pub async fn set_mode(&self, enabled: bool) -> GranaryResult<bool> {
        let old = self.db.run(|tr| self.jobs.set_mode(tr, enabled)).await?;
        tracing::info!(old, new = enabled, "set bulk dump mode");
        Ok(old)
    }

    pub async fn submit_job(&self, range: &KeyRange, root: &str, transport: Transport) -> GranaryResult<JobId> {
        self.db.run(|tr| self.jobs.submit(tr, range, root, transport)).await
    }

    pub async fn cancel_job(&self, id: JobId) -> GranaryResult<()> {
        self.db.run(|tr| self.jobs.cancel(tr, id)).await
    }

    pub async fn job_status(&self) -> GranaryResult<Option<BulkDumpJob>> {
        self.db.run(|tr| self.jobs.job(tr)).await
    }

    pub async fn completed_task_count(&self, range: &KeyRange) -> GranaryResult<usize> {
        self.db.run(|tr| self.jobs.completed_task_count(tr, range)).await
    }

    pub async fn tasks(&self, range: &KeyRange) -> GranaryResult<Vec<(KeyRange, BulkDumpTask)>> {
        self.db.run(|tr| self.jobs.tasks(tr, range)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_parses_with_or_without_prefix() {
        let id = JobId(255);
        assert_eq!(id.to_string(), "job-00000000000000ff");
        assert_eq!(id.to_string().parse::<JobId>().unwrap(), id);
        assert_eq!("ff".parse::<JobId>().unwrap(), id);
    }
}
