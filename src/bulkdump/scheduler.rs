//! Bulk dump task scheduling.

use super::job::{BulkDumpJobs, TaskState, TASKS};
use crate::core::error::GranaryResult;
use crate::keys::printable;
use crate::keys::system::BULK_DUMP_JOB_KEY;
use crate::store::Database;

/// Result of one scheduler step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Mode is off; nothing ran.
    Disabled,
    /// No job is submitted.
    Idle,
    /// A task completed and others remain.
    Progressed { manifest: String },
    /// The last task completed and the job was cleared.
    Finished { manifest: String },
}

/// Completes bulk dump tasks one at a time while the mode is enabled.
#[derive(Debug, Clone)]
pub struct BulkDumpScheduler {
    db: Database,
    jobs: BulkDumpJobs,
}

impl BulkDumpScheduler {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            jobs: BulkDumpJobs::new(),
        }
    }

    /// Complete the next pending task of the running job.
    pub async fn step(&self) -> GranaryResult<StepOutcome> {
        let jobs = self.jobs;
        self.db
            .run(|tr| {
                if !jobs.mode(tr)? {
                    return Ok(StepOutcome::Disabled);
                }
                let Some(job) = jobs.job(tr)? else {
                    return Ok(StepOutcome::Idle);
                };

                let mut pending = TASKS
                    .overlapping(tr, &job.range, 0)?
                    .into_iter()
                    .filter(|(_, task)| task.job == job.id && !task.is_complete());

                let Some((range, mut task)) = pending.next() else {
                    tr.clear(BULK_DUMP_JOB_KEY);
                    return Ok(StepOutcome::Idle);
                };
                let remaining = pending.count();

                let manifest = format!(
                    "{}/{}/{}/manifest",
                    job.root.trim_end_matches('/'),
                    job.id,
                    printable(range.begin())
                );
                task.state = TaskState::Complete {
                    manifest: manifest.clone(),
                };
                TASKS.put(tr, &range, &task)?;

                if remaining > 0 {
                    return Ok(StepOutcome::Progressed { manifest });
                }
                tr.clear(BULK_DUMP_JOB_KEY);
                Ok(StepOutcome::Finished { manifest })
            })
            .await
            .inspect(|outcome| match outcome {
                StepOutcome::Progressed { manifest } => {
                    tracing::debug!(manifest = %manifest, "bulk dump task complete")
                }
                StepOutcome::Finished { manifest } => {
                    tracing::info!(manifest = %manifest, "bulk dump job finished")
                }
                StepOutcome::Disabled | StepOutcome::Idle => {}
            })
    }

    /// Step until the running job finishes or no progress can be made.
    pub async fn run_to_completion(&self) -> GranaryResult<usize> {
        let mut completed = 0;
        loop {
            match self.step().await? {
                StepOutcome::Progressed { .. } => completed += 1,
                StepOutcome::Finished { .. } => return Ok(completed + 1),
                StepOutcome::Disabled | StepOutcome::Idle => return Ok(completed),
            }
        }
    }
}
