//! Bulk dump job tracking.
//!
//! - [`job`] - Mode flag, job submission, task bookkeeping
//! - [`scheduler`] - Task completion while the mode is enabled

pub mod job;
pub mod scheduler;

pub use job::{BulkDump, BulkDumpJob, BulkDumpJobs, BulkDumpTask, JobId, TaskState, Transport};
pub use scheduler::{BulkDumpScheduler, StepOutcome};
