//! Background purge execution.

use super::purge::PurgeCoordinator;
use crate::core::config::PurgeConfig;
use crate::core::error::GranaryResult;
use crate::store::Database;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Executes pending purge tasks.
///
/// The worker wakes on every commit and at least once per poll interval.
/// It stops when the database shuts down.
#[derive(Debug, Clone)]
pub struct PurgeWorker {
    db: Database,
    config: PurgeConfig,
    coordinator: PurgeCoordinator,
}

impl PurgeWorker {
    pub fn new(db: Database, config: PurgeConfig) -> Self {
        Self {
            db,
            config,
            coordinator: PurgeCoordinator::new(),
        }
    }

    /// Execute one batch of pending tasks in a single transaction. Returns
    /// how many tasks completed.
    pub async fn process_pending(&self) -> GranaryResult<usize> {
        let coordinator = self.coordinator;
        let batch_size = self.config.batch_size;
        self.db
            .run(|tr| {
                let tasks = coordinator.pending(tr, batch_size)?;
                for task in &tasks {
                    coordinator.execute(tr, task)?;
                }
                Ok(tasks.len())
            })
            .await
    }

    /// Drain every pending task.
    pub async fn drain(&self) -> GranaryResult<usize> {
        let mut total = 0;
        loop {
            let done = self.process_pending().await?;
            if done == 0 {
                return Ok(total);
            }
            total += done;
        }
    }

    /// Run until shutdown.
    pub async fn run(self) {
        let mut commits = self.db.subscribe_commits();
        let mut shutdown = self.db.subscribe_shutdown();
        let poll = Duration::from_millis(self.config.poll_interval_ms);

        tracing::info!(poll_interval_ms = self.config.poll_interval_ms, "purge worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.process_pending().await {
                Ok(0) => {}
                Ok(done) => tracing::debug!(done, "purge batch executed"),
                Err(e) if e.is_cancelled() => break,
                Err(e) => tracing::warn!(error = %e, "purge batch failed"),
            }

            tokio::select! {
                _ = shutdown.changed() => {}
                changed = commits.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(poll) => {}
            }
        }
        tracing::info!("purge worker stopped");
    }

    /// Spawn [`run`](Self::run) onto the current runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
