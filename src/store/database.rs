//! Shared database handle and transaction runner.

use super::mvcc::{MvccStats, MvccStore, Mutation};
use super::snapshot::StoreSnapshot;
use super::transaction::Transaction;
use super::version::Version;
use crate::core::config::StoreConfig;
use crate::core::error::{GranaryError, GranaryResult};
use anyhow::Result;
use parking_lot::RwLock;
use rand::Rng;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

struct Shared {
    store: RwLock<MvccStore>,
    next_id: AtomicU64,
    cancelled: AtomicBool,
    commits: watch::Sender<Version>,
    shutdown: watch::Sender<bool>,
    config: StoreConfig,
}

/// Cloneable handle to an in-process transactional store.
#[derive(Clone)]
pub struct Database {
    shared: Arc<Shared>,
}

impl Database {
    /// Create an empty database.
    pub fn new(config: StoreConfig) -> Self {
        Self::from_store(MvccStore::new(), 1, config)
    }

    /// Create an empty database with default settings.
    pub fn in_memory() -> Self {
        Self::new(StoreConfig::default())
    }

    fn from_store(store: MvccStore, next_id: u64, config: StoreConfig) -> Self {
        let (commits, _) = watch::channel(store.committed());
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                store: RwLock::new(store),
                next_id: AtomicU64::new(next_id),
                cancelled: AtomicBool::new(false),
                commits,
                shutdown,
                config,
            }),
        }
    }

    /// Restore a database from a snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot, config: StoreConfig) -> Self {
        let next_id = snapshot.next_id;
        Self::from_store(snapshot.into_store(), next_id, config)
    }

    /// Capture the current state.
    pub fn snapshot(&self) -> StoreSnapshot {
        let store = self.shared.store.read();
        StoreSnapshot::from_store(&store, self.shared.next_id.load(Ordering::SeqCst))
    }

    /// Open a database persisted at `path`, or an empty one if the file does
    /// not exist yet.
    pub fn open(path: &Path, config: StoreConfig) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no snapshot found, starting empty");
            return Ok(Self::new(config));
        }
        let snapshot = StoreSnapshot::read_from_file(path)?;
        tracing::debug!(
            path = %path.display(),
            version = %snapshot.committed,
            "restored database snapshot"
        );
        Ok(Self::from_snapshot(snapshot, config))
    }

    /// Persist the current state to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.snapshot().write_to_file(path)
    }

    /// Begin a new transaction.
    pub fn create_transaction(&self) -> Transaction {
        Transaction::new(self.clone())
    }

    /// Highest committed version.
    pub fn committed_version(&self) -> Version {
        self.shared.store.read().committed()
    }

    /// Allocate a fresh opaque identifier.
    pub fn next_id(&self) -> u64 {
        self.shared.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Store-level settings.
    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    /// Receiver notified with the new version after every commit.
    pub fn subscribe_commits(&self) -> watch::Receiver<Version> {
        self.shared.commits.subscribe()
    }

    /// Receiver flipped to `true` on shutdown.
    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shared.shutdown.subscribe()
    }

    /// Abort all further work: new reads, commits, and waits fail with
    /// [`GranaryError::Cancelled`].
    pub fn shutdown(&self) {
        if !self.shared.cancelled.swap(true, Ordering::SeqCst) {
            tracing::info!("database shutdown requested");
            self.shared.shutdown.send_replace(true);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }

    /// Discard history below `floor`.
    pub fn compact(&self, floor: Version) -> usize {
        let removed = self.shared.store.write().compact(floor);
        tracing::debug!(floor = %floor, removed, "compacted history");
        removed
    }

    /// Store statistics.
    pub fn stats(&self) -> MvccStats {
        self.shared.store.read().stats()
    }

    pub(crate) fn with_store<T>(&self, f: impl FnOnce(&MvccStore) -> T) -> T {
        f(&self.shared.store.read())
    }

    pub(crate) fn commit(
        &self,
        read_version: Option<Version>,
        read_conflicts: &[(Vec<u8>, Vec<u8>)],
        writes: &[Mutation],
        write_conflicts: &[(Vec<u8>, Vec<u8>)],
    ) -> GranaryResult<Version> {
        let version = {
            let mut store = self.shared.store.write();
            if let Some(rv) = read_version {
                // History a conflict check would need may already be gone.
                if rv < store.oldest_version() {
                    return Err(GranaryError::Conflict {
                        read_version: rv.get(),
                    });
                }
                let conflicted = read_conflicts
                    .iter()
                    .any(|(begin, end)| store.modified_since(begin, end, rv));
                if conflicted {
                    return Err(GranaryError::Conflict {
                        read_version: rv.get(),
                    });
                }
            }
            let version = store.apply(writes);
            store.declare_writes(version, write_conflicts);
            version
        };
        self.shared.commits.send_replace(version);
        Ok(version)
    }

    /// Run `f` in a transaction and commit it, re-running the whole closure
    /// on conflict.
    ///
    /// The closure must be free of side effects outside the transaction,
    /// since it may execute several times.
    pub async fn run<T, F>(&self, mut f: F) -> GranaryResult<T>
    where
        F: FnMut(&mut Transaction) -> GranaryResult<T>,
    {
        let config = &self.shared.config;
        let mut attempt: u32 = 0;
        let mut backoff_ms = config.retry_backoff_ms;

        loop {
            let mut tr = self.create_transaction();
            let result = f(&mut tr).and_then(|value| tr.commit().map(|_| value));
            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retriable() => {
                    attempt += 1;
                    if config.max_retries.is_some_and(|max| attempt > max) {
                        tracing::warn!(attempt, error = %e, "transaction retry limit reached");
                        return Err(e);
                    }
                    tracing::debug!(attempt, error = %e, "retrying transaction");
                    let jitter = rand::rng().random_range(0..=backoff_ms);
                    tokio::time::sleep(Duration::from_millis(jitter)).await;
                    backoff_ms = std::cmp::min(backoff_ms.saturating_mul(2), config.max_retry_backoff_ms);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("committed", &self.committed_version())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
