//! Snapshot persistence.
//!
//! The whole store (version chains, compaction floor, id sequence) is
//! serialized with bincode into a single file under `paths.storage_dir`.

use super::mvcc::{MvccStore, VersionedValue};
use super::version::Version;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// File name of the database snapshot inside the storage directory.
pub const SNAPSHOT_FILE_NAME: &str = "granary.snap";

/// Serialized form of a database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Committed version at snapshot time.
    pub committed: Version,
    /// Oldest readable version at snapshot time.
    pub oldest: Version,
    /// Next opaque id to hand out.
    pub next_id: u64,
    /// Version chains by key.
    pub chains: Vec<(Vec<u8>, Vec<VersionedValue>)>,
}

impl StoreSnapshot {
    /// Capture a store.
    pub fn from_store(store: &MvccStore, next_id: u64) -> Self {
        Self {
            committed: store.committed(),
            oldest: store.oldest_version(),
            next_id,
            chains: store
                .chains()
                .iter()
                .map(|(k, chain)| (k.clone(), chain.clone()))
                .collect(),
        }
    }

    /// Rebuild the store.
    pub fn into_store(self) -> MvccStore {
        MvccStore::from_parts(self.committed, self.oldest, self.chains.into_iter().collect())
    }

    /// Serialize the snapshot to bytes.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).context("failed to serialize snapshot")
    }

    /// Deserialize a snapshot from bytes.
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).context("failed to deserialize snapshot")
    }

    /// Write the snapshot to a file, replacing it atomically.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("snap.tmp");
        {
            let file = std::fs::File::create(&tmp).context("failed to create snapshot file")?;
            let mut writer = BufWriter::new(file);
            let bytes = self.serialize()?;
            writer
                .write_all(&bytes)
                .context("failed to write snapshot")?;
            writer.flush().context("failed to flush snapshot")?;
        }
        std::fs::rename(&tmp, path).context("failed to install snapshot")?;
        Ok(())
    }

    /// Read a snapshot from a file.
    pub fn read_from_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).context("failed to open snapshot file")?;
        let mut reader = BufReader::new(file);
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .context("failed to read snapshot")?;
        Self::deserialize(&bytes)
    }
}
