//! Optimistic snapshot-isolated transactions.
//!
//! A transaction reads at a single snapshot version, buffers its writes, and
//! records the key ranges it read. At commit, any write to a read range
//! after the snapshot version fails the commit with a conflict; the caller
//! (usually [`Database::run`](super::Database::run)) re-runs it from scratch.

use super::database::Database;
use super::mvcc::Mutation;
use super::version::Version;
use crate::core::error::{GranaryError, GranaryResult};
use crate::keys::key_after;
use std::collections::BTreeMap;

/// A key/value pair, or the bounds of a conflict range.
type KeyPair = (Vec<u8>, Vec<u8>);

/// A read-write transaction against a [`Database`].
pub struct Transaction {
    db: Database,
    read_version: Option<Version>,
    writes: Vec<Mutation>,
    read_conflicts: Vec<(Vec<u8>, Vec<u8>)>,
    write_conflicts: Vec<(Vec<u8>, Vec<u8>)>,
}

impl Transaction {
    pub(crate) fn new(db: Database) -> Self {
        Self {
            db,
            read_version: None,
            writes: Vec::new(),
            read_conflicts: Vec::new(),
            write_conflicts: Vec::new(),
        }
    }

    /// Database this transaction runs against.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Snapshot version of this transaction, acquiring the latest committed
    /// version on first use.
    pub fn read_version(&mut self) -> GranaryResult<Version> {
        if self.db.is_cancelled() {
            return Err(GranaryError::Cancelled);
        }
        match self.read_version {
            Some(v) => Ok(v),
            None => {
                let v = self.db.committed_version();
                self.read_version = Some(v);
                Ok(v)
            }
        }
    }

    /// Pin the snapshot version before the first read.
    pub fn set_read_version(&mut self, version: Version) {
        self.read_version = Some(version);
    }

    /// Read a single key.
    pub fn get(&mut self, key: &[u8]) -> GranaryResult<Option<Vec<u8>>> {
        let version = self.read_version()?;
        self.read_conflicts.push((key.to_vec(), key_after(key)));

        let mut value = self.db.with_store(|s| s.get_at(key, version))?;
        for write in &self.writes {
            match write {
                Mutation::Set { key: k, value: v } if k.as_slice() == key => {
                    value = Some(v.clone())
                }
                Mutation::Clear { key: k } if k.as_slice() == key => value = None,
                Mutation::ClearRange { begin, end }
                    if key >= begin.as_slice() && key < end.as_slice() =>
                {
                    value = None
                }
                _ => {}
            }
        }
        Ok(value)
    }

    /// Read live pairs in `[begin, end)`, including this transaction's own
    /// writes.
    ///
    /// `limit == 0` means unlimited. When the limit truncates the scan, only
    /// the part of the range actually returned is recorded for conflicts.
    pub fn get_range(
        &mut self,
        begin: &[u8],
        end: &[u8],
        limit: usize,
        reverse: bool,
    ) -> GranaryResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let (result, conflict) = self.scan(begin, end, limit, reverse)?;
        if let Some(conflict) = conflict {
            self.read_conflicts.push(conflict);
        }
        Ok(result)
    }

    /// Like [`get_range`](Self::get_range), but records no read conflict.
    /// The caller declares whatever dependency it actually relies on.
    pub fn get_range_snapshot(
        &mut self,
        begin: &[u8],
        end: &[u8],
        limit: usize,
        reverse: bool,
    ) -> GranaryResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.scan(begin, end, limit, reverse).map(|(result, _)| result)
    }

    fn scan(
        &mut self,
        begin: &[u8],
        end: &[u8],
        limit: usize,
        reverse: bool,
    ) -> GranaryResult<(Vec<KeyPair>, Option<KeyPair>)> {
        let version = self.read_version()?;
        if begin >= end {
            return Ok((Vec::new(), None));
        }

        let snapshot = self
            .db
            .with_store(|s| s.range_at(begin, end, version, 0, false))?;
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = snapshot.into_iter().collect();
        for write in &self.writes {
            match write {
                Mutation::Set { key, value }
                    if key.as_slice() >= begin && key.as_slice() < end =>
                {
                    merged.insert(key.clone(), value.clone());
                }
                Mutation::Clear { key } => {
                    merged.remove(key);
                }
                Mutation::ClearRange { begin: b, end: e } => {
                    merged.retain(|k, _| k < b || k >= e);
                }
                _ => {}
            }
        }

        let total = merged.len();
        let result: Vec<(Vec<u8>, Vec<u8>)> = if reverse {
            merged.into_iter().rev().take(effective(limit)).collect()
        } else {
            merged.into_iter().take(effective(limit)).collect()
        };

        let truncated = limit != 0 && total > limit;
        let conflict = match (truncated, reverse, result.last()) {
            (true, false, Some((last, _))) => (begin.to_vec(), key_after(last)),
            (true, true, Some((last, _))) => (last.clone(), end.to_vec()),
            _ => (begin.to_vec(), end.to_vec()),
        };
        Ok((result, Some(conflict)))
    }

    /// Set a key to a value.
    pub fn set(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.writes.push(Mutation::Set {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Remove a key.
    pub fn clear(&mut self, key: impl Into<Vec<u8>>) {
        self.writes.push(Mutation::Clear { key: key.into() });
    }

    /// Remove every key in `[begin, end)`.
    pub fn clear_range(&mut self, begin: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) {
        self.writes.push(Mutation::ClearRange {
            begin: begin.into(),
            end: end.into(),
        });
    }

    /// Declare a read dependency without reading.
    pub fn add_read_conflict_range(&mut self, begin: &[u8], end: &[u8]) {
        self.read_conflicts.push((begin.to_vec(), end.to_vec()));
    }

    /// Declare that this transaction logically writes `[begin, end)`.
    ///
    /// Concurrent transactions that read any key of the range conflict with
    /// this one even if no key inside it is set.
    pub fn add_write_conflict_range(&mut self, begin: &[u8], end: &[u8]) {
        self.write_conflicts.push((begin.to_vec(), end.to_vec()));
    }

    /// Commit buffered writes.
    ///
    /// Read-only transactions commit trivially at their read version.
    pub fn commit(self) -> GranaryResult<Version> {
        if self.db.is_cancelled() {
            return Err(GranaryError::Cancelled);
        }
        if self.writes.is_empty() {
            return Ok(self
                .read_version
                .unwrap_or_else(|| self.db.committed_version()));
        }
        let Transaction {
            db,
            read_version,
            writes,
            read_conflicts,
            write_conflicts,
        } = self;
        db.commit(read_version, &read_conflicts, &writes, &write_conflicts)
    }
}

fn effective(limit: usize) -> usize {
    if limit == 0 {
        usize::MAX
    } else {
        limit
    }
}
