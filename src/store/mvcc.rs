//! Multi-version ordered key-value map.
//!
//! Each key keeps a chain of `(version, value)` entries in ascending version
//! order; a `None` value is a tombstone. Reads at version `v` see the newest
//! entry at or below `v`. History below the compaction floor is discarded.

use super::version::Version;
use crate::core::error::{GranaryError, GranaryResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single buffered write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mutation {
    /// Set a key to a value.
    Set { key: Vec<u8>, value: Vec<u8> },
    /// Remove a key.
    Clear { key: Vec<u8> },
    /// Remove every key in `[begin, end)`.
    ClearRange { begin: Vec<u8>, end: Vec<u8> },
}

/// One entry of a key's version chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedValue {
    pub version: Version,
    pub value: Option<Vec<u8>>,
}

/// Multi-version store core.
#[derive(Debug, Clone, Default)]
pub struct MvccStore {
    /// Highest committed version.
    committed: Version,

    /// Oldest version still readable.
    oldest: Version,

    /// key → ascending version chain.
    index: BTreeMap<Vec<u8>, Vec<VersionedValue>>,

    /// Write-conflict ranges declared by commits, oldest first.
    declared: Vec<(Version, Vec<u8>, Vec<u8>)>,
}

impl MvccStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from its persisted parts.
    pub fn from_parts(
        committed: Version,
        oldest: Version,
        index: BTreeMap<Vec<u8>, Vec<VersionedValue>>,
    ) -> Self {
        Self {
            committed,
            oldest,
            index,
            declared: Vec::new(),
        }
    }

    /// Highest committed version.
    pub fn committed(&self) -> Version {
        self.committed
    }

    /// Oldest readable version (compaction floor).
    pub fn oldest_version(&self) -> Version {
        self.oldest
    }

    /// All version chains, for snapshotting.
    pub fn chains(&self) -> &BTreeMap<Vec<u8>, Vec<VersionedValue>> {
        &self.index
    }

    /// Check that `version` can be read.
    pub fn check_readable(&self, version: Version) -> GranaryResult<()> {
        if version < self.oldest {
            return Err(GranaryError::VersionTooOld {
                version: version.get(),
                oldest: self.oldest.get(),
            });
        }
        if version > self.committed {
            return Err(GranaryError::FutureVersion {
                version: version.get(),
                committed: self.committed.get(),
            });
        }
        Ok(())
    }

    /// Read a key at a version.
    pub fn get_at(&self, key: &[u8], version: Version) -> GranaryResult<Option<Vec<u8>>> {
        self.check_readable(version)?;
        Ok(self
            .index
            .get(key)
            .and_then(|chain| visible(chain, version))
            .map(<[u8]>::to_vec))
    }

    /// Read live pairs in `[begin, end)` at a version.
    ///
    /// `limit == 0` means unlimited. With `reverse`, pairs are returned from
    /// the end of the range backwards.
    pub fn range_at(
        &self,
        begin: &[u8],
        end: &[u8],
        version: Version,
        limit: usize,
        reverse: bool,
    ) -> GranaryResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.check_readable(version)?;
        if begin >= end {
            return Ok(Vec::new());
        }

        let iter = self.index.range(begin.to_vec()..end.to_vec());
        let live = |(k, chain): (&Vec<u8>, &Vec<VersionedValue>)| {
            visible(chain, version).map(|v| (k.clone(), v.to_vec()))
        };

        let mut result = Vec::new();
        if reverse {
            for pair in iter.rev().filter_map(live) {
                result.push(pair);
                if limit != 0 && result.len() >= limit {
                    break;
                }
            }
        } else {
            for pair in iter.filter_map(live) {
                result.push(pair);
                if limit != 0 && result.len() >= limit {
                    break;
                }
            }
        }
        Ok(result)
    }

    /// Check if any key in `[begin, end)` was written after `version`.
    ///
    /// Ranges declared through [`declare_writes`](Self::declare_writes)
    /// count as written even when no key inside them changed.
    pub fn modified_since(&self, begin: &[u8], end: &[u8], version: Version) -> bool {
        if begin >= end {
            return false;
        }
        let declared = self
            .declared
            .iter()
            .rev()
            .take_while(|(v, _, _)| *v > version)
            .any(|(_, b, e)| b.as_slice() < end && begin < e.as_slice());
        declared
            || self
                .index
                .range(begin.to_vec()..end.to_vec())
                .any(|(_, chain)| chain.last().is_some_and(|e| e.version > version))
    }

    /// Record write-conflict ranges for the commit at `version`.
    pub fn declare_writes(&mut self, version: Version, ranges: &[(Vec<u8>, Vec<u8>)]) {
        for (begin, end) in ranges {
            if begin < end {
                self.declared.push((version, begin.clone(), end.clone()));
            }
        }
    }

    /// Apply a batch of mutations atomically at the next version.
    ///
    /// Returns the new committed version.
    pub fn apply(&mut self, mutations: &[Mutation]) -> Version {
        let version = self.committed.next();
        for mutation in mutations {
            match mutation {
                Mutation::Set { key, value } => {
                    self.push(key.clone(), version, Some(value.clone()));
                }
                Mutation::Clear { key } => {
                    if self.is_live(key) {
                        self.push(key.clone(), version, None);
                    }
                }
                Mutation::ClearRange { begin, end } => {
                    if begin >= end {
                        continue;
                    }
                    let keys: Vec<Vec<u8>> = self
                        .index
                        .range(begin.clone()..end.clone())
                        .filter(|(_, chain)| chain.last().is_some_and(|e| e.value.is_some()))
                        .map(|(k, _)| k.clone())
                        .collect();
                    for key in keys {
                        self.push(key, version, None);
                    }
                }
            }
        }
        self.committed = version;
        version
    }

    /// Discard history below `floor`.
    ///
    /// Returns the number of chain entries removed.
    pub fn compact(&mut self, floor: Version) -> usize {
        let floor = std::cmp::min(floor, self.committed);
        if floor <= self.oldest {
            return 0;
        }

        let mut removed = 0;
        let mut empty = Vec::new();
        for (key, chain) in self.index.iter_mut() {
            // Keep the newest entry at or below the floor; it is still visible there.
            let keep_from = chain
                .iter()
                .rposition(|e| e.version <= floor)
                .unwrap_or(0);
            removed += keep_from;
            chain.drain(..keep_from);
            if chain.len() == 1 && chain[0].value.is_none() && chain[0].version <= floor {
                removed += 1;
                empty.push(key.clone());
            }
        }
        for key in empty {
            self.index.remove(&key);
        }

        self.declared.retain(|(v, _, _)| *v > floor);
        self.oldest = floor;
        removed
    }

    /// Get statistics about the store.
    pub fn stats(&self) -> MvccStats {
        MvccStats {
            committed: self.committed,
            oldest: self.oldest,
            live_keys: self.index.values().filter(|c| is_live_chain(c)).count(),
            index_size: self.index.len(),
            history_entries: self.index.values().map(Vec::len).sum(),
        }
    }

    fn is_live(&self, key: &[u8]) -> bool {
        self.index.get(key).is_some_and(|c| is_live_chain(c))
    }

    fn push(&mut self, key: Vec<u8>, version: Version, value: Option<Vec<u8>>) {
        let chain = self.index.entry(key).or_default();
        match chain.last_mut() {
            // Several mutations of one key in a single commit collapse.
            Some(last) if last.version == version => last.value = value,
            _ => chain.push(VersionedValue { version, value }),
        }
    }
}

fn visible(chain: &[VersionedValue], version: Version) -> Option<&[u8]> {
    chain
        .iter()
        .rev()
        .find(|e| e.version <= version)
        .and_then(|e| e.value.as_deref())
}

fn is_live_chain(chain: &[VersionedValue]) -> bool {
    chain.last().is_some_and(|e| e.value.is_some())
}

/// Statistics for an MVCC store.
#[derive(Debug, Clone, Serialize)]
pub struct MvccStats {
    /// Highest committed version.
    pub committed: Version,
    /// Oldest readable version.
    pub oldest: Version,
    /// Keys with a live value at the committed version.
    pub live_keys: usize,
    /// Keys with any retained history (including tombstones).
    pub index_size: usize,
    /// Total retained chain entries.
    pub history_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(k: &str, v: &str) -> Mutation {
        Mutation::Set {
            key: k.as_bytes().to_vec(),
            value: v.as_bytes().to_vec(),
        }
    }

    #[test]
    fn empty_store_starts_at_version_zero() {
        let store = MvccStore::default();
        assert_eq!(store.committed(), Version::ZERO);
        assert_eq!(store.oldest_version(), Version::default());
    }

    #[test]
    fn reads_see_versioned_history() {
        let mut store = MvccStore::new();
        let v1 = store.apply(&[set("a", "1")]);
        let v2 = store.apply(&[set("a", "2")]);
        let v3 = store.apply(&[Mutation::Clear { key: b"a".to_vec() }]);

        assert_eq!(store.get_at(b"a", v1).unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get_at(b"a", v2).unwrap(), Some(b"2".to_vec()));
        assert_eq!(store.get_at(b"a", v3).unwrap(), None);
        assert_eq!(store.get_at(b"a", Version::ZERO).unwrap(), None);
    }

    #[test]
    fn compaction_keeps_visible_entry() {
        let mut store = MvccStore::new();
        store.apply(&[set("a", "1")]);
        store.apply(&[set("a", "2")]);
        store.apply(&[set("b", "x")]);

        let removed = store.compact(Version::new(2));
        assert_eq!(removed, 1);
        assert_eq!(store.oldest_version(), Version::new(2));
        assert_eq!(
            store.get_at(b"a", Version::new(2)).unwrap(),
            Some(b"2".to_vec())
        );
        assert!(matches!(
            store.get_at(b"a", Version::new(1)),
            Err(GranaryError::VersionTooOld { .. })
        ));
    }

    #[test]
    fn clear_range_writes_tombstones() {
        let mut store = MvccStore::new();
        store.apply(&[set("a", "1"), set("b", "2"), set("c", "3")]);
        let before = store.committed();
        let after = store.apply(&[Mutation::ClearRange {
            begin: b"a".to_vec(),
            end: b"c".to_vec(),
        }]);

        let live = store.range_at(b"a", b"z", after, 0, false).unwrap();
        assert_eq!(live, vec![(b"c".to_vec(), b"3".to_vec())]);
        assert!(store.modified_since(b"a", b"b", before));
        assert!(!store.modified_since(b"c", b"d", before));
    }

    #[test]
    fn declared_ranges_conflict_without_key_changes() {
        let mut store = MvccStore::new();
        let before = store.committed();
        let v = store.apply(&[set("a", "1")]);
        store.declare_writes(v, &[(b"a".to_vec(), b"m".to_vec())]);

        assert!(store.modified_since(b"f", b"g", before));
        assert!(!store.modified_since(b"m", b"z", before));
        assert!(!store.modified_since(b"f", b"g", v));

        store.compact(v);
        assert!(!store.modified_since(b"f", b"g", v));
    }

    #[test]
    fn reverse_scan_with_limit() {
        let mut store = MvccStore::new();
        let v = store.apply(&[set("a", "1"), set("b", "2"), set("c", "3")]);
        let last = store.range_at(b"a", b"c", v, 1, true).unwrap();
        assert_eq!(last, vec![(b"b".to_vec(), b"2".to_vec())]);
    }
}
