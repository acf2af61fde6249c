//! Ordered map of non-overlapping key ranges.

use super::range::{key_after, KeyRange};
use std::collections::BTreeMap;

/// Error returned when an insert would overlap an existing interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlapError {
    /// The existing interval that blocked the insert.
    pub existing: KeyRange,
}

/// Ordered map from non-overlapping [`KeyRange`]s to values.
///
/// Intervals are indexed by their begin key, so every lookup is a
/// `BTreeMap` range scan.
#[derive(Debug, Clone)]
pub struct RangeMap<V> {
    entries: BTreeMap<Vec<u8>, (KeyRange, V)>,
}

impl<V> RangeMap<V> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert an interval that must not overlap any existing one.
    pub fn insert(&mut self, range: KeyRange, value: V) -> Result<(), OverlapError> {
        if let Some((existing, _)) = self.overlapping(&range).next() {
            return Err(OverlapError {
                existing: existing.clone(),
            });
        }
        self.entries.insert(range.begin().to_vec(), (range, value));
        Ok(())
    }

    /// Value stored for exactly this interval.
    pub fn get_exact(&self, range: &KeyRange) -> Option<&V> {
        self.entries
            .get(range.begin())
            .filter(|(stored, _)| stored == range)
            .map(|(_, v)| v)
    }

    /// Remove exactly this interval.
    pub fn remove(&mut self, range: &KeyRange) -> Option<V> {
        match self.entries.get(range.begin()) {
            Some((stored, _)) if stored == range => {
                self.entries.remove(range.begin()).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    /// Intervals intersecting `query`, in key order.
    pub fn overlapping<'a>(
        &'a self,
        query: &KeyRange,
    ) -> impl Iterator<Item = (&'a KeyRange, &'a V)> + 'a {
        // The interval starting at or before query.begin may still reach into it.
        let first = self
            .entries
            .range(..=query.begin().to_vec())
            .next_back()
            .filter(|(_, (range, _))| range.end() > query.begin())
            .map(|(_, (range, v))| (range, v));
        let rest = self
            .entries
            .range(key_after(query.begin())..query.end().to_vec())
            .map(|(_, (range, v))| (range, v));
        first.into_iter().chain(rest)
    }

    /// Check that `query` is covered by intervals without gaps.
    pub fn covers(&self, query: &KeyRange) -> bool {
        let mut cursor = query.begin().to_vec();
        for (range, _) in self.overlapping(query) {
            if range.begin() > cursor.as_slice() {
                return false;
            }
            if range.end() >= query.end() {
                return true;
            }
            cursor = range.end().to_vec();
        }
        false
    }

    /// All intervals in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&KeyRange, &V)> {
        self.entries.values().map(|(range, v)| (range, v))
    }
}

impl<V> Default for RangeMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> FromIterator<(KeyRange, V)> for RangeMap<V> {
    /// Build from intervals assumed non-overlapping; later duplicates of the
    /// same begin key replace earlier ones.
    fn from_iter<I: IntoIterator<Item = (KeyRange, V)>>(iter: I) -> Self {
        let mut entries = BTreeMap::new();
        for (range, value) in iter {
            entries.insert(range.begin().to_vec(), (range, value));
        }
        Self { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(b: &str, e: &str) -> KeyRange {
        KeyRange::new(b.as_bytes().to_vec(), e.as_bytes().to_vec()).unwrap()
    }

    #[test]
    fn insert_rejects_overlap() {
        let mut map = RangeMap::new();
        map.insert(r("b", "d"), 1).unwrap();
        assert!(map.insert(r("a", "c"), 2).is_err());
        assert!(map.insert(r("c", "e"), 2).is_err());
        assert!(map.insert(r("a", "z"), 2).is_err());
        map.insert(r("d", "e"), 3).unwrap();
        map.insert(r("a", "b"), 4).unwrap();
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn overlapping_includes_interval_starting_before_query() {
        let map: RangeMap<u32> = [(r("a", "m"), 1), (r("m", "t"), 2), (r("x", "z"), 3)]
            .into_iter()
            .collect();
        let hits: Vec<_> = map
            .overlapping(&r("c", "n"))
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        assert_eq!(hits, vec![(r("a", "m"), 1), (r("m", "t"), 2)]);

        let none: Vec<_> = map.overlapping(&r("t", "x")).collect();
        assert!(none.is_empty());
    }

    #[test]
    fn covers_detects_gaps() {
        let map: RangeMap<()> = [(r("a", "c"), ()), (r("c", "f"), ()), (r("g", "k"), ())]
            .into_iter()
            .collect();
        assert!(map.covers(&r("a", "f")));
        assert!(map.covers(&r("b", "d")));
        assert!(!map.covers(&r("a", "h")));
        assert!(!map.covers(&r("0", "b")));
    }

    #[test]
    fn exact_lookup_and_remove() {
        let mut map = RangeMap::new();
        map.insert(r("a", "c"), "x").unwrap();
        assert_eq!(map.get_exact(&r("a", "c")), Some(&"x"));
        assert_eq!(map.get_exact(&r("a", "b")), None);
        assert_eq!(map.remove(&r("a", "b")), None);
        assert_eq!(map.remove(&r("a", "c")), Some("x"));
        assert!(map.is_empty());
    }
}
