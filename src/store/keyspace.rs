//! Range-keyed record tables in the system keyspace.
//!
//! A [`RangeKeyspace`] stores one record per non-overlapping key range under
//! `prefix + range.begin`, with the range end carried in the value. Lookups
//! by overlap read the single record starting before the query plus every
//! record starting inside it.
//!
//! Conflicts stay local to the queried range: the record before the query
//! is depended on only when it reaches into the query, and every `put`
//! declares a write over the record's whole span, so a record inserted in
//! front of the query that reaches into it conflicts with the query's scan.

use super::transaction::Transaction;
use crate::core::error::{GranaryError, GranaryResult};
use crate::keys::system::system_key;
use crate::keys::{key_after, KeyRange};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

#[derive(Serialize, Deserialize)]
struct StoredRecord<T> {
    end: Vec<u8>,
    record: T,
}

/// Typed table of range-keyed records.
pub struct RangeKeyspace<T> {
    prefix: &'static [u8],
    _marker: PhantomData<fn() -> T>,
}

impl<T> RangeKeyspace<T>
where
    T: Serialize + DeserializeOwned,
{
    pub const fn new(prefix: &'static [u8]) -> Self {
        Self {
            prefix,
            _marker: PhantomData,
        }
    }

    fn key(&self, begin: &[u8]) -> Vec<u8> {
        system_key(self.prefix, begin)
    }

    fn decode(&self, key: &[u8], value: &[u8]) -> GranaryResult<(KeyRange, T)> {
        let stored: StoredRecord<T> = bincode::deserialize(value)?;
        let begin = key[self.prefix.len()..].to_vec();
        let range = KeyRange::new(begin, stored.end).map_err(|e| GranaryError::Codec {
            message: format!("corrupt range record: {}", e),
        })?;
        Ok((range, stored.record))
    }

    /// Record starting exactly at `begin`.
    pub fn get(&self, tr: &mut Transaction, begin: &[u8]) -> GranaryResult<Option<(KeyRange, T)>> {
        let key = self.key(begin);
        match tr.get(&key)? {
            Some(value) => self.decode(&key, &value).map(Some),
            None => Ok(None),
        }
    }

    /// Write (or overwrite) the record for `range`.
    pub fn put(&self, tr: &mut Transaction, range: &KeyRange, record: &T) -> GranaryResult<()> {
        let stored = StoredRecord {
            end: range.end().to_vec(),
            record,
        };
        let key = self.key(range.begin());
        tr.add_write_conflict_range(&key, &self.key(range.end()));
        tr.set(key, bincode::serialize(&stored)?);
        Ok(())
    }

    /// Delete the record starting at `begin`.
    pub fn remove(&self, tr: &mut Transaction, begin: &[u8]) {
        tr.clear(self.key(begin));
    }

    /// Records intersecting `query`, in key order, at most `limit` of them
    /// (`0` = unlimited).
    pub fn overlapping(
        &self,
        tr: &mut Transaction,
        query: &KeyRange,
        limit: usize,
    ) -> GranaryResult<Vec<(KeyRange, T)>> {
        let mut out = Vec::new();

        let before = tr.get_range_snapshot(self.prefix, &self.key(query.begin()), 1, true)?;
        if let Some((key, value)) = before.first() {
            let (range, record) = self.decode(key, value)?;
            if range.end() > query.begin() {
                tr.add_read_conflict_range(key, &key_after(key));
                out.push((range, record));
            }
        }

        let inside = tr.get_range(&self.key(query.begin()), &self.key(query.end()), limit, false)?;
        for (key, value) in &inside {
            out.push(self.decode(key, value)?);
        }

        if limit != 0 {
            out.truncate(limit);
        }
        Ok(out)
    }
}
