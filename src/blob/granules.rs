//! Granule boundary view.
//!
//! Every Active registered range is tiled by granules stored under
//! `\xff\x02/bgMap/`. A fresh activation seeds one granule spanning the
//! whole range; splits refine the tiling. Each granule carries a purge
//! floor: history below it has been destroyed by a versioned purge.
//!
//! A force purge does not delete granules. It marks them destroyed, so the
//! tiling of a partly purged range stays intact and the destruction is
//! remembered after the range is deactivated. Destroyed granules are
//! hidden from the view and only disappear when a new activation covers
//! them.

use super::registry::RANGES;
use crate::core::error::{GranaryError, GranaryResult};
use crate::keys::system::GRANULE_MAP_PREFIX;
use crate::keys::{printable, KeyRange, RangeMap};
use crate::store::{RangeKeyspace, Transaction, Version};
use crate::tenant::TenantScope;
use serde::{Deserialize, Serialize};

/// Granule table.
pub(crate) const GRANULES: RangeKeyspace<GranuleRecord> = RangeKeyspace::new(GRANULE_MAP_PREFIX);

/// Stored granule record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GranuleRecord {
    /// Reads below this version are no longer served.
    pub purge_floor: Version,
    /// A force purge destroyed all history of this granule.
    pub destroyed: bool,
}

impl GranuleRecord {
    pub fn live(purge_floor: Version) -> Self {
        Self {
            purge_floor,
            destroyed: false,
        }
    }

    /// Tombstone left by a force purge executed at `at`.
    pub fn destroyed_at(at: Version) -> Self {
        Self {
            purge_floor: at.next(),
            destroyed: true,
        }
    }
}

/// How much of a range's history is still readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum History {
    /// Versions at or after `floor` are readable.
    Readable { floor: Version },
    /// A force purge destroyed part of the range.
    Destroyed,
}

/// Replace whatever granules exist in `range` with one spanning it.
///
/// Destroyed granules reaching outside `range` keep their outside parts.
/// The new granule's floor is raised past any destruction it covers.
pub(crate) fn seed(tr: &mut Transaction, range: &KeyRange, floor: Version) -> GranaryResult<()> {
    let mut floor = floor;
    for (granule, record) in GRANULES.overlapping(tr, range, 0)? {
        GRANULES.remove(tr, granule.begin());
        if !record.destroyed {
            continue;
        }
        floor = std::cmp::max(floor, record.purge_floor);
        if granule.begin() < range.begin() {
            let left = KeyRange::new(granule.begin(), range.begin())?;
            GRANULES.put(tr, &left, &record)?;
        }
        if granule.end() > range.end() {
            let right = KeyRange::new(range.end(), granule.end())?;
            GRANULES.put(tr, &right, &record)?;
        }
    }
    GRANULES.put(tr, range, &GranuleRecord::live(floor))
}

/// Remove the live granules overlapping `range`. Destroyed ones stay behind
/// as a record of the purge.
pub(crate) fn retire(tr: &mut Transaction, range: &KeyRange) -> GranaryResult<usize> {
    let mut removed = 0;
    for (granule, record) in GRANULES.overlapping(tr, range, 0)? {
        if !record.destroyed {
            GRANULES.remove(tr, granule.begin());
            removed += 1;
        }
    }
    Ok(removed)
}

/// Granules overlapping `range` that are readable at `version`.
pub(crate) fn readable_at(
    tr: &mut Transaction,
    range: &KeyRange,
    version: Version,
) -> GranaryResult<RangeMap<GranuleRecord>> {
    Ok(GRANULES
        .overlapping(tr, range, 0)?
        .into_iter()
        .filter(|(_, record)| !record.destroyed && record.purge_floor <= version)
        .collect())
}

/// Current history state of an absolute range, read at the transaction's
/// version. Used to reject reads of old versions purged since.
pub(crate) fn history(tr: &mut Transaction, range: &KeyRange) -> GranaryResult<History> {
    let destroyed = RANGES
        .overlapping(tr, range, 0)?
        .into_iter()
        .any(|(_, record)| record.is_active() && record.purged);
    if destroyed {
        return Ok(History::Destroyed);
    }

    let granules = GRANULES.overlapping(tr, range, 0)?;
    if granules.iter().any(|(_, record)| record.destroyed) {
        return Ok(History::Destroyed);
    }
    let floor = granules
        .into_iter()
        .map(|(_, record)| record.purge_floor)
        .max()
        .unwrap_or(Version::ZERO);
    Ok(History::Readable { floor })
}

/// Granule view operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct GranuleView;

impl GranuleView {
    pub fn new() -> Self {
        Self
    }

    /// Granules intersecting `query`, ordered by begin, at most `limit` of
    /// them (`0` = unlimited).
    ///
    /// The result is the tiling of every Active range touching the query,
    /// minus granules destroyed by a force purge. A broken tiling is
    /// reported as an internal error rather than returned.
    pub fn granule_ranges(
        &self,
        tr: &mut Transaction,
        scope: &TenantScope,
        query: &KeyRange,
        limit: usize,
    ) -> GranaryResult<Vec<KeyRange>> {
        let absolute = scope.to_absolute(query)?;
        let granules = GRANULES.overlapping(tr, &absolute, 0)?;
        let records = RANGES.overlapping(tr, &absolute, 0)?;

        for (registered, record) in &records {
            if !record.is_active() || record.purged {
                continue;
            }
            let Some(span) = registered.intersection(&absolute) else {
                continue;
            };
            verify_tiling(&span, registered, &granules)?;
        }

        let mut out = Vec::new();
        for (granule, record) in &granules {
            if record.destroyed {
                continue;
            }
            let owned = records
                .iter()
                .any(|(registered, record)| record.is_active() && registered.contains_range(granule));
            if !owned {
                return Err(GranaryError::internal(format!(
                    "granule {} lies outside every active range",
                    granule
                )));
            }
            if let Some(relative) = scope.to_relative(granule) {
                out.push(relative);
            }
            if limit != 0 && out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    /// Split `granule` at `split_keys`.
    ///
    /// Returns `false` when `granule` is not an existing live granule. Split
    /// keys must be strictly increasing and strictly inside the granule. The
    /// pieces inherit the granule's purge floor.
    pub fn split_granule(
        &self,
        tr: &mut Transaction,
        scope: &TenantScope,
        granule: &KeyRange,
        split_keys: &[Vec<u8>],
    ) -> GranaryResult<bool> {
        let absolute = scope.to_absolute(granule)?;
        let record = match GRANULES.get(tr, absolute.begin())? {
            Some((existing, record)) if existing == absolute && !record.destroyed => record,
            _ => return Ok(false),
        };

        let mut bounds = Vec::with_capacity(split_keys.len() + 2);
        bounds.push(granule.begin().to_vec());
        for key in split_keys {
            let previous = bounds.last().map(Vec::as_slice).unwrap_or_default();
            if key.as_slice() <= previous || key.as_slice() >= granule.end() {
                return Err(GranaryError::invalid_request(format!(
                    "split key {} must be strictly increasing and inside {}",
                    printable(key),
                    granule
                )));
            }
            bounds.push(key.clone());
        }
        bounds.push(granule.end().to_vec());

        GRANULES.remove(tr, absolute.begin());
        for pair in bounds.windows(2) {
            let piece = scope.to_absolute(&KeyRange::new(pair[0].clone(), pair[1].clone())?)?;
            GRANULES.put(tr, &piece, &record)?;
        }

        tracing::info!(
            granule = %granule,
            scope = %scope,
            pieces = bounds.len() - 1,
            "split granule"
        );
        Ok(true)
    }
}

/// Check that `granules` tile `span`, the part of `registered` being read,
/// without gaps.
fn verify_tiling(
    span: &KeyRange,
    registered: &KeyRange,
    granules: &[(KeyRange, GranuleRecord)],
) -> GranaryResult<()> {
    let mut cursor = span.begin();
    for (granule, _) in granules.iter().filter(|(g, _)| g.intersects(span)) {
        if !registered.contains_range(granule) {
            return Err(GranaryError::internal(format!(
                "granule {} straddles the boundary of {}",
                granule, registered
            )));
        }
        if granule.begin() > cursor {
            break;
        }
        cursor = granule.end();
    }
    if cursor < span.end() {
        return Err(GranaryError::internal(format!(
            "granules of {} leave a gap at {}",
            registered,
            printable(cursor)
        )));
    }
    Ok(())
}
