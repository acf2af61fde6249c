//! Range registry.
//!
//! The registry holds one record per registered key range under
//! `\xff\x02/blobRange/`. Registered ranges never overlap. A record's
//! boundaries are fixed for its lifetime: transitions only flip it between
//! Active and Inactive, or destroy it after a force purge.
//!
//! Overlap rule: activation and deactivation succeed on an exact match with
//! an existing record, or when no Active record overlaps at all. Any other
//! overlap with an Active record (superset, subset, or shifted interval)
//! returns `false` and changes nothing.

use super::granules;
use crate::core::error::GranaryResult;
use crate::keys::system::BLOB_RANGE_PREFIX;
use crate::keys::{KeyRange, RangeMap};
use crate::store::{RangeKeyspace, Transaction, Version};
use crate::tenant::TenantScope;
use serde::{Deserialize, Serialize};

/// Registry table.
pub(crate) const RANGES: RangeKeyspace<RangeRecord> = RangeKeyspace::new(BLOB_RANGE_PREFIX);

/// Whether a registered range is being mirrored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RangeState {
    Active,
    Inactive,
}

impl std::fmt::Display for RangeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
        }
    }
}

/// Stored registry record. The range itself is the record key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeRecord {
    pub state: RangeState,
    /// Tenant that registered the range, if any.
    pub tenant: Option<String>,
    /// All history was destroyed by a force purge.
    pub purged: bool,
}

impl RangeRecord {
    fn active(tenant: Option<&str>) -> Self {
        Self {
            state: RangeState::Active,
            tenant: tenant.map(str::to_string),
            purged: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == RangeState::Active
    }
}

/// A registry record as seen by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryEntry {
    /// Range in the caller's (tenant-relative) terms.
    pub range: KeyRange,
    pub tenant: Option<String>,
    pub state: RangeState,
    pub purged: bool,
}

/// Registry operations. All of them run inside the caller's transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeRegistry;

impl RangeRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Mark `range` Active.
    ///
    /// Returns `false` without changes when an Active record overlaps the
    /// range without matching it exactly. Inactive records overlapping it
    /// are pruned.
    pub fn activate(
        &self,
        tr: &mut Transaction,
        scope: &TenantScope,
        range: &KeyRange,
    ) -> GranaryResult<bool> {
        let absolute = scope.to_absolute(range)?;
        let existing = RANGES.overlapping(tr, &absolute, 0)?;

        let mut exact = None;
        let mut prune = Vec::new();
        for (registered, record) in existing {
            if registered == absolute {
                exact = Some(record);
            } else if record.is_active() {
                tracing::debug!(
                    range = %range,
                    existing = %registered,
                    scope = %scope,
                    "activation overlaps a registered range"
                );
                return Ok(false);
            } else {
                prune.push(registered);
            }
        }

        // Granule history restarts at this read version after a force purge.
        let floor = match &exact {
            Some(record) if record.is_active() && !record.purged => return Ok(true),
            Some(record) if record.purged => tr.read_version()?,
            _ => Version::ZERO,
        };

        for stale in &prune {
            RANGES.remove(tr, stale.begin());
        }
        RANGES.put(tr, &absolute, &RangeRecord::active(scope.name()))?;
        granules::seed(tr, &absolute, floor)?;

        tracing::info!(range = %range, scope = %scope, pruned = prune.len(), "activated range");
        Ok(true)
    }

    /// Mark `range` Inactive.
    ///
    /// Idempotent on an exact match in either state; a range with no Active
    /// overlap is a successful no-op. A force-purged record is destroyed
    /// instead of flipped.
    pub fn deactivate(
        &self,
        tr: &mut Transaction,
        scope: &TenantScope,
        range: &KeyRange,
    ) -> GranaryResult<bool> {
        let absolute = scope.to_absolute(range)?;
        let existing = RANGES.overlapping(tr, &absolute, 0)?;

        let mut exact = None;
        for (registered, record) in existing {
            if registered == absolute {
                exact = Some(record);
            } else if record.is_active() {
                tracing::debug!(
                    range = %range,
                    existing = %registered,
                    scope = %scope,
                    "deactivation overlaps a registered range"
                );
                return Ok(false);
            }
        }

        let Some(record) = exact else {
            return Ok(true);
        };
        if !record.is_active() {
            return Ok(true);
        }

        if record.purged {
            RANGES.remove(tr, absolute.begin());
        } else {
            let inactive = RangeRecord {
                state: RangeState::Inactive,
                ..record
            };
            RANGES.put(tr, &absolute, &inactive)?;
        }
        granules::retire(tr, &absolute)?;

        tracing::info!(range = %range, scope = %scope, destroyed = record.purged, "deactivated range");
        Ok(true)
    }

    /// Check that every key of `range` is served from the secondary tier at
    /// the transaction's read version.
    ///
    /// Returns the read version as witness, or `None` when any part of the
    /// range is not covered by Active, readable granules.
    pub fn is_active(
        &self,
        tr: &mut Transaction,
        scope: &TenantScope,
        range: &KeyRange,
    ) -> GranaryResult<Option<Version>> {
        let version = tr.read_version()?;
        let absolute = scope.to_absolute(range)?;

        let active: RangeMap<()> = RANGES
            .overlapping(tr, &absolute, 0)?
            .into_iter()
            .filter(|(_, record)| record.is_active() && !record.purged)
            .map(|(r, _)| (r, ()))
            .collect();
        if !active.covers(&absolute) {
            return Ok(None);
        }

        let readable = granules::readable_at(tr, &absolute, version)?;
        Ok(readable.covers(&absolute).then_some(version))
    }

    /// Active ranges intersecting `query`, unclipped, ordered by begin, at
    /// most `limit` of them (`0` = unlimited).
    pub fn list_active(
        &self,
        tr: &mut Transaction,
        scope: &TenantScope,
        query: &KeyRange,
        limit: usize,
    ) -> GranaryResult<Vec<KeyRange>> {
        let absolute = scope.to_absolute(query)?;
        let mut out = Vec::new();
        for (registered, record) in RANGES.overlapping(tr, &absolute, 0)? {
            if !record.is_active() {
                continue;
            }
            if let Some(relative) = scope.to_relative(&registered) {
                out.push(relative);
            }
            if limit != 0 && out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    /// Every record intersecting `query`, in any state.
    pub fn entries(
        &self,
        tr: &mut Transaction,
        scope: &TenantScope,
        query: &KeyRange,
    ) -> GranaryResult<Vec<RegistryEntry>> {
        let absolute = scope.to_absolute(query)?;
        Ok(RANGES
            .overlapping(tr, &absolute, 0)?
            .into_iter()
            .filter_map(|(registered, record)| {
                scope.to_relative(&registered).map(|range| RegistryEntry {
                    range,
                    tenant: record.tenant,
                    state: record.state,
                    purged: record.purged,
                })
            })
            .collect())
    }
}
