//! Mapping between tenant-relative and absolute key ranges.

use crate::core::error::{GranaryError, GranaryResult};
use crate::keys::KeyRange;

/// The key-space a request is scoped to: either the whole user keyspace or
/// a single tenant's prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantScope {
    name: Option<String>,
    prefix: Vec<u8>,
}

impl TenantScope {
    /// Scope covering the whole user keyspace.
    pub fn global() -> Self {
        Self {
            name: None,
            prefix: Vec::new(),
        }
    }

    /// Scope for a resolved tenant.
    pub fn tenant(name: impl Into<String>, prefix: Vec<u8>) -> Self {
        Self {
            name: Some(name.into()),
            prefix,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Absolute keyspace owned by this scope.
    pub fn keyspace(&self) -> KeyRange {
        if self.prefix.is_empty() {
            KeyRange::normal_keys()
        } else {
            KeyRange::prefix_range(&self.prefix).unwrap_or_else(|_| KeyRange::normal_keys())
        }
    }

    /// Map a caller range into the absolute keyspace.
    ///
    /// Caller ranges must stay below the system keyspace.
    pub fn to_absolute(&self, range: &KeyRange) -> GranaryResult<KeyRange> {
        if !range.is_normal() {
            return Err(GranaryError::invalid_range(format!(
                "{} reaches into the system keyspace",
                range
            )));
        }
        Ok(range.with_prefix(&self.prefix))
    }

    /// Map an absolute range back into caller terms, clamped to this scope.
    pub fn to_relative(&self, range: &KeyRange) -> Option<KeyRange> {
        if self.prefix.is_empty() {
            return range.intersection(&KeyRange::normal_keys());
        }
        range.strip_prefix(&self.prefix)
    }
}

impl std::fmt::Display for TenantScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "tenant:{}", name),
            None => write!(f, "global"),
        }
    }
}
