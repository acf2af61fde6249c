//! Tenant directory.
//!
//! Tenants are named key-space partitions. Each tenant gets a monotonically
//! allocated id whose 8-byte big-endian encoding is its key prefix. Records
//! live in the system keyspace so that resolution participates in the
//! caller's transaction.

use super::scope::TenantScope;
use crate::core::error::{GranaryError, GranaryResult};
use crate::keys::system::{
    system_key, BLOB_RANGE_PREFIX, TENANT_LAST_ID_KEY, TENANT_MAP_PREFIX,
};
use crate::keys::{strinc, KeyRange};
use crate::store::Transaction;
use serde::{Deserialize, Serialize};

/// Resolves tenant names to key-space prefixes.
pub trait TenantDirectory {
    /// Resolve `name`, failing with `TenantNotFound` if it does not exist.
    fn resolve(&self, tr: &mut Transaction, name: &str) -> GranaryResult<TenantScope>;
}

/// Resolve an optional tenant name; `None` is the global scope.
pub fn resolve_scope<D: TenantDirectory + ?Sized>(
    directory: &D,
    tr: &mut Transaction,
    tenant: Option<&str>,
) -> GranaryResult<TenantScope> {
    match tenant {
        Some(name) => directory.resolve(tr, name),
        None => Ok(TenantScope::global()),
    }
}

/// A stored tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantEntry {
    pub name: String,
    pub id: u64,
    pub prefix: Vec<u8>,
}

impl TenantEntry {
    pub fn scope(&self) -> TenantScope {
        TenantScope::tenant(self.name.clone(), self.prefix.clone())
    }
}

/// Tenant directory persisted in the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreTenantDirectory;

impl StoreTenantDirectory {
    pub fn new() -> Self {
        Self
    }

    fn key(name: &str) -> Vec<u8> {
        system_key(TENANT_MAP_PREFIX, name.as_bytes())
    }

    fn validate_name(name: &str) -> GranaryResult<()> {
        if name.is_empty() {
            return Err(GranaryError::invalid_request("tenant name must not be empty"));
        }
        if name.as_bytes().first() == Some(&0xff) {
            return Err(GranaryError::invalid_request(
                "tenant name must not start with \\xff",
            ));
        }
        Ok(())
    }

    /// Look up a tenant.
    pub fn get_tenant(&self, tr: &mut Transaction, name: &str) -> GranaryResult<Option<TenantEntry>> {
        match tr.get(&Self::key(name))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Create a tenant, or return the existing entry of that name.
    pub fn create_tenant(&self, tr: &mut Transaction, name: &str) -> GranaryResult<TenantEntry> {
        Self::validate_name(name)?;
        if let Some(existing) = self.get_tenant(tr, name)? {
            return Ok(existing);
        }

        let last_id = match tr.get(TENANT_LAST_ID_KEY)? {
            Some(bytes) => decode_id(&bytes)?,
            None => 0,
        };
        let id = last_id + 1;
        let entry = TenantEntry {
            name: name.to_string(),
            id,
            prefix: id.to_be_bytes().to_vec(),
        };
        tr.set(TENANT_LAST_ID_KEY, id.to_be_bytes().to_vec());
        tr.set(Self::key(name), bincode::serialize(&entry)?);
        tracing::info!(tenant = name, id, "created tenant");
        Ok(entry)
    }

    /// All tenants, ordered by name.
    pub fn list_tenants(&self, tr: &mut Transaction) -> GranaryResult<Vec<TenantEntry>> {
        let end = strinc(TENANT_MAP_PREFIX)
            .ok_or_else(|| GranaryError::internal("tenant prefix has no successor"))?;
        tr.get_range(TENANT_MAP_PREFIX, &end, 0, false)?
            .into_iter()
            .map(|(_, v)| bincode::deserialize(&v).map_err(GranaryError::from))
            .collect()
    }

    /// Delete a tenant that has no registered ranges left.
    pub fn delete_tenant(&self, tr: &mut Transaction, name: &str) -> GranaryResult<()> {
        let entry = self
            .get_tenant(tr, name)?
            .ok_or_else(|| GranaryError::tenant_not_found(name))?;

        let space = KeyRange::prefix_range(&entry.prefix)?;
        let begin = system_key(BLOB_RANGE_PREFIX, space.begin());
        let end = system_key(BLOB_RANGE_PREFIX, space.end());
        if !tr.get_range(&begin, &end, 1, false)?.is_empty() {
            return Err(GranaryError::invalid_request(format!(
                "tenant {} still has registered ranges",
                name
            )));
        }

        tr.clear(Self::key(name));
        tracing::info!(tenant = name, "deleted tenant");
        Ok(())
    }
}

impl TenantDirectory for StoreTenantDirectory {
    fn resolve(&self, tr: &mut Transaction, name: &str) -> GranaryResult<TenantScope> {
        self.get_tenant(tr, name)?
            .map(|entry| entry.scope())
            .ok_or_else(|| GranaryError::tenant_not_found(name))
    }
}

fn decode_id(bytes: &[u8]) -> GranaryResult<u64> {
    let array: [u8; 8] = bytes
        .try_into()
        .map_err(|_| GranaryError::Codec {
            message: format!("tenant id has {} bytes, expected 8", bytes.len()),
        })?;
    Ok(u64::from_be_bytes(array))
}
