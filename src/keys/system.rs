//! Reserved system keyspace.
//!
//! Every prefix here sorts at or above `\xff`, so no user range (which must
//! end at or below `\xff`) and no tenant prefix can reach it.

/// Registry records, keyed by absolute range begin.
pub const BLOB_RANGE_PREFIX: &[u8] = b"\xff\x02/blobRange/";

/// Granule records, keyed by absolute granule begin.
pub const GRANULE_MAP_PREFIX: &[u8] = b"\xff\x02/bgMap/";

/// Purge task records, keyed by big-endian task id.
pub const PURGE_TASK_PREFIX: &[u8] = b"\xff\x02/bgPurge/task/";

/// Pending purge dedup index, keyed by request digest.
pub const PURGE_INTENT_PREFIX: &[u8] = b"\xff\x02/bgPurge/intent/";

/// Tenant records, keyed by tenant name.
pub const TENANT_MAP_PREFIX: &[u8] = b"\xff/tenant/map/";

/// Last allocated tenant id.
pub const TENANT_LAST_ID_KEY: &[u8] = b"\xff/tenant/lastId";

/// Bulk dump scheduler mode flag.
pub const BULK_DUMP_MODE_KEY: &[u8] = b"\xff/bulkDumpMode";

/// The currently submitted bulk dump job.
pub const BULK_DUMP_JOB_KEY: &[u8] = b"\xff/bulkDump/job";

/// Bulk dump task records, keyed by task range begin.
pub const BULK_DUMP_TASK_PREFIX: &[u8] = b"\xff/bulkDump/task/";

/// Concatenate a system prefix and a suffix.
pub fn system_key(prefix: &[u8], suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + suffix.len());
    key.extend_from_slice(prefix);
    key.extend_from_slice(suffix);
    key
}
