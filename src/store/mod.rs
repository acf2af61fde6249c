//! In-process transactional key-value store.
//!
//! This is the host store the registry persists into:
//! - [`version`] - Commit versions
//! - [`mvcc`] - Multi-version ordered map
//! - [`transaction`] - Optimistic snapshot-isolated transactions
//! - [`database`] - Shared handle, retry loop, commit notifications
//! - [`keyspace`] - Range-keyed record tables
//! - [`snapshot`] - On-disk persistence

pub mod database;
pub mod keyspace;
pub mod mvcc;
pub mod snapshot;
pub mod transaction;
pub mod version;

pub use database::Database;
pub use keyspace::RangeKeyspace;
pub use mvcc::{Mutation, MvccStats, MvccStore};
pub use snapshot::{StoreSnapshot, SNAPSHOT_FILE_NAME};
pub use transaction::Transaction;
pub use version::Version;
