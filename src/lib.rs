//! Granary - range-scoped blob granule registry.
//!
//! Granary tracks which key ranges of a transactional key-value store are
//! mirrored into a secondary blob tier. Callers register ranges as Active,
//! check whether a range is fully served from the blob tier at a version,
//! inspect how Active ranges are tiled into granules, and request purges of
//! a range's history. Every operation runs inside a serializable
//! transaction of the host store, optionally scoped to a tenant's prefix.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   CLI  │  Workload driver                       │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 BlobClient (tenant resolution)                  │
//! │   Range Registry │ Granule View │ Purge Coordinator │ Worker    │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Host transactional store                     │
//! │     MVCC map │ Optimistic transactions │ Retry loop │ Snapshot  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::runtime`] - Component lifecycle
//! - [`core::error`] - Error types and failure kinds
//!
//! ## Keys and storage
//! - [`keys`] - Key ranges, interval maps, system keyspace layout
//! - [`store`] - In-process MVCC store and transactions
//! - [`tenant`] - Tenant directory and range scoping
//!
//! ## Registry
//! - [`blob::registry`] - Active/Inactive range records
//! - [`blob::granules`] - Granule tiling and splits
//! - [`blob::purge`] - Purge requests and execution
//! - [`blob::worker`] - Background purge worker
//! - [`blob::client`] - Async entry points
//!
//! ## Auxiliary
//! - [`bulkdump`] - Bulk dump job tracking
//! - [`workload`] - Randomized self-checking driver
//! - [`cli`] - Command-line interface
//!
//! # Key Invariants
//!
//! - Registered ranges never overlap, and their boundaries never change
//! - Every Active range is tiled by contiguous granules until force purged
//! - An activation or deactivation either applies fully or not at all
//! - A range is reported active only if every key in it is covered

// Core infrastructure
pub mod core;

// Keys and storage
pub mod keys;
pub mod store;
pub mod tenant;

// Registry
pub mod blob;

// Auxiliary subsystems
pub mod bulkdump;
pub mod workload;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{config, error, runtime};
pub use blob::{BlobClient, PurgeStatus, PurgeTaskId, PurgeVersion, PurgeWorker};
pub use error::{ErrorKind, GranaryError, GranaryResult};
pub use keys::KeyRange;
pub use store::{Database, Version};
