//! Range-scoped blob granule registry.
//!
//! - [`registry`] - Which key ranges are mirrored to the blob tier
//! - [`granules`] - Granule tiling of Active ranges
//! - [`purge`] - Durable history purge requests
//! - [`worker`] - Background purge execution
//! - [`client`] - Async, tenant-aware entry points

pub mod client;
pub mod granules;
pub mod purge;
pub mod registry;
pub mod worker;

pub use client::BlobClient;
pub use granules::{GranuleRecord, GranuleView, History};
pub use purge::{PurgeCoordinator, PurgeOutcome, PurgeStatus, PurgeTask, PurgeTaskId, PurgeVersion};
pub use registry::{RangeRecord, RangeRegistry, RangeState, RegistryEntry};
pub use worker::PurgeWorker;
