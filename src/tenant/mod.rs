//! Tenant scoping.
//!
//! - [`directory`] - Tenant name → prefix resolution
//! - [`scope`] - Range mapping between tenant and absolute keyspace

pub mod directory;
pub mod scope;

pub use directory::{resolve_scope, StoreTenantDirectory, TenantDirectory, TenantEntry};
pub use scope::TenantScope;
