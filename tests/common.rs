//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

#![allow(dead_code)]

use granary::blob::{BlobClient, PurgeWorker};
use granary::core::config::{Config, PurgeConfig, StoreConfig};
use granary::keys::{strinc, KeyRange};
use granary::store::Database;
use granary::tenant::StoreTenantDirectory;
use std::io::Write;
use tempfile::NamedTempFile;
use tokio::task::JoinHandle;

/// Purge settings that keep tests fast.
pub fn fast_purge_config() -> PurgeConfig {
    PurgeConfig {
        poll_interval_ms: 5,
        batch_size: 8,
    }
}

/// Store settings with short backoff.
pub fn fast_store_config() -> StoreConfig {
    StoreConfig {
        max_retries: Some(100),
        retry_backoff_ms: 1,
        max_retry_backoff_ms: 5,
    }
}

/// A fresh in-memory database with a client over it.
pub fn client() -> BlobClient {
    BlobClient::new(Database::new(fast_store_config()), fast_purge_config())
}

/// A client plus a running purge worker.
pub fn client_with_worker() -> (BlobClient, JoinHandle<()>) {
    let client = client();
    let worker = PurgeWorker::new(client.database().clone(), fast_purge_config()).spawn();
    (client, worker)
}

/// Build a range from string bounds.
pub fn range(begin: &str, end: &str) -> KeyRange {
    KeyRange::new(begin.as_bytes(), end.as_bytes()).expect("valid range")
}

/// Range of every key starting with `prefix`.
pub fn prefix(prefix: &str) -> KeyRange {
    let end = strinc(prefix.as_bytes()).expect("prefix has a successor");
    KeyRange::new(prefix.as_bytes(), end).expect("valid range")
}

/// Build a key from a prefix and suffix.
pub fn key(prefix: &KeyRange, suffix: &str) -> Vec<u8> {
    let mut out = prefix.begin().to_vec();
    out.extend_from_slice(suffix.as_bytes());
    out
}

/// Create a tenant through the store's directory.
pub async fn create_tenant(client: &BlobClient, name: &str) {
    let directory = StoreTenantDirectory::new();
    client
        .database()
        .run(|tr| directory.create_tenant(tr, name))
        .await
        .expect("Failed to create tenant");
}

/// Write `content` to a temp config file.
pub fn config_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

/// Create a config with paths.
pub fn create_config_with_paths(storage_dir: &str) -> NamedTempFile {
    config_file(&format!(
        r#"
[purge]
poll_interval_ms = 5

[paths]
storage_dir = "{}"
"#,
        storage_dir
    ))
}

/// Load a config from a temp file.
pub fn load_config(file: &NamedTempFile) -> Config {
    Config::from_file(file.path()).expect("Failed to load config")
}
