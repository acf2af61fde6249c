//! Commit versions.
//!
//! A version is the monotone commit sequence number of the store. Every
//! committed write transaction advances it by exactly one; version 0 is the
//! empty database.

use serde::{Deserialize, Serialize};

/// A commit version, also used as a read snapshot.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Version(pub u64);

impl Version {
    /// Version of the empty database.
    pub const ZERO: Version = Version(0);

    pub const fn new(version: u64) -> Self {
        Self(version)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// Next commit version.
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(version: u64) -> Self {
        Self::new(version)
    }
}
