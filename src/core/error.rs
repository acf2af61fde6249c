//! Error types and failure-kind classification.
//!
//! Expected business-rule outcomes (an overlapping or redundant activation)
//! are returned as `bool`, never as errors. Everything in [`GranaryError`]
//! is a failure that propagates to the caller, except [`GranaryError::Conflict`]
//! which the transaction runner retries transparently.

use thiserror::Error;

/// Granary error conditions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GranaryError {
    /// The named tenant does not exist in the tenant directory.
    #[error("tenant_not_found: {name}")]
    TenantNotFound { name: String },

    /// A referenced object (purge task, bulk dump job) does not exist.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// The request cannot be served as asked, e.g. a purge that would cut a
    /// granule in two.
    #[error("unsupported_operation: {message}")]
    UnsupportedOperation { message: String },

    /// The operation was aborted because the database is shutting down.
    #[error("operation_cancelled")]
    Cancelled,

    /// Optimistic concurrency conflict; the whole transaction must be re-run.
    #[error("not_committed: transaction conflict at read version {read_version}")]
    Conflict { read_version: u64 },

    /// Requested read version is below the compaction floor.
    #[error("transaction_too_old: version {version} is below the oldest readable version {oldest}")]
    VersionTooOld { version: u64, oldest: u64 },

    /// Requested read version has not been committed yet.
    #[error("future_version: version {version} is newer than committed version {committed}")]
    FutureVersion { version: u64, committed: u64 },

    /// Malformed key range (empty, inverted, or outside the permitted keyspace).
    #[error("invalid range: {message}")]
    InvalidRange { message: String },

    /// Invalid request arguments.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// A stored record could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec { message: String },

    /// Internal invariant violation.
    #[error("internal error: {message}")]
    Internal { message: String },
}

/// Closed classification of failures; callers match on this instead of
/// inspecting individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    UnsupportedOperation,
    Cancelled,
    Conflict,
    InvalidArgument,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "NotFound"),
            Self::UnsupportedOperation => write!(f, "UnsupportedOperation"),
            Self::Cancelled => write!(f, "Cancelled"),
            Self::Conflict => write!(f, "Conflict"),
            Self::InvalidArgument => write!(f, "InvalidArgument"),
            Self::Internal => write!(f, "Internal"),
        }
    }
}

impl GranaryError {
    /// Create a TenantNotFound error.
    pub fn tenant_not_found(name: impl Into<String>) -> Self {
        Self::TenantNotFound { name: name.into() }
    }

    /// Create a NotFound error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create an UnsupportedOperation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            message: message.into(),
        }
    }

    /// Create an InvalidRange error.
    pub fn invalid_range(message: impl Into<String>) -> Self {
        Self::InvalidRange {
            message: message.into(),
        }
    }

    /// Create an InvalidRequest error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create an Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Failure kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TenantNotFound { .. } | Self::NotFound { .. } => ErrorKind::NotFound,
            Self::UnsupportedOperation { .. } => ErrorKind::UnsupportedOperation,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::VersionTooOld { .. }
            | Self::FutureVersion { .. }
            | Self::InvalidRange { .. }
            | Self::InvalidRequest { .. } => ErrorKind::InvalidArgument,
            Self::Codec { .. } | Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Check if the whole transaction should be re-run.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Check if this error reports an environment-driven abort.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<bincode::Error> for GranaryError {
    fn from(err: bincode::Error) -> Self {
        Self::Codec {
            message: err.to_string(),
        }
    }
}

/// Result type using GranaryError.
pub type GranaryResult<T> = Result<T, GranaryError>;
