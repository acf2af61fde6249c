//! Core runtime infrastructure.
//!
//! This module contains the essential components for running Granary:
//! - [`config`] - Configuration parsing and validation
//! - [`runtime`] - Main runtime orchestration
//! - [`error`] - Error types and failure classification

pub mod config;
pub mod error;
pub mod runtime;
