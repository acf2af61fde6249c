//! Key ranges, interval maps, and the system keyspace layout.
//!
//! - [`range`] - Half-open byte-string ranges and key helpers
//! - [`range_map`] - Ordered non-overlapping interval map
//! - [`system`] - Reserved system key prefixes

pub mod range;
pub mod range_map;
pub mod system;

pub use range::{key_after, parse_printable, printable, strinc, KeyRange};
pub use range_map::{OverlapError, RangeMap};
