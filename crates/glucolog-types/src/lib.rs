//! Shared types for the glucolog measurement aggregation engine.
//!
//! This crate provides the data types used by both the storage layer
//! (glucolog-store) and the query/ingestion layer (glucolog-engine).
//!
//! # Features
//!
//! - [`Measurement`]: a single timestamped glucose reading
//! - Day-boundary helpers for UTC calendar-day bucketing
//! - Identifier validation for opaque user/device ids
//! - Record shapes for externally managed users and devices
//!
//! # Example
//!
//! ```
//! use glucolog_types::{Measurement, day};
//! use time::macros::datetime;
//!
//! let m = Measurement::new(datetime!(2024-03-15 08:30:00 UTC), 104);
//! assert_eq!(day::truncate_to_day(m.time).to_string(), "2024-03-15");
//! ```

pub mod day;
pub mod error;
pub mod records;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use records::{Device, DeviceKind, User};
pub use types::{DailyMetrics, DayDeviceCounts, DeviceCount, Measurement};

/// Validate an opaque user or device identifier.
///
/// Identifiers are caller-supplied keys: non-empty, at most 64 characters,
/// limited to ASCII alphanumerics plus `-`, `_`, and `:`.
pub fn validate_id(id: &str) -> ParseResult<()> {
    if id.is_empty() || id.len() > 64 {
        return Err(ParseError::InvalidIdentifier(id.to_string()));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':'))
    {
        return Err(ParseError::InvalidIdentifier(id.to_string()));
    }
    Ok(())
}
