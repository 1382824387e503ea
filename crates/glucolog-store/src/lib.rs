//! Day-bucketed persistence for glucolog measurement data.
//!
//! This crate provides SQLite-based storage for glucose measurements,
//! grouped into per-device-per-calendar-day buckets with running
//! statistics that are maintained incrementally on every write.
//!
//! # Features
//!
//! - Atomic merge-on-write: appending a measurement and updating the
//!   bucket's min/max/sum/count/avg is a single transaction
//! - Folded group merges for batched ingestion (one write per day group)
//! - Range reads by user and day window, ascending by day
//! - Per-day, per-device reading counts over a lookback window
//!
//! # Example
//!
//! ```no_run
//! use glucolog_store::BucketStore;
//! use time::OffsetDateTime;
//!
//! let store = BucketStore::open_default()?;
//! store.merge("cgm-1", "user-1", OffsetDateTime::now_utc(), 104)?;
//! # Ok::<(), glucolog_store::Error>(())
//! ```

mod error;
mod models;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::StoredBucket;
pub use store::BucketStore;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/glucolog/data.db`
/// - macOS: `~/Library/Application Support/glucolog/data.db`
/// - Windows: `C:\Users\<user>\AppData\Local\glucolog\data.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("glucolog")
        .join("data.db")
}
