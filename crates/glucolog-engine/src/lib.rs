//! Ingestion and query engines over the glucolog bucket store.
//!
//! Three components sit on top of [`glucolog_store::BucketStore`]:
//!
//! - [`IngestionEngine`]: write-side entry point; accepts single or batched
//!   measurements and hides day-grouping from the store
//! - [`RangeQueryEngine`]: reconstructs per-day measurement lists and
//!   statistics for a user over a date window
//! - [`CrossDeviceAggregator`]: per-day reading counts by device over a
//!   lookback window
//!
//! Store handles are constructed once and passed in explicitly; there is no
//! ambient global state.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use glucolog_engine::{IngestionEngine, RangeQueryEngine};
//! use glucolog_store::BucketStore;
//! use time::OffsetDateTime;
//!
//! let store = Arc::new(BucketStore::open_default()?);
//! let ingest = IngestionEngine::new(store.clone());
//! ingest.ingest_one("cgm-1", "user-1", OffsetDateTime::now_utc(), 104)?;
//!
//! let queries = RangeQueryEngine::new(store);
//! let overview = queries.fetch_overview("user-1", None, None)?;
//! # Ok::<(), glucolog_engine::Error>(())
//! ```

mod devices;
mod error;
mod ingest;
mod overview;

pub use devices::CrossDeviceAggregator;
pub use error::{Error, Result};
pub use ingest::IngestionEngine;
pub use overview::{DailyOverview, RangeQueryEngine};
