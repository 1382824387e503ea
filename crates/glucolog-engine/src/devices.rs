//! Per-day reading counts grouped by device.

use std::sync::Arc;

use glucolog_store::BucketStore;
use glucolog_types::DayDeviceCounts;

use crate::error::Result;

/// Groups bucket counts by day and device over a lookback window.
///
/// A thin transform over
/// [`BucketStore::fetch_daily_device_counts`]: counts are trusted from the
/// persisted `count_readings` fields with no recomputation, unlike the
/// overview path. Device counts report ingestion volume, not aggregated
/// values, so the defensive re-derivation there does not apply here.
pub struct CrossDeviceAggregator {
    store: Arc<BucketStore>,
}

impl CrossDeviceAggregator {
    /// Create an aggregator over an existing store handle.
    pub fn new(store: Arc<BucketStore>) -> Self {
        Self { store }
    }

    /// Per-day, per-device reading counts for the last `lookback_days`.
    ///
    /// Days ascend; within a day, devices ascend by id. A user with no
    /// buckets in the window yields an empty vec.
    pub fn devices_overview(&self, user_id: &str, lookback_days: i64) -> Result<Vec<DayDeviceCounts>> {
        Ok(self.store.fetch_daily_device_counts(user_id, lookback_days)?)
    }
}
