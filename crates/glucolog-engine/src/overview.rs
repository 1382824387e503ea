//! Read-side reconstruction of per-day measurements and statistics.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use time::{Date, Duration, OffsetDateTime};
use tracing::{debug, warn};

use glucolog_store::BucketStore;
use glucolog_types::{DailyMetrics, Measurement, day};

use crate::error::Result;

/// Days of history returned when no start date is given.
const DEFAULT_LOOKBACK_DAYS: i64 = 14;

/// One calendar day of a user's measurements with recomputed statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyOverview {
    /// Owning user's id.
    pub user_id: String,
    /// The day as `YYYY-MM-DD`.
    pub day: String,
    /// All of the user's measurements that day across devices, in arrival
    /// order per device.
    pub readings: Vec<Measurement>,
    /// Metrics recomputed from `readings`, not from persisted running
    /// fields.
    pub metrics: DailyMetrics,
}

/// Reconstructs per-day overviews for a user across a date window.
pub struct RangeQueryEngine {
    store: Arc<BucketStore>,
}

impl RangeQueryEngine {
    /// Create an engine over an existing store handle.
    pub fn new(store: Arc<BucketStore>) -> Self {
        Self { store }
    }

    /// Fetch a user's per-day overview for `[start, end]` inclusive.
    ///
    /// `start` defaults to 14 days before today (UTC), `end` to today. Each
    /// day's entries are filtered to those whose calendar date matches the
    /// bucket's day key, buckets of the same day across devices merge into
    /// one result, and metrics are recomputed from the surviving entries so
    /// a stored entry on the wrong day can never corrupt the statistics.
    pub fn fetch_overview(
        &self,
        user_id: &str,
        start: Option<Date>,
        end: Option<Date>,
    ) -> Result<Vec<DailyOverview>> {
        let today = day::truncate_to_day(OffsetDateTime::now_utc());
        let start = start.unwrap_or(today - Duration::days(DEFAULT_LOOKBACK_DAYS));
        let end = end.unwrap_or(today);

        let buckets = self.store.fetch_range(user_id, start, end)?;
        debug!(
            "Building overview for {} from {} bucket(s) in [{}, {}]",
            user_id,
            buckets.len(),
            start,
            end
        );

        let mut days: BTreeMap<Date, Vec<Measurement>> = BTreeMap::new();
        for bucket in &buckets {
            let entries = days.entry(bucket.day).or_default();
            let before = entries.len();
            entries.extend(
                bucket
                    .entries
                    .iter()
                    .filter(|m| day::truncate_to_day(m.time) == bucket.day)
                    .copied(),
            );

            let kept = entries.len() - before;
            if kept != bucket.entries.len() {
                warn!(
                    "Bucket ({}, {}) holds {} entr(ies) dated outside its day; \
                     excluded from the overview",
                    bucket.device_id,
                    bucket.day,
                    bucket.entries.len() - kept
                );
            } else if let Some(recomputed) = DailyMetrics::compute(&entries[before..]) {
                // With nothing filtered, the persisted running stats must
                // agree with a fresh recomputation.
                let persisted = bucket.metrics();
                if persisted.min_value != recomputed.min_value
                    || persisted.max_value != recomputed.max_value
                    || (persisted.avg_value - recomputed.avg_value).abs() > 1e-9
                {
                    warn!(
                        "Bucket ({}, {}) persisted stats {:?} disagree with recomputed {:?}",
                        bucket.device_id, bucket.day, persisted, recomputed
                    );
                }
            }
        }

        Ok(days
            .into_iter()
            .map(|(result_day, readings)| {
                let metrics = DailyMetrics::compute(&readings).unwrap_or_default();
                DailyOverview {
                    user_id: user_id.to_string(),
                    day: day::format_day(result_day),
                    readings,
                    metrics,
                }
            })
            .collect())
    }

    /// Fetch an overview with `YYYY-MM-DD` string bounds, as received from
    /// an outer API layer. Malformed dates surface a validation error.
    pub fn fetch_overview_str(
        &self,
        user_id: &str,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Vec<DailyOverview>> {
        let start = start.map(day::parse_day).transpose()?;
        let end = end.map(day::parse_day).transpose()?;
        self.fetch_overview(user_id, start, end)
    }
}
