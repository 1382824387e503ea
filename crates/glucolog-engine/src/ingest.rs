//! Write-side entry point: single and batched measurement ingestion.

use std::collections::BTreeMap;
use std::sync::Arc;

use time::{Date, OffsetDateTime};
use tracing::debug;

use glucolog_store::BucketStore;
use glucolog_types::{Measurement, day};

use crate::error::Result;

/// Accepts measurements and drives bucket merges.
///
/// Batches are grouped by UTC calendar day so each day group costs exactly
/// one store write instead of one per measurement.
pub struct IngestionEngine {
    store: Arc<BucketStore>,
}

impl IngestionEngine {
    /// Create an engine over an existing store handle.
    pub fn new(store: Arc<BucketStore>) -> Self {
        Self { store }
    }

    /// Ingest a single measurement.
    pub fn ingest_one(
        &self,
        device_id: &str,
        user_id: &str,
        time: OffsetDateTime,
        value: i64,
    ) -> Result<()> {
        self.store.merge(device_id, user_id, time, value)?;
        Ok(())
    }

    /// Ingest a batch of measurements for one device.
    ///
    /// The batch is grouped by each measurement's truncated day, preserving
    /// arrival order within a group, and every group is merged with one
    /// store call. The final bucket state is identical to calling
    /// [`ingest_one`] once per measurement in slice order.
    ///
    /// Day groups commit independently: if one group fails, groups already
    /// merged stay durable and the error is returned with the failed
    /// bucket's key attached.
    ///
    /// [`ingest_one`]: IngestionEngine::ingest_one
    pub fn ingest_batch(
        &self,
        device_id: &str,
        user_id: &str,
        measurements: &[Measurement],
    ) -> Result<()> {
        let mut groups: BTreeMap<Date, Vec<Measurement>> = BTreeMap::new();
        for m in measurements {
            groups.entry(day::truncate_to_day(m.time)).or_default().push(*m);
        }

        debug!(
            "Ingesting {} measurement(s) for {} across {} day group(s)",
            measurements.len(),
            device_id,
            groups.len()
        );

        for (group_day, group) in &groups {
            self.store
                .merge_group(device_id, user_id, *group_day, group)?;
        }
        Ok(())
    }
}
