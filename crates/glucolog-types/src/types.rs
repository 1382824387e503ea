//! Core types for glucose measurement data.

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

/// A single glucose reading taken from a device.
///
/// Immutable once recorded. The value is an integer in the device's native
/// unit; no unit conversion happens anywhere in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    /// When the reading was taken.
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    /// The measured glucose value.
    pub value: i64,
}

impl Measurement {
    /// Create a measurement.
    pub fn new(time: OffsetDateTime, value: i64) -> Self {
        Self { time, value }
    }
}

/// Aggregated statistics for one calendar day of readings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyMetrics {
    /// Minimum value observed.
    pub min_value: i64,
    /// Maximum value observed.
    pub max_value: i64,
    /// Arithmetic mean of all values.
    pub avg_value: f64,
}

impl DailyMetrics {
    /// Compute metrics over a set of measurements.
    ///
    /// Returns `None` for an empty set: min/max/avg are undefined without
    /// at least one reading.
    pub fn compute(measurements: &[Measurement]) -> Option<Self> {
        let first = measurements.first()?;
        let mut min_value = first.value;
        let mut max_value = first.value;
        let mut sum: i64 = 0;
        for m in measurements {
            min_value = min_value.min(m.value);
            max_value = max_value.max(m.value);
            sum += m.value;
        }
        Some(Self {
            min_value,
            max_value,
            avg_value: sum as f64 / measurements.len() as f64,
        })
    }
}

/// Per-device reading count within a single day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCount {
    /// Device identifier.
    pub device_id: String,
    /// Number of readings the device contributed that day.
    pub count: u64,
}

/// Reading counts for every device that contributed on one day.
///
/// Devices are ordered ascending by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayDeviceCounts {
    /// The calendar day.
    #[serde(with = "crate::day::serde_day")]
    pub day: Date,
    /// Per-device counts, ascending by device id.
    pub devices: Vec<DeviceCount>,
}
