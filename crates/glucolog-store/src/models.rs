//! Data models for stored buckets.

use serde::{Deserialize, Serialize};
use time::Date;

use glucolog_types::{DailyMetrics, Measurement};

/// A bucket stored in the database: one device, one UTC calendar day.
///
/// `entries` holds the raw measurements in arrival order (not necessarily
/// sorted by time). The running statistics are maintained incrementally by
/// [`BucketStore::merge`](crate::BucketStore::merge) and satisfy
/// `count_readings == entries.len()`, `min_value == min(entries)`,
/// `max_value == max(entries)`, and
/// `avg_value == sum_values / count_readings` whenever non-empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredBucket {
    /// Database row ID.
    #[serde(skip)]
    pub id: i64,
    /// Owning user's id, set at bucket creation.
    pub user_id: String,
    /// Device identifier; part of the bucket key.
    pub device_id: String,
    /// UTC calendar day; part of the bucket key.
    #[serde(with = "glucolog_types::day::serde_day")]
    pub day: Date,
    /// Raw measurements in arrival order.
    #[serde(rename = "readings")]
    pub entries: Vec<Measurement>,
    /// Running minimum across all entries ever appended.
    pub min_value: i64,
    /// Running maximum across all entries ever appended.
    pub max_value: i64,
    /// Running sum of all values.
    pub sum_values: i64,
    /// Running count of entries.
    pub count_readings: u64,
    /// Derived mean, equal to `sum_values / count_readings`.
    pub avg_value: f64,
}

impl StoredBucket {
    /// The persisted running statistics as a [`DailyMetrics`].
    pub fn metrics(&self) -> DailyMetrics {
        DailyMetrics {
            min_value: self.min_value,
            max_value: self.max_value,
            avg_value: self.avg_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn test_stored_bucket_serializes_to_wire_contract() {
        let bucket = StoredBucket {
            id: 7,
            user_id: "u1".to_string(),
            device_id: "d1".to_string(),
            day: date!(2024-03-15),
            entries: vec![Measurement::new(datetime!(2024-03-15 08:00:00 UTC), 100)],
            min_value: 100,
            max_value: 100,
            sum_values: 100,
            count_readings: 1,
            avg_value: 100.0,
        };

        let json = serde_json::to_value(&bucket).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["deviceId"], "d1");
        assert_eq!(json["day"], "2024-03-15");
        assert_eq!(json["readings"][0]["value"], 100);
        assert_eq!(json["minValue"], 100);
        assert_eq!(json["maxValue"], 100);
        assert_eq!(json["sumValues"], 100);
        assert_eq!(json["countReadings"], 1);
        assert_eq!(json["avgValue"], 100.0);
        assert!(json.get("id").is_none());
    }
}
